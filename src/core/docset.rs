use std::collections::{BTreeMap, HashMap};

use crate::core::IndexDocument;

/// 有序、key 唯一的文档集合。
///
/// - 迭代顺序 = 首次插入顺序（seq 单调递增）
/// - upsert 已存在的 key：原位替换，不改变顺序（last write wins）
#[derive(Clone, Debug, Default)]
pub struct DocumentSet {
    next_seq: u64,
    docs: BTreeMap<u64, IndexDocument>,
    by_key: HashMap<String, u64>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(docs: impl IntoIterator<Item = IndexDocument>) -> Self {
        let mut set = Self::new();
        for d in docs {
            set.upsert(d);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// 返回 true 表示替换了同 key 的旧文档
    pub fn upsert(&mut self, doc: IndexDocument) -> bool {
        if let Some(&seq) = self.by_key.get(doc.primary_key()) {
            self.docs.insert(seq, doc);
            return true;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_key.insert(doc.primary_key().to_string(), seq);
        self.docs.insert(seq, doc);
        false
    }

    pub fn remove(&mut self, primary_key: &str) -> Option<IndexDocument> {
        let seq = self.by_key.remove(primary_key)?;
        self.docs.remove(&seq)
    }

    pub fn get(&self, primary_key: &str) -> Option<&IndexDocument> {
        let seq = self.by_key.get(primary_key)?;
        self.docs.get(seq)
    }

    pub fn contains_key(&self, primary_key: &str) -> bool {
        self.by_key.contains_key(primary_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexDocument> {
        self.docs.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.docs.values().map(|d| d.primary_key())
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.by_key.clear();
    }

    /// 重新编号（optimize 用）：顺序不变，seq 收敛为 0..len
    pub fn compacted(&self) -> Self {
        Self::from_documents(self.iter().cloned())
    }

    pub fn to_documents(&self) -> Vec<IndexDocument> {
        self.iter().cloned().collect()
    }
}
