use std::collections::HashSet;

use dashmap::DashSet;
use parking_lot::Mutex;

use crate::core::{DocumentSet, IndexDocument};

/// 一批待提交变更：upserts 与 removed 的 key 互斥（后到的操作抵消先到的）。
#[derive(Clone, Debug, Default)]
pub struct PendingChanges {
    pub upserts: DocumentSet,
    pub removed: HashSet<String>,
}

impl PendingChanges {
    pub fn len(&self) -> usize {
        self.upserts.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removed.is_empty()
    }

    /// 先删后增（key 互斥，顺序无歧义）
    pub fn apply_to(&self, target: &mut DocumentSet) {
        for k in &self.removed {
            target.remove(k);
        }
        for d in self.upserts.iter() {
            target.upsert(d.clone());
        }
    }
}

/// 每个 root 的簿记对象：base store 的 pending 缓冲 + dirty key 集合。
///
/// registry 与 store 共享同一个实例；增量重建驱动可以通过 factory 拿到它，
/// 观察积压量或 dirty key。
#[derive(Debug, Default)]
pub struct DocumentIndexCache {
    pending: Mutex<PendingChanges>,
    dirty: DashSet<String>,
}

impl DocumentIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回当前 pending 条数
    pub fn add(&self, doc: IndexDocument) -> usize {
        let mut p = self.pending.lock();
        p.removed.remove(doc.primary_key());
        p.upserts.upsert(doc);
        p.len()
    }

    pub fn remove(&self, primary_key: &str) -> usize {
        let mut p = self.pending.lock();
        p.upserts.remove(primary_key);
        p.removed.insert(primary_key.to_string());
        p.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.lock().upserts.keys().map(str::to_string).collect()
    }

    pub fn removed_keys(&self) -> Vec<String> {
        let mut v: Vec<String> = self.pending.lock().removed.iter().cloned().collect();
        v.sort();
        v
    }

    /// 取走全部 pending（留下空缓冲）
    pub fn take(&self) -> PendingChanges {
        std::mem::take(&mut *self.pending.lock())
    }

    /// 落盘失败时放回取走的变更；期间新到的变更覆盖旧的。
    pub fn restore(&self, older: PendingChanges) {
        let mut p = self.pending.lock();
        let newer = std::mem::replace(&mut *p, older);
        for k in newer.removed {
            p.upserts.remove(&k);
            p.removed.insert(k);
        }
        for d in newer.upserts.iter() {
            p.removed.remove(d.primary_key());
            p.upserts.upsert(d.clone());
        }
    }

    pub fn discard_pending(&self) -> usize {
        let mut p = self.pending.lock();
        let n = p.len();
        *p = PendingChanges::default();
        n
    }

    pub fn mark_dirty(&self, primary_key: &str) {
        self.dirty.insert(primary_key.to_string());
    }

    pub fn remove_dirty(&self, keys: &[String]) {
        for k in keys {
            self.dirty.remove(k);
        }
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        let mut v: Vec<String> = self.dirty.iter().map(|k| k.key().clone()).collect();
        v.sort();
        v
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn clear(&self) {
        self.discard_pending();
        self.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_cancel_in_order() {
        let c = DocumentIndexCache::new();
        c.add(IndexDocument::new("a"));
        c.remove("a");
        assert!(c.pending_keys().is_empty());
        assert_eq!(c.removed_keys(), vec!["a".to_string()]);

        c.add(IndexDocument::new("a"));
        assert!(c.removed_keys().is_empty());
        assert_eq!(c.pending_len(), 1);

        let taken = c.take();
        assert_eq!(taken.len(), 1);
        assert!(c.is_empty());
    }

    #[test]
    fn pending_applies_removals_then_upserts() {
        let mut base = DocumentSet::from_documents(vec![
            IndexDocument::new("a").with_field("v", "old"),
            IndexDocument::new("b"),
        ]);
        let c = DocumentIndexCache::new();
        c.remove("b");
        c.add(IndexDocument::new("a").with_field("v", "new"));
        c.take().apply_to(&mut base);
        assert_eq!(base.len(), 1);
        assert_eq!(base.get("a").and_then(|d| d.value("v")), Some("new"));
    }

    #[test]
    fn dirty_keys_sorted_and_removable() {
        let c = DocumentIndexCache::new();
        c.mark_dirty("z");
        c.mark_dirty("a");
        c.mark_dirty("a");
        assert_eq!(c.dirty_keys(), vec!["a".to_string(), "z".to_string()]);
        c.remove_dirty(&["z".to_string()]);
        assert_eq!(c.dirty_keys(), vec!["a".to_string()]);
    }
}
