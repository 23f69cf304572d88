use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::core::{DocumentSet, IndexDocument};
use crate::error::{IndexError, Result};
use crate::query::{collect_matches, CompiledQuery, MatchKind, Query};

/// 纯内存 overlay：承载 transient 文档，无持久化、无事务。
///
/// 插入即可见；同 key 再次插入原位替换（last write wins）。
pub struct OverlayIndex {
    epoch: u64,
    docs: RwLock<DocumentSet>,
    flushes: AtomicU64,
    closed: AtomicBool,
    parallel_threshold: usize,
}

impl OverlayIndex {
    pub fn open(epoch: u64, parallel_threshold: usize) -> Result<Self> {
        tracing::debug!("Overlay #{} created", epoch);
        Ok(Self {
            epoch,
            docs: RwLock::new(DocumentSet::new()),
            flushes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            parallel_threshold,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn add(&self, doc: IndexDocument) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::closed(format!("overlay#{}", self.epoch)));
        }
        self.docs.write().upsert(doc);
        Ok(())
    }

    /// 已被丢弃的 overlay 查询结果为空
    pub fn query_compiled(&self, query: &CompiledQuery, fields_to_load: &[&str]) -> Vec<IndexDocument> {
        let docs = self.docs.read();
        collect_matches(&docs, query, fields_to_load, self.parallel_threshold)
    }

    pub fn query(&self, query: &Query, fields_to_load: &[&str]) -> Result<Vec<IndexDocument>> {
        Ok(self.query_compiled(&query.compile()?, fields_to_load))
    }

    pub fn find_by_primary_key(
        &self,
        primary_key: &str,
        kind: MatchKind,
        fields_to_load: &[&str],
    ) -> Result<Vec<IndexDocument>> {
        if kind == MatchKind::Exact {
            return Ok(self
                .docs
                .read()
                .get(primary_key)
                .map(|d| vec![d.project(fields_to_load)])
                .unwrap_or_default());
        }
        self.query(&Query::primary_key(primary_key, kind), fields_to_load)
    }

    /// overlay 的 store：没有可落盘的东西，只记录一次 flush
    pub fn flush(&self) -> Result<()> {
        let n = self.flushes.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!("Overlay #{} flushed ({} docs, flush #{})", self.epoch, self.len(), n);
        Ok(())
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.docs.read().keys().map(str::to_string).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut docs = self.docs.write();
            let n = docs.len();
            docs.clear();
            n
        };
        tracing::debug!("Overlay #{} discarded ({} docs)", self.epoch, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_immediately_visible_and_last_write_wins() {
        let o = OverlayIndex::open(1, 0).unwrap();
        o.add(IndexDocument::new("a").with_field("text", "foo")).unwrap();
        o.add(IndexDocument::new("b").with_field("text", "foo")).unwrap();
        o.add(IndexDocument::new("a").with_field("text", "bar")).unwrap();

        let foo = o.query(&Query::term("text", "foo"), &[]).unwrap();
        assert_eq!(foo.len(), 1);
        assert_eq!(foo[0].primary_key(), "b");
        assert_eq!(o.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            o.find_by_primary_key("a", MatchKind::Exact, &[]).unwrap()[0].value("text"),
            Some("bar")
        );
    }

    #[test]
    fn closed_overlay_is_empty_and_rejects_adds() {
        let o = OverlayIndex::open(7, 0).unwrap();
        o.add(IndexDocument::new("a")).unwrap();
        o.close();
        o.close();
        assert!(o.is_empty());
        assert!(o.add(IndexDocument::new("b")).unwrap_err().is_closed());
        assert!(o.find_by_primary_key("a", MatchKind::Exact, &[]).unwrap().is_empty());
    }
}
