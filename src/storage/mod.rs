pub mod cache;
pub mod disk;
pub mod snapshot;

use serde::Serialize;

use crate::core::IndexDocument;
use crate::error::Result;
use crate::query::{MatchKind, Query};

pub use cache::DocumentIndexCache;
pub use disk::DiskIndex;
pub use snapshot::{IndexSnapshot, SnapshotLoad, SnapshotStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    /// 尚无已提交文档
    Empty,
    Valid,
    /// 磁盘数据校验失败，需要 clear 后重建
    Invalid,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Empty => "empty",
            IndexStatus::Valid => "valid",
            IndexStatus::Invalid => "invalid",
        }
    }
}

/// 持久化 base store 抽象（每个 root 一个实例）。
///
/// ## 契约
/// - 自身保证线程安全：add/remove/query/commit 可被任意线程并发调用。
/// - `add_document`/`remove_document` 只进 pending；`store`/`commit` 之后才对查询可见。
/// - `close` 幂等；close 之后其余调用一律返回 `IndexError::Closed`。
pub trait TextIndexStore: Send + Sync {
    fn add_document(&self, doc: IndexDocument) -> Result<()>;
    fn remove_document(&self, primary_key: &str) -> Result<()>;
    fn status(&self) -> Result<IndexStatus>;
    fn close(&self) -> Result<()>;
    /// 提交 pending 并落盘；`optimize` 时额外整理存储
    fn store(&self, optimize: bool) -> Result<()>;
    fn rollback(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    /// 两阶段提交的 prepare：落盘但不发布
    fn tx_store(&self) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn query(&self, query: &Query, fields_to_load: &[&str]) -> Result<Vec<IndexDocument>>;
    fn find_by_primary_key(
        &self,
        primary_key: &str,
        kind: MatchKind,
        fields_to_load: &[&str],
    ) -> Result<Vec<IndexDocument>>;
    fn mark_key_dirty(&self, primary_key: &str) -> Result<()>;
    fn remove_dirty_keys(&self, keys: &[String]) -> Result<()>;
    fn dirty_keys(&self) -> Result<Vec<String>>;
    /// 已提交文档数
    fn document_count(&self) -> Result<usize>;
}
