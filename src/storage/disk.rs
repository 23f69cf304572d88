use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::StoreOptions;
use crate::core::{DocumentSet, IndexDocument};
use crate::error::{IndexError, IoContext, Result};
use crate::query::{collect_matches, MatchKind, Query};
use crate::storage::cache::DocumentIndexCache;
use crate::storage::snapshot::{IndexSnapshot, SnapshotLoad, SnapshotStore};
use crate::storage::{IndexStatus, TextIndexStore};

pub const INDEX_FILE: &str = "index.db";
pub const TX_FILE: &str = "index.db.tx";

/// 目录级持久索引：已提交文档整体存为一个原子快照。
///
/// - 写入先进 `DocumentIndexCache` 的 pending 缓冲
/// - `tx_store`：pending 叠加到 staged（或 committed）上，写 `index.db.tx`，不发布
/// - `commit`：rename `index.db.tx` -> `index.db`，再原子切换 committed（查询无锁读）
pub struct DiskIndex {
    dir: PathBuf,
    main: SnapshotStore,
    tx: SnapshotStore,
    committed: ArcSwap<DocumentSet>,
    staged: Mutex<Option<DocumentSet>>,
    generation: AtomicU64,
    cache: Arc<DocumentIndexCache>,
    /// tx_store/commit/rollback/clear 串行化；查询不经过它
    write_gate: Mutex<()>,
    invalid: AtomicBool,
    closed: AtomicBool,
    options: StoreOptions,
}

impl DiskIndex {
    /// 目录不存在则创建
    pub fn create(dir: &Path, cache: Arc<DocumentIndexCache>, options: StoreOptions) -> Result<Self> {
        std::fs::create_dir_all(dir).at(&dir.display())?;
        Self::open(dir, cache, options)
    }

    pub fn open(dir: &Path, cache: Arc<DocumentIndexCache>, options: StoreOptions) -> Result<Self> {
        if !dir.is_dir() {
            return Err(IndexError::io(
                dir.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "index directory does not exist"),
            ));
        }

        let main = SnapshotStore::new(dir.join(INDEX_FILE));
        let tx = SnapshotStore::new(dir.join(TX_FILE));

        // 崩溃残留：未 commit 的事务文件与 tmp 一律丢弃
        if tx.exists() {
            tracing::warn!("Discarding uncommitted transaction at {:?}", tx.path());
            tx.remove()?;
        }
        main.remove_stale_tmp();

        let (docs, generation, invalid) = match main.load()? {
            SnapshotLoad::Missing => (DocumentSet::new(), 0, false),
            SnapshotLoad::Loaded(snap) => {
                tracing::info!(
                    "Opened index {:?}: {} docs (generation {})",
                    dir,
                    snap.documents.len(),
                    snap.generation
                );
                (DocumentSet::from_documents(snap.documents), snap.generation, false)
            }
            SnapshotLoad::Corrupt(detail) => {
                tracing::warn!("Index snapshot {:?} is corrupted: {}", main.path(), detail);
                (DocumentSet::new(), 0, true)
            }
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            main,
            tx,
            committed: ArcSwap::from_pointee(docs),
            staged: Mutex::new(None),
            generation: AtomicU64::new(generation),
            cache,
            write_gate: Mutex::new(()),
            invalid: AtomicBool::new(invalid),
            closed: AtomicBool::new(false),
            options,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cache(&self) -> &Arc<DocumentIndexCache> {
        &self.cache
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::closed(self.dir.display().to_string()));
        }
        Ok(())
    }

    fn maybe_auto_stage(&self, pending: usize) -> Result<()> {
        let limit = self.options.pending_flush_limit;
        if limit == 0 || pending < limit {
            return Ok(());
        }
        tracing::debug!(
            "Pending buffer reached {} (limit {}), staging {:?}",
            pending,
            limit,
            self.dir
        );
        self.tx_store()
    }

    /// 调用方持有 write_gate
    fn stage_locked(&self) -> Result<()> {
        let pending = self.cache.take();
        if pending.is_empty() {
            return Ok(());
        }

        let mut staged = self.staged.lock();
        let prev = staged.take();
        let mut next = match &prev {
            Some(s) => s.clone(),
            None => (**self.committed.load()).clone(),
        };
        pending.apply_to(&mut next);

        let snap = IndexSnapshot {
            generation: self.generation() + 1,
            documents: next.to_documents(),
        };
        if let Err(e) = self.tx.write_atomic(&snap, self.options.sync_on_store) {
            *staged = prev;
            self.cache.restore(pending);
            return Err(e);
        }

        tracing::debug!("Staged {} changes into {:?}", pending.len(), self.tx.path());
        *staged = Some(next);
        Ok(())
    }

    /// 调用方持有 write_gate
    fn commit_locked(&self) -> Result<()> {
        self.stage_locked()?;

        let mut staged = self.staged.lock();
        let Some(next) = staged.take() else {
            return Ok(());
        };
        if let Err(e) = self.tx.promote_to(&self.main, self.options.sync_on_store) {
            *staged = Some(next);
            return Err(e);
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let count = next.len();
        self.committed.store(Arc::new(next));
        self.invalid.store(false, Ordering::Release);
        tracing::debug!(
            "Committed {:?}: {} docs (generation {})",
            self.dir,
            count,
            generation
        );
        Ok(())
    }

    fn optimize_locked(&self) -> Result<()> {
        let compacted = self.committed.load().compacted();
        let snap = IndexSnapshot {
            generation: self.generation(),
            documents: compacted.to_documents(),
        };
        self.main.write_atomic(&snap, self.options.sync_on_store)?;
        self.committed.store(Arc::new(compacted));
        if self.main.remove_stale_tmp() || self.tx.remove_stale_tmp() {
            tracing::debug!("Removed stale temp files in {:?}", self.dir);
        }
        tracing::info!("Optimized index {:?}: {} docs", self.dir, snap.documents.len());
        Ok(())
    }
}

impl TextIndexStore for DiskIndex {
    fn add_document(&self, doc: IndexDocument) -> Result<()> {
        self.ensure_open()?;
        let pending = self.cache.add(doc);
        self.maybe_auto_stage(pending)
    }

    fn remove_document(&self, primary_key: &str) -> Result<()> {
        self.ensure_open()?;
        let pending = self.cache.remove(primary_key);
        self.maybe_auto_stage(pending)
    }

    fn status(&self) -> Result<IndexStatus> {
        self.ensure_open()?;
        if self.invalid.load(Ordering::Acquire) {
            return Ok(IndexStatus::Invalid);
        }
        if self.committed.load().is_empty() {
            return Ok(IndexStatus::Empty);
        }
        Ok(IndexStatus::Valid)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _g = self.write_gate.lock();
        let dropped = self.cache.discard_pending();
        let had_tx = self.staged.lock().take().is_some();
        if had_tx {
            self.tx.remove()?;
        }
        if dropped > 0 || had_tx {
            tracing::debug!(
                "Closed {:?}, discarded {} pending changes (staged tx: {})",
                self.dir,
                dropped,
                had_tx
            );
        }
        Ok(())
    }

    fn store(&self, optimize: bool) -> Result<()> {
        self.ensure_open()?;
        let _g = self.write_gate.lock();
        self.commit_locked()?;
        if optimize {
            self.optimize_locked()?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        let _g = self.write_gate.lock();
        let dropped = self.cache.discard_pending();
        let had_tx = self.staged.lock().take().is_some();
        self.tx.remove()?;
        tracing::debug!(
            "Rolled back {:?}: {} pending changes (staged tx: {})",
            self.dir,
            dropped,
            had_tx
        );
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let _g = self.write_gate.lock();
        self.commit_locked()
    }

    fn tx_store(&self) -> Result<()> {
        self.ensure_open()?;
        let _g = self.write_gate.lock();
        self.stage_locked()
    }

    fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let _g = self.write_gate.lock();
        self.cache.clear();
        *self.staged.lock() = None;
        self.committed.store(Arc::new(DocumentSet::new()));
        self.main.remove()?;
        self.tx.remove()?;
        self.generation.store(0, Ordering::Release);
        self.invalid.store(false, Ordering::Release);
        tracing::info!("Cleared index {:?}", self.dir);
        Ok(())
    }

    fn query(&self, query: &Query, fields_to_load: &[&str]) -> Result<Vec<IndexDocument>> {
        self.ensure_open()?;
        let compiled = query.compile()?;
        let docs = self.committed.load_full();
        Ok(collect_matches(
            &docs,
            &compiled,
            fields_to_load,
            self.options.parallel_query_threshold,
        ))
    }

    fn find_by_primary_key(
        &self,
        primary_key: &str,
        kind: MatchKind,
        fields_to_load: &[&str],
    ) -> Result<Vec<IndexDocument>> {
        if kind == MatchKind::Exact {
            self.ensure_open()?;
            let docs = self.committed.load();
            return Ok(docs
                .get(primary_key)
                .map(|d| vec![d.project(fields_to_load)])
                .unwrap_or_default());
        }
        self.query(&Query::primary_key(primary_key, kind), fields_to_load)
    }

    fn mark_key_dirty(&self, primary_key: &str) -> Result<()> {
        self.ensure_open()?;
        self.cache.mark_dirty(primary_key);
        Ok(())
    }

    fn remove_dirty_keys(&self, keys: &[String]) -> Result<()> {
        self.ensure_open()?;
        self.cache.remove_dirty(keys);
        Ok(())
    }

    fn dirty_keys(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.cache.dirty_keys())
    }

    fn document_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.committed.load().len())
    }
}
