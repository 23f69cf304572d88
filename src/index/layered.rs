use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{IndexDocument, Root, UpdateScope};
use crate::error::{IndexError, Result};
use crate::index::overlay::OverlayIndex;
use crate::query::{MatchKind, Query};
use crate::stats::{IndexReport, OverlayStats};
use crate::storage::{DocumentIndexCache, IndexStatus, TextIndexStore};

#[derive(Default)]
struct OverlayState {
    overlay: Option<Arc<OverlayIndex>>,
    /// overlay 取代的 base 文档 key（查询时屏蔽 base 侧同 key 结果）
    suppressed: HashSet<String>,
}

/// 两层索引：持久 base store + 可选的内存 overlay。
///
/// 写入按调用方传入的 `UpdateScope` 路由：transient 只进 overlay，durable 只进 base。
/// 查询总是合并两层：先 base（剔除被屏蔽的 key），再 overlay，各自保持原顺序。
///
/// ## 并发
/// - overlay 引用与屏蔽集合由同一把锁保护；查询在锁内取快照（屏蔽集合拷贝），锁外执行
/// - overlay 惰性创建：同一 epoch 内并发的首个写者只会构造一个实例
pub struct LayeredIndex {
    root: Root,
    base: Arc<dyn TextIndexStore>,
    cache: Option<Arc<DocumentIndexCache>>,
    state: Mutex<OverlayState>,
    overlays_created: AtomicU64,
    closed: AtomicBool,
    parallel_threshold: usize,
}

impl LayeredIndex {
    pub fn new(root: Root, base: Arc<dyn TextIndexStore>) -> Self {
        Self {
            root,
            base,
            cache: None,
            state: Mutex::new(OverlayState::default()),
            overlays_created: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            parallel_threshold: 0,
        }
    }

    /// 挂上 base 的簿记对象（仅用于报告 pending 积压）
    pub fn with_cache(mut self, cache: Arc<DocumentIndexCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn base(&self) -> &Arc<dyn TextIndexStore> {
        &self.base
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::closed(self.root.as_str()));
        }
        Ok(())
    }

    /// 取当前 overlay，不存在则创建（持锁调用）
    fn overlay_locked(&self, st: &mut OverlayState) -> Result<Arc<OverlayIndex>> {
        if let Some(o) = &st.overlay {
            return Ok(o.clone());
        }
        let epoch = self.overlays_created.load(Ordering::Acquire) + 1;
        // 构造失败时 st 不变，下次写入可重试
        let o = Arc::new(OverlayIndex::open(epoch, self.parallel_threshold)?);
        self.overlays_created.store(epoch, Ordering::Release);
        st.overlay = Some(o.clone());
        tracing::debug!("Transient overlay #{} opened for {}", epoch, self.root);
        Ok(o)
    }

    /// 丢弃 overlay：清空屏蔽集合并同步关闭实例
    fn clear_overlay(&self) {
        let overlay = {
            let mut st = self.state.lock();
            st.suppressed.clear();
            st.overlay.take()
        };
        if let Some(o) = overlay {
            o.close();
            tracing::debug!("Transient overlay #{} cleared for {}", o.epoch(), self.root);
        }
    }

    fn snapshot(&self) -> (Option<Arc<OverlayIndex>>, HashSet<String>) {
        let st = self.state.lock();
        (st.overlay.clone(), st.suppressed.clone())
    }

    fn merge(
        base_hits: Vec<IndexDocument>,
        overlay_hits: Vec<IndexDocument>,
        suppressed: &HashSet<String>,
    ) -> Vec<IndexDocument> {
        let mut out: Vec<IndexDocument> = base_hits
            .into_iter()
            .filter(|d| !suppressed.contains(d.primary_key()))
            .collect();
        out.extend(overlay_hits);
        out
    }

    pub fn add_document(&self, scope: UpdateScope, doc: IndexDocument) -> Result<()> {
        self.ensure_open()?;
        if !scope.is_transient() {
            return self.base.add_document(doc);
        }
        let mut st = self.state.lock();
        // close 先置位再取锁清 overlay；锁内复查，避免在已关闭的索引上重建 overlay
        self.ensure_open()?;
        let overlay = self.overlay_locked(&mut st)?;
        st.suppressed.insert(doc.primary_key().to_string());
        overlay.add(doc)
    }

    pub fn remove_document(&self, scope: UpdateScope, primary_key: &str) -> Result<()> {
        self.ensure_open()?;
        if scope.is_transient() {
            tracing::debug!("Ignoring transient remove of {:?} in {}", primary_key, self.root);
            return Ok(());
        }
        self.base.remove_document(primary_key)
    }

    pub fn status(&self, scope: UpdateScope) -> Result<IndexStatus> {
        self.ensure_open()?;
        if scope.is_transient() {
            return Ok(IndexStatus::Valid);
        }
        self.base.status()
    }

    pub fn store(&self, scope: UpdateScope, optimize: bool) -> Result<()> {
        self.ensure_open()?;
        if !scope.is_transient() {
            return self.base.store(optimize);
        }
        let overlay = self.state.lock().overlay.clone();
        match overlay {
            Some(o) => o.flush(),
            None => Ok(()),
        }
    }

    pub fn rollback(&self, scope: UpdateScope) -> Result<()> {
        self.ensure_open()?;
        if scope.is_transient() {
            self.clear_overlay();
            return Ok(());
        }
        self.base.rollback()
    }

    pub fn commit(&self, scope: UpdateScope) -> Result<()> {
        self.ensure_open()?;
        if scope.is_transient() {
            return Err(IndexError::UnsupportedInTransientScope { op: "commit" });
        }
        self.base.commit()
    }

    pub fn tx_store(&self, scope: UpdateScope) -> Result<()> {
        self.ensure_open()?;
        if scope.is_transient() {
            return Err(IndexError::UnsupportedInTransientScope { op: "tx_store" });
        }
        self.base.tx_store()
    }

    pub fn clear(&self, scope: UpdateScope) -> Result<()> {
        self.ensure_open()?;
        if scope.is_transient() {
            self.clear_overlay();
            return Ok(());
        }
        self.base.clear()
    }

    pub fn query(&self, query: &Query, fields_to_load: &[&str]) -> Result<Vec<IndexDocument>> {
        self.ensure_open()?;
        let (overlay, suppressed) = self.snapshot();
        let Some(overlay) = overlay else {
            return self.base.query(query, fields_to_load);
        };
        let compiled = query.compile()?;
        let base_hits = self.base.query(query, fields_to_load)?;
        let overlay_hits = overlay.query_compiled(&compiled, fields_to_load);
        Ok(Self::merge(base_hits, overlay_hits, &suppressed))
    }

    pub fn find_by_primary_key(
        &self,
        primary_key: &str,
        kind: MatchKind,
        fields_to_load: &[&str],
    ) -> Result<Vec<IndexDocument>> {
        self.ensure_open()?;
        let (overlay, suppressed) = self.snapshot();
        let base_hits = self.base.find_by_primary_key(primary_key, kind, fields_to_load)?;
        let Some(overlay) = overlay else {
            return Ok(base_hits);
        };
        let overlay_hits = overlay.find_by_primary_key(primary_key, kind, fields_to_load)?;
        Ok(Self::merge(base_hits, overlay_hits, &suppressed))
    }

    /// 交给 base 的 dirty 簿记；overlay 存在时同时记入屏蔽集合
    pub fn mark_key_dirty(&self, primary_key: &str) -> Result<()> {
        self.ensure_open()?;
        {
            let mut st = self.state.lock();
            if st.overlay.is_some() {
                st.suppressed.insert(primary_key.to_string());
            }
        }
        self.base.mark_key_dirty(primary_key)
    }

    /// durable scope 下的 dirty flush 意味着 base 已全量刷新，overlay 随之作废
    pub fn remove_dirty_keys(&self, scope: UpdateScope, keys: &[String]) -> Result<()> {
        self.ensure_open()?;
        self.base.remove_dirty_keys(keys)?;
        if !scope.is_transient() {
            self.clear_overlay();
        }
        Ok(())
    }

    pub fn dirty_keys(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.base.dirty_keys()
    }

    /// 只关闭本层并丢弃 overlay；base store 的生命周期归 registry
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.clear_overlay();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn has_overlay(&self) -> bool {
        self.state.lock().overlay.is_some()
    }

    pub fn overlay_len(&self) -> usize {
        self.state.lock().overlay.as_ref().map(|o| o.len()).unwrap_or(0)
    }

    pub fn suppressed_keys(&self) -> Vec<String> {
        let mut v: Vec<String> = self.state.lock().suppressed.iter().cloned().collect();
        v.sort();
        v
    }

    pub fn overlays_created(&self) -> u64 {
        self.overlays_created.load(Ordering::Acquire)
    }

    pub fn report(&self) -> Result<IndexReport> {
        self.ensure_open()?;
        let (overlay, suppressed) = self.snapshot();
        Ok(IndexReport {
            root: self.root.to_string(),
            status: self.base.status()?,
            committed_docs: self.base.document_count()?,
            pending_changes: self.cache.as_ref().map(|c| c.pending_len()).unwrap_or(0),
            dirty_keys: self.base.dirty_keys()?.len(),
            overlay: overlay.map(|o| OverlayStats {
                epoch: o.epoch(),
                documents: o.len(),
                flushes: o.flush_count(),
            }),
            suppressed_keys: suppressed.len(),
            overlays_created: self.overlays_created(),
        })
    }
}
