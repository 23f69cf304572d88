use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::IndexConfig;
use crate::core::Root;
use crate::error::{IndexError, Result};
use crate::index::layered::LayeredIndex;
use crate::index::registry::{CreationMode, IndexRegistry, RegistryEntry};
use crate::stats::IndexReport;
use crate::storage::DocumentIndexCache;

/// 调用方的索引上下文：只关心它给出的索引基目录
pub trait IndexingContext {
    fn index_folder(&self) -> Option<&Path>;
}

/// 最简单的上下文：一个固定目录
#[derive(Clone, Debug)]
pub struct FolderContext(pub PathBuf);

impl IndexingContext for FolderContext {
    fn index_folder(&self) -> Option<&Path> {
        Some(&self.0)
    }
}

impl IndexingContext for PathBuf {
    fn index_folder(&self) -> Option<&Path> {
        Some(self)
    }
}

impl IndexingContext for Option<PathBuf> {
    fn index_folder(&self) -> Option<&Path> {
        self.as_deref()
    }
}

#[derive(Default)]
struct FactoryState {
    closed: bool,
    indexes: HashMap<Root, Arc<LayeredIndex>>,
}

/// 上下文目录 -> 带版本号的存储位置 -> LayeredIndex。
///
/// 存储位置为 `<folder>/<schema_version>/`；版本号变化即换到新的空目录，旧索引不迁移。
pub struct IndexFactory {
    registry: Arc<IndexRegistry>,
    schema_version: u32,
    parallel_threshold: usize,
    state: Mutex<FactoryState>,
}

impl IndexFactory {
    pub fn new(registry: Arc<IndexRegistry>, config: &IndexConfig) -> Self {
        Self {
            registry,
            schema_version: config.schema_version,
            parallel_threshold: config.parallel_query_threshold,
            state: Mutex::new(FactoryState::default()),
        }
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn index_location(&self, folder: &Path) -> Result<Root> {
        Root::from_path(folder)?.child(&self.schema_version.to_string())
    }

    fn wrap(&self, root: Root, entry: RegistryEntry) -> Arc<LayeredIndex> {
        Arc::new(
            LayeredIndex::new(root, entry.store)
                .with_cache(entry.cache)
                .with_parallel_threshold(self.parallel_threshold),
        )
    }

    fn lookup(&self, root: Root, mode: CreationMode) -> Result<Option<Arc<LayeredIndex>>> {
        let mut st = self.state.lock();
        if st.closed {
            return Ok(None);
        }
        if let Some(idx) = st.indexes.get(&root) {
            return Ok(Some(idx.clone()));
        }
        let Some(entry) = self.registry.get_index(&root, mode)? else {
            return Ok(None);
        };
        let idx = self.wrap(root.clone(), entry);
        st.indexes.insert(root, idx.clone());
        Ok(Some(idx))
    }

    /// 没有基目录时报 `no index base folder`；factory 关闭后返回 `None`
    pub fn create_index(&self, ctx: &dyn IndexingContext) -> Result<Option<Arc<LayeredIndex>>> {
        let folder = ctx.index_folder().ok_or_else(IndexError::no_index_folder)?;
        let root = self.index_location(folder)?;
        self.lookup(root, CreationMode::Create)
    }

    /// 只打开已有的非空存储
    pub fn get_index(&self, folder: &Path) -> Result<Option<Arc<LayeredIndex>>> {
        let root = self.index_location(folder)?;
        self.lookup(root, CreationMode::IfExist)
    }

    pub fn cache(&self, ctx: &dyn IndexingContext) -> Result<Option<Arc<DocumentIndexCache>>> {
        let Some(folder) = ctx.index_folder() else {
            return Ok(None);
        };
        Ok(self.registry.cache(&self.index_location(folder)?))
    }

    /// 幂等；单个索引关闭失败只记日志。base store 仍登记在 registry，由 registry 关闭
    pub fn close(&self) {
        let indexes = {
            let mut st = self.state.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            std::mem::take(&mut st.indexes)
        };
        for (root, idx) in indexes {
            if let Err(e) = idx.close() {
                tracing::warn!("Failed to close layered index {}: {}", root, e);
            }
        }
        tracing::debug!("Index factory closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn reports(&self) -> Vec<IndexReport> {
        let indexes: Vec<Arc<LayeredIndex>> = self.state.lock().indexes.values().cloned().collect();
        let mut out: Vec<IndexReport> = indexes
            .iter()
            .filter_map(|idx| match idx.report() {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::debug!("Skipping report for {}: {}", idx.root(), e);
                    None
                }
            })
            .collect();
        out.sort_by(|a, b| a.root.cmp(&b.root));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IndexDocument, UpdateScope};
    use crate::query::Query;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("layerdex-factory-{}-{}", tag, nanos))
    }

    fn config(version: u32) -> IndexConfig {
        IndexConfig {
            schema_version: version,
            pending_flush_limit: 0,
            sync_on_store: false,
            parallel_query_threshold: 0,
        }
    }

    fn factory(version: u32) -> IndexFactory {
        let cfg = config(version);
        IndexFactory::new(Arc::new(IndexRegistry::new(cfg.store_options())), &cfg)
    }

    fn keys(idx: &LayeredIndex, field: &str, value: &str) -> Vec<String> {
        idx.query(&Query::term(field, value), &[])
            .unwrap()
            .into_iter()
            .map(|d| d.primary_key().to_string())
            .collect()
    }

    #[test]
    fn location_is_versioned() {
        let f = factory(7);
        let loc = f.index_location(Path::new("/var/idx")).unwrap();
        assert_eq!(loc.as_str(), "file:///var/idx/7/");
    }

    #[test]
    fn missing_folder_is_io_error() {
        let f = factory(1);
        let err = f.create_index(&None::<PathBuf>).err().unwrap();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
        assert!(err.to_string().contains("no index base folder"));
        assert!(f.cache(&None::<PathBuf>).unwrap().is_none());
    }

    #[test]
    fn create_then_get_returns_cached_instance() {
        let dir = unique_tmp_dir("cached");
        let f = factory(1);
        assert!(f.get_index(&dir).unwrap().is_none());

        let a = f.create_index(&FolderContext(dir.clone())).unwrap().unwrap();
        let b = f.get_index(&dir).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(dir.join("1").is_dir());
        assert!(f.cache(&dir).unwrap().is_some());
    }

    #[test]
    fn end_to_end_overlay_session() {
        let dir = unique_tmp_dir("e2e");
        let f = factory(1);
        let idx = f.create_index(&FolderContext(dir.join("r"))).unwrap().unwrap();

        idx.add_document(UpdateScope::Durable, IndexDocument::new("a").with_field("text", "foo"))
            .unwrap();
        idx.store(UpdateScope::Durable, false).unwrap();
        assert_eq!(keys(&idx, "text", "foo"), vec!["a"]);

        idx.mark_key_dirty("a").unwrap();
        idx.add_document(UpdateScope::Transient, IndexDocument::new("a").with_field("text", "bar"))
            .unwrap();
        assert_eq!(keys(&idx, "text", "bar"), vec!["a"]);
        assert!(keys(&idx, "text", "foo").is_empty());

        idx.rollback(UpdateScope::Transient).unwrap();
        assert_eq!(keys(&idx, "text", "foo"), vec!["a"]);
        assert!(keys(&idx, "text", "bar").is_empty());

        let reports = f.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].committed_docs, 1);
        assert_eq!(reports[0].dirty_keys, 1);
        assert!(reports[0].overlay.is_none());
    }

    #[test]
    fn schema_bump_starts_from_empty_store() {
        let dir = unique_tmp_dir("version");
        {
            let f = factory(1);
            let idx = f.create_index(&dir).unwrap().unwrap();
            idx.add_document(UpdateScope::Durable, IndexDocument::new("old")).unwrap();
            idx.store(UpdateScope::Durable, false).unwrap();
            f.close();
            f.registry().close();
        }

        let f = factory(2);
        assert!(f.get_index(&dir).unwrap().is_none());
        let idx = f.create_index(&dir).unwrap().unwrap();
        assert_eq!(idx.base().document_count().unwrap(), 0);
        assert!(dir.join("1").join(crate::storage::disk::INDEX_FILE).exists());
    }

    #[test]
    fn close_is_idempotent_and_closes_indexes() {
        let dir = unique_tmp_dir("close");
        let f = factory(1);
        let idx = f.create_index(&dir).unwrap().unwrap();

        f.close();
        f.close();
        assert!(f.is_closed());
        assert!(idx.is_closed());
        assert!(f.create_index(&dir).unwrap().is_none());
        assert!(f.get_index(&dir).unwrap().is_none());
        assert!(f.reports().is_empty());
    }

    #[test]
    fn closing_factory_leaves_registry_stores_usable() {
        let dir = unique_tmp_dir("shared-registry");
        let cfg = config(1);
        let registry = Arc::new(IndexRegistry::new(cfg.store_options()));

        let first = IndexFactory::new(registry.clone(), &cfg);
        let old = first.create_index(&dir).unwrap().unwrap();
        old.add_document(UpdateScope::Durable, IndexDocument::new("a").with_field("text", "foo"))
            .unwrap();
        old.store(UpdateScope::Durable, false).unwrap();
        first.close();
        assert!(old.is_closed());
        assert!(!registry.is_closed());

        let root = first.index_location(&dir).unwrap();
        let entry = registry.get_index(&root, CreationMode::Opened).unwrap().unwrap();
        assert_eq!(entry.store.status().unwrap(), crate::storage::IndexStatus::Valid);

        let second = IndexFactory::new(registry.clone(), &cfg);
        let idx = second.create_index(&dir).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&old, &idx));
        idx.add_document(UpdateScope::Durable, IndexDocument::new("b").with_field("text", "foo"))
            .unwrap();
        idx.store(UpdateScope::Durable, false).unwrap();
        assert_eq!(keys(&idx, "text", "foo"), vec!["a", "b"]);

        registry.close();
        assert!(entry.store.status().unwrap_err().is_closed());
    }
}
