use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::StoreOptions;
use crate::core::Root;
use crate::error::Result;
use crate::storage::{DiskIndex, DocumentIndexCache, TextIndexStore};

/// `IndexRegistry::get_index` 的创建策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreationMode {
    /// 只返回已登记的实例，不探测磁盘
    Opened,
    /// 目录不存在则创建
    Create,
    /// 仅当目录存在且非空时打开
    IfExist,
}

/// 一个 root 登记的 base store 与它的簿记对象
#[derive(Clone)]
pub struct RegistryEntry {
    pub store: Arc<dyn TextIndexStore>,
    pub cache: Arc<DocumentIndexCache>,
}

#[derive(Default)]
struct RegistryState {
    closed: bool,
    entries: HashMap<Root, RegistryEntry>,
}

/// root -> base store 的进程级登记表。
///
/// 查找、登记与 closed 标志都在同一把锁下完成；打开 store 的文件 I/O 也在锁内
/// （按 root 粒度，开销有界）。
pub struct IndexRegistry {
    state: Mutex<RegistryState>,
    options: StoreOptions,
}

fn has_existing_storage(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    match std::fs::read_dir(dir) {
        Ok(mut rd) => rd.next().is_some(),
        Err(e) => {
            tracing::debug!("Cannot list {:?}: {}", dir, e);
            false
        }
    }
}

impl IndexRegistry {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            options,
        }
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// 关闭后一律返回 `None`；同一 root 始终返回同一实例。
    pub fn get_index(&self, root: &Root, mode: CreationMode) -> Result<Option<RegistryEntry>> {
        let mut st = self.state.lock();
        if st.closed {
            return Ok(None);
        }
        if let Some(entry) = st.entries.get(root) {
            return Ok(Some(entry.clone()));
        }

        let dir = root.to_path();
        let cache = Arc::new(DocumentIndexCache::new());
        let store = match mode {
            CreationMode::Opened => return Ok(None),
            CreationMode::Create => DiskIndex::create(&dir, cache.clone(), self.options)?,
            CreationMode::IfExist => {
                if !has_existing_storage(&dir) {
                    tracing::debug!("No existing index storage at {}", root);
                    return Ok(None);
                }
                DiskIndex::open(&dir, cache.clone(), self.options)?
            }
        };

        tracing::info!("Registered index {} ({:?})", root, mode);
        let entry = RegistryEntry {
            store: Arc::new(store),
            cache,
        };
        st.entries.insert(root.clone(), entry.clone());
        Ok(Some(entry))
    }

    pub fn cache(&self, root: &Root) -> Option<Arc<DocumentIndexCache>> {
        self.state.lock().entries.get(root).map(|e| e.cache.clone())
    }

    /// 幂等；单个 store 关闭失败只记日志，不影响其余 store
    pub fn close(&self) {
        let entries = {
            let mut st = self.state.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            std::mem::take(&mut st.entries)
        };

        let total = entries.len();
        let mut failed = 0usize;
        for (root, entry) in entries {
            if let Err(e) = entry.store.close() {
                failed += 1;
                tracing::warn!("Failed to close index {}: {}", root, e);
            }
        }
        tracing::info!("Index registry closed: {} stores ({} failed)", total, failed);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn roots(&self) -> Vec<Root> {
        let mut v: Vec<Root> = self.state.lock().entries.keys().cloned().collect();
        v.sort();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("layerdex-registry-{}-{}", tag, nanos))
    }

    fn registry() -> IndexRegistry {
        IndexRegistry::new(StoreOptions {
            pending_flush_limit: 0,
            sync_on_store: false,
            parallel_query_threshold: 0,
        })
    }

    #[test]
    fn same_root_yields_same_store() {
        let dir = unique_tmp_dir("singleton");
        let reg = registry();
        let root = Root::from_path(&dir).unwrap();

        let a = reg.get_index(&root, CreationMode::Create).unwrap().unwrap();
        let b = reg.get_index(&root, CreationMode::Create).unwrap().unwrap();
        let c = reg.get_index(&root, CreationMode::Opened).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a.store, &b.store));
        assert!(Arc::ptr_eq(&a.store, &c.store));
        assert!(Arc::ptr_eq(&a.cache, &reg.cache(&root).unwrap()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn if_exist_creates_nothing() {
        let dir = unique_tmp_dir("if-exist");
        let reg = registry();
        let root = Root::from_path(&dir).unwrap();

        assert!(reg.get_index(&root, CreationMode::IfExist).unwrap().is_none());
        assert!(reg.get_index(&root, CreationMode::Opened).unwrap().is_none());
        assert!(!dir.exists());

        // 空目录也不算已有存储
        std::fs::create_dir_all(&dir).unwrap();
        assert!(reg.get_index(&root, CreationMode::IfExist).unwrap().is_none());

        let created = reg.get_index(&root, CreationMode::Create).unwrap().unwrap();
        let found = reg.get_index(&root, CreationMode::IfExist).unwrap().unwrap();
        assert!(Arc::ptr_eq(&created.store, &found.store));
    }

    #[test]
    fn if_exist_opens_store_written_by_another_registry() {
        let dir = unique_tmp_dir("reopen");
        let root = Root::from_path(&dir).unwrap();
        {
            let reg = registry();
            let e = reg.get_index(&root, CreationMode::Create).unwrap().unwrap();
            e.store
                .add_document(crate::core::IndexDocument::new("a"))
                .unwrap();
            e.store.store(false).unwrap();
            reg.close();
        }

        let reg = registry();
        let e = reg.get_index(&root, CreationMode::IfExist).unwrap().unwrap();
        assert_eq!(e.store.document_count().unwrap(), 1);
    }

    #[test]
    fn close_is_idempotent_and_closes_stores() {
        let dir = unique_tmp_dir("close");
        let reg = registry();
        let r1 = Root::from_path(&dir.join("one")).unwrap();
        let r2 = Root::from_path(&dir.join("two")).unwrap();
        let e1 = reg.get_index(&r1, CreationMode::Create).unwrap().unwrap();
        reg.get_index(&r2, CreationMode::Create).unwrap().unwrap();
        assert_eq!(reg.roots(), vec![r1.clone(), r2.clone()]);

        reg.close();
        reg.close();
        assert!(reg.is_closed());
        assert!(reg.is_empty());
        assert!(e1.store.status().unwrap_err().is_closed());
        assert!(reg.get_index(&r1, CreationMode::Create).unwrap().is_none());
    }

    #[test]
    fn concurrent_create_yields_one_store() {
        const N: usize = 8;
        let dir = unique_tmp_dir("concurrent");
        let reg = Arc::new(registry());
        let root = Root::from_path(&dir).unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(N));

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let reg = reg.clone();
                let root = root.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    reg.get_index(&root, CreationMode::Create).unwrap().unwrap().store
                })
            })
            .collect();
        let stores: Vec<Arc<dyn TextIndexStore>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(reg.len(), 1);
        for s in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], s));
        }
    }
}
