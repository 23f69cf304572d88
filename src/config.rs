use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IoContext, Result};

/// 存储布局版本：写进路径 `<base>/<schema_version>/`，升级即废弃旧索引（不做迁移）。
pub const SCHEMA_VERSION: u32 = 1;

const DEFAULT_PENDING_FLUSH_LIMIT: usize = 10_000;
const DEFAULT_PARALLEL_QUERY_THRESHOLD: usize = 4096;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub schema_version: u32,
    /// pending 缓冲达到该条数时自动 tx_store（0 表示禁用）
    pub pending_flush_limit: usize,
    /// store/commit 时是否 fsync 文件与目录
    pub sync_on_store: bool,
    /// 文档数不低于该值时用 rayon 并行扫描
    pub parallel_query_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            pending_flush_limit: DEFAULT_PENDING_FLUSH_LIMIT,
            sync_on_store: true,
            parallel_query_threshold: DEFAULT_PARALLEL_QUERY_THRESHOLD,
        }
    }
}

/// DiskIndex 关心的那部分配置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    pub pending_flush_limit: usize,
    pub sync_on_store: bool,
    pub parallel_query_threshold: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        IndexConfig::default().store_options()
    }
}

impl IndexConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| IndexError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at(&path.display())?;
        let cfg = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded index config from {:?}: {:?}", path, cfg);
        Ok(cfg)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            pending_flush_limit: self.pending_flush_limit,
            sync_on_store: self.sync_on_store,
            parallel_query_threshold: self.parallel_query_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = IndexConfig::from_toml_str("schema_version = 7\n").unwrap();
        assert_eq!(cfg.schema_version, 7);
        assert_eq!(cfg.pending_flush_limit, DEFAULT_PENDING_FLUSH_LIMIT);
        assert!(cfg.sync_on_store);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = IndexConfig::from_toml_str("schema_version = \"x\"").unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
    }
}
