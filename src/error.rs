use std::io;

/// 索引层统一错误。
///
/// - `Closed`：close 之后的任何调用（close 自身除外）
/// - `UnsupportedInTransientScope`：transient 作用域内调用事务操作
/// - `Io`：存储/文件系统失败，携带出错的 location 便于定位
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index {location} is closed")]
    Closed { location: String },

    #[error("{op} is not supported inside a transient update scope")]
    UnsupportedInTransientScope { op: &'static str },

    #[error("I/O error at {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid query pattern {pattern:?}: {reason}")]
    InvalidQuery { pattern: String, reason: String },

    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub fn closed(location: impl Into<String>) -> Self {
        IndexError::Closed {
            location: location.into(),
        }
    }

    pub fn io(location: impl Into<String>, source: io::Error) -> Self {
        IndexError::Io {
            location: location.into(),
            source,
        }
    }

    /// location 无法规范化（含 host、非绝对路径等）
    pub fn malformed(location: impl Into<String>, reason: &str) -> Self {
        Self::io(location, io::Error::new(io::ErrorKind::InvalidInput, reason.to_string()))
    }

    pub fn no_index_folder() -> Self {
        Self::io(
            "<none>",
            io::Error::new(io::ErrorKind::NotFound, "no index base folder"),
        )
    }

    pub fn corrupted(location: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::io(
            location,
            io::Error::new(io::ErrorKind::InvalidData, detail.into()),
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, IndexError::Closed { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, IndexError::Io { .. })
    }

    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            IndexError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// 给 `std::io::Result` 挂上 location 上下文
pub(crate) trait IoContext<T> {
    fn at(self, location: &dyn std::fmt::Display) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, location: &dyn std::fmt::Display) -> Result<T> {
        self.map_err(|e| IndexError::io(location.to_string(), e))
    }
}
