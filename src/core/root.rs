use std::fmt;
use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::error::{IndexError, Result};

const SCHEME: &str = "file://";

/// 一个索引的规范位置：`file:///abs/path/`
///
/// - 无 host 部分、以 `/` 结尾、`.`/`..` 已按字面消解、NFC 规范化
/// - 同一目录跨进程重启得到同一个 Root（不解析 symlink，不依赖目录是否存在）
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Root {
    location: String,
}

impl Root {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = path.display().to_string();
        let Some(text) = path.to_str() else {
            return Err(IndexError::malformed(raw, "path is not valid UTF-8"));
        };
        if !path.is_absolute() {
            return Err(IndexError::malformed(text, "location must be absolute"));
        }

        let mut parts: Vec<&str> = Vec::new();
        for comp in path.components() {
            match comp {
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    parts.pop();
                }
                Component::Normal(s) => match s.to_str() {
                    Some(s) => parts.push(s),
                    None => return Err(IndexError::malformed(text, "path is not valid UTF-8")),
                },
                Component::Prefix(_) => {
                    return Err(IndexError::malformed(text, "path prefixes are not supported"));
                }
            }
        }

        let mut location = String::with_capacity(SCHEME.len() + text.len() + 2);
        location.push_str(SCHEME);
        location.push('/');
        for p in parts {
            location.extend(p.nfc());
            location.push('/');
        }
        Ok(Self { location })
    }

    /// 接受绝对路径或 `file:` URL；带 host 的 URL 视为畸形位置。
    pub fn parse(s: &str) -> Result<Self> {
        let path = if let Some(rest) = s.strip_prefix(SCHEME) {
            if !rest.starts_with('/') {
                return Err(IndexError::malformed(s, "location embeds a host part"));
            }
            rest
        } else if let Some(rest) = s.strip_prefix("file:") {
            rest
        } else {
            s
        };
        Self::from_path(Path::new(path))
    }

    pub fn as_str(&self) -> &str {
        &self.location
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.location[SCHEME.len()..])
    }

    /// 追加一级子目录（用于版本号段）
    pub fn child(&self, segment: &str) -> Result<Self> {
        Self::from_path(&self.to_path().join(segment))
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dots_and_trailing_slash() {
        let a = Root::from_path(Path::new("/var/./idx/../idx/cache")).unwrap();
        let b = Root::parse("file:///var/idx/cache/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "file:///var/idx/cache/");
        assert_eq!(a.to_path(), PathBuf::from("/var/idx/cache/"));
    }

    #[test]
    fn host_part_is_rejected_as_io() {
        let err = Root::parse("file://remote-host/idx").unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::InvalidInput));
    }

    #[test]
    fn relative_path_is_rejected() {
        assert!(Root::from_path(Path::new("idx/cache")).is_err());
    }

    #[test]
    fn nfc_and_nfd_spellings_collapse() {
        let nfd = Root::from_path(Path::new("/idx/cafe\u{301}")).unwrap();
        let nfc = Root::from_path(Path::new("/idx/caf\u{e9}")).unwrap();
        assert_eq!(nfd, nfc);
    }

    #[test]
    fn child_appends_segment() {
        let r = Root::parse("/idx").unwrap().child("3").unwrap();
        assert_eq!(r.as_str(), "file:///idx/3/");
    }
}
