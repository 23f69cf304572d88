use std::str::FromStr;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// 字段值匹配方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    #[default]
    Exact,
    Prefix,
    CaseInsensitivePrefix,
    /// `FoBa` 命中 `FooBar`：每个大写字母开启一个新词段
    CamelCase,
    /// camel-case 或大小写不敏感前缀，任一命中即可
    CaseInsensitiveCamelCase,
    /// 整值匹配（隐式 `^...$`）
    Regexp,
    CaseInsensitiveRegexp,
}

impl FromStr for MatchKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "exact" => MatchKind::Exact,
            "prefix" => MatchKind::Prefix,
            "case-insensitive-prefix" | "iprefix" => MatchKind::CaseInsensitivePrefix,
            "camel-case" | "camel" => MatchKind::CamelCase,
            "case-insensitive-camel-case" | "icamel" => MatchKind::CaseInsensitiveCamelCase,
            "regexp" | "regex" => MatchKind::Regexp,
            "case-insensitive-regexp" | "iregex" => MatchKind::CaseInsensitiveRegexp,
            other => {
                return Err(IndexError::InvalidQuery {
                    pattern: other.to_string(),
                    reason: "unknown match kind".to_string(),
                })
            }
        };
        Ok(kind)
    }
}

/// Matcher 抽象接口，定义匹配行为
pub trait Matcher: Send + Sync {
    /// 判断字段值是否匹配
    fn matches(&self, value: &str) -> bool;
}

pub struct ExactMatcher {
    pattern: String,
}

impl Matcher for ExactMatcher {
    fn matches(&self, value: &str) -> bool {
        value == self.pattern
    }
}

pub struct PrefixMatcher {
    prefix: String,
    case_insensitive: bool,
}

impl PrefixMatcher {
    pub fn new(prefix: &str, case_insensitive: bool) -> Self {
        let prefix = if case_insensitive {
            prefix.to_lowercase()
        } else {
            prefix.to_string()
        };
        Self {
            prefix,
            case_insensitive,
        }
    }
}

impl Matcher for PrefixMatcher {
    fn matches(&self, value: &str) -> bool {
        if self.case_insensitive {
            value.to_lowercase().starts_with(&self.prefix)
        } else {
            value.starts_with(&self.prefix)
        }
    }
}

pub struct RegexMatcher {
    re: Regex,
}

impl Matcher for RegexMatcher {
    fn matches(&self, value: &str) -> bool {
        self.re.is_match(value)
    }
}

/// 任一子匹配器命中即命中
pub struct AnyMatcher {
    inner: Vec<Arc<dyn Matcher>>,
}

impl Matcher for AnyMatcher {
    fn matches(&self, value: &str) -> bool {
        self.inner.iter().any(|m| m.matches(value))
    }
}

fn whole_value_regex(pattern: &str, source: &str, case_insensitive: bool) -> Result<RegexMatcher> {
    let re = RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| IndexError::InvalidQuery {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;
    Ok(RegexMatcher { re })
}

/// `FoBa` -> `Fo[^A-Z]*Ba.*`
fn camel_case_regex(pattern: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    for ch in pattern.chars() {
        if ch.is_uppercase() || segments.is_empty() {
            segments.push(String::new());
        }
        if let Some(last) = segments.last_mut() {
            last.push(ch);
        }
    }
    let mut out = segments
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("[^A-Z]*");
    out.push_str(".*");
    out
}

/// 匹配器工厂：按 kind 构造（正则在此处一次编译）
pub fn create_matcher(kind: MatchKind, pattern: &str) -> Result<Arc<dyn Matcher>> {
    let m: Arc<dyn Matcher> = match kind {
        MatchKind::Exact => Arc::new(ExactMatcher {
            pattern: pattern.to_string(),
        }),
        MatchKind::Prefix => Arc::new(PrefixMatcher::new(pattern, false)),
        MatchKind::CaseInsensitivePrefix => Arc::new(PrefixMatcher::new(pattern, true)),
        MatchKind::CamelCase => Arc::new(whole_value_regex(&camel_case_regex(pattern), pattern, false)?),
        MatchKind::CaseInsensitiveCamelCase => Arc::new(AnyMatcher {
            inner: vec![
                Arc::new(whole_value_regex(&camel_case_regex(pattern), pattern, false)?),
                Arc::new(PrefixMatcher::new(pattern, true)),
            ],
        }),
        MatchKind::Regexp => Arc::new(whole_value_regex(pattern, pattern, false)?),
        MatchKind::CaseInsensitiveRegexp => Arc::new(whole_value_regex(pattern, pattern, true)?),
    };
    Ok(m)
}
