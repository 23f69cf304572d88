use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{DocumentSet, IndexDocument};
use crate::error::Result;
use crate::query::matcher::{create_matcher, MatchKind, Matcher};

/// 布尔/字段查询条件
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    Term {
        field: String,
        value: String,
        kind: MatchKind,
    },
    /// AND；空列表匹配全部文档
    All(Vec<Query>),
    /// OR；空列表不匹配任何文档
    Any(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_kind(field, value, MatchKind::Exact)
    }

    pub fn with_kind(field: impl Into<String>, value: impl Into<String>, kind: MatchKind) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn primary_key(key: impl Into<String>, kind: MatchKind) -> Self {
        Self::with_kind(IndexDocument::PRIMARY_KEY_FIELD, key, kind)
    }

    pub fn negate(self) -> Self {
        Query::Not(Box::new(self))
    }

    /// 预编译：正则等只编译一次，之后可跨线程共享
    pub fn compile(&self) -> Result<CompiledQuery> {
        Ok(CompiledQuery {
            node: compile_node(self)?,
        })
    }
}

enum Node {
    Term {
        field: String,
        matcher: Arc<dyn Matcher>,
    },
    All(Vec<Node>),
    Any(Vec<Node>),
    Not(Box<Node>),
}

fn compile_node(q: &Query) -> Result<Node> {
    Ok(match q {
        Query::Term { field, value, kind } => Node::Term {
            field: field.clone(),
            matcher: create_matcher(*kind, value)?,
        },
        Query::All(qs) => Node::All(qs.iter().map(compile_node).collect::<Result<_>>()?),
        Query::Any(qs) => Node::Any(qs.iter().map(compile_node).collect::<Result<_>>()?),
        Query::Not(q) => Node::Not(Box::new(compile_node(q)?)),
    })
}

fn eval(node: &Node, doc: &IndexDocument) -> bool {
    match node {
        Node::Term { field, matcher } => {
            if field == IndexDocument::PRIMARY_KEY_FIELD {
                matcher.matches(doc.primary_key())
            } else {
                doc.searchable_values(field).any(|v| matcher.matches(v))
            }
        }
        Node::All(ns) => ns.iter().all(|n| eval(n, doc)),
        Node::Any(ns) => ns.iter().any(|n| eval(n, doc)),
        Node::Not(n) => !eval(n, doc),
    }
}

pub struct CompiledQuery {
    node: Node,
}

impl CompiledQuery {
    pub fn matches(&self, doc: &IndexDocument) -> bool {
        eval(&self.node, doc)
    }
}

/// 按集合自身顺序收集命中文档并投影字段；大集合走 rayon（collect 保序）。
pub fn collect_matches(
    docs: &DocumentSet,
    query: &CompiledQuery,
    fields_to_load: &[&str],
    parallel_threshold: usize,
) -> Vec<IndexDocument> {
    if parallel_threshold > 0 && docs.len() >= parallel_threshold {
        let all: Vec<&IndexDocument> = docs.iter().collect();
        return all
            .par_iter()
            .filter(|d| query.matches(d))
            .map(|d| d.project(fields_to_load))
            .collect();
    }
    docs.iter()
        .filter(|d| query.matches(d))
        .map(|d| d.project(fields_to_load))
        .collect()
}
