use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use layerdex::core::{IndexDocument, UpdateScope};
use layerdex::index::{FolderContext, IndexFactory, IndexRegistry, LayeredIndex};
use layerdex::query::{MatchKind, Query};
use layerdex::IndexConfig;

#[derive(Parser, Debug)]
#[command(name = "layerdex")]
#[command(about = "Maintain a layered document index on disk", long_about = None)]
struct Cli {
    /// 索引基目录（实际存储在 `<dir>/<schema_version>/`）
    #[arg(long, value_name = "DIR", global = true)]
    index_dir: Option<PathBuf>,

    /// TOML 配置文件
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 写入（或替换）一个文档并提交
    Add {
        primary_key: String,
        /// name=value，可重复
        #[arg(short, long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },
    /// 删除一个文档并提交
    Remove { primary_key: String },
    /// 按字段查询（`_pk` 表示主键）
    Query {
        field: String,
        value: String,
        #[arg(short, long, default_value = "exact")]
        kind: MatchKind,
        /// 只返回这些 stored 字段，可重复
        #[arg(short, long = "load", value_name = "FIELD")]
        load: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// 标记 / 移除 dirty key，然后列出当前 dirty key
    Dirty {
        #[arg(long, value_name = "KEY")]
        mark: Vec<String>,
        #[arg(long, value_name = "KEY")]
        clear: Vec<String>,
    },
    /// 打印索引状态
    Status {
        #[arg(long)]
        json: bool,
    },
    /// 清空索引
    Clear,
}

fn parse_field(pair: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("field must be NAME=VALUE, got {:?}", pair))?;
    if name.is_empty() {
        bail!("field name is empty in {:?}", pair);
    }
    Ok((name.to_string(), value.to_string()))
}

fn default_index_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("layerdex")
}

fn run(idx: &LayeredIndex, command: Commands) -> anyhow::Result<()> {
    let scope = UpdateScope::Durable;
    match command {
        Commands::Add {
            primary_key,
            fields,
        } => {
            let mut doc = IndexDocument::new(primary_key.clone());
            for pair in &fields {
                let (name, value) = parse_field(pair)?;
                doc = doc.with_field(name, value);
            }
            idx.add_document(scope, doc)?;
            idx.store(scope, false)?;
            info!("Stored document {:?} ({} fields)", primary_key, fields.len());
        }
        Commands::Remove { primary_key } => {
            idx.remove_document(scope, &primary_key)?;
            idx.store(scope, false)?;
            info!("Removed document {:?}", primary_key);
        }
        Commands::Query {
            field,
            value,
            kind,
            load,
            json,
        } => {
            let fields: Vec<&str> = load.iter().map(String::as_str).collect();
            let hits = idx.query(&Query::with_kind(field, value, kind), &fields)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for doc in &hits {
                    let pairs: Vec<String> = doc
                        .fields()
                        .iter()
                        .map(|f| format!("{}={}", f.name, f.value))
                        .collect();
                    println!("{}\t{}", doc.primary_key(), pairs.join(" "));
                }
            }
        }
        Commands::Dirty { mark, clear } => {
            for key in &mark {
                idx.mark_key_dirty(key)?;
            }
            if !clear.is_empty() {
                idx.remove_dirty_keys(scope, &clear)?;
            }
            for key in idx.dirty_keys()? {
                println!("{}", key);
            }
        }
        Commands::Status { json } => {
            let report = idx.report()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
        Commands::Clear => {
            idx.clear(scope)?;
            info!("Cleared index {}", idx.root());
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IndexConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => IndexConfig::default(),
    };
    let index_dir = cli.index_dir.clone().unwrap_or_else(default_index_dir);

    let registry = Arc::new(IndexRegistry::new(config.store_options()));
    let factory = IndexFactory::new(registry.clone(), &config);

    let idx = factory
        .create_index(&FolderContext(index_dir.clone()))
        .with_context(|| format!("failed to open index under {}", index_dir.display()))?
        .ok_or_else(|| anyhow!("index factory is closed"))?;

    let result = run(&idx, cli.command);

    factory.close();
    registry.close();
    result
}
