#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod query;
pub mod stats;
pub mod storage;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::{FolderContext, IndexFactory, IndexRegistry, IndexingContext, LayeredIndex};
