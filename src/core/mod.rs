pub mod docset;
pub mod document;
pub mod root;
pub mod scope;

pub use docset::DocumentSet;
pub use document::{Field, IndexDocument};
pub use root::Root;
pub use scope::UpdateScope;
