pub mod criteria;
pub mod matcher;

pub use criteria::*;
pub use matcher::*;
