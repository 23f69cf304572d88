pub mod factory;
pub mod layered;
pub mod overlay;
pub mod registry;

pub use factory::{FolderContext, IndexFactory, IndexingContext};
pub use layered::LayeredIndex;
pub use overlay::OverlayIndex;
pub use registry::{CreationMode, IndexRegistry, RegistryEntry};
