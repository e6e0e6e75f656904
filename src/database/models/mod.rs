pub mod document;
pub mod entity;
pub mod project;
pub mod search;
pub mod snapshot;

pub use document::*;
pub use entity::*;
pub use project::*;
pub use search::*;
pub use snapshot::*;
