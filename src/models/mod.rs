//! Data models for Azure Blob Storage.

mod blob;
mod block;
mod container;
mod page;

pub use blob::*;
pub use block::*;
pub use container::*;
pub use page::*;
