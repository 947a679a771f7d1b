pub mod batch;
pub mod collection;
pub mod document;

pub use batch::{Batch, QueueItem};
pub use collection::CollectionName;
pub use document::ParsedDocument;
