pub mod failing_store;
pub mod fixtures;

pub use failing_store::FailingStore;
