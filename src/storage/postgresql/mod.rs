pub mod postgresql;

pub use postgresql::{PostgresSession, PostgresStore};
