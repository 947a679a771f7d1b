pub mod sqlite;

pub use sqlite::{SqliteSession, SqliteStore};
