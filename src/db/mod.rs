pub mod sqlite;

pub use sqlite::{CleanupStats, SqliteStore};
