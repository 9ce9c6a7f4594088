pub mod sqlite_primary;
pub mod sqlite_schema;

pub use sqlite_primary::{default_db_path, init_sqlite_pool, SqliteInitError};
