//! Persistence layer: record store for the language catalog and thread
//! bookkeeping.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
