// Durable work-unit archive
// One row per terminal work unit; rows are inserted once, never updated

mod db;
mod entry;
mod error;
mod production;
mod query;
mod query_file;
mod schema;

// Public API
pub use db::HistoryDatabase;
pub use entry::{HistoryEntry, HistoryPage};
pub use error::{Error, Result};
pub use production::ProductionView;
pub use query::{
    HistoryColumn, QueryField, QueryOperator, QueryParameters, QueryValue, SELECT_ALL_NAME,
};
pub use query_file::QueryFile;
pub use schema::SCHEMA_VERSION;
