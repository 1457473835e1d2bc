mod client;
mod transaction;
mod types;

pub use client::PostgresStore;
pub use transaction::PostgresTransaction;
pub use types::IndexRecord;
