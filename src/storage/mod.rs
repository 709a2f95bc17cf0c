//! `SQLite` persistence for watch configurations and API keys.

mod apikeys;
mod connection;
mod dirwatches;
mod schema;

pub use apikeys::{read_apikeys, write_apikeys};
pub use connection::Database;
pub use dirwatches::{read_dirwatches, write_dirwatches};
pub use schema::{migrate, SCHEMA_VERSION};

/// Initialize storage with migrations.
///
/// # Errors
///
/// Returns an error if database initialization fails.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        migrate(conn)?;
        tracing::info!("Storage initialized, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}
