//! The ordered collection of directory watches.

use std::sync::Arc;

use parking_lot::Mutex;

use super::Dirwatch;
use crate::ingest::Ingestor;
use crate::storage::{self, Database};
use crate::Result;

/// Registry owning every configured watch.
///
/// `load`/`save`/`start`/`stop` are serialized by one mutex; the lock is
/// never held across an await point.
#[derive(Default)]
pub struct Dirwatches {
    list: Mutex<Vec<Arc<Dirwatch>>>,
}

impl Dirwatches {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current watches with a materialized list, stopping any
    /// running ones first.
    pub fn replace(&self, watches: Vec<Dirwatch>) {
        let mut list = self.list.lock();
        for watch in list.iter() {
            watch.stop();
        }
        *list = watches.into_iter().map(Arc::new).collect();
    }

    /// Load the registry from the store, replacing the current list.
    ///
    /// # Errors
    ///
    /// Returns a `dirwatches.read`-prefixed error on database failure.
    pub fn read(&self, db: &Database) -> Result<()> {
        let watches = db.with_conn(storage::read_dirwatches)?;
        self.replace(watches);
        Ok(())
    }

    /// Diff-persist the registry: rows whose ids are gone are deleted, then
    /// every entry is inserted or updated by id.
    ///
    /// # Errors
    ///
    /// Returns a `dirwatches.write`-prefixed error on database failure.
    pub fn write(&self, db: &Database) -> Result<()> {
        let list = self.list.lock();
        db.with_transaction(|conn| storage::write_dirwatches(conn, &list))
    }

    /// Start every enabled watch. Configuration errors are logged and the
    /// remaining watches continue.
    pub fn start_all(&self, ingestor: &Arc<Ingestor>) {
        let list = self.list.lock();
        for watch in list.iter() {
            if let Err(err) = Arc::clone(watch).start(ingestor) {
                tracing::error!(
                    directory = %watch.directory.display(),
                    error = %err,
                    "failed to start watch"
                );
            }
        }
    }

    /// Stop every running watch.
    pub fn stop_all(&self) {
        let list = self.list.lock();
        for watch in list.iter() {
            watch.stop();
        }
    }

    /// A snapshot of the current watches, in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Dirwatch>> {
        self.list.lock().clone()
    }
}
