mod batch;
mod feed;

pub use batch::{WriteBatch, WriteOp};
pub use feed::{
    ChangeBatch, ChangeFeed, ChangeNotice, Collection, Document, DocumentChange, Snapshot,
    Subscription, WatchScope,
};

use crate::database::Database;
use crate::error::{AppError, ErrorEvents};
use diesel::sqlite::SqliteConnection;

/// The shared document store: every read and write in the service goes through here.
///
/// Operations are synchronous; async callers should go through [`Store::run`].
#[derive(Clone)]
pub struct Store {
    database: Database,
    feed: ChangeFeed,
    errors: ErrorEvents,
}

impl Store {
    pub fn new(database: Database, errors: ErrorEvents) -> Self {
        Store {
            database,
            feed: ChangeFeed::new(),
            errors,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn errors(&self) -> &ErrorEvents {
        &self.errors
    }

    /// Runs `f` against a pooled connection.
    pub(crate) fn with_connection<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, AppError>,
    {
        let mut conn = self.database.connection()?;
        f(&mut *conn)
    }

    /// Moves a blocking store operation off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Store) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|err| AppError::Internal(format!("store task failed: {err}")))?
    }

    /// Publishes permission failures on the shared error channel.
    pub(crate) fn observe(&self, error: AppError) -> AppError {
        self.errors.observe(error)
    }

    /// Applies every operation of `batch` as one unit: either all of them
    /// take effect or none do. Subscribers are notified once, after commit.
    pub fn commit(&self, batch: WriteBatch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }

        let notices = self
            .with_connection(|conn| {
                conn.immediate_transaction::<_, AppError, _>(|conn| batch.apply(conn))
            })
            .map_err(|err| self.observe(err))?;

        tracing::debug!(changes = notices.len(), "committed write batch");
        self.feed.publish(ChangeBatch { notices });
        Ok(())
    }
}
