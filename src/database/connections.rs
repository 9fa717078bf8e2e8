use crate::error::AppError;
use diesel::{
    connection::SimpleConnection,
    r2d2::{Builder, ConnectionManager, CustomizeConnection, Pool, PooledConnection},
    sqlite::SqliteConnection,
};
use std::time::Duration;

type DbConnection = ConnectionManager<SqliteConnection>;

#[derive(Clone)]
pub struct Database {
    internal_pool: Pool<DbConnection>,
}

/// Applied to every connection as it leaves the pool.
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        // Batches take an IMMEDIATE lock; other writers wait instead of failing outright.
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

// Simple pooling of SQLite3 connections, shared through the application state.
impl Database {
    /// Opens the pool against the specified SQLite3 database, creating our tables if needed.
    pub fn open(db_path: &str) -> Result<Self, AppError> {
        let manager = ConnectionManager::<SqliteConnection>::new(db_path);
        let pool = Builder::new()
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)?;

        let database = Database {
            internal_pool: pool,
        };
        super::migrations::run(&mut *database.connection()?)?;
        Ok(database)
    }

    /// Begins a new connection.
    /// There's no need to worry about manually closing
    /// and returning to the pool, as this will occur automatically.
    pub fn connection(&self) -> Result<PooledConnection<DbConnection>, AppError> {
        Ok(self.internal_pool.get()?)
    }
}
