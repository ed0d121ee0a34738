//! SQLite storage via Diesel with an r2d2 connection pool
//!
//! ## Tables
//!
//! - `enterprises` - tracked companies, partitioned by `env_scope`
//! - `users` - staff accounts with role and scope
//! - `policies` - ingested policy documents and their analysis status
//! - `comments` / `notifications` - annotations and @mention notices
//!
//! Every repository function that reads or writes scoped data takes an
//! `EnvScope` and adds it to the WHERE clause alongside `status = 'active'`.

pub mod comments;
pub mod dashboard;
pub mod diesel_schema;
pub mod enterprises;
pub mod models;
pub mod policies;
pub mod reports;
pub mod schema;
pub mod snapshot;
pub mod users;

use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::NexusError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let pragmas = if self.wal {
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;"
        } else {
            "PRAGMA busy_timeout=5000;"
        };
        conn.batch_execute(pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    path: String,
}

impl Database {
    /// Open or create the database file and initialize the schema
    pub fn open(path: &str) -> Result<Self, NexusError> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }

        info!("Opening SQLite database at {}", path);
        let manager = ConnectionManager::<SqliteConnection>::new(path);
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(SqlitePragmas { wal: true }))
            .build(manager)?;

        let db = Self {
            pool,
            path: path.to_string(),
        };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Each in-memory connection is its own database, so the pool holds a
    /// single connection that never expires.
    pub fn open_in_memory() -> Result<Self, NexusError> {
        debug!("Opening in-memory SQLite database");
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(SqlitePragmas { wal: false }))
            .build(manager)?;

        let db = Self {
            pool,
            path: ":memory:".to_string(),
        };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }

    /// Check out a pooled connection
    pub fn conn(&self) -> Result<DbConn, NexusError> {
        Ok(self.pool.get()?)
    }

    /// Run a closure with a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, NexusError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, NexusError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Run a closure inside one transaction; any error rolls everything back
    pub fn transaction<F, T>(&self, f: F) -> Result<T, NexusError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, NexusError>,
    {
        let mut conn = self.conn()?;
        conn.transaction::<T, NexusError, _>(|conn| f(conn))
    }

    /// Cheap liveness probe for the health endpoint
    pub fn ping(&self) -> Result<(), NexusError> {
        self.with_conn(|conn| {
            conn.batch_execute("SELECT 1")
                .map_err(|e| NexusError::Database(e.to_string()))
        })
    }
}
