//! Pooled SQLite access with request-scoped sessions.
//!
//! A [`Database`] owns a small pool of connections. Each request borrows one
//! through a [`Session`]; dropping the session hands the connection back,
//! rolls back anything left uncommitted and decrements the active-session
//! counter, whichever way the request ended.

use crate::error::DataError;
use crate::schema;
use crate::time::{Clock, SystemClock};
use crate::Data;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_idle() -> usize {
    8
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file. `None` keeps everything in memory for the process lifetime.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// How long a writer waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Connections kept open between requests.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            max_idle: default_max_idle(),
        }
    }
}

/// Handle to the connection pool. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
    clock: Arc<dyn Clock>,
}

struct Pool {
    target: String,
    in_memory: bool,
    busy_timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
    active: AtomicUsize,
    // A shared-cache memory database disappears with its last connection.
    _anchor: Option<Mutex<Connection>>,
}

impl Database {
    /// Opens (and if needed creates) the database described by `config`.
    pub fn open(config: &DatabaseConfig) -> Result<Self, DataError> {
        let (target, in_memory) = match &config.path {
            Some(path) => (path.to_string_lossy().into_owned(), false),
            None => (memory_uri(), true),
        };

        let mut pool = Pool {
            target,
            in_memory,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            max_idle: config.max_idle.max(1),
            idle: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            _anchor: None,
        };

        let first = pool.connect()?;
        schema::create_all(&first)?;
        if in_memory {
            pool._anchor = Some(Mutex::new(first));
        } else {
            pool.idle_connections()?.push(first);
        }

        info!("🗄️ Database ready at {}", pool.target);
        Ok(Self {
            pool: Arc::new(pool),
            clock: Arc::new(SystemClock),
        })
    }

    /// A private in-memory database, used by tests and throwaway runs.
    pub fn in_memory() -> Result<Self, DataError> {
        Self::open(&DatabaseConfig::default())
    }

    /// Replaces the clock handed to every [`Data`] built from this database.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Borrows a connection for the lifetime of the returned session.
    pub fn session(&self) -> Result<Session, DataError> {
        let conn = match self.pool.idle_connections()?.pop() {
            Some(conn) => conn,
            None => self.pool.connect()?,
        };
        let active = self.pool.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Session opened ({} active)", active);
        Ok(Session {
            conn: Mutex::new(Some(conn)),
            pool: Arc::clone(&self.pool),
        })
    }

    /// Opens a session and wraps it with this database's clock.
    pub fn data(&self) -> Result<Data, DataError> {
        Ok(Data::new(self.session()?, self.clock()))
    }

    /// Number of sessions currently checked out.
    pub fn active_sessions(&self) -> usize {
        self.pool.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("target", &self.pool.target)
            .field("active", &self.active_sessions())
            .finish()
    }
}

impl Pool {
    fn connect(&self) -> Result<Connection, DataError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.target, flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        if !self.in_memory {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        }
        Ok(conn)
    }

    fn idle_connections(&self) -> Result<MutexGuard<'_, Vec<Connection>>, DataError> {
        self.idle
            .lock()
            .map_err(|_| DataError::Session("connection pool lock poisoned".to_string()))
    }

    fn release(&self, conn: Connection) {
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!("Discarding connection after failed rollback: {}", e);
                return;
            }
        }
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(conn);
            }
        }
    }
}

fn memory_uri() -> String {
    format!("file:eamuse-{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple())
}

/// A connection checked out for one unit of work.
pub struct Session {
    conn: Mutex<Option<Connection>>,
    pool: Arc<Pool>,
}

impl Session {
    /// Runs `f` against the session's connection.
    ///
    /// SQLite calls block, up to the busy timeout on a locked database. On a
    /// multi-threaded runtime the worker hands its other tasks off for the
    /// duration via [`tokio::task::block_in_place`].
    pub fn with<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, DataError>,
    ) -> Result<T, DataError> {
        let run = || -> Result<T, DataError> {
            let mut guard = self
                .conn
                .lock()
                .map_err(|_| DataError::Session("session lock poisoned".to_string()))?;
            match guard.as_mut() {
                Some(conn) => f(conn),
                None => Err(DataError::Session("session already released".to_string())),
            }
        };

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(run)
            }
            _ => run(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let conn = match self.conn.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(conn) = conn {
            self.pool.release(conn);
        }
        let remaining = self.pool.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!("Session released ({} active)", remaining);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}
