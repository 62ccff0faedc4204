//! Connection checkout for a shared client handle.
//!
//! Each command borrows a connection for its own duration, so a reader
//! parked in a blocking `XREADGROUP` never holds up publishers or
//! acknowledgements issued through the same [`StreamClient`](crate::StreamClient).

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::{Error, Result};

/// A bounded set of reusable connections to one broker.
pub struct Pool {
    config: ConnectionConfig,
    idle: parking_lot::Mutex<Vec<Connection>>,
    semaphore: Arc<Semaphore>,
}

impl Pool {
    /// Create an empty pool. Connections are opened on demand.
    pub fn new(config: ConnectionConfig) -> Self {
        let max_size = config.pool_size.max(1);
        Self {
            config,
            idle: parking_lot::Mutex::new(Vec::with_capacity(max_size)),
            semaphore: Arc::new(Semaphore::new(max_size)),
        }
    }

    /// Create a pool seeded with an already established connection.
    pub fn with_connection(config: ConnectionConfig, conn: Connection) -> Self {
        let pool = Self::new(config);
        pool.idle.lock().push(conn);
        pool
    }

    /// Check out a connection, opening a new one if none is idle.
    pub async fn get(&self) -> Result<PooledConnection<'_>> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolExhausted {
                max_size: self.config.pool_size,
            })?;

        let idle = { self.idle.lock().pop() };
        let conn = match idle {
            Some(c) => c,
            None => Connection::connect(&self.config).await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self,
            reusable: false,
            _permit: permit,
        })
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

/// A checked-out connection.
///
/// It goes back to the pool on drop only after [`settle`](Self::settle)
/// has seen a result that leaves the connection in a known state; a
/// command future dropped mid-flight discards the connection.
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a Pool,
    reusable: bool,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledConnection<'_> {
    /// Access the underlying connection.
    pub fn conn(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }

    /// Record the outcome of a command and pass it through.
    pub fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        self.reusable = match result {
            Ok(_) => true,
            Err(ref e) => !e.is_connection_error(),
        };
        result
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.reusable {
                self.pool.idle.lock().push(conn);
            }
        }
    }
}
