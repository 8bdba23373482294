use std::time::Duration;

use deadpool::managed::{self, Metrics, RecycleError, RecycleResult};

use keylock_cache::error::StoreError;

use crate::config::MemcachedConfig;
use crate::protocol::Connection;

/// Opens and health-checks pooled Memcached connections.
pub(crate) struct ConnectionManager {
    addr: String,
    connect_timeout: Duration,
}

impl managed::Manager for ConnectionManager {
    type Type = Connection;
    type Error = StoreError;

    async fn create(&self) -> Result<Connection, StoreError> {
        Connection::connect(&self.addr, self.connect_timeout).await
    }

    async fn recycle(&self, conn: &mut Connection, _: &Metrics) -> RecycleResult<StoreError> {
        conn.version().await.map(|_| ()).map_err(RecycleError::Backend)
    }
}

pub(crate) type ConnectionPool = managed::Pool<ConnectionManager>;

/// Pooled connection handle.
pub(crate) type PooledConnection = managed::Object<ConnectionManager>;

/// Build a pool for `config`. No connection is opened until first use.
pub(crate) fn build_pool(config: &MemcachedConfig) -> Result<ConnectionPool, StoreError> {
    let manager = ConnectionManager {
        addr: config.address().to_owned(),
        connect_timeout: config.connection_timeout,
    };

    managed::Pool::builder(manager)
        .max_size(config.pool_size)
        .wait_timeout(Some(config.connection_timeout))
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| StoreError::Connection(e.to_string()))
}

/// Check a connection out of the pool.
pub(crate) async fn checkout(pool: &ConnectionPool) -> Result<PooledConnection, StoreError> {
    pool.get().await.map_err(|e| match e {
        managed::PoolError::Backend(inner) => inner,
        other => StoreError::Connection(other.to_string()),
    })
}
