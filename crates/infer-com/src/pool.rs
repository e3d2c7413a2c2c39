use crate::{ComError, Connection};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded set of connections to one endpoint.
///
/// At most `max_concurrency` connections are checked out at any instant; the
/// semaphore queues further callers in arrival order. Connections are opened
/// lazily and kept idle between exchanges. `Pool` is a cheap handle; clones
/// share the same connections.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    addr: String,
    max_concurrency: usize,
    connect_timeout: Option<Duration>,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    in_flight: usize,
    peak_in_flight: usize,
    opened: u64,
    closed: bool,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn open(&self) -> Result<Connection, ComError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let connect = Connection::connect(&self.addr, id);
        let connection = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| ComError::Timeout)??,
            None => connect.await?,
        };
        self.lock().opened += 1;
        log::debug!("opened connection {} to {}", id, self.addr);
        Ok(connection)
    }
}

impl Pool {
    /// Create an empty pool. A `max_concurrency` of zero is raised to one.
    pub fn new(addr: impl Into<String>, max_concurrency: usize, connect_timeout: Option<Duration>) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner: Arc::new(PoolInner {
                addr: addr.into(),
                max_concurrency,
                connect_timeout,
                permits: Arc::new(Semaphore::new(max_concurrency)),
                state: Mutex::new(PoolState::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Check out a connection, reusing an idle one when available.
    ///
    /// Waits until fewer than `max_concurrency` connections are checked out.
    /// `timeout` bounds that wait; expiry returns `ComError::Timeout`.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<PooledConnection, ComError> {
        self.checkout(timeout, false).await
    }

    /// Like `acquire`, but always opens a new connection. Used to replace a
    /// connection that turned out to be dead.
    pub async fn acquire_fresh(&self, timeout: Option<Duration>) -> Result<PooledConnection, ComError> {
        self.checkout(timeout, true).await
    }

    /// Return a connection to the idle set. Same as dropping it.
    pub fn release(&self, connection: PooledConnection) {
        drop(connection);
    }

    async fn checkout(&self, timeout: Option<Duration>, fresh: bool) -> Result<PooledConnection, ComError> {
        let wait = self.inner.permits.clone().acquire_owned();
        let permit = match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ComError::Timeout)?,
            None => wait.await,
        }
        .map_err(|_| ComError::PoolClosed)?;

        let idle = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(ComError::PoolClosed);
            }
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
            if fresh {
                // Other idle connections stay usable. Only evict the oldest
                // one when the new connection would exceed the ceiling.
                if state.idle.len() + state.in_flight > self.inner.max_concurrency {
                    let evicted = state.idle.remove(0);
                    log::debug!("closing idle connection {} to make room", evicted.id());
                }
                None
            } else {
                state.idle.pop()
            }
        };

        // From here the guard owns the in-flight slot, so an open failure or a
        // dropped future still gives it back.
        let reused = idle.is_some();
        let mut pooled = PooledConnection {
            pool: self.inner.clone(),
            connection: idle,
            reused,
            _permit: permit,
        };
        if pooled.connection.is_none() {
            pooled.connection = Some(self.inner.open().await?);
        }
        Ok(pooled)
    }

    /// Stop handing out connections, wait for every checked-out connection to
    /// come back, then close the idle ones.
    pub async fn close(&self) {
        self.inner.lock().closed = true;

        let max = u32::try_from(self.inner.max_concurrency).unwrap_or(u32::MAX);
        let drained = self.inner.permits.acquire_many(max).await;
        let idle = std::mem::take(&mut self.inner.lock().idle);
        self.inner.permits.close();
        drop(drained);

        log::debug!("pool for {} closed, dropped {} idle connections", self.inner.addr, idle.len());
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Connections currently checked out.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Highest `in_flight` value observed since creation.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.lock().peak_in_flight
    }

    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }

    /// Total connections opened since creation, replacements included.
    pub fn opened_count(&self) -> u64 {
        self.inner.lock().opened
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// A checked-out connection.
///
/// Dropping it returns the connection to the pool if it is reusable and
/// closes it otherwise; either way the concurrency slot is freed.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
    reused: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Whether this connection served an earlier exchange before this checkout.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Close the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        if let Some(connection) = self.connection.take() {
            log::debug!("discarding connection {}", connection.id());
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let mut state = self.pool.lock();
        state.in_flight -= 1;
        if let Some(connection) = self.connection.take() {
            if connection.is_reusable() && !state.closed {
                state.idle.push(connection);
            } else {
                log::debug!("closing connection {}", connection.id());
            }
        }
    }
}
