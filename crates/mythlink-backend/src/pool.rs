//! Connection pooling contract and the per-thread binding built on it.
//!
//! The pool itself is a collaborator: anything implementing
//! [`ConnectionPool`] can back a [`PoolBinding`]. The binding gives each
//! calling thread at most one checked-out item. The outermost
//! [`PoolBinding::inject`] on a thread checks out, nested calls on the same
//! thread reuse it, and the outermost call checks it back in on every exit
//! path, including unwinding.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use crate::collaborators::Database;
use crate::config::BackendConfig;
use crate::connection::Connection;
use crate::error::{BackendError, Result};
use crate::events::EventBus;
use crate::negotiate::Negotiator;
use crate::INJECT_TARGET;

/// Creates and permanently disposes of pooled items.
pub trait PoolableFactory<T>: Send + Sync {
    fn create(&self) -> Result<T>;

    /// Called when `item` leaves the pool for good.
    fn destroy(&self, item: T);
}

/// The three operations a pool must provide to back a [`PoolBinding`].
pub trait ConnectionPool<T>: Send + Sync {
    /// Return an idle item or create a new one.
    fn checkout(&self) -> Result<T>;

    /// Hand an item back for reuse.
    fn checkin(&self, item: T);

    /// Remove an item permanently.
    fn destroy(&self, item: T);
}

/// Opens playback [`Connection`]s to the master backend.
///
/// Every connection shares one [`Negotiator`], so the protocol version is
/// negotiated once per factory.
pub struct ConnectionFactory {
    config: BackendConfig,
    negotiator: Arc<Negotiator>,
    bus: Arc<dyn EventBus>,
    db: Option<Arc<dyn Database>>,
}

impl ConnectionFactory {
    /// Factory with the standard protocol registry and `config.client_version`.
    pub fn new(config: BackendConfig, bus: Arc<dyn EventBus>) -> Self {
        let negotiator = Negotiator::standard(config.client_version);
        Self::with_negotiator(config, negotiator, bus)
    }

    pub fn with_negotiator(
        config: BackendConfig,
        negotiator: Arc<Negotiator>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            config,
            negotiator,
            bus,
            db: None,
        }
    }

    /// Attach a catalog to every connection this factory creates.
    pub fn with_database(mut self, db: Arc<dyn Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn negotiator(&self) -> &Arc<Negotiator> {
        &self.negotiator
    }
}

impl PoolableFactory<Connection> for ConnectionFactory {
    fn create(&self) -> Result<Connection> {
        let conn = Connection::open(
            self.config.clone(),
            Arc::clone(&self.negotiator),
            Arc::clone(&self.bus),
        )?;
        Ok(match &self.db {
            Some(db) => conn.with_database(Arc::clone(db)),
            None => conn,
        })
    }

    fn destroy(&self, mut conn: Connection) {
        if let Err(err) = conn.close() {
            warn!(host = %self.config.host, error = %err, "failed to close connection");
        }
    }
}

/// A pool that keeps nothing: checkout creates, checkin destroys.
pub struct UnpooledConnections<F> {
    factory: F,
}

impl<F> UnpooledConnections<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<T, F: PoolableFactory<T>> ConnectionPool<T> for UnpooledConnections<F> {
    fn checkout(&self) -> Result<T> {
        self.factory.create()
    }

    fn checkin(&self, item: T) {
        self.factory.destroy(item);
    }

    fn destroy(&self, item: T) {
        self.factory.destroy(item);
    }
}

/// Thread-affine scoped acquisition over a [`ConnectionPool`].
///
/// A slot per thread holds the checked-out item. The slot holds `None` while
/// the item is lent out through [`Injected::conn`].
pub struct PoolBinding<T, P> {
    pool: P,
    slots: Mutex<HashMap<ThreadId, Option<T>>>,
}

impl<T, P: ConnectionPool<T>> PoolBinding<T, P> {
    pub fn new(pool: P) -> Self {
        Self {
            pool,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Whether the current thread holds a checked-out item.
    pub fn is_bound(&self) -> bool {
        self.slots().contains_key(&thread::current().id())
    }

    /// Run `f` with this thread's item, checking one out first if needed.
    ///
    /// Only the call that checked out checks in, after `f` returns, fails or
    /// panics.
    pub fn inject<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Injected<'_, T, P>) -> Result<R>,
    {
        let id = thread::current().id();
        let ctx = Injected {
            binding: self,
            id,
            _not_send: PhantomData,
        };

        if self.slots().contains_key(&id) {
            debug!(target: INJECT_TARGET, ?id, "reusing thread connection");
            return f(&ctx);
        }

        let item = self.pool.checkout()?;
        debug!(target: INJECT_TARGET, ?id, "checked out connection");
        self.slots().insert(id, Some(item));
        let _release = Release { binding: self, id };
        f(&ctx)
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ThreadId, Option<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, id: ThreadId) -> Result<T> {
        match self.slots().get_mut(&id) {
            Some(slot) => slot.take().ok_or_else(|| {
                BackendError::Client(
                    "Injected::conn called inside another conn on the same thread; \
                     use the connection the outer call lent"
                        .into(),
                )
            }),
            None => Err(BackendError::Closed),
        }
    }

    fn put_back(&self, id: ThreadId, item: T) {
        if let Some(slot) = self.slots().get_mut(&id) {
            *slot = Some(item);
        }
    }
}

/// Handle to the current thread's item inside [`PoolBinding::inject`].
///
/// Tied to the thread that created it.
pub struct Injected<'a, T, P> {
    binding: &'a PoolBinding<T, P>,
    id: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl<T, P: ConnectionPool<T>> Injected<'_, T, P> {
    /// Lend the item to `op`. It returns to the thread slot afterwards, even
    /// if `op` panics.
    pub fn conn<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let item = self.binding.take(self.id)?;
        let mut lent = Lent {
            binding: self.binding,
            id: self.id,
            item: Some(item),
        };
        match lent.item.as_mut() {
            Some(item) => op(item),
            None => Err(BackendError::Closed),
        }
    }
}

struct Lent<'a, T, P: ConnectionPool<T>> {
    binding: &'a PoolBinding<T, P>,
    id: ThreadId,
    item: Option<T>,
}

impl<T, P: ConnectionPool<T>> Drop for Lent<'_, T, P> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.binding.put_back(self.id, item);
        }
    }
}

struct Release<'a, T, P: ConnectionPool<T>> {
    binding: &'a PoolBinding<T, P>,
    id: ThreadId,
}

impl<T, P: ConnectionPool<T>> Drop for Release<'_, T, P> {
    fn drop(&mut self) {
        let slot = self.binding.slots().remove(&self.id);
        match slot {
            Some(Some(item)) => {
                debug!(target: INJECT_TARGET, id = ?self.id, "checking in connection");
                self.binding.pool.checkin(item);
            }
            _ => warn!(target: INJECT_TARGET, id = ?self.id, "thread connection missing at release"),
        }
    }
}
