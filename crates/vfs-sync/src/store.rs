//! A small reactive store.
//!
//! State is split in two: `Data` is plain, serializable and may be replaced
//! wholesale by a remote merge; `Actions` is fixed at construction and never
//! touched again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use dashmap::DashMap;

type Listener<D> = Arc<dyn Fn(&D) + Send + Sync>;

/// Hooks into a store's lifecycle.
pub trait StoreMiddleware<D, A>: Send + Sync {
    /// Called once when the store is created.
    fn attach(&self, store: &Store<D, A>);

    /// Called after every local mutation, once subscribers have seen it.
    fn after_set(&self, data: &D);
}

/// Everything needed to build a `Store`.
pub struct StoreConfig<D, A = ()> {
    pub initial: D,
    pub actions: A,
    pub middleware: Vec<Arc<dyn StoreMiddleware<D, A>>>,
}

impl<D, A> StoreConfig<D, A> {
    pub fn new(initial: D, actions: A) -> Self {
        Self {
            initial,
            actions,
            middleware: Vec::new(),
        }
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn StoreMiddleware<D, A>>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

struct StoreInner<D, A> {
    data: RwLock<D>,
    actions: A,
    listeners: DashMap<u64, Listener<D>>,
    next_listener: AtomicU64,
    middleware: Vec<Arc<dyn StoreMiddleware<D, A>>>,
}

/// Shared handle to a store. Clones see the same state.
pub struct Store<D, A = ()> {
    inner: Arc<StoreInner<D, A>>,
}

impl<D, A> Clone for Store<D, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: std::fmt::Debug, A> std::fmt::Debug for Store<D, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data", &*self.inner.data.read().unwrap_or_else(PoisonError::into_inner))
            .field("listeners", &self.inner.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Non-owning handle, for tasks that must not keep a store alive.
pub struct WeakStore<D, A = ()> {
    inner: Weak<StoreInner<D, A>>,
}

impl<D, A> Clone for WeakStore<D, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<D, A> WeakStore<D, A> {
    pub fn upgrade(&self) -> Option<Store<D, A>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<D, A> Store<D, A> {
    pub fn new(config: StoreConfig<D, A>) -> Self {
        let store = Self {
            inner: Arc::new(StoreInner {
                data: RwLock::new(config.initial),
                actions: config.actions,
                listeners: DashMap::new(),
                next_listener: AtomicU64::new(1),
                middleware: config.middleware,
            }),
        };
        for middleware in &store.inner.middleware {
            middleware.attach(&store);
        }
        store
    }

    /// Borrow the current data.
    pub fn read<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.inner.data.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn actions(&self) -> &A {
        &self.inner.actions
    }

    /// Call `listener` after every change. Returns an id for `unsubscribe`.
    pub fn subscribe<F>(&self, listener: F) -> u64
    where
        F: Fn(&D) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.insert(id, Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.inner.listeners.remove(&id).is_some()
    }

    pub fn downgrade(&self) -> WeakStore<D, A> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn notify(&self, data: &D) {
        let listeners: Vec<Listener<D>> = self
            .inner
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener(data);
        }
    }
}

impl<D: Clone, A> Store<D, A> {
    /// Clone of the current data.
    pub fn get(&self) -> D {
        self.read(D::clone)
    }

    /// Mutate the data in place.
    pub fn update(&self, f: impl FnOnce(&mut D)) {
        let snapshot = {
            let mut data = self.inner.data.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut data);
            data.clone()
        };
        self.notify(&snapshot);
        for middleware in &self.inner.middleware {
            middleware.after_set(&snapshot);
        }
    }

    /// Swap in new data.
    pub fn replace(&self, next: D) {
        self.update(|data| *data = next);
    }

    /// Replace the data with a value merged from elsewhere.
    ///
    /// Subscribers are notified; middleware is not, so a merge never echoes
    /// back to where it came from.
    pub fn apply_remote(&self, next: D) {
        let snapshot = {
            let mut data = self.inner.data.write().unwrap_or_else(PoisonError::into_inner);
            *data = next;
            data.clone()
        };
        self.notify(&snapshot);
    }
}
