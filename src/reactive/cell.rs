//! Reactive cell and derived views.

use super::batch;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Change listener registered on a cell.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`ReactiveCell::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Counter for cell identity (used to dedup notifications inside a batch).
static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

struct CellInner<T> {
    id: u64,
    value: RwLock<T>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

/// A shared mutable value that notifies listeners on every write.
///
/// Clones share the same value.
pub struct ReactiveCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> ReactiveCell<T> {
    /// Create a new cell.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id: NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed),
                value: RwLock::new(value),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Read the value through a borrow.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Replace the value and notify listeners.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.notify();
    }

    /// Mutate the value in place and notify listeners.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut value = self.inner.value.write();
            f(&mut value)
        };
        self.notify();
        result
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a change listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a read-only projection of this cell.
    pub fn map<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Derived<T, U> {
        Derived {
            source: self.clone(),
            project: Arc::new(f),
        }
    }

    fn notify(&self) {
        // Snapshot listeners so they run without the lock held.
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        batch::notify(self.inner.id, listeners);
    }
}

impl<T: Clone + Send + Sync + 'static> ReactiveCell<T> {
    /// Clone the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReactiveCell")
            .field(&*self.inner.value.read())
            .finish()
    }
}

/// Read-only view computed from a [`ReactiveCell`] on every read.
///
/// Listeners registered here fire whenever the source cell changes.
pub struct Derived<T, U> {
    source: ReactiveCell<T>,
    project: Arc<dyn Fn(&T) -> U + Send + Sync>,
}

impl<T, U> Clone for Derived<T, U> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            project: self.project.clone(),
        }
    }
}

impl<T: Send + Sync + 'static, U> Derived<T, U> {
    pub fn get(&self) -> U {
        self.source.with(|value| (self.project)(value))
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.source.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.source.unsubscribe(id)
    }
}

impl<T: Send + Sync + 'static, U: fmt::Debug> fmt::Debug for Derived<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Derived").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_set_notifies_listeners() {
        let cell = ReactiveCell::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = cell.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(2);
        cell.update(|v| *v += 1);
        assert_eq!(cell.get(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(cell.unsubscribe(id));
        assert!(!cell.unsubscribe(id));
        cell.set(4);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clones_share_value() {
        let cell = ReactiveCell::new(String::from("a"));
        let other = cell.clone();
        other.set("b".to_string());
        assert_eq!(cell.get(), "b");
        assert!(cell.ptr_eq(&other));
        assert!(!cell.ptr_eq(&ReactiveCell::new(String::new())));
    }

    #[test]
    fn test_derived_tracks_source() {
        let cell = ReactiveCell::new((1, "x"));
        let first = cell.map(|(n, _)| *n * 10);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        first.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(first.get(), 10);
        cell.set((5, "y"));
        assert_eq!(first.get(), 50);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_write_other_cell() {
        let source = ReactiveCell::new(0);
        let mirror = ReactiveCell::new(0);
        let (src, dst) = (source.clone(), mirror.clone());
        source.subscribe(move || dst.set(src.get() * 2));

        source.set(21);
        assert_eq!(mirror.get(), 42);
    }
}
