//! Interpreter lock - serializes every entry into handler code
//!
//! Script runtimes are not safe to enter from several threads at once. All
//! dispatches hold an `InterpreterGuard` while they run; the guard releases
//! the lock on every exit path, including unwinding.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Hooks invoked while the lock is held, right after acquiring and right
/// before releasing
pub trait LockObserver: Send + Sync {
    fn on_acquire(&self, scope: &'static str);
    fn on_release(&self, scope: &'static str);
}

/// Process-wide (or per-dispatcher) mutual exclusion for script entry
#[derive(Default)]
pub struct InterpreterLock {
    mutex: Mutex<()>,
    observer: Option<Arc<dyn LockObserver>>,
}

impl InterpreterLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: Arc<dyn LockObserver>) -> Self {
        Self {
            mutex: Mutex::new(()),
            observer: Some(observer),
        }
    }

    /// The lock shared by every dispatcher that was not given its own
    pub fn global() -> Arc<InterpreterLock> {
        static GLOBAL: OnceLock<Arc<InterpreterLock>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(InterpreterLock::new())).clone()
    }

    /// Block until the lock is free and enter `scope`
    pub fn acquire(&self, scope: &'static str) -> InterpreterGuard<'_> {
        // The mutex protects no data, so a panic in a previous holder
        // leaves nothing to repair.
        let guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);

        log::trace!("interpreter lock acquired ({})", scope);
        if let Some(observer) = &self.observer {
            observer.on_acquire(scope);
        }

        InterpreterGuard {
            lock: self,
            scope,
            _guard: guard,
        }
    }
}

/// Held for the duration of a script entry
pub struct InterpreterGuard<'a> {
    lock: &'a InterpreterLock,
    scope: &'static str,
    _guard: MutexGuard<'a, ()>,
}

impl InterpreterGuard<'_> {
    pub fn scope(&self) -> &'static str {
        self.scope
    }
}

impl Drop for InterpreterGuard<'_> {
    fn drop(&mut self) {
        // Runs before `_guard` is dropped, so the mutex is still held here.
        if let Some(observer) = &self.lock.observer {
            observer.on_release(self.scope);
        }
        log::trace!("interpreter lock released ({})", self.scope);
    }
}
