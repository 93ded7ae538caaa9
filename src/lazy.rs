//! One-time, thread-safe lazy construction.
//!
//! [`LazyInit`] runs a construction routine at most once successfully,
//! using double-checked locking: an atomic state flag answers the common
//! ready case without locking, and the slow path re-checks under a
//! per-instance mutex so two threads that both saw "not ready" cannot both
//! construct.
//!
//! A failed construction leaves the cell `Uninitialized`; the next access
//! starts over. Nothing partial is ever published as ready.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::Result;

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// Lifecycle of a [`LazyInit`] cell. `Ready` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
}

/// A value built on first access, at most once.
#[derive(Debug)]
pub struct LazyInit<D> {
    state: AtomicU8,
    init_lock: Mutex<()>,
    value: OnceLock<D>,
}

impl<D> LazyInit<D> {
    /// An empty, uninitialized cell.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
            init_lock: Mutex::new(()),
            value: OnceLock::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InitState {
        match self.state.load(Ordering::Acquire) {
            READY => InitState::Ready,
            INITIALIZING => InitState::Initializing,
            _ => InitState::Uninitialized,
        }
    }

    /// Whether construction has completed.
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// The constructed value, if construction has completed.
    pub fn get(&self) -> Option<&D> {
        if self.is_ready() {
            self.value.get()
        } else {
            None
        }
    }

    /// Return the value, running `construct` first if nobody has yet.
    ///
    /// Concurrent callers block on the per-instance lock while one of them
    /// constructs. If `construct` fails (or panics) the state returns to
    /// `Uninitialized` and the error goes to this caller only.
    pub fn get_or_try_init<F>(&self, construct: F) -> Result<&D>
    where
        F: FnOnce() -> Result<D>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Double-check: another thread may have finished while we waited.
        if let Some(value) = self.get() {
            return Ok(value);
        }

        self.state.store(INITIALIZING, Ordering::Release);
        let reset = ResetOnUnwind {
            state: &self.state,
            armed: true,
        };
        let outcome = construct();
        reset.disarm();

        match outcome {
            Ok(data) => {
                let value = self.value.get_or_init(|| data);
                self.state.store(READY, Ordering::Release);
                Ok(value)
            }
            Err(err) => {
                self.state.store(UNINITIALIZED, Ordering::Release);
                Err(err)
            }
        }
    }
}

impl<D> Default for LazyInit<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Puts the state back to `Uninitialized` if construction unwinds.
struct ResetOnUnwind<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl ResetOnUnwind<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(UNINITIALIZED, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlmanacError;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn starts_uninitialized() {
        let cell: LazyInit<u32> = LazyInit::new();
        assert_eq!(cell.state(), InitState::Uninitialized);
        assert!(cell.get().is_none());
    }

    #[test]
    fn constructs_once() {
        let cell = LazyInit::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cell
                .get_or_try_init(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .unwrap();
            assert_eq!(*v, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), InitState::Ready);
    }

    #[test]
    fn failure_allows_retry() {
        let cell = LazyInit::new();
        let err = cell
            .get_or_try_init(|| Err(AlmanacError::construction::<u32>("not yet")))
            .unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(cell.state(), InitState::Uninitialized);

        assert_eq!(*cell.get_or_try_init(|| Ok(7)).unwrap(), 7);
    }

    #[test]
    fn panic_resets_state() {
        let cell: LazyInit<u32> = LazyInit::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = cell.get_or_try_init(|| panic!("constructor panicked"));
        }));
        assert!(result.is_err());
        assert_eq!(cell.state(), InitState::Uninitialized);
        assert_eq!(*cell.get_or_try_init(|| Ok(1)).unwrap(), 1);
    }

    #[test]
    fn state_is_initializing_during_construction() {
        let cell: LazyInit<u32> = LazyInit::new();
        cell.get_or_try_init(|| {
            assert_eq!(cell.state(), InitState::Initializing);
            Ok(3)
        })
        .unwrap();
    }

    #[test]
    fn concurrent_first_access_constructs_once() {
        let cell = LazyInit::new();
        let calls = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let v = cell
                        .get_or_try_init(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(String::from("built"))
                        })
                        .unwrap();
                    assert_eq!(v, "built");
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
