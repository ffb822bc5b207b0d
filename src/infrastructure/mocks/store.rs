//! Window store standing in for an unreliable backend.

use crate::application::ports::{StoreError, WindowStore};
use crate::domain::window::WindowOutcome;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FAILING: u8 = 0;
const HANGING: u8 = 1;
const HEALTHY: u8 = 2;

/// Store standing in for an unreachable backend.
///
/// `new()` fails every call at once; `hanging()` never completes, which
/// exercises the limiter's store timeout. Clones share their mode, so a test
/// can switch a store owned by a limiter with `fail`, `hang` or `recover`.
/// A recovered store admits every request without counting.
#[derive(Debug, Clone, Default)]
pub struct UnavailableStore {
    mode: Arc<AtomicU8>,
    calls: Arc<AtomicUsize>,
}

impl UnavailableStore {
    /// Store that fails every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose calls never complete.
    pub fn hanging() -> Self {
        let store = Self::default();
        store.hang();
        store
    }

    /// Fail every following call immediately.
    pub fn fail(&self) {
        self.mode.store(FAILING, Ordering::SeqCst);
    }

    /// Never complete following calls.
    pub fn hang(&self) {
        self.mode.store(HANGING, Ordering::SeqCst);
    }

    /// Answer following calls with an admitted outcome.
    pub fn recover(&self) {
        self.mode.store(HEALTHY, Ordering::SeqCst);
    }

    /// Number of `check_and_record` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WindowStore for UnavailableStore {
    fn check_and_record(
        &self,
        _key: &str,
        _window: Duration,
        _max_requests: u32,
    ) -> impl Future<Output = Result<WindowOutcome, StoreError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.load(Ordering::SeqCst);
        async move {
            match mode {
                HANGING => std::future::pending().await,
                HEALTHY => Ok(WindowOutcome {
                    admitted: true,
                    count: 1,
                    oldest_ms: None,
                    now_ms: 0,
                }),
                _ => Err(StoreError::Unavailable("connection refused".to_string())),
            }
        }
    }
}
