//! Shared cancellation signal with at-most-once semantics.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// An externally settable stop signal shared between a controller and one or
/// more background tasks.
///
/// Cloning produces another handle to the same signal. The controller calls
/// [`StopToken::signal`] exactly once (further calls are no-ops); observers
/// poll [`StopToken::is_signaled`] or block on [`StopToken::wait_timeout`].
#[derive(Clone)]
pub struct StopToken {
    inner: Arc<Inner>,
}

struct Inner {
    signaled: Mutex<bool>,
    observers: Condvar,
}

impl StopToken {
    pub fn new() -> Self {
        StopToken {
            inner: Arc::new(Inner {
                signaled: Mutex::new(false),
                observers: Condvar::new(),
            }),
        }
    }

    /// Set the signal and wake all blocked observers.
    pub fn signal(&self) {
        let mut signaled = self.inner.signaled.lock().unwrap();
        if !*signaled {
            *signaled = true;
            self.inner.observers.notify_all();
        }
    }

    pub fn is_signaled(&self) -> bool {
        *self.inner.signaled.lock().unwrap()
    }

    /// Block until the token is signaled or `timeout` elapses. Returns
    /// whether the token was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signaled = self.inner.signaled.lock().unwrap();
        if *signaled {
            return true;
        }
        let (signaled, _timed_out) = self
            .inner
            .observers
            .wait_timeout_while(signaled, timeout, |signaled| !*signaled)
            .unwrap();
        *signaled
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
