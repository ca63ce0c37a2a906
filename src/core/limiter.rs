//! Fixed-window rate limiter.
//!
//! Checked before pool acquisition, so a rejected call never touches the
//! storage engine: rejection is O(1) and side-effect-free. The limiter is
//! per-process and in-memory; a restart resets the window, and multiple
//! server instances sharing one store do not coordinate. Documented
//! limitation, not a bug.

use crate::core::error::MemoryError;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct WindowState {
    window_start: Instant,
    count: u32,
}

pub struct RateLimiter {
    window: Duration,
    max_ops: u32,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_ops: u32) -> Self {
        Self {
            window,
            max_ops,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Count one operation against the current window, resetting the window
    /// first if it has elapsed.
    pub fn try_acquire(&self) -> Result<(), MemoryError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| MemoryError::StorageError("rate limiter lock poisoned".to_string()))?;

        let now = Instant::now();
        if now.duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.count = 0;
        }
        if state.count >= self.max_ops {
            return Err(MemoryError::RateLimitExceeded(self.max_ops));
        }
        state.count += 1;
        Ok(())
    }

    /// Remaining budget in the current window. Health reporting only; does
    /// not consume an operation.
    pub fn remaining(&self) -> u32 {
        self.state
            .lock()
            .map(|state| {
                if Instant::now().duration_since(state.window_start) >= self.window {
                    self.max_ops
                } else {
                    self.max_ops.saturating_sub(state.count)
                }
            })
            .unwrap_or(0)
    }
}
