//! # Cooperative Cancellation & Timeout
//!
//! A `ReasonToken` is checked cooperatively at every AST node entry, catching both
//! elapsed-time and explicit cancellation at the same checkpoint. One token is
//! constructed per `reason()` call; its `CancelHandle` may be cloned out and used
//! from another thread to cancel the run early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single-run timeout/cancellation token. Not `Clone` itself — callers obtain a
/// `CancelHandle` (via `cancel_handle()`) to share cancellation across threads while
/// the token stays owned by the `reason()` call that created it.
pub struct ReasonToken {
    start: Instant,
    max_duration: Duration,
    cancelled: Arc<AtomicBool>,
}

impl ReasonToken {
    pub fn new(max_duration_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            max_duration: Duration::from_millis(max_duration_ms),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Checked at every AST node entry. `Err` carries which bound was hit.
    pub fn check(&self) -> Result<(), TimeoutReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(TimeoutReason::Cancelled);
        }
        let elapsed = self.start.elapsed();
        if elapsed > self.max_duration {
            return Err(TimeoutReason::Elapsed {
                limit_ms: self.max_duration.as_millis() as u64,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        Ok(())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone)]
pub enum TimeoutReason {
    Elapsed { limit_ms: u64, elapsed_ms: u64 },
    Cancelled,
}

/// A cloneable handle that can cancel the `ReasonToken` it was derived from from any
/// thread.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn passes_before_deadline() {
        let token = ReasonToken::new(1_000);
        assert!(token.check().is_ok());
    }

    #[test]
    fn fails_after_deadline() {
        let token = ReasonToken::new(0);
        thread::sleep(Duration::from_millis(5));
        assert!(matches!(token.check(), Err(TimeoutReason::Elapsed { .. })));
    }

    #[test]
    fn cancel_handle_stops_token() {
        let token = ReasonToken::new(10_000);
        let handle = token.cancel_handle();
        assert!(token.check().is_ok());
        handle.cancel();
        assert!(matches!(token.check(), Err(TimeoutReason::Cancelled)));
    }

    #[test]
    fn cancel_from_other_thread() {
        let token = ReasonToken::new(10_000);
        let handle = token.cancel_handle();
        let t = thread::spawn(move || handle.cancel());
        t.join().unwrap();
        assert!(token.check().is_err());
    }
}
