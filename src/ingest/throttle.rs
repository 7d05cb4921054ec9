// src/ingest/throttle.rs
#[cfg(test)]
use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};

/// Serializes calls against one provider and spaces their starts by at least
/// `min_interval`. Calls to other providers are unaffected (one throttle each).
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    /// Exclusive turn on this provider. Nothing is spaced until `start_by`.
    pub async fn turn(&self) -> Turn<'_> {
        Turn {
            min_interval: self.min_interval,
            last_start: self.last_start.lock().await,
        }
    }

    /// Waits for this provider's turn, then runs `call` while holding the slot.
    #[cfg(test)]
    pub async fn run<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut turn = self.turn().await;
        // previous start is never in the future, so this always succeeds
        turn.start_by(Instant::now() + self.min_interval).await;
        call().await
    }
}

/// Held for the duration of one provider call.
pub struct Turn<'a> {
    min_interval: Duration,
    last_start: MutexGuard<'a, Option<Instant>>,
}

impl Turn<'_> {
    /// Sleeps out the rest of the interval since the previous call and records
    /// this call's start. Gives up without sleeping when that would run past
    /// `deadline`; returns whether the call may go ahead.
    pub async fn start_by(&mut self, deadline: Instant) -> bool {
        if let Some(prev) = *self.last_start {
            let ready = prev + self.min_interval;
            if ready > deadline {
                return false;
            }
            sleep_until(ready).await;
        }
        *self.last_start = Some(Instant::now());
        true
    }
}
