//! Retransmission timer on the tokio clock.
//!
//! [`TokioTimer`] implements the single-shot [`Timer`] contract for the
//! async session.  It does not own a task: it only records a deadline, and
//! the event loop races [`TokioTimer::expired`] against its other inputs.
//! A disarmed timer yields a future that never completes, so the
//! `select!` branch can stay in place.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::channel::Timer;

#[derive(Debug, Default)]
pub struct TokioTimer {
    deadline: Option<Instant>,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the current deadline passes.
    ///
    /// The returned future holds a copy of the deadline, not a borrow, so
    /// re-arming afterwards does not affect it.
    pub fn expired(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        }
    }

    /// Record that the deadline passed; the timer is idle afterwards.
    pub fn fired(&mut self) {
        self.deadline = None;
    }
}

impl Timer for TokioTimer {
    fn arm(&mut self, duration: Duration) {
        if self.deadline.is_some() {
            log::warn!("[timer] armed while already armed; previous deadline replaced");
        }
        self.deadline = Some(Instant::now() + duration);
    }

    fn disarm(&mut self) {
        if self.deadline.is_none() {
            log::warn!("[timer] disarmed while idle");
        }
        self.deadline = None;
    }
}
