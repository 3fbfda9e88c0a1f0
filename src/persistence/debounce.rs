//! A restartable one-shot timer.

use std::future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Fires once, `delay` after the most recent [`schedule`](Debouncer::schedule).
///
/// The owner polls [`elapsed`](Debouncer::elapsed) inside its event loop and
/// calls [`cancel`](Debouncer::cancel) once it acted on the deadline.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms the timer, pushing back a deadline that is already armed.
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes when the deadline passes; never completes while disarmed.
    pub async fn elapsed(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending().await,
        }
    }
}
