//! Fixed-Delay Policy
//!
//! Blocks the calling thread for a configured duration and hands the payload
//! back unchanged. Usable on its own or as a step in a workflow.

use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::BoxError;
use crate::workflow::Command;

/// Waits a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    delay: Duration,
}

impl Interval {
    pub fn of(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn seconds(seconds: u64) -> Self {
        Self::of(Duration::from_secs(seconds))
    }

    pub fn millis(millis: u64) -> Self {
        Self::of(Duration::from_millis(millis))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleeps for the interval, then returns `payload` untouched.
    pub fn execute<T>(&self, payload: T) -> T {
        debug!("Waiting {:?}", self.delay);
        thread::sleep(self.delay);
        payload
    }
}

impl<T: Send> Command<T> for Interval {
    fn execute(&self, payload: T) -> Result<T, BoxError> {
        Ok(Interval::execute(self, payload))
    }

    fn name(&self) -> &str {
        "interval"
    }
}
