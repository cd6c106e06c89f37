use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::sync::lock;

/// Counting semaphore used as a flow-control signal.
///
/// Each `signal` releases exactly one `wait`.
#[derive(Debug, Default)]
pub struct Signal {
    permits: Mutex<u32>,
    cv: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let mut permits = lock(&self.permits);
        *permits = permits.saturating_add(1);
        self.cv.notify_one();
    }

    /// Takes one permit, waiting at most `timeout`. Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = lock(&self.permits);
        while *permits == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(permits, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            permits = guard;
        }
        *permits -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_times_out_without_permit() {
        let s = Signal::new();
        assert!(!s.wait(Duration::from_millis(5)));
    }

    #[test]
    fn each_signal_releases_one_wait() {
        let s = Signal::new();
        s.signal();
        s.signal();
        assert!(s.wait(Duration::ZERO));
        assert!(s.wait(Duration::ZERO));
        assert!(!s.wait(Duration::ZERO));
    }

    #[test]
    fn signal_wakes_waiter_on_other_thread() {
        let s = Arc::new(Signal::new());
        let waiter = {
            let s = s.clone();
            thread::spawn(move || s.wait(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        s.signal();
        assert!(waiter.join().unwrap());
    }
}
