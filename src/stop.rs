//! Cooperative shutdown signal. No abrupt socket shutdown: every loop
//! checks this at its natural tick (accept timeout, advertiser interval,
//! GC interval) and exits cleanly.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep in short slices so a stop request is noticed promptly rather
    /// than only at the next full-length tick.
    pub fn sleep_or_stop(&self, total: Duration) {
        const SLICE: Duration = Duration::from_millis(100);
        let mut remaining = total;
        while remaining > Duration::ZERO {
            if self.is_stopped() {
                return;
            }
            let slice = remaining.min(SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_interrupts_sleep_promptly() {
        let token = StopToken::new();
        let token2 = token.clone();
        let handle = std::thread::spawn(move || {
            let start = std::time::Instant::now();
            token2.sleep_or_stop(Duration::from_secs(10));
            start.elapsed()
        });
        std::thread::sleep(Duration::from_millis(50));
        token.stop();
        let elapsed = handle.join().unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }
}
