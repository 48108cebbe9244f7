//! Process-wide logical clock used to stamp refresh requests.
//!
//! Panels of one process share a single [`TimeCounter`] so that a refresh in
//! one panel totally orders against requests posted to the other.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TimeCounter {
    value: AtomicU64,
}

impl TimeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current value and advance the counter.
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst)
    }

    /// Current value without advancing.
    pub fn peek(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_next_is_strictly_increasing() {
        let counter = TimeCounter::new();
        let a = counter.next();
        let b = counter.next();
        assert!(b > a);
        assert_eq!(counter.peek(), b + 1);
    }

    #[test]
    fn test_shared_counter_never_repeats() {
        let counter = Arc::new(TimeCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || (0..250).map(|_| counter.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
