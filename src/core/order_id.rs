// Correlation id allocation for outgoing orders

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic correlation id generator shared by every instrument of a session.
#[derive(Debug, Default)]
pub struct CorrelationIds {
    counter: AtomicU64,
}

impl CorrelationIds {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Useful when resuming after a restart so ids do not collide with the last run.
    pub fn starting_at(first: u64) -> Self {
        Self {
            counter: AtomicU64::new(first),
        }
    }

    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to [`next`](Self::next) will hand out.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_monotonic_allocation() {
        let ids = CorrelationIds::new();
        assert_eq!(ids.next(), 0);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.current(), 2);

        let resumed = CorrelationIds::starting_at(500);
        assert_eq!(resumed.next(), 500);
    }

    #[test]
    fn test_concurrent_allocation() {
        let ids = Arc::new(CorrelationIds::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                thread::spawn(move || (0..100).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();

        assert_eq!(all.len(), 400);
        for (i, id) in all.iter().enumerate() {
            assert_eq!(*id, i as u64);
        }
    }
}
