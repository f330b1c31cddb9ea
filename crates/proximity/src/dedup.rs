//! At-most-once gate for inbound payment requests.
//!
//! Entries live for the lifetime of the process; a restarted process will
//! accept a request that is still being broadcast.

use dashmap::DashSet;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DedupTracker {
    seen: DashSet<String>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `request_id` and report whether it was unseen.
    ///
    /// Check and insert happen in one step, so concurrent callers racing on
    /// the same id get exactly one `true`.
    pub fn mark_if_new(&self, request_id: &str) -> bool {
        let fresh = self.seen.insert(request_id.to_string());
        if !fresh {
            debug!(request_id, "Duplicate request suppressed");
        }
        fresh
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.seen.contains(request_id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_if_new() {
        let tracker = DedupTracker::new();
        assert!(tracker.mark_if_new("req-1"));
        assert!(!tracker.mark_if_new("req-1"));
        assert!(tracker.mark_if_new("req-2"));
        assert_eq!(tracker.len(), 2);
        assert!(tracker.contains("req-1"));
    }

    #[test]
    fn test_concurrent_marks_admit_one() {
        let tracker = Arc::new(DedupTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.mark_if_new("req-race"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fresh| *fresh)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(tracker.len(), 1);
    }
}
