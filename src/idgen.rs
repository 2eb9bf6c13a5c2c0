//! Process-wide unique job identifiers.

use parking_lot::Mutex;

use crate::models::JobId;

/// Hands out compact base-16 identifiers from a locked counter.
///
/// Safe for any number of concurrent callers; a value is never handed out
/// twice for the lifetime of the generator.
#[derive(Debug, Default)]
pub struct AutoId {
    next: Mutex<u64>,
}

impl AutoId {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `first` instead of zero.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Mutex::new(first),
        }
    }

    pub fn next(&self) -> JobId {
        let mut next = self.next.lock();
        let id = JobId::new(format!("{:x}", *next));
        *next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_hex_and_sequential() {
        let ids = AutoId::new();
        let got: Vec<String> = (0..18).map(|_| ids.next().to_string()).collect();
        assert_eq!(got[0], "0");
        assert_eq!(got[9], "9");
        assert_eq!(got[10], "a");
        assert_eq!(got[15], "f");
        assert_eq!(got[16], "10");
    }

    #[test]
    fn test_starting_at_offsets_sequence() {
        let ids = AutoId::starting_at(255);
        assert_eq!(ids.next().as_str(), "ff");
        assert_eq!(ids.next().as_str(), "100");
    }

    #[test]
    fn test_concurrent_callers_never_share_an_id() {
        let ids = Arc::new(AutoId::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..500).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread") {
                assert!(seen.insert(id), "duplicate id handed out");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
