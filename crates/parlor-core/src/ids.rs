use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Process-wide monotonic message id source. Ids are never reused; after a
/// restart the counter is seeded past the highest id in the loaded snapshot.
#[derive(Debug)]
pub struct MessageIdGen {
    next: AtomicU64,
}

impl MessageIdGen {
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next.max(1)),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let ids = MessageIdGen::starting_at(41);
        assert_eq!(ids.next(), 41);
        assert_eq!(ids.next(), 42);
        assert_eq!(ids.next(), 43);
    }

    #[test]
    fn seed_is_clamped_to_one() {
        let ids = MessageIdGen::starting_at(0);
        assert_eq!(ids.next(), 1);
    }
}
