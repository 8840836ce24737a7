//! Update-id tracking for the depth stream.
//!
//! Transport retries can replay or reorder depth messages. Each message
//! covers the update-id range `[first, final]`; a message whose `final` is
//! not past the last one applied is a replay and is dropped.

/// Verdict for one depth message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Contiguous with the previous message (or the first one seen).
    InOrder,
    /// Newer, but update ids `[expected, received)` were never seen.
    Gap {
        /// First missing update id.
        expected: u64,
        /// First update id of the received message.
        received: u64,
    },
    /// Already covered by a previous message.
    Duplicate,
}

impl SequenceCheck {
    /// Returns true if the message should be applied.
    #[must_use]
    pub fn should_apply(self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

/// Tracks the last applied update id of one depth stream.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    last_final: Option<u64>,
    gaps: u64,
    duplicates: u64,
}

impl SequenceGuard {
    /// Creates a guard that accepts any first message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a message covering `[first_update_id, final_update_id]`.
    pub fn check(&mut self, first_update_id: u64, final_update_id: u64) -> SequenceCheck {
        let Some(last) = self.last_final else {
            self.last_final = Some(final_update_id);
            return SequenceCheck::InOrder;
        };

        if final_update_id <= last {
            self.duplicates += 1;
            return SequenceCheck::Duplicate;
        }

        self.last_final = Some(final_update_id);
        let expected = last + 1;
        if first_update_id > expected {
            self.gaps += 1;
            SequenceCheck::Gap {
                expected,
                received: first_update_id,
            }
        } else {
            SequenceCheck::InOrder
        }
    }

    /// Forgets the last applied id; used after a reconnect.
    pub fn reset(&mut self) {
        self.last_final = None;
    }

    /// Returns the last applied update id.
    #[must_use]
    pub fn last_update_id(&self) -> Option<u64> {
        self.last_final
    }

    /// Returns the number of gaps seen.
    #[must_use]
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Returns the number of duplicates dropped.
    #[must_use]
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_and_duplicates() {
        let mut guard = SequenceGuard::new();

        assert_eq!(guard.check(100, 105), SequenceCheck::InOrder);
        assert_eq!(guard.check(106, 110), SequenceCheck::InOrder);
        assert_eq!(guard.check(106, 110), SequenceCheck::Duplicate); // Replay
        assert_eq!(guard.check(101, 104), SequenceCheck::Duplicate); // Old
        assert_eq!(guard.duplicates(), 2);
        assert_eq!(guard.last_update_id(), Some(110));
    }

    #[test]
    fn test_gap_detection() {
        let mut guard = SequenceGuard::new();

        assert_eq!(guard.check(1, 1), SequenceCheck::InOrder);
        assert_eq!(
            guard.check(5, 6),
            SequenceCheck::Gap {
                expected: 2,
                received: 5
            }
        );
        assert!(guard.check(5, 6) == SequenceCheck::Duplicate);
        assert_eq!(guard.check(7, 7), SequenceCheck::InOrder);
        assert_eq!(guard.gaps(), 1);
    }

    #[test]
    fn test_overlapping_range_applies() {
        let mut guard = SequenceGuard::new();
        guard.check(10, 20);
        assert_eq!(guard.check(15, 25), SequenceCheck::InOrder);
        assert!(SequenceCheck::InOrder.should_apply());
        assert!(!SequenceCheck::Duplicate.should_apply());
    }

    #[test]
    fn test_reset() {
        let mut guard = SequenceGuard::new();
        guard.check(10, 20);
        guard.reset();
        assert_eq!(guard.last_update_id(), None);
        assert_eq!(guard.check(1, 2), SequenceCheck::InOrder);
    }
}
