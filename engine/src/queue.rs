//! Waitlist queue ordering and first-fit selection.
//!
//! Queue order: priority descending, then `joined_at` ascending (FIFO within
//! a priority), then entry ID so equal timestamps still order totally.

use crate::types::{UserId, WaitlistEntry, WaitlistStatus};
use std::cmp::Ordering;

/// Compare two entries by queue order.
#[must_use]
pub fn queue_order(a: &WaitlistEntry, b: &WaitlistEntry) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort entries into queue order.
pub fn sort_queue(entries: &mut [WaitlistEntry]) {
    entries.sort_by(queue_order);
}

/// 1-based position of the user's active entry among active entries.
///
/// `entries` may be unsorted and may contain entries in any status.
#[must_use]
pub fn position_of(entries: &[WaitlistEntry], user_id: UserId) -> Option<usize> {
    let mut active: Vec<&WaitlistEntry> = entries
        .iter()
        .filter(|e| e.status == WaitlistStatus::Active)
        .collect();
    active.sort_by(|a, b| queue_order(a, b));

    active.iter().position(|e| e.user_id == user_id).map(|index| index + 1)
}

/// Greedy first-fit budget for one redistribution pass.
///
/// Walk candidates in queue order; an entry is admitted when its quantity
/// fits what is left. Entries that do not fit are skipped, not removed, so a
/// smaller entry further back can still be served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirstFit {
    remaining: u32,
}

impl FirstFit {
    /// Start a pass with `budget` seats
    #[must_use]
    pub const fn new(budget: u32) -> Self {
        Self { remaining: budget }
    }

    /// Seats not yet handed out
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Nothing left to hand out
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Whether `quantity` fits the remaining budget
    #[must_use]
    pub const fn admits(&self, quantity: u32) -> bool {
        quantity > 0 && quantity <= self.remaining
    }

    /// Spend `quantity` seats after a successful offer
    pub const fn commit(&mut self, quantity: u32) {
        self.remaining = self.remaining.saturating_sub(quantity);
    }
}
