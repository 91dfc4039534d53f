//! Inventory ledger: the single path for seat mutation.
//!
//! Two layers keep counters consistent. A per-event async mutex serializes
//! every read-validate-write sequence on one event, and the repository applies
//! each adjustment as a conditional update. Mutating methods take the
//! [`EventGuard`] from [`SeatLedger::lock`], so a caller cannot adjust seats
//! for an event it has not locked.

use crate::error::{EngineError, Result};
use crate::repository::EventRepository;
use crate::types::{EventId, SeatAdjustment, SeatCounts};
use boxoffice_core::environment::Clock;
use boxoffice_runtime::{KeyedGuard, KeyedLocks};
use std::sync::Arc;

/// Exclusive access to one event's seat counters.
pub type EventGuard = KeyedGuard<EventId>;

/// Owns seat-counter mutation for all events.
pub struct SeatLedger {
    events: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<EventId>,
}

impl SeatLedger {
    /// Ledger over `events`
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            events,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// Wait for exclusive access to an event's counters.
    pub async fn lock(&self, event_id: EventId) -> EventGuard {
        self.locks.lock(event_id).await
    }

    /// Apply `available_seats += delta` if the result stays in bounds.
    ///
    /// Negative deltas reserve seats for a booking, positive deltas return
    /// them. Held seats cannot be reserved this way.
    ///
    /// # Errors
    ///
    /// [`EngineError::InsufficientCapacity`] when out of bounds (counters
    /// unchanged), [`EngineError::NotFound`] for unknown events.
    pub async fn adjust_seats(&self, guard: &EventGuard, delta: i64) -> Result<SeatCounts> {
        self.apply(guard, SeatAdjustment::seats(delta), "adjust").await
    }

    /// Set `quantity` available seats aside for a waitlist offer.
    ///
    /// # Errors
    ///
    /// [`EngineError::InsufficientCapacity`] when fewer unheld seats remain.
    pub async fn place_hold(&self, guard: &EventGuard, quantity: u32) -> Result<SeatCounts> {
        self.apply(guard, SeatAdjustment::hold(quantity), "hold").await
    }

    /// Return held seats to general availability.
    ///
    /// # Errors
    ///
    /// Fails if fewer than `quantity` seats are held.
    pub async fn release_hold(&self, guard: &EventGuard, quantity: u32) -> Result<SeatCounts> {
        self.apply(guard, SeatAdjustment::release_hold(quantity), "release").await
    }

    /// Turn held seats into a booking in one step.
    ///
    /// # Errors
    ///
    /// Fails if fewer than `quantity` seats are held.
    pub async fn consume_hold(&self, guard: &EventGuard, quantity: u32) -> Result<SeatCounts> {
        self.apply(guard, SeatAdjustment::consume_hold(quantity), "consume").await
    }

    /// Drop lock slots for events nobody is working on.
    pub async fn prune_idle_locks(&self) -> usize {
        let pruned = self.locks.prune().await;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned idle event locks");
        }
        pruned
    }

    async fn apply(
        &self,
        guard: &EventGuard,
        adjustment: SeatAdjustment,
        operation: &'static str,
    ) -> Result<SeatCounts> {
        let event_id = *guard.key();
        match self.events.adjust_seats(event_id, adjustment, self.clock.now()).await {
            Ok(counts) => {
                crate::metrics::record_ledger_adjustment(operation, "applied", Some(counts.held));
                tracing::debug!(
                    event_id = %event_id,
                    operation,
                    available = counts.available,
                    held = counts.held,
                    "Seat counters adjusted"
                );
                Ok(counts)
            },
            Err(error) => {
                crate::metrics::record_ledger_adjustment(operation, "rejected", None);
                let error = EngineError::from(error);
                tracing::debug!(event_id = %event_id, operation, error = %error, "Seat adjustment rejected");
                Err(error)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::repository::InMemoryDatabase;
    use crate::types::{Event, Money, UserId};
    use boxoffice_testing::test_clock;
    use chrono::Duration;

    async fn ledger_with_event(capacity: u32) -> (SeatLedger, Arc<InMemoryDatabase>, EventId) {
        let clock = Arc::new(test_clock());
        let now = clock.now();
        let db = Arc::new(InMemoryDatabase::new());
        let event = Event {
            id: EventId::new(),
            name: "Matinee".into(),
            description: String::new(),
            venue: "Studio".into(),
            event_time: now + Duration::days(1),
            total_capacity: capacity,
            available_seats: capacity,
            held_seats: 0,
            price: Money::from_dollars(10),
            created_by: UserId::new(),
            created_at: now,
            updated_at: now,
        };
        EventRepository::create(db.as_ref(), &event).await.unwrap();
        (SeatLedger::new(db.clone(), clock), db, event.id)
    }

    #[tokio::test]
    async fn adjustment_outside_bounds_leaves_state_unchanged() {
        let (ledger, db, event_id) = ledger_with_event(5).await;
        let guard = ledger.lock(event_id).await;

        ledger.adjust_seats(&guard, -5).await.unwrap();
        let err = ledger.adjust_seats(&guard, -1).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientCapacity {
                event_id,
                requested: 1,
                available: 0
            }
        );

        ledger.adjust_seats(&guard, 5).await.unwrap();
        assert!(ledger.adjust_seats(&guard, 1).await.is_err());
        let stored = EventRepository::get(db.as_ref(), event_id).await.unwrap().unwrap();
        assert_eq!(stored.available_seats, 5);
    }

    #[tokio::test]
    async fn held_seats_are_not_bookable() {
        let (ledger, _db, event_id) = ledger_with_event(4).await;
        let guard = ledger.lock(event_id).await;

        ledger.place_hold(&guard, 3).await.unwrap();
        assert!(ledger.adjust_seats(&guard, -2).await.is_err());
        let counts = ledger.adjust_seats(&guard, -1).await.unwrap();
        assert_eq!((counts.available, counts.held), (3, 3));

        let counts = ledger.consume_hold(&guard, 3).await.unwrap();
        assert_eq!((counts.available, counts.held, counts.bookable()), (0, 0, 0));
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let (ledger, _db, _) = ledger_with_event(1).await;
        let guard = ledger.lock(EventId::new()).await;

        let err = ledger.adjust_seats(&guard, -1).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let (ledger, _db, event_id) = ledger_with_event(1).await;
        drop(ledger.lock(event_id).await);

        assert_eq!(ledger.prune_idle_locks().await, 1);
    }
}
