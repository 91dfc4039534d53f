//! Booking lifecycle integration tests.
//!
//! Create, cancel, analytics and the notices sent along the way, driven
//! through the engine facade over the in-memory repositories.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use async_trait::async_trait;
use boxoffice_engine::repository::{EventRepository, InMemoryDatabase, RepositoryError};
use boxoffice_engine::types::{PageWindow, SeatAdjustment, SeatCounts};
use boxoffice_engine::{
    BookingStatus, EngineError, ErrorKind, Event, EventId, EventPopularity, Money, NotificationKind, Page,
    Repositories, UserId, WaitlistStatus,
};
use chrono::{DateTime, Utc};
use common::{ALL, Harness};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[tokio::test]
async fn test_booking_takes_seats_and_prices_tickets() {
    let harness = Harness::new();
    let event = harness.event(10).await;
    let user = UserId::new();

    let booking = harness.engine.create_booking(user, event.id, 3).await.unwrap();

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.quantity, 3);
    assert_eq!(booking.total_amount, Money::from_dollars(75));
    assert_eq!(harness.seats(&event).await, (7, 0));
    assert_eq!(harness.engine.get_booking(booking.id).await.unwrap(), booking);

    let notices = harness.engine.get_user_notifications(user, Page::default()).await.unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NotificationKind::BookingConfirmed);
    assert_eq!(notices[0].title, "Booking Confirmed");
    assert!(!notices[0].is_read);
}

#[tokio::test]
async fn test_request_validation() {
    let harness = Harness::new();
    let event = harness.event(10).await;
    let user = UserId::new();

    for quantity in [0, 11] {
        let error = harness.engine.create_booking(user, event.id, quantity).await.unwrap_err();
        assert!(matches!(error, EngineError::Validation(_)), "quantity {quantity}: {error}");
    }

    let error = harness
        .engine
        .create_booking(user, boxoffice_engine::EventId::new(), 1)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    assert_eq!(harness.seats(&event).await, (10, 0));
    assert!(harness.engine.get_user_bookings(user, ALL).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_past_events_cannot_be_booked_or_cancelled() {
    let harness = Harness::new();
    let event = harness.event(10).await;
    let user = UserId::new();
    let booking = harness.engine.create_booking(user, event.id, 2).await.unwrap();

    harness.clock.advance(chrono::Duration::days(8));

    let error = harness.engine.create_booking(user, event.id, 1).await.unwrap_err();
    assert!(matches!(error, EngineError::EventInPast { event_id } if event_id == event.id));
    assert_eq!(error.kind(), ErrorKind::Validation);

    let error = harness.engine.cancel_booking(booking.id, user).await.unwrap_err();
    assert!(matches!(error, EngineError::EventInPast { .. }));
    assert_eq!(harness.seats(&event).await, (8, 0));
}

#[tokio::test]
async fn test_double_cancel_restores_seats_once() {
    let harness = Harness::new();
    let event = harness.event(10).await;
    let user = UserId::new();
    let booking = harness.engine.create_booking(user, event.id, 4).await.unwrap();

    let cancelled = harness.engine.cancel_booking(booking.id, user).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(harness.seats(&event).await, (10, 0));

    let error = harness.engine.cancel_booking(booking.id, user).await.unwrap_err();
    assert_eq!(error, EngineError::AlreadyCancelled { booking_id: booking.id });
    assert_eq!(error.kind(), ErrorKind::Conflict);
    assert_eq!(harness.seats(&event).await, (10, 0));

    let kinds: Vec<_> = harness
        .engine
        .get_user_notifications(user, Page::default())
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(kinds.contains(&NotificationKind::BookingCancelled));
}

#[tokio::test]
async fn test_cancellation_that_cannot_be_stored_keeps_the_seats_sold() {
    let (harness, bookings) = Harness::with_flaky_bookings();
    let event = harness.event(10).await;
    let user = UserId::new();
    let booking = harness.engine.create_booking(user, event.id, 2).await.unwrap();

    bookings.refuse_updates(true);
    let error = harness.engine.cancel_booking(booking.id, user).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(
        harness.engine.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Confirmed
    );
    assert_eq!(harness.seats(&event).await, (8, 0));

    bookings.refuse_updates(false);
    harness.engine.cancel_booking(booking.id, user).await.unwrap();
    assert_eq!(harness.seats(&event).await, (10, 0));
}

#[tokio::test]
async fn test_only_the_owner_may_cancel() {
    let harness = Harness::new();
    let event = harness.event(10).await;
    let owner = UserId::new();
    let stranger = UserId::new();
    let booking = harness.engine.create_booking(owner, event.id, 2).await.unwrap();

    let error = harness.engine.cancel_booking(booking.id, stranger).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unauthorized);
    assert_eq!(harness.seats(&event).await, (8, 0));
    assert_eq!(
        harness.engine.get_booking(booking.id).await.unwrap().status,
        BookingStatus::Confirmed
    );
}

#[tokio::test]
async fn test_cancellation_offers_seats_to_the_waitlist() {
    let harness = Harness::new();
    let event = harness.event(2).await;
    let holder = UserId::new();
    let waiting = UserId::new();

    let booking = harness.engine.create_booking(holder, event.id, 2).await.unwrap();
    let entry = harness.engine.join_waitlist(waiting, event.id, 2).await.unwrap();

    harness.engine.cancel_booking(booking.id, holder).await.unwrap();

    let offered = harness.engine.get_waitlist_by_id(entry.id).await.unwrap();
    assert_eq!(offered.status, WaitlistStatus::Notified);
    assert_eq!(offered.notified_at, Some(harness.now()));
    assert_eq!(
        offered.expires_at,
        Some(harness.now() + chrono::Duration::minutes(30))
    );
    assert_eq!(harness.seats(&event).await, (2, 2));

    let notices = harness.engine.get_user_notifications(waiting, Page::default()).await.unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NotificationKind::WaitlistSpotAvailable);
    assert_eq!(
        notices[0].message,
        "A spot is now available for Spring Concert. You have 30 minutes to complete your booking for 2 ticket(s)."
    );
}

#[tokio::test]
async fn test_analytics_count_confirmed_revenue_only() {
    let harness = Harness::new();
    let event = harness.event(20).await;
    let alice = UserId::new();
    let bob = UserId::new();

    harness.engine.create_booking(alice, event.id, 2).await.unwrap();
    let cancelled = harness.engine.create_booking(bob, event.id, 3).await.unwrap();
    harness.engine.cancel_booking(cancelled.id, bob).await.unwrap();
    harness.engine.create_booking(bob, event.id, 1).await.unwrap();

    let analytics = harness.engine.get_booking_analytics(event.id).await.unwrap();
    assert_eq!(analytics.total_bookings, 3);
    assert_eq!(analytics.confirmed, 2);
    assert_eq!(analytics.cancelled, 1);
    assert_eq!(analytics.confirmed_revenue, Money::from_dollars(75));

    let overview = harness.engine.analytics_overview().await.unwrap();
    assert_eq!(overview.total_bookings, 2);
    assert_eq!(overview.most_popular[0].event_id, event.id);
    assert_eq!(overview.most_popular[0].seats_sold, 3);
    assert!((overview.most_popular[0].utilization_rate - 15.0).abs() < 1e-9);

    let utilization = harness.engine.event_utilization(event.id).await.unwrap();
    assert_eq!(utilization.confirmed_bookings, 2);
    assert_eq!(utilization.revenue, Money::from_dollars(75));
    assert_eq!(utilization.total_capacity, 20);

    let bookings = harness.engine.get_event_bookings(event.id, ALL).await.unwrap();
    assert_eq!(bookings.len(), 3);
    assert_eq!(harness.engine.get_user_bookings(bob, ALL).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_event_with_confirmed_bookings_cannot_be_deleted() {
    let harness = Harness::new();
    let event = harness.event(5).await;
    let user = UserId::new();
    let booking = harness.engine.create_booking(user, event.id, 1).await.unwrap();

    let error = harness.engine.delete_event(event.id).await.unwrap_err();
    assert!(matches!(error, EngineError::HasBookings { confirmed: 1, .. }));
    assert_eq!(error.kind(), ErrorKind::Conflict);

    harness.engine.cancel_booking(booking.id, user).await.unwrap();
    harness.engine.delete_event(event.id).await.unwrap();
    assert_eq!(harness.engine.get_event(event.id).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_notifications_can_be_marked_read() {
    let harness = Harness::new();
    let event = harness.event(5).await;
    let user = UserId::new();

    let first = harness.engine.create_booking(user, event.id, 1).await.unwrap();
    harness.engine.create_booking(user, event.id, 1).await.unwrap();
    harness.engine.cancel_booking(first.id, user).await.unwrap();
    assert_eq!(harness.engine.unread_notification_count(user).await.unwrap(), 3);

    let newest = harness.engine.get_user_notifications(user, Page::default()).await.unwrap()[0].id;
    harness.engine.mark_notification_read(newest).await.unwrap();
    assert_eq!(harness.engine.unread_notification_count(user).await.unwrap(), 2);

    assert_eq!(harness.engine.mark_all_notifications_read(user).await.unwrap(), 2);
    assert_eq!(harness.engine.unread_notification_count(user).await.unwrap(), 0);
}

/// Event store whose seat counters refuse every adjustment while switched on.
struct RejectingSeats {
    inner: Arc<InMemoryDatabase>,
    reject: AtomicBool,
}

#[async_trait]
impl EventRepository for RejectingSeats {
    async fn create(&self, event: &Event) -> Result<(), RepositoryError> {
        EventRepository::create(self.inner.as_ref(), event).await
    }

    async fn update(&self, event: &Event) -> Result<(), RepositoryError> {
        EventRepository::update(self.inner.as_ref(), event).await
    }

    async fn delete(&self, id: EventId) -> Result<(), RepositoryError> {
        EventRepository::delete(self.inner.as_ref(), id).await
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>, RepositoryError> {
        EventRepository::get(self.inner.as_ref(), id).await
    }

    async fn list_upcoming(&self, now: DateTime<Utc>, window: PageWindow) -> Result<Vec<Event>, RepositoryError> {
        self.inner.list_upcoming(now, window).await
    }

    async fn list_all(&self, window: PageWindow) -> Result<Vec<Event>, RepositoryError> {
        self.inner.list_all(window).await
    }

    async fn adjust_seats(
        &self,
        id: EventId,
        adjustment: SeatAdjustment,
        at: DateTime<Utc>,
    ) -> Result<SeatCounts, RepositoryError> {
        if self.reject.load(Ordering::SeqCst) {
            let counts = EventRepository::get(self.inner.as_ref(), id)
                .await?
                .map(|event| event.seat_counts())
                .unwrap();
            return Err(RepositoryError::OutOfBounds {
                event_id: id,
                counts,
                adjustment,
            });
        }
        self.inner.adjust_seats(id, adjustment, at).await
    }

    async fn most_popular(&self, limit: usize) -> Result<Vec<EventPopularity>, RepositoryError> {
        self.inner.most_popular(limit).await
    }
}

#[tokio::test]
async fn test_ledger_rejection_leaves_a_failed_booking() {
    let db = Arc::new(InMemoryDatabase::new());
    let events = Arc::new(RejectingSeats {
        inner: db.clone(),
        reject: AtomicBool::new(false),
    });
    let mut repos = Repositories::in_memory(&db);
    repos.events = events.clone();
    let harness = Harness::with_repositories(repos, db);
    let event = harness.event(5).await;
    let user = UserId::new();

    events.reject.store(true, Ordering::SeqCst);
    let error = harness.engine.create_booking(user, event.id, 2).await.unwrap_err();

    assert!(
        matches!(error, EngineError::InsufficientCapacity { requested: 2, available: 5, .. }),
        "{error}"
    );
    let stored = harness.engine.get_event_bookings(event.id, ALL).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, BookingStatus::Failed);
    assert_eq!(stored[0].user_id, user);
    assert_eq!(harness.seats(&event).await, (5, 0));

    // A failed booking cannot be cancelled back into seats.
    let error = harness.engine.cancel_booking(stored[0].id, user).await.unwrap_err();
    assert!(matches!(error, EngineError::InvalidState { .. }), "{error}");
}
