//! Waitlist lifecycle integration tests.
//!
//! Queue order, first-fit redistribution, and the notify → expire → convert
//! lifecycle of an offer together with the seat hold behind it.
//!
//! Run with: `cargo test --test waitlist_lifecycle_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use async_trait::async_trait;
use boxoffice_engine::repository::{
    InMemoryDatabase, NotificationRepository, RepositoryError, WaitlistRepository,
};
use boxoffice_engine::types::PageWindow;
use boxoffice_engine::{
    BookingStatus, EngineError, ErrorKind, Event, Notification, NotificationId, Repositories, UserId,
    WaitlistEntry, WaitlistId, WaitlistStatus,
};
use chrono::{DateTime, Utc};
use common::{ALL, Harness};
use std::sync::Arc;

/// Sell out `capacity - bookable` seats so the rest stay open.
async fn event_with_bookable(harness: &Harness, capacity: u32, bookable: u32) -> Event {
    let event = harness.event(capacity).await;
    if capacity > bookable {
        harness
            .engine
            .create_booking(UserId::new(), event.id, capacity - bookable)
            .await
            .unwrap();
    }
    event
}

async fn join(harness: &Harness, event: &Event, quantity: u32) -> WaitlistEntry {
    harness.tick();
    harness.engine.join_waitlist(UserId::new(), event.id, quantity).await.unwrap()
}

async fn status_of(harness: &Harness, id: WaitlistId) -> WaitlistStatus {
    harness.engine.get_waitlist_by_id(id).await.unwrap().status
}

/// Sold-out event with one user offered `quantity` seats.
async fn offered(harness: &Harness, quantity: u32) -> (Event, WaitlistEntry) {
    let event = event_with_bookable(harness, 5, quantity).await;
    let entry = join(harness, &event, quantity).await;
    let round = harness
        .engine
        .process_waitlist_notifications(event.id, quantity)
        .await
        .unwrap();
    assert_eq!(round.offered.len(), 1);
    (event, round.offered[0].clone())
}

// ============================================================================
// Joining and ordering
// ============================================================================

#[tokio::test]
async fn test_queue_orders_by_priority_then_join_time() {
    let harness = Harness::new();
    let event = harness.event(5).await;
    let start = harness.now();

    let entry = |user: UserId, priority: i32, offset: i64| WaitlistEntry {
        id: WaitlistId::new(),
        user_id: user,
        event_id: event.id,
        quantity: 1,
        priority,
        status: WaitlistStatus::Active,
        joined_at: start + chrono::Duration::seconds(offset),
        notified_at: None,
        expires_at: None,
        updated_at: start,
    };
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
    for row in [entry(a, 0, 0), entry(b, 1, 1), entry(c, 0, 2)] {
        WaitlistRepository::create(harness.db.as_ref(), &row).await.unwrap();
    }

    let order: Vec<_> = harness
        .engine
        .get_event_waitlist(event.id, ALL)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.user_id)
        .collect();
    assert_eq!(order, vec![b, a, c]);

    assert_eq!(harness.engine.get_waitlist_position(b, event.id).await.unwrap(), 1);
    assert_eq!(harness.engine.get_waitlist_position(a, event.id).await.unwrap(), 2);
    assert_eq!(harness.engine.get_waitlist_position(c, event.id).await.unwrap(), 3);
    assert_eq!(harness.engine.waitlist_length(event.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_join_rules() {
    let harness = Harness::new();
    let event = harness.event(5).await;
    let user = UserId::new();

    let entry = harness.engine.join_waitlist(user, event.id, 2).await.unwrap();
    assert_eq!(entry.status, WaitlistStatus::Active);
    assert_eq!(entry.priority, 0);
    assert_eq!(entry.joined_at, harness.now());

    let error = harness.engine.join_waitlist(user, event.id, 1).await.unwrap_err();
    assert_eq!(error, EngineError::AlreadyWaitlisted { user_id: user, event_id: event.id });

    for quantity in [0, 11] {
        let error = harness.engine.join_waitlist(UserId::new(), event.id, quantity).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    let error = harness
        .engine
        .join_waitlist(user, boxoffice_engine::EventId::new(), 1)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    harness.clock.advance(chrono::Duration::days(8));
    let error = harness.engine.join_waitlist(UserId::new(), event.id, 1).await.unwrap_err();
    assert!(matches!(error, EngineError::EventInPast { .. }));
}

#[tokio::test]
async fn test_position_requires_an_active_entry() {
    let harness = Harness::new();
    let event = harness.event(5).await;
    let user = UserId::new();

    let error = harness.engine.get_waitlist_position(user, event.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    let error = harness.engine.leave_waitlist(user, event.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    harness.engine.join_waitlist(user, event.id, 1).await.unwrap();
    harness.engine.leave_waitlist(user, event.id).await.unwrap();
    assert_eq!(harness.engine.waitlist_length(event.id).await.unwrap(), 0);
    assert!(harness.engine.get_user_waitlist(user, ALL).await.unwrap().is_empty());
}

// ============================================================================
// Redistribution
// ============================================================================

#[tokio::test]
async fn test_first_fit_skips_entries_that_do_not_fit() {
    let harness = Harness::new();
    let event = event_with_bookable(&harness, 10, 3).await;
    let four = join(&harness, &event, 4).await;
    let two = join(&harness, &event, 2).await;
    let three = join(&harness, &event, 3).await;

    let round = harness.engine.process_waitlist_notifications(event.id, 3).await.unwrap();

    assert_eq!(round.budget, 3);
    assert_eq!(round.remaining, 1);
    assert_eq!(round.offered.iter().map(|e| e.id).collect::<Vec<_>>(), vec![two.id]);
    assert_eq!(status_of(&harness, four.id).await, WaitlistStatus::Active);
    assert_eq!(status_of(&harness, two.id).await, WaitlistStatus::Notified);
    assert_eq!(status_of(&harness, three.id).await, WaitlistStatus::Active);
    assert_eq!(harness.seats(&event).await, (3, 2));
}

#[tokio::test]
async fn test_budget_is_capped_by_unheld_seats() {
    let harness = Harness::new();
    let event = event_with_bookable(&harness, 10, 2).await;
    let first = join(&harness, &event, 2).await;
    let second = join(&harness, &event, 1).await;

    let round = harness.engine.process_waitlist_notifications(event.id, 8).await.unwrap();

    assert_eq!(round.budget, 2);
    assert_eq!(round.offered.len(), 1);
    assert_eq!(round.offered[0].id, first.id);
    assert_eq!(status_of(&harness, second.id).await, WaitlistStatus::Active);

    // Everything is held now, so a second pass has nothing to give.
    let round = harness.engine.process_waitlist_notifications(event.id, 1).await.unwrap();
    assert_eq!(round.budget, 0);
    assert!(round.offered.is_empty());
}

#[tokio::test]
async fn test_unknown_event_redistribution_is_not_found() {
    let harness = Harness::new();
    let error = harness
        .engine
        .process_waitlist_notifications(boxoffice_engine::EventId::new(), 1)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

/// Notification store that refuses to record anything for one user.
struct RefusingNotifications {
    inner: Arc<InMemoryDatabase>,
    refused: UserId,
}

#[async_trait]
impl NotificationRepository for RefusingNotifications {
    async fn create(&self, notification: &Notification) -> Result<(), RepositoryError> {
        if notification.user_id == self.refused {
            return Err(RepositoryError::Unavailable("notification store offline".to_string()));
        }
        NotificationRepository::create(self.inner.as_ref(), notification).await
    }

    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<Notification>, RepositoryError> {
        NotificationRepository::list_by_user(self.inner.as_ref(), user_id, window).await
    }

    async fn mark_as_read(&self, id: NotificationId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.inner.mark_as_read(id, at).await
    }

    async fn mark_all_as_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.inner.mark_all_as_read(user_id, at).await
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        self.inner.unread_count(user_id).await
    }
}

#[tokio::test]
async fn test_failed_notification_releases_hold_and_pass_continues() {
    let db = Arc::new(InMemoryDatabase::new());
    let unreachable = UserId::new();
    let mut repos = Repositories::in_memory(&db);
    repos.notifications = Arc::new(RefusingNotifications {
        inner: db.clone(),
        refused: unreachable,
    });
    let harness = Harness::with_repositories(repos, db);

    let event = event_with_bookable(&harness, 5, 2).await;
    harness.tick();
    let skipped = harness.engine.join_waitlist(unreachable, event.id, 1).await.unwrap();
    let reached = join(&harness, &event, 1).await;

    let round = harness.engine.process_waitlist_notifications(event.id, 2).await.unwrap();

    assert_eq!(round.offered.iter().map(|e| e.id).collect::<Vec<_>>(), vec![reached.id]);
    assert_eq!(round.remaining, 1);
    assert_eq!(status_of(&harness, skipped.id).await, WaitlistStatus::Active);
    assert_eq!(harness.seats(&event).await, (2, 1));
}

// ============================================================================
// Offers and holds
// ============================================================================

#[tokio::test]
async fn test_held_seats_cannot_be_booked_by_others() {
    let harness = Harness::new();
    let (event, _offer) = offered(&harness, 2).await;
    assert_eq!(harness.seats(&event).await, (2, 2));

    let error = harness.engine.create_booking(UserId::new(), event.id, 1).await.unwrap_err();
    assert!(matches!(error, EngineError::InsufficientCapacity { available: 0, .. }));
    assert_eq!(harness.seats(&event).await, (2, 2));
}

#[tokio::test]
async fn test_claim_consumes_the_hold() {
    let harness = Harness::new();
    let (event, offer) = offered(&harness, 2).await;

    let booking = harness.engine.claim_offer(offer.id, offer.user_id).await.unwrap();

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.quantity, 2);
    assert_eq!(booking.user_id, offer.user_id);
    assert_eq!(status_of(&harness, offer.id).await, WaitlistStatus::Converted);
    assert_eq!(harness.seats(&event).await, (0, 0));
}

#[tokio::test]
async fn test_claim_that_cannot_be_stored_keeps_the_offer_open() {
    let (harness, bookings) = Harness::with_flaky_bookings();
    let (event, offer) = offered(&harness, 2).await;

    bookings.refuse_creates(true);
    let error = harness.engine.claim_offer(offer.id, offer.user_id).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(status_of(&harness, offer.id).await, WaitlistStatus::Notified);
    assert_eq!(harness.seats(&event).await, (2, 2));

    bookings.refuse_creates(false);
    let booking = harness.engine.claim_offer(offer.id, offer.user_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(harness.seats(&event).await, (0, 0));
}

#[tokio::test]
async fn test_failed_claim_still_lapses_and_frees_its_seats() {
    let (harness, bookings) = Harness::with_flaky_bookings();
    let (event, offer) = offered(&harness, 2).await;

    bookings.refuse_creates(true);
    harness.engine.claim_offer(offer.id, offer.user_id).await.unwrap_err();

    harness.clock.advance(chrono::Duration::minutes(31));
    let expired = harness.engine.cleanup_expired_waitlist().await.unwrap();
    assert_eq!(expired.iter().map(|e| e.id).collect::<Vec<_>>(), vec![offer.id]);
    assert_eq!(harness.seats(&event).await, (2, 0));

    bookings.refuse_creates(false);
    harness.engine.create_booking(UserId::new(), event.id, 1).await.unwrap();
    assert_eq!(harness.seats(&event).await, (1, 0));
}

#[tokio::test]
async fn test_claim_by_another_user_is_unauthorized() {
    let harness = Harness::new();
    let (event, offer) = offered(&harness, 2).await;

    let error = harness.engine.claim_offer(offer.id, UserId::new()).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Unauthorized);
    assert_eq!(status_of(&harness, offer.id).await, WaitlistStatus::Notified);
    assert_eq!(harness.seats(&event).await, (2, 2));
}

#[tokio::test]
async fn test_convert_releases_the_hold_for_a_follow_up_booking() {
    let harness = Harness::new();
    let (event, offer) = offered(&harness, 2).await;

    let converted = harness.engine.convert_waitlist_to_booking(offer.id).await.unwrap();
    assert_eq!(converted.status, WaitlistStatus::Converted);
    assert_eq!(harness.seats(&event).await, (2, 0));

    let booking = harness.engine.create_booking(offer.user_id, event.id, 2).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(harness.seats(&event).await, (0, 0));
}

#[tokio::test]
async fn test_convert_requires_an_offer() {
    let harness = Harness::new();
    let event = harness.event(5).await;
    let entry = join(&harness, &event, 1).await;

    let error = harness.engine.convert_waitlist_to_booking(entry.id).await.unwrap_err();
    assert!(matches!(error, EngineError::InvalidState { .. }));

    let error = harness
        .engine
        .convert_waitlist_to_booking(WaitlistId::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_leaving_with_an_offer_releases_the_hold() {
    let harness = Harness::new();
    let (event, offer) = offered(&harness, 2).await;

    harness.engine.leave_waitlist(offer.user_id, event.id).await.unwrap();

    assert_eq!(harness.seats(&event).await, (2, 0));
    let error = harness.engine.get_waitlist_by_id(offer.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn test_lapsed_offer_cannot_be_converted_and_is_cleaned_up() {
    let harness = Harness::new();
    let (event, offer) = offered(&harness, 2).await;
    let expires_at = offer.expires_at.unwrap();

    harness.clock.set(expires_at + chrono::Duration::seconds(1));

    let error = harness.engine.convert_waitlist_to_booking(offer.id).await.unwrap_err();
    assert_eq!(
        error,
        EngineError::Expired {
            waitlist_id: offer.id,
            expired_at: expires_at,
        }
    );
    assert_eq!(error.kind(), ErrorKind::Expired);

    let error = harness.engine.claim_offer(offer.id, offer.user_id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Expired);
    assert_eq!(status_of(&harness, offer.id).await, WaitlistStatus::Notified);

    let expired = harness.engine.cleanup_expired_waitlist().await.unwrap();
    assert_eq!(expired.iter().map(|e| e.id).collect::<Vec<_>>(), vec![offer.id]);
    assert_eq!(status_of(&harness, offer.id).await, WaitlistStatus::Expired);
    assert_eq!(harness.seats(&event).await, (2, 0));

    // Expired entries no longer block the user from joining again.
    harness.engine.join_waitlist(offer.user_id, event.id, 1).await.unwrap();
}

#[tokio::test]
async fn test_cleanup_leaves_open_offers_alone() {
    let harness = Harness::new();
    let (event, offer) = offered(&harness, 1).await;

    harness.clock.advance(chrono::Duration::minutes(29));
    assert!(harness.engine.cleanup_expired_waitlist().await.unwrap().is_empty());
    assert_eq!(status_of(&harness, offer.id).await, WaitlistStatus::Notified);
    assert_eq!(harness.seats(&event).await, (1, 1));

    harness.engine.claim_offer(offer.id, offer.user_id).await.unwrap();
    assert_eq!(harness.seats(&event).await, (0, 0));
}
