//! In-memory implementation of every repository trait.
//!
//! One [`InMemoryDatabase`] holds all four tables so cross-table queries
//! (popularity ranking) can join events with bookings. Each table sits behind
//! a `tokio::sync::RwLock`; seat adjustments take the events write lock, which
//! makes check-and-write a single step.

use super::{
    BookingRepository, EventRepository, NotificationRepository, RepositoryError, Result,
    WaitlistRepository,
};
use crate::error::Resource;
use crate::queue;
use crate::types::{
    Booking, BookingAnalytics, BookingId, BookingStatus, Event, EventId, EventPopularity, Money,
    Notification, NotificationId, PageWindow, SeatAdjustment, SeatCounts, UserId, WaitlistEntry,
    WaitlistId, WaitlistStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// All tables in memory.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    events: RwLock<HashMap<EventId, Event>>,
    bookings: RwLock<HashMap<BookingId, Booking>>,
    waitlist: RwLock<HashMap<WaitlistId, WaitlistEntry>>,
    notifications: RwLock<HashMap<NotificationId, Notification>>,
}

impl InMemoryDatabase {
    /// Empty database
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn duplicate(resource: Resource, id: impl ToString) -> RepositoryError {
    RepositoryError::Duplicate {
        resource,
        id: id.to_string(),
    }
}

fn missing(resource: Resource, id: impl ToString) -> RepositoryError {
    RepositoryError::NotFound {
        resource,
        id: id.to_string(),
    }
}

// ============================================================================
// Events
// ============================================================================

#[async_trait]
impl EventRepository for InMemoryDatabase {
    async fn create(&self, event: &Event) -> Result<()> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(duplicate(Resource::Event, event.id));
        }
        events.insert(event.id, event.clone());
        Ok(())
    }

    async fn update(&self, event: &Event) -> Result<()> {
        let mut events = self.events.write().await;
        let stored = events
            .get_mut(&event.id)
            .ok_or_else(|| missing(Resource::Event, event.id))?;

        stored.name.clone_from(&event.name);
        stored.description.clone_from(&event.description);
        stored.venue.clone_from(&event.venue);
        stored.event_time = event.event_time;
        stored.price = event.price;
        stored.updated_at = event.updated_at;
        Ok(())
    }

    async fn delete(&self, id: EventId) -> Result<()> {
        self.events
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing(Resource::Event, id))
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn list_upcoming(&self, now: DateTime<Utc>, window: PageWindow) -> Result<Vec<Event>> {
        let events = self.events.read().await;
        let mut upcoming: Vec<_> = events.values().filter(|e| e.event_time >= now).cloned().collect();
        upcoming.sort_by_key(|e| (e.event_time, e.id));
        Ok(window.apply(upcoming))
    }

    async fn list_all(&self, window: PageWindow) -> Result<Vec<Event>> {
        let events = self.events.read().await;
        let mut all: Vec<_> = events.values().cloned().collect();
        all.sort_by_key(|e| (Reverse(e.event_time), e.id));
        Ok(window.apply(all))
    }

    async fn adjust_seats(
        &self,
        id: EventId,
        adjustment: SeatAdjustment,
        at: DateTime<Utc>,
    ) -> Result<SeatCounts> {
        let mut events = self.events.write().await;
        let event = events.get_mut(&id).ok_or_else(|| missing(Resource::Event, id))?;

        let counts = event.seat_counts();
        let next = counts.apply(adjustment).ok_or(RepositoryError::OutOfBounds {
            event_id: id,
            counts,
            adjustment,
        })?;

        event.available_seats = next.available;
        event.held_seats = next.held;
        event.updated_at = at;
        Ok(next)
    }

    async fn most_popular(&self, limit: usize) -> Result<Vec<EventPopularity>> {
        let events = self.events.read().await;
        let bookings = self.bookings.read().await;

        let mut totals: HashMap<EventId, (u64, Money)> = HashMap::new();
        for booking in bookings.values().filter(|b| b.status == BookingStatus::Confirmed) {
            let entry = totals.entry(booking.event_id).or_insert((0, Money::ZERO));
            entry.0 += 1;
            entry.1 = entry.1.saturating_add(booking.total_amount);
        }

        let mut rows: Vec<EventPopularity> = events
            .values()
            .map(|event| {
                let (confirmed_bookings, revenue) =
                    totals.get(&event.id).copied().unwrap_or((0, Money::ZERO));
                let counts = event.seat_counts();
                EventPopularity {
                    event_id: event.id,
                    name: event.name.clone(),
                    confirmed_bookings,
                    revenue,
                    seats_sold: counts.sold(),
                    total_capacity: event.total_capacity,
                    utilization_rate: counts.utilization_rate(),
                }
            })
            .collect();

        rows.sort_by_key(|row| (Reverse(row.confirmed_bookings), Reverse(row.revenue), row.event_id));
        rows.truncate(limit);
        Ok(rows)
    }
}

// ============================================================================
// Bookings
// ============================================================================

#[async_trait]
impl BookingRepository for InMemoryDatabase {
    async fn create(&self, booking: &Booking) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(duplicate(Resource::Booking, booking.id));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update(&self, booking: &Booking) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get_mut(&booking.id)
            .ok_or_else(|| missing(Resource::Booking, booking.id))?;
        *stored = booking.clone();
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut rows: Vec<_> = bookings.values().filter(|b| b.user_id == user_id).cloned().collect();
        rows.sort_by_key(|b| (Reverse(b.booking_time), b.id));
        Ok(window.apply(rows))
    }

    async fn list_by_event(&self, event_id: EventId, window: PageWindow) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut rows: Vec<_> = bookings.values().filter(|b| b.event_id == event_id).cloned().collect();
        rows.sort_by_key(|b| (Reverse(b.booking_time), b.id));
        Ok(window.apply(rows))
    }

    async fn count_confirmed_by_event(&self, event_id: EventId) -> Result<u64> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| b.event_id == event_id && b.status == BookingStatus::Confirmed)
            .count() as u64)
    }

    async fn total_confirmed(&self) -> Result<u64> {
        let bookings = self.bookings.read().await;
        Ok(bookings.values().filter(|b| b.status == BookingStatus::Confirmed).count() as u64)
    }

    async fn analytics(&self, event_id: EventId) -> Result<BookingAnalytics> {
        let bookings = self.bookings.read().await;
        let mut analytics = BookingAnalytics {
            event_id,
            ..BookingAnalytics::default()
        };

        for booking in bookings.values().filter(|b| b.event_id == event_id) {
            analytics.total_bookings += 1;
            match booking.status {
                BookingStatus::Pending => analytics.pending += 1,
                BookingStatus::Confirmed => {
                    analytics.confirmed += 1;
                    analytics.confirmed_revenue =
                        analytics.confirmed_revenue.saturating_add(booking.total_amount);
                },
                BookingStatus::Cancelled => analytics.cancelled += 1,
                BookingStatus::Failed => analytics.failed += 1,
            }
        }
        Ok(analytics)
    }
}

// ============================================================================
// Waitlist
// ============================================================================

#[async_trait]
impl WaitlistRepository for InMemoryDatabase {
    async fn create(&self, entry: &WaitlistEntry) -> Result<()> {
        let mut waitlist = self.waitlist.write().await;
        if waitlist.contains_key(&entry.id) {
            return Err(duplicate(Resource::WaitlistEntry, entry.id));
        }
        waitlist.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &WaitlistEntry) -> Result<()> {
        let mut waitlist = self.waitlist.write().await;
        let stored = waitlist
            .get_mut(&entry.id)
            .ok_or_else(|| missing(Resource::WaitlistEntry, entry.id))?;
        *stored = entry.clone();
        Ok(())
    }

    async fn delete(&self, id: WaitlistId) -> Result<()> {
        self.waitlist
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing(Resource::WaitlistEntry, id))
    }

    async fn get(&self, id: WaitlistId) -> Result<Option<WaitlistEntry>> {
        Ok(self.waitlist.read().await.get(&id).cloned())
    }

    async fn find_open(&self, user_id: UserId, event_id: EventId) -> Result<Option<WaitlistEntry>> {
        let waitlist = self.waitlist.read().await;
        Ok(waitlist
            .values()
            .find(|e| e.user_id == user_id && e.event_id == event_id && e.status.is_open())
            .cloned())
    }

    async fn list_by_event(&self, event_id: EventId, window: PageWindow) -> Result<Vec<WaitlistEntry>> {
        let waitlist = self.waitlist.read().await;
        let mut rows: Vec<_> = waitlist.values().filter(|e| e.event_id == event_id).cloned().collect();
        queue::sort_queue(&mut rows);
        Ok(window.apply(rows))
    }

    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<WaitlistEntry>> {
        let waitlist = self.waitlist.read().await;
        let mut rows: Vec<_> = waitlist.values().filter(|e| e.user_id == user_id).cloned().collect();
        rows.sort_by_key(|e| (Reverse(e.joined_at), e.id));
        Ok(window.apply(rows))
    }

    async fn next_in_queue(&self, event_id: EventId, max_quantity: u32) -> Result<Vec<WaitlistEntry>> {
        let waitlist = self.waitlist.read().await;
        let mut rows: Vec<_> = waitlist
            .values()
            .filter(|e| {
                e.event_id == event_id
                    && e.status == WaitlistStatus::Active
                    && e.quantity <= max_quantity
            })
            .cloned()
            .collect();
        queue::sort_queue(&mut rows);
        Ok(rows)
    }

    async fn count_active(&self, event_id: EventId) -> Result<u64> {
        let waitlist = self.waitlist.read().await;
        Ok(waitlist
            .values()
            .filter(|e| e.event_id == event_id && e.status == WaitlistStatus::Active)
            .count() as u64)
    }

    async fn update_status(&self, id: WaitlistId, status: WaitlistStatus, at: DateTime<Utc>) -> Result<()> {
        let mut waitlist = self.waitlist.write().await;
        let entry = waitlist
            .get_mut(&id)
            .ok_or_else(|| missing(Resource::WaitlistEntry, id))?;
        entry.status = status;
        entry.updated_at = at;
        Ok(())
    }

    async fn lapsed_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>> {
        let waitlist = self.waitlist.read().await;
        let mut rows: Vec<_> = waitlist.values().filter(|e| e.offer_lapsed(now)).cloned().collect();
        rows.sort_by_key(|e| (e.event_id, e.expires_at, e.id));
        Ok(rows)
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[async_trait]
impl NotificationRepository for InMemoryDatabase {
    async fn create(&self, notification: &Notification) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        if notifications.contains_key(&notification.id) {
            return Err(duplicate(Resource::Notification, notification.id));
        }
        notifications.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut rows: Vec<_> = notifications.values().filter(|n| n.user_id == user_id).cloned().collect();
        rows.sort_by_key(|n| (Reverse(n.created_at), n.id));
        Ok(window.apply(rows))
    }

    async fn mark_as_read(&self, id: NotificationId, at: DateTime<Utc>) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or_else(|| missing(Resource::Notification, id))?;
        if !notification.is_read {
            notification.is_read = true;
            notification.updated_at = at;
        }
        Ok(())
    }

    async fn mark_all_as_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<u64> {
        let mut notifications = self.notifications.write().await;
        let mut changed = 0;
        for notification in notifications.values_mut().filter(|n| n.user_id == user_id && !n.is_read) {
            notification.is_read = true;
            notification.updated_at = at;
            changed += 1;
        }
        Ok(changed)
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        let notifications = self.notifications.read().await;
        Ok(notifications.values().filter(|n| n.user_id == user_id && !n.is_read).count() as u64)
    }
}
