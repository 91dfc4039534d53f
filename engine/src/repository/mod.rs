//! Persistence contracts.
//!
//! The engine reads and writes records only through these traits. A SQL
//! implementation lives with the deployment; [`memory::InMemoryDatabase`]
//! implements every trait for tests, the demo binary and embedding.
//!
//! Getters return `Ok(None)` for missing records. Mutations of missing records
//! return [`RepositoryError::NotFound`].

use crate::error::Resource;
use crate::types::{
    Booking, BookingAnalytics, BookingId, Event, EventId, EventPopularity, Notification,
    NotificationId, PageWindow, SeatAdjustment, SeatCounts, UserId, WaitlistEntry, WaitlistId,
    WaitlistStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryDatabase;

/// Result alias for repository calls
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Repository failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Record to mutate does not exist
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Record type
        resource: Resource,
        /// Record ID
        id: String,
    },

    /// Record with this ID already exists
    #[error("{resource} already exists: {id}")]
    Duplicate {
        /// Record type
        resource: Resource,
        /// Record ID
        id: String,
    },

    /// Conditional seat update rejected; counters unchanged
    #[error("seat adjustment {adjustment:?} out of bounds for event {event_id} ({counts:?})")]
    OutOfBounds {
        /// Event ID
        event_id: EventId,
        /// Counters at the time of the attempt
        counts: SeatCounts,
        /// Rejected adjustment
        adjustment: SeatAdjustment,
    },

    /// Backend could not be reached or failed
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Event records and their seat counters.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert a new event
    async fn create(&self, event: &Event) -> Result<()>;

    /// Overwrite descriptive fields (name, description, venue, time, price).
    ///
    /// Seat counters are left untouched; they change only through
    /// [`EventRepository::adjust_seats`].
    async fn update(&self, event: &Event) -> Result<()>;

    /// Remove an event
    async fn delete(&self, id: EventId) -> Result<()>;

    /// Fetch one event
    async fn get(&self, id: EventId) -> Result<Option<Event>>;

    /// Events starting at or after `now`, soonest first
    async fn list_upcoming(&self, now: DateTime<Utc>, window: PageWindow) -> Result<Vec<Event>>;

    /// All events, latest first
    async fn list_all(&self, window: PageWindow) -> Result<Vec<Event>>;

    /// Apply `adjustment` to the seat counters if the result keeps
    /// `held <= available <= total`; otherwise fail with
    /// [`RepositoryError::OutOfBounds`] and change nothing.
    ///
    /// The check and the write are one atomic step.
    async fn adjust_seats(
        &self,
        id: EventId,
        adjustment: SeatAdjustment,
        at: DateTime<Utc>,
    ) -> Result<SeatCounts>;

    /// Events ranked by confirmed bookings, then revenue
    async fn most_popular(&self, limit: usize) -> Result<Vec<EventPopularity>>;
}

/// Booking records.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert a new booking
    async fn create(&self, booking: &Booking) -> Result<()>;

    /// Overwrite an existing booking
    async fn update(&self, booking: &Booking) -> Result<()>;

    /// Fetch one booking
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;

    /// A user's bookings, newest first
    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<Booking>>;

    /// An event's bookings, newest first
    async fn list_by_event(&self, event_id: EventId, window: PageWindow) -> Result<Vec<Booking>>;

    /// Confirmed bookings for an event
    async fn count_confirmed_by_event(&self, event_id: EventId) -> Result<u64>;

    /// Confirmed bookings across all events
    async fn total_confirmed(&self) -> Result<u64>;

    /// Status counts and revenue for an event
    async fn analytics(&self, event_id: EventId) -> Result<BookingAnalytics>;
}

/// Waitlist entries.
///
/// Queue order is priority descending, then `joined_at` ascending, then ID.
#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    /// Insert a new entry
    async fn create(&self, entry: &WaitlistEntry) -> Result<()>;

    /// Overwrite an existing entry
    async fn update(&self, entry: &WaitlistEntry) -> Result<()>;

    /// Remove an entry
    async fn delete(&self, id: WaitlistId) -> Result<()>;

    /// Fetch one entry
    async fn get(&self, id: WaitlistId) -> Result<Option<WaitlistEntry>>;

    /// The user's active or notified entry for an event
    async fn find_open(&self, user_id: UserId, event_id: EventId) -> Result<Option<WaitlistEntry>>;

    /// An event's entries in any status, in queue order
    async fn list_by_event(&self, event_id: EventId, window: PageWindow) -> Result<Vec<WaitlistEntry>>;

    /// A user's entries, most recently joined first
    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<WaitlistEntry>>;

    /// Active entries wanting at most `max_quantity` seats, in queue order
    async fn next_in_queue(&self, event_id: EventId, max_quantity: u32) -> Result<Vec<WaitlistEntry>>;

    /// Active entries for an event
    async fn count_active(&self, event_id: EventId) -> Result<u64>;

    /// Set status and `updated_at` without touching other fields
    async fn update_status(&self, id: WaitlistId, status: WaitlistStatus, at: DateTime<Utc>) -> Result<()>;

    /// Notified entries whose `expires_at` is before `now`
    async fn lapsed_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>>;
}

/// Notification records.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a new notification
    async fn create(&self, notification: &Notification) -> Result<()>;

    /// A user's notifications, newest first
    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<Notification>>;

    /// Flag one notification as read
    async fn mark_as_read(&self, id: NotificationId, at: DateTime<Utc>) -> Result<()>;

    /// Flag all of a user's notifications as read; returns how many changed
    async fn mark_all_as_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<u64>;

    /// Unread notifications for a user
    async fn unread_count(&self, user_id: UserId) -> Result<u64>;
}
