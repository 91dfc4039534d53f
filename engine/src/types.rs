//! Domain types for the allocation engine.
//!
//! Identifiers, money, the event/booking/waitlist/notification records, seat
//! counter value types, pagination and analytics rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Upper bound on tickets in one booking or waitlist request.
pub const MAX_TICKETS_PER_REQUEST: u32 = 10;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an event
    EventId
);
define_id!(
    /// Unique identifier for a user (issued by the auth collaborator)
    UserId
);
define_id!(
    /// Unique identifier for a booking
    BookingId
);
define_id!(
    /// Unique identifier for a waitlist entry
    WaitlistId
);
define_id!(
    /// Unique identifier for a notification
    NotificationId
);

// ============================================================================
// Money
// ============================================================================

/// Amount of money in cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero cents
    pub const ZERO: Self = Self(0);

    /// Creates money from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates money from whole dollars
    #[must_use]
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars * 100)
    }

    /// Amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Multiply by a ticket quantity, `None` on overflow
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Add two amounts, saturating at `u64::MAX` cents
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Seat counters
// ============================================================================

/// Snapshot of an event's seat counters.
///
/// Valid counters satisfy `held <= available <= total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatCounts {
    /// Fixed capacity
    pub total: u32,
    /// Seats not taken by a confirmed booking
    pub available: u32,
    /// Available seats set aside for outstanding waitlist offers
    pub held: u32,
}

impl SeatCounts {
    /// Seats a new booking may take right now
    #[must_use]
    pub const fn bookable(&self) -> u32 {
        self.available.saturating_sub(self.held)
    }

    /// Seats taken by confirmed bookings
    #[must_use]
    pub const fn sold(&self) -> u32 {
        self.total.saturating_sub(self.available)
    }

    /// Sold seats as a percentage of capacity
    #[must_use]
    pub fn utilization_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.sold()) / f64::from(self.total) * 100.0
        }
    }

    /// Whether the counters satisfy `held <= available <= total`
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.held <= self.available && self.available <= self.total
    }

    /// Apply an adjustment, or `None` if the result leaves the valid range.
    #[must_use]
    pub fn apply(&self, adjustment: SeatAdjustment) -> Option<Self> {
        let available = i64::from(self.available) + adjustment.available;
        let held = i64::from(self.held) + adjustment.held;

        let next = Self {
            total: self.total,
            available: u32::try_from(available).ok()?,
            held: u32::try_from(held).ok()?,
        };
        next.is_consistent().then_some(next)
    }
}

/// Signed change to an event's seat counters, applied atomically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAdjustment {
    /// Change to available seats (negative reserves, positive returns)
    pub available: i64,
    /// Change to held seats
    pub held: i64,
}

impl SeatAdjustment {
    /// Plain ledger adjustment of available seats
    #[must_use]
    pub const fn seats(delta: i64) -> Self {
        Self {
            available: delta,
            held: 0,
        }
    }

    /// Set `quantity` seats aside for an offer
    #[must_use]
    pub const fn hold(quantity: u32) -> Self {
        Self {
            available: 0,
            held: quantity as i64,
        }
    }

    /// Return held seats to general availability
    #[must_use]
    pub const fn release_hold(quantity: u32) -> Self {
        Self {
            available: 0,
            held: -(quantity as i64),
        }
    }

    /// Turn held seats into a confirmed booking
    #[must_use]
    pub const fn consume_hold(quantity: u32) -> Self {
        Self {
            available: -(quantity as i64),
            held: -(quantity as i64),
        }
    }

    /// Seats this adjustment asks for, used in capacity errors
    #[must_use]
    pub const fn requested(&self) -> u32 {
        let larger = if self.available.unsigned_abs() > self.held.unsigned_abs() {
            self.available.unsigned_abs()
        } else {
            self.held.unsigned_abs()
        };
        if larger > u32::MAX as u64 {
            u32::MAX
        } else {
            larger as u32
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// A ticketed event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Venue name
    pub venue: String,
    /// When the event starts
    pub event_time: DateTime<Utc>,
    /// Fixed capacity
    pub total_capacity: u32,
    /// Seats not taken by confirmed bookings
    pub available_seats: u32,
    /// Seats held for outstanding waitlist offers
    pub held_seats: u32,
    /// Price per ticket
    pub price: Money,
    /// Organizer who created the event
    pub created_by: UserId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Current seat counters
    #[must_use]
    pub const fn seat_counts(&self) -> SeatCounts {
        SeatCounts {
            total: self.total_capacity,
            available: self.available_seats,
            held: self.held_seats,
        }
    }

    /// Whether the event started before `now`
    #[must_use]
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.event_time < now
    }
}

/// Input for creating an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Venue name
    pub venue: String,
    /// When the event starts
    pub event_time: DateTime<Utc>,
    /// Fixed capacity
    pub total_capacity: u32,
    /// Price per ticket
    pub price: Money,
    /// Organizer
    pub created_by: UserId,
}

/// Editable event fields. Capacity is fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUpdate {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Venue name
    pub venue: String,
    /// When the event starts
    pub event_time: DateTime<Utc>,
    /// Price per ticket for future bookings
    pub price: Money,
}

// ============================================================================
// Bookings
// ============================================================================

/// Booking lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Recorded, ledger adjustment not yet applied
    Pending,
    /// Seats taken from the ledger
    Confirmed,
    /// Cancelled by the owner; seats returned
    Cancelled,
    /// Ledger adjustment failed; never held seats
    Failed,
}

impl BookingStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booking of one or more tickets for an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// Owner
    pub user_id: UserId,
    /// Booked event
    pub event_id: EventId,
    /// Number of tickets
    pub quantity: u32,
    /// `quantity × price` at booking time
    pub total_amount: Money,
    /// Lifecycle status
    pub status: BookingStatus,
    /// When the booking was placed
    pub booking_time: DateTime<Utc>,
    /// When the booking was cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Waitlist
// ============================================================================

/// Waitlist entry lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    /// Waiting in the queue
    Active,
    /// Offered seats; waiting for the user within the offer window
    Notified,
    /// Offer window lapsed
    Expired,
    /// Offer accepted
    Converted,
}

impl WaitlistStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Notified => "notified",
            Self::Expired => "expired",
            Self::Converted => "converted",
        }
    }

    /// Active and notified entries block the user from joining again.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Notified)
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's place in an event's waitlist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Entry ID
    pub id: WaitlistId,
    /// Waiting user
    pub user_id: UserId,
    /// Event waited on
    pub event_id: EventId,
    /// Tickets wanted
    pub quantity: u32,
    /// Higher goes first
    pub priority: i32,
    /// Lifecycle status
    pub status: WaitlistStatus,
    /// When the user joined
    pub joined_at: DateTime<Utc>,
    /// When an offer was made
    pub notified_at: Option<DateTime<Utc>>,
    /// When the offer lapses
    pub expires_at: Option<DateTime<Utc>>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    /// Whether this is an offer whose window closed before `now`
    #[must_use]
    pub fn offer_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == WaitlistStatus::Notified && self.expires_at.is_some_and(|at| at < now)
    }
}

/// Result of one redistribution pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRound {
    /// Event whose queue was served
    pub event_id: EventId,
    /// Seats the pass could offer
    pub budget: u32,
    /// Entries moved to `notified`, in queue order
    pub offered: Vec<WaitlistEntry>,
    /// Budget left after the pass
    pub remaining: u32,
}

// ============================================================================
// Notifications
// ============================================================================

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A waitlist offer was made
    WaitlistSpotAvailable,
    /// A booking was confirmed
    BookingConfirmed,
    /// A booking was cancelled
    BookingCancelled,
}

impl NotificationKind {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WaitlistSpotAvailable => "waitlist_spot_available",
            Self::BookingConfirmed => "booking_confirmed",
            Self::BookingCancelled => "booking_cancelled",
        }
    }
}

/// A user-facing notification record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID
    pub id: NotificationId,
    /// Recipient
    pub user_id: UserId,
    /// Related event
    pub event_id: Option<EventId>,
    /// Category
    pub kind: NotificationKind,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
    /// Read flag, the only mutable field
    pub is_read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Recipient
    pub user_id: UserId,
    /// Related event
    pub event_id: Option<EventId>,
    /// Category
    pub kind: NotificationKind,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
}

// ============================================================================
// Pagination
// ============================================================================

/// Caller-supplied pagination, possibly out of range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum rows; `<= 0` means "use the default"
    pub limit: i64,
    /// Rows to skip; `< 0` is treated as 0
    pub offset: i64,
}

impl Page {
    /// Explicit page
    #[must_use]
    pub const fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    /// Resolve against a default limit.
    #[must_use]
    pub fn window(self, default_limit: usize) -> PageWindow {
        PageWindow {
            limit: usize::try_from(self.limit)
                .ok()
                .filter(|limit| *limit > 0)
                .unwrap_or(default_limit),
            offset: usize::try_from(self.offset).unwrap_or(0),
        }
    }
}

/// Normalized pagination handed to repositories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    /// Maximum rows
    pub limit: usize,
    /// Rows to skip
    pub offset: usize,
}

impl PageWindow {
    /// Everything
    pub const ALL: Self = Self {
        limit: usize::MAX,
        offset: 0,
    };

    /// Slice an already ordered iterator
    pub fn apply<T>(self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

// ============================================================================
// Analytics
// ============================================================================

/// Booking totals for one event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingAnalytics {
    /// Event ID
    pub event_id: EventId,
    /// Bookings in any status
    pub total_bookings: u64,
    /// Confirmed bookings
    pub confirmed: u64,
    /// Cancelled bookings
    pub cancelled: u64,
    /// Pending bookings
    pub pending: u64,
    /// Failed bookings
    pub failed: u64,
    /// Revenue of confirmed bookings
    pub confirmed_revenue: Money,
}

/// Popularity row for one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPopularity {
    /// Event ID
    pub event_id: EventId,
    /// Event name
    pub name: String,
    /// Confirmed bookings
    pub confirmed_bookings: u64,
    /// Revenue of confirmed bookings
    pub revenue: Money,
    /// Seats taken by confirmed bookings
    pub seats_sold: u32,
    /// Fixed capacity
    pub total_capacity: u32,
    /// `seats_sold / total_capacity` as a percentage
    pub utilization_rate: f64,
}
