//! Error types for the allocation engine.
//!
//! [`EngineError`] is what every public operation returns. [`ErrorKind`]
//! collapses it into the coarse taxonomy a calling layer maps onto its own
//! protocol (HTTP status codes, RPC codes).

use crate::repository::RepositoryError;
use crate::types::{BookingId, EventId, UserId, WaitlistId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Record types referenced by errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// An event
    Event,
    /// A booking
    Booking,
    /// A waitlist entry
    WaitlistEntry,
    /// A notification
    Notification,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Event => "event",
            Self::Booking => "booking",
            Self::WaitlistEntry => "waitlist entry",
            Self::Notification => "notification",
        })
    }
}

/// Coarse error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced record does not exist
    NotFound,
    /// Input or timing rule violated
    Validation,
    /// Acting user does not own the record
    Unauthorized,
    /// Request conflicts with current state
    Conflict,
    /// Offer window elapsed
    Expired,
    /// Persistence failure
    Internal,
}

/// Errors returned by engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ========================================================================
    // Lookup
    // ========================================================================
    /// Record not found
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Record type
        resource: Resource,
        /// Record ID
        id: String,
    },

    // ========================================================================
    // Validation
    // ========================================================================
    /// Invalid input
    #[error("validation failed: {0}")]
    Validation(String),

    /// The event already started
    #[error("event {event_id} has already taken place")]
    EventInPast {
        /// Event ID
        event_id: EventId,
    },

    // ========================================================================
    // Authorization
    // ========================================================================
    /// Acting user does not own the record
    #[error("user {user_id} does not own {resource} {id}")]
    Unauthorized {
        /// Acting user
        user_id: UserId,
        /// Record type
        resource: Resource,
        /// Record ID
        id: String,
    },

    // ========================================================================
    // Conflicts
    // ========================================================================
    /// Not enough bookable seats
    #[error("insufficient capacity for event {event_id}: requested {requested}, available {available}")]
    InsufficientCapacity {
        /// Event ID
        event_id: EventId,
        /// Seats requested
        requested: u32,
        /// Seats that could be taken
        available: u32,
    },

    /// Booking already cancelled
    #[error("booking {booking_id} is already cancelled")]
    AlreadyCancelled {
        /// Booking ID
        booking_id: BookingId,
    },

    /// User already has an open waitlist entry for the event
    #[error("user {user_id} is already on the waitlist for event {event_id}")]
    AlreadyWaitlisted {
        /// User ID
        user_id: UserId,
        /// Event ID
        event_id: EventId,
    },

    /// Record is not in the status the operation requires
    #[error("{resource} {id} is {status}, expected {expected}")]
    InvalidState {
        /// Record type
        resource: Resource,
        /// Record ID
        id: String,
        /// Current status
        status: String,
        /// Required status
        expected: String,
    },

    /// Event still has confirmed bookings
    #[error("event {event_id} has {confirmed} confirmed bookings")]
    HasBookings {
        /// Event ID
        event_id: EventId,
        /// Confirmed bookings
        confirmed: u64,
    },

    // ========================================================================
    // Expiry
    // ========================================================================
    /// Waitlist offer window elapsed
    #[error("waitlist offer {waitlist_id} expired at {expired_at}")]
    Expired {
        /// Waitlist entry ID
        waitlist_id: WaitlistId,
        /// When the window closed
        expired_at: DateTime<Utc>,
    },

    // ========================================================================
    // Persistence
    // ========================================================================
    /// Repository failure
    #[error("repository error: {0}")]
    Repository(#[source] RepositoryError),
}

impl EngineError {
    /// Taxonomy bucket for this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) | Self::EventInPast { .. } => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InsufficientCapacity { .. }
            | Self::AlreadyCancelled { .. }
            | Self::AlreadyWaitlisted { .. }
            | Self::InvalidState { .. }
            | Self::HasBookings { .. } => ErrorKind::Conflict,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::Repository(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for [`EngineError::NotFound`]
    pub fn not_found(resource: Resource, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`EngineError::InvalidState`]
    pub fn invalid_state(
        resource: Resource,
        id: impl fmt::Display,
        status: impl fmt::Display,
        expected: &str,
    ) -> Self {
        Self::InvalidState {
            resource,
            id: id.to_string(),
            status: status.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { resource, id } => Self::NotFound { resource, id },
            RepositoryError::OutOfBounds {
                event_id,
                counts,
                adjustment,
            } => Self::InsufficientCapacity {
                event_id,
                requested: adjustment.requested(),
                available: counts.bookable(),
            },
            other => Self::Repository(other),
        }
    }
}
