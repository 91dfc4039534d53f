//! Booking aggregate.
//!
//! Pure lifecycle rules for one booking:
//!
//! ```text
//! Place ──► Pending ──Confirm──► Confirmed ──Cancel──► Cancelled
//!              │
//!              └──Fail──► Failed
//! ```
//!
//! Commands validate and, on success, produce an event that [`apply_event`]
//! folds into state. A rejected command records the error in
//! `last_error` and leaves the booking untouched. Persistence and seat
//! adjustments are the caller's job; the reducer returns no effects.
//!
//! [`apply_event`]: BookingReducer::apply_event

use crate::error::{EngineError, Resource};
use crate::types::{Booking, BookingId, BookingStatus, Event, UserId};
use boxoffice_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use chrono::{DateTime, Utc};
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// State of a single booking.
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// The booking, once placed
    pub booking: Option<Booking>,
    /// Error from the most recent rejected command
    pub last_error: Option<EngineError>,
}

impl BookingState {
    /// State wrapping a stored booking
    #[must_use]
    pub const fn from_booking(booking: Booking) -> Self {
        Self {
            booking: Some(booking),
            last_error: None,
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Option<BookingStatus> {
        self.booking.as_ref().map(|b| b.status)
    }

    /// Consume the outcome of the last command.
    ///
    /// # Errors
    ///
    /// Returns the error recorded by a rejected command.
    pub fn outcome(&mut self) -> Result<&Booking, EngineError> {
        if let Some(error) = self.last_error.take() {
            return Err(error);
        }
        self.booking
            .as_ref()
            .ok_or_else(|| EngineError::Validation("no booking in state".into()))
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Commands and events for the booking aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum BookingAction {
    // Commands
    /// Place a booking against a snapshot of the event
    Place {
        /// New booking ID
        booking_id: BookingId,
        /// Booking owner
        user_id: UserId,
        /// Event snapshot, read under the event lock
        event: Event,
        /// Tickets requested
        quantity: u32,
    },
    /// Mark a pending booking confirmed after the ledger accepted it
    Confirm,
    /// Mark a pending booking failed after the ledger rejected it
    Fail {
        /// Why the ledger rejected it
        reason: String,
    },
    /// Cancel on behalf of `user_id`
    Cancel {
        /// Acting user
        user_id: UserId,
        /// Event snapshot
        event: Event,
    },

    // Events
    /// Booking recorded as pending
    Placed {
        /// The new booking
        booking: Booking,
    },
    /// Booking confirmed
    Confirmed {
        /// When
        at: DateTime<Utc>,
    },
    /// Booking failed
    Failed {
        /// Why
        reason: String,
        /// When
        at: DateTime<Utc>,
    },
    /// Booking cancelled
    Cancelled {
        /// When
        at: DateTime<Utc>,
    },
    /// Command rejected
    Rejected {
        /// Why
        error: EngineError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the booking reducer.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Time source for timestamps and past-event checks
    pub clock: Arc<dyn Clock>,
    /// Largest allowed quantity
    pub max_quantity: u32,
}

impl BookingEnvironment {
    /// Environment with the given clock and limit
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, max_quantity: u32) -> Self {
        Self { clock, max_quantity }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Booking lifecycle reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Create a reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_place(
        state: &BookingState,
        event: &Event,
        quantity: u32,
        env: &BookingEnvironment,
    ) -> Result<(), EngineError> {
        if let Some(existing) = &state.booking {
            return Err(EngineError::invalid_state(
                Resource::Booking,
                existing.id,
                existing.status,
                "absent",
            ));
        }
        if event.is_past(env.clock.now()) {
            return Err(EngineError::EventInPast { event_id: event.id });
        }
        if quantity == 0 || quantity > env.max_quantity {
            return Err(EngineError::Validation(format!(
                "quantity must be between 1 and {}, got {quantity}",
                env.max_quantity
            )));
        }
        let bookable = event.seat_counts().bookable();
        if bookable < quantity {
            return Err(EngineError::InsufficientCapacity {
                event_id: event.id,
                requested: quantity,
                available: bookable,
            });
        }
        Ok(())
    }

    fn validate_pending(state: &BookingState, expected_transition: &str) -> Result<(), EngineError> {
        match &state.booking {
            Some(booking) if booking.status == BookingStatus::Pending => Ok(()),
            Some(booking) => Err(EngineError::invalid_state(
                Resource::Booking,
                booking.id,
                booking.status,
                expected_transition,
            )),
            None => Err(EngineError::Validation("no booking in state".into())),
        }
    }

    fn validate_cancel(
        state: &BookingState,
        user_id: UserId,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let Some(booking) = &state.booking else {
            return Err(EngineError::Validation("no booking in state".into()));
        };
        if booking.user_id != user_id {
            return Err(EngineError::Unauthorized {
                user_id,
                resource: Resource::Booking,
                id: booking.id.to_string(),
            });
        }
        match booking.status {
            BookingStatus::Confirmed => {},
            BookingStatus::Cancelled => {
                return Err(EngineError::AlreadyCancelled { booking_id: booking.id });
            },
            status @ (BookingStatus::Pending | BookingStatus::Failed) => {
                return Err(EngineError::invalid_state(
                    Resource::Booking,
                    booking.id,
                    status,
                    BookingStatus::Confirmed.as_str(),
                ));
            },
        }
        if event.is_past(now) {
            return Err(EngineError::EventInPast { event_id: event.id });
        }
        Ok(())
    }

    /// Fold an event into state.
    pub fn apply_event(state: &mut BookingState, action: &BookingAction) {
        match action {
            BookingAction::Placed { booking } => {
                state.booking = Some(booking.clone());
                state.last_error = None;
            },
            BookingAction::Confirmed { at } => {
                if let Some(booking) = &mut state.booking {
                    booking.status = BookingStatus::Confirmed;
                    booking.updated_at = *at;
                }
                state.last_error = None;
            },
            BookingAction::Failed { at, .. } => {
                if let Some(booking) = &mut state.booking {
                    booking.status = BookingStatus::Failed;
                    booking.updated_at = *at;
                }
                state.last_error = None;
            },
            BookingAction::Cancelled { at } => {
                if let Some(booking) = &mut state.booking {
                    booking.status = BookingStatus::Cancelled;
                    booking.cancelled_at = Some(*at);
                    booking.updated_at = *at;
                }
                state.last_error = None;
            },
            BookingAction::Rejected { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands are not events
            BookingAction::Place { .. }
            | BookingAction::Confirm
            | BookingAction::Fail { .. }
            | BookingAction::Cancel { .. } => {},
        }
    }

    fn reject(state: &mut BookingState, error: EngineError) -> SmallVec<[Effect<BookingAction>; 4]> {
        Self::apply_event(state, &BookingAction::Rejected { error });
        SmallVec::new()
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock.now();

        match action {
            // ========== Commands ==========
            BookingAction::Place {
                booking_id,
                user_id,
                event,
                quantity,
            } => {
                if let Err(error) = Self::validate_place(state, &event, quantity, env) {
                    return Self::reject(state, error);
                }
                let Some(total_amount) = event.price.checked_mul(quantity) else {
                    return Self::reject(
                        state,
                        EngineError::Validation("total amount overflows".into()),
                    );
                };

                let booking = Booking {
                    id: booking_id,
                    user_id,
                    event_id: event.id,
                    quantity,
                    total_amount,
                    status: BookingStatus::Pending,
                    booking_time: now,
                    cancelled_at: None,
                    updated_at: now,
                };
                Self::apply_event(state, &BookingAction::Placed { booking });
                SmallVec::new()
            },

            BookingAction::Confirm => {
                if let Err(error) = Self::validate_pending(state, "pending before confirmation") {
                    return Self::reject(state, error);
                }
                Self::apply_event(state, &BookingAction::Confirmed { at: now });
                SmallVec::new()
            },

            BookingAction::Fail { reason } => {
                if let Err(error) = Self::validate_pending(state, "pending before failure") {
                    return Self::reject(state, error);
                }
                Self::apply_event(state, &BookingAction::Failed { reason, at: now });
                SmallVec::new()
            },

            BookingAction::Cancel { user_id, event } => {
                if let Err(error) = Self::validate_cancel(state, user_id, &event, now) {
                    return Self::reject(state, error);
                }
                Self::apply_event(state, &BookingAction::Cancelled { at: now });
                SmallVec::new()
            },

            // ========== Events ==========
            event @ (BookingAction::Placed { .. }
            | BookingAction::Confirmed { .. }
            | BookingAction::Failed { .. }
            | BookingAction::Cancelled { .. }
            | BookingAction::Rejected { .. }) => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
