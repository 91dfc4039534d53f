//! Waitlist entry aggregate.
//!
//! ```text
//! Join ──► Active ──Offer──► Notified ──Convert──► Converted
//!                               │
//!                               └──Expire──► Expired
//! ```

use crate::error::{EngineError, Resource};
use crate::types::{Event, UserId, WaitlistEntry, WaitlistId, WaitlistStatus};
use boxoffice_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// State of a single waitlist entry.
#[derive(Clone, Debug, Default)]
pub struct WaitlistState {
    /// The entry, once joined
    pub entry: Option<WaitlistEntry>,
    /// Error from the most recent rejected command
    pub last_error: Option<EngineError>,
}

impl WaitlistState {
    /// State wrapping a stored entry
    #[must_use]
    pub const fn from_entry(entry: WaitlistEntry) -> Self {
        Self {
            entry: Some(entry),
            last_error: None,
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Option<WaitlistStatus> {
        self.entry.as_ref().map(|e| e.status)
    }

    /// Consume the outcome of the last command.
    ///
    /// # Errors
    ///
    /// Returns the error recorded by a rejected command.
    pub fn outcome(&mut self) -> Result<&WaitlistEntry, EngineError> {
        if let Some(error) = self.last_error.take() {
            return Err(error);
        }
        self.entry
            .as_ref()
            .ok_or_else(|| EngineError::Validation("no waitlist entry in state".into()))
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Commands and events for the waitlist aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum WaitlistAction {
    // Commands
    /// Join an event's queue
    Join {
        /// New entry ID
        waitlist_id: WaitlistId,
        /// Joining user
        user_id: UserId,
        /// Event snapshot
        event: Event,
        /// Tickets wanted
        quantity: u32,
        /// Queue priority
        priority: i32,
        /// The user already has an open entry for this event
        already_waitlisted: bool,
    },
    /// Offer seats for `window`
    Offer {
        /// How long the offer stays open
        window: Duration,
    },
    /// Accept the offer
    Convert,
    /// Close a lapsed offer
    Expire,

    // Events
    /// Entry created
    Joined {
        /// The new entry
        entry: WaitlistEntry,
    },
    /// Offer made
    Offered {
        /// When
        at: DateTime<Utc>,
        /// When the offer lapses
        expires_at: DateTime<Utc>,
    },
    /// Offer accepted
    Converted {
        /// When
        at: DateTime<Utc>,
    },
    /// Offer lapsed
    Expired {
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

/// Dependencies of the waitlist reducer.
#[derive(Clone)]
pub struct WaitlistEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Largest allowed quantity
    pub max_quantity: u32,
}

impl WaitlistEnvironment {
    /// Environment with the given clock and limit
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, max_quantity: u32) -> Self {
        Self { clock, max_quantity }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Waitlist entry lifecycle reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitlistReducer;

impl WaitlistReducer {
    /// Create a reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_join(
        state: &WaitlistState,
        user_id: UserId,
        event: &Event,
        quantity: u32,
        already_waitlisted: bool,
        env: &WaitlistEnvironment,
    ) -> Result<(), EngineError> {
        if state.entry.is_some() {
            return Err(EngineError::Validation("waitlist entry already exists".into()));
        }
        if quantity == 0 || quantity > env.max_quantity {
            return Err(EngineError::Validation(format!(
                "quantity must be between 1 and {}, got {quantity}",
                env.max_quantity
            )));
        }
        if event.is_past(env.clock.now()) {
            return Err(EngineError::EventInPast { event_id: event.id });
        }
        if already_waitlisted {
            return Err(EngineError::AlreadyWaitlisted {
                user_id,
                event_id: event.id,
            });
        }
        Ok(())
    }

    fn require_status(state: &WaitlistState, expected: WaitlistStatus) -> Result<&WaitlistEntry, EngineError> {
        let Some(entry) = &state.entry else {
            return Err(EngineError::Validation("no waitlist entry in state".into()));
        };
        if entry.status == expected {
            Ok(entry)
        } else {
            Err(EngineError::invalid_state(
                Resource::WaitlistEntry,
                entry.id,
                entry.status,
                expected.as_str(),
            ))
        }
    }

    fn validate_convert(state: &WaitlistState, now: DateTime<Utc>) -> Result<(), EngineError> {
        let entry = Self::require_status(state, WaitlistStatus::Notified)?;
        match entry.expires_at {
            Some(expired_at) if expired_at < now => Err(EngineError::Expired {
                waitlist_id: entry.id,
                expired_at,
            }),
            _ => Ok(()),
        }
    }

    fn validate_expire(state: &WaitlistState, now: DateTime<Utc>) -> Result<(), EngineError> {
        let entry = Self::require_status(state, WaitlistStatus::Notified)?;
        if entry.offer_lapsed(now) {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "offer {} is still open",
                entry.id
            )))
        }
    }

    /// Fold an event into state.
    pub fn apply_event(state: &mut WaitlistState, action: &WaitlistAction) {
        match action {
            WaitlistAction::Joined { entry } => {
                state.entry = Some(entry.clone());
                state.last_error = None;
            },
            WaitlistAction::Offered { at, expires_at } => {
                if let Some(entry) = &mut state.entry {
                    entry.status = WaitlistStatus::Notified;
                    entry.notified_at = Some(*at);
                    entry.expires_at = Some(*expires_at);
                    entry.updated_at = *at;
                }
                state.last_error = None;
            },
            WaitlistAction::Converted { at } => {
                if let Some(entry) = &mut state.entry {
                    entry.status = WaitlistStatus::Converted;
                    entry.updated_at = *at;
                }
                state.last_error = None;
            },
            WaitlistAction::Expired { at } => {
                if let Some(entry) = &mut state.entry {
                    entry.status = WaitlistStatus::Expired;
                    entry.updated_at = *at;
                }
                state.last_error = None;
            },
            WaitlistAction::Rejected { error } => {
                state.last_error = Some(error.clone());
            },
            WaitlistAction::Join { .. }
            | WaitlistAction::Offer { .. }
            | WaitlistAction::Convert
            | WaitlistAction::Expire => {},
        }
    }

    fn reject(state: &mut WaitlistState, error: EngineError) -> SmallVec<[Effect<WaitlistAction>; 4]> {
        Self::apply_event(state, &WaitlistAction::Rejected { error });
        SmallVec::new()
    }
}

impl Reducer for WaitlistReducer {
    type State = WaitlistState;
    type Action = WaitlistAction;
    type Environment = WaitlistEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock.now();

        match action {
            // ========== Commands ==========
            WaitlistAction::Join {
                waitlist_id,
                user_id,
                event,
                quantity,
                priority,
                already_waitlisted,
            } => {
                if let Err(error) =
                    Self::validate_join(state, user_id, &event, quantity, already_waitlisted, env)
                {
                    return Self::reject(state, error);
                }

                let entry = WaitlistEntry {
                    id: waitlist_id,
                    user_id,
                    event_id: event.id,
                    quantity,
                    priority,
                    status: WaitlistStatus::Active,
                    joined_at: now,
                    notified_at: None,
                    expires_at: None,
                    updated_at: now,
                };
                Self::apply_event(state, &WaitlistAction::Joined { entry });
                SmallVec::new()
            },

            WaitlistAction::Offer { window } => {
                if let Err(error) = Self::require_status(state, WaitlistStatus::Active) {
                    return Self::reject(state, error);
                }
                Self::apply_event(
                    state,
                    &WaitlistAction::Offered {
                        at: now,
                        expires_at: now + window,
                    },
                );
                SmallVec::new()
            },

            WaitlistAction::Convert => {
                if let Err(error) = Self::validate_convert(state, now) {
                    return Self::reject(state, error);
                }
                Self::apply_event(state, &WaitlistAction::Converted { at: now });
                SmallVec::new()
            },

            WaitlistAction::Expire => {
                if let Err(error) = Self::validate_expire(state, now) {
                    return Self::reject(state, error);
                }
                Self::apply_event(state, &WaitlistAction::Expired { at: now });
                SmallVec::new()
            },

            // ========== Events ==========
            event @ (WaitlistAction::Joined { .. }
            | WaitlistAction::Offered { .. }
            | WaitlistAction::Converted { .. }
            | WaitlistAction::Expired { .. }
            | WaitlistAction::Rejected { .. }) => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
