//! Booking lifecycle manager.
//!
//! Creation is a two-step saga under the event lock: the booking is persisted
//! `pending`, the ledger takes the seats, then the booking is `confirmed`. A
//! rejected ledger step marks the booking `failed`. Cancellation returns the
//! seats and offers them to the waitlist before the lock is released.

use crate::aggregates::{BookingAction, BookingEnvironment, BookingReducer, BookingState};
use crate::app::notifications::NotificationDispatcher;
use crate::app::waitlist::WaitlistManager;
use crate::error::{EngineError, Resource, Result};
use crate::ledger::{EventGuard, SeatLedger};
use crate::metrics;
use crate::repository::{BookingRepository, EventRepository};
use crate::types::{
    Booking, BookingAnalytics, BookingId, Event, EventId, Page, UserId, WaitlistId, WaitlistStatus,
};
use boxoffice_core::reducer::Reducer;
use std::sync::Arc;

/// Creates, cancels and reads bookings.
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    events: Arc<dyn EventRepository>,
    ledger: Arc<SeatLedger>,
    waitlist: Arc<WaitlistManager>,
    notifier: Arc<NotificationDispatcher>,
    reducer: BookingReducer,
    env: BookingEnvironment,
    default_page_limit: usize,
}

impl BookingManager {
    /// Manager over the given collaborators
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        events: Arc<dyn EventRepository>,
        ledger: Arc<SeatLedger>,
        waitlist: Arc<WaitlistManager>,
        notifier: Arc<NotificationDispatcher>,
        env: BookingEnvironment,
        default_page_limit: usize,
    ) -> Self {
        Self {
            bookings,
            events,
            ledger,
            waitlist,
            notifier,
            reducer: BookingReducer::new(),
            env,
            default_page_limit,
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Book `quantity` tickets for an event.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::EventInPast`],
    /// [`EngineError::Validation`] for quantities outside `[1, max]`,
    /// [`EngineError::InsufficientCapacity`] when too few seats are bookable.
    pub async fn create_booking(&self, user_id: UserId, event_id: EventId, quantity: u32) -> Result<Booking> {
        let guard = self.ledger.lock(event_id).await;
        let event = self.load_event(event_id).await?;

        let mut state = BookingState::default();
        self.reducer.reduce(
            &mut state,
            BookingAction::Place {
                booking_id: BookingId::new(),
                user_id,
                event: event.clone(),
                quantity,
            },
            &self.env,
        );
        let pending = match state.outcome() {
            Ok(booking) => booking.clone(),
            Err(error) => {
                metrics::record_booking("rejected", quantity);
                return Err(error);
            },
        };
        self.bookings.create(&pending).await?;

        if let Err(error) = self.ledger.adjust_seats(&guard, -i64::from(quantity)).await {
            self.fail(&mut state, &error).await;
            return Err(error);
        }

        let booking = self.confirm(&guard, &mut state).await?;

        metrics::record_booking("confirmed", quantity);
        tracing::info!(
            booking_id = %booking.id,
            user_id = %user_id,
            event_id = %event_id,
            quantity,
            total = %booking.total_amount,
            "Booking confirmed"
        );
        if let Err(error) = self.notifier.notify_booking_confirmed(&event, &booking).await {
            tracing::warn!(booking_id = %booking.id, error = %error, "Booking confirmation notice failed");
        }
        Ok(booking)
    }

    /// Cancel a confirmed booking on behalf of its owner.
    ///
    /// The seats go back to the ledger and are offered to the event's waitlist
    /// before other requests for the event can run.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::Unauthorized`] for other
    /// users, [`EngineError::AlreadyCancelled`], [`EngineError::InvalidState`]
    /// for pending or failed bookings, [`EngineError::EventInPast`].
    pub async fn cancel_booking(&self, booking_id: BookingId, user_id: UserId) -> Result<Booking> {
        let event_id = self.get_booking(booking_id).await?.event_id;
        let guard = self.ledger.lock(event_id).await;

        let booking = self.get_booking(booking_id).await?;
        let event = self.load_event(event_id).await?;

        let mut state = BookingState::from_booking(booking);
        self.reducer.reduce(
            &mut state,
            BookingAction::Cancel {
                user_id,
                event: event.clone(),
            },
            &self.env,
        );
        let cancelled = state.outcome()?.clone();
        let seats = i64::from(cancelled.quantity);
        self.ledger.adjust_seats(&guard, seats).await?;
        if let Err(error) = self.bookings.update(&cancelled).await {
            tracing::error!(booking_id = %booking_id, error = %error, "Failed to store cancellation, taking seats back");
            if let Err(undo) = self.ledger.adjust_seats(&guard, -seats).await {
                tracing::error!(booking_id = %booking_id, error = %undo, "Failed to take seats back");
            }
            return Err(error.into());
        }

        metrics::record_booking_cancelled(cancelled.quantity);
        tracing::info!(
            booking_id = %booking_id,
            user_id = %user_id,
            event_id = %event_id,
            quantity = cancelled.quantity,
            "Booking cancelled"
        );

        if let Err(error) = self.waitlist.redistribute_locked(&guard, cancelled.quantity).await {
            tracing::warn!(event_id = %event_id, error = %error, "Waitlist redistribution after cancellation failed");
        }
        drop(guard);

        if let Err(error) = self.notifier.notify_booking_cancelled(&event, &cancelled).await {
            tracing::warn!(booking_id = %booking_id, error = %error, "Booking cancellation notice failed");
        }
        Ok(cancelled)
    }

    /// Turn a pending waitlist offer into a confirmed booking in one step.
    ///
    /// The offer's held seats are consumed directly, so nobody can take them
    /// between conversion and booking.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::Unauthorized`] when the entry
    /// belongs to another user, [`EngineError::InvalidState`] unless notified,
    /// [`EngineError::Expired`], [`EngineError::EventInPast`].
    pub async fn claim_offer(&self, waitlist_id: WaitlistId, user_id: UserId) -> Result<Booking> {
        let event_id = self.waitlist.get_by_id(waitlist_id).await?.event_id;
        let guard = self.ledger.lock(event_id).await;

        let entry = self.waitlist.get_by_id(waitlist_id).await?;
        if entry.user_id != user_id {
            return Err(EngineError::Unauthorized {
                user_id,
                resource: Resource::WaitlistEntry,
                id: waitlist_id.to_string(),
            });
        }
        let event = self.load_event(event_id).await?;

        // The claimant's own hold counts as bookable for them.
        let mut snapshot = event.clone();
        if entry.status == WaitlistStatus::Notified {
            snapshot.held_seats = snapshot.held_seats.saturating_sub(entry.quantity);
        }
        let quantity = entry.quantity;

        let mut state = BookingState::default();
        self.reducer.reduce(
            &mut state,
            BookingAction::Place {
                booking_id: BookingId::new(),
                user_id,
                event: snapshot,
                quantity,
            },
            &self.env,
        );
        let pending = state.outcome()?.clone();
        let converted = self.waitlist.check_convert(&guard, &entry)?;

        // Until the hold is consumed, every failure leaves the offer open.
        self.bookings.create(&pending).await?;
        if let Err(error) = self.waitlist.store_converted(&converted).await {
            self.fail(&mut state, &error).await;
            return Err(error);
        }
        if let Err(error) = self.ledger.consume_hold(&guard, quantity).await {
            self.waitlist.restore_offer(&entry).await;
            self.fail(&mut state, &error).await;
            return Err(error);
        }
        let booking = self.confirm(&guard, &mut state).await?;

        metrics::record_booking("claimed", quantity);
        tracing::info!(
            booking_id = %booking.id,
            waitlist_id = %waitlist_id,
            user_id = %user_id,
            quantity,
            "Waitlist offer claimed"
        );
        if let Err(error) = self.notifier.notify_booking_confirmed(&event, &booking).await {
            tracing::warn!(booking_id = %booking.id, error = %error, "Booking confirmation notice failed");
        }
        Ok(booking)
    }

    /// Confirm the pending booking in `state` after its seats were taken.
    ///
    /// If the confirmation cannot be stored, the seats go back to the ledger.
    async fn confirm(&self, guard: &EventGuard, state: &mut BookingState) -> Result<Booking> {
        self.reducer.reduce(state, BookingAction::Confirm, &self.env);
        let booking = state.outcome()?.clone();

        if let Err(error) = self.bookings.update(&booking).await {
            tracing::error!(booking_id = %booking.id, error = %error, "Failed to store confirmation, returning seats");
            if let Err(undo) = self.ledger.adjust_seats(guard, i64::from(booking.quantity)).await {
                tracing::error!(booking_id = %booking.id, error = %undo, "Failed to return seats");
            }
            return Err(error.into());
        }
        Ok(booking)
    }

    /// Mark the pending booking in `state` failed after a later saga step
    /// refused it.
    async fn fail(&self, state: &mut BookingState, cause: &EngineError) {
        self.reducer.reduce(
            state,
            BookingAction::Fail {
                reason: cause.to_string(),
            },
            &self.env,
        );
        match state.outcome() {
            Ok(failed) => {
                metrics::record_booking("failed", failed.quantity);
                tracing::warn!(booking_id = %failed.id, error = %cause, "Booking failed");
                if let Err(error) = self.bookings.update(failed).await {
                    tracing::error!(booking_id = %failed.id, error = %error, "Failed to store failed booking");
                }
            },
            Err(error) => {
                tracing::error!(error = %error, "Booking could not be marked failed");
            },
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Fetch one booking.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when absent.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::Booking, booking_id))
    }

    /// A user's bookings, newest first.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn user_bookings(&self, user_id: UserId, page: Page) -> Result<Vec<Booking>> {
        Ok(self
            .bookings
            .list_by_user(user_id, page.window(self.default_page_limit))
            .await?)
    }

    /// An event's bookings, newest first.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn event_bookings(&self, event_id: EventId, page: Page) -> Result<Vec<Booking>> {
        Ok(self
            .bookings
            .list_by_event(event_id, page.window(self.default_page_limit))
            .await?)
    }

    /// Status counts and confirmed revenue for an event.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for unknown events.
    pub async fn booking_analytics(&self, event_id: EventId) -> Result<BookingAnalytics> {
        self.load_event(event_id).await?;
        Ok(self.bookings.analytics(event_id).await?)
    }

    async fn load_event(&self, event_id: EventId) -> Result<Event> {
        self.events
            .get(event_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::Event, event_id))
    }
}
