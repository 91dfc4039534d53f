//! Waitlist queue manager.
//!
//! Owns waitlist-status transitions: join, leave, offer (redistribution),
//! convert and expiry. Every operation that touches seat holds runs under the
//! event's ledger lock.

use crate::aggregates::{
    OfferSweeper, SweepReport, WaitlistAction, WaitlistEnvironment, WaitlistReducer, WaitlistState,
};
use crate::app::notifications::NotificationDispatcher;
use crate::error::{EngineError, Resource, Result};
use crate::ledger::{EventGuard, SeatLedger};
use crate::metrics;
use crate::queue::{FirstFit, position_of};
use crate::repository::{EventRepository, WaitlistRepository};
use crate::types::{
    Event, EventId, OfferRound, Page, PageWindow, UserId, WaitlistEntry, WaitlistId, WaitlistStatus,
};
use async_trait::async_trait;
use boxoffice_core::reducer::Reducer;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serves event waitlists.
pub struct WaitlistManager {
    waitlist: Arc<dyn WaitlistRepository>,
    events: Arc<dyn EventRepository>,
    ledger: Arc<SeatLedger>,
    notifier: Arc<NotificationDispatcher>,
    reducer: WaitlistReducer,
    env: WaitlistEnvironment,
    offer_window: chrono::Duration,
    default_page_limit: usize,
}

impl WaitlistManager {
    /// Manager over the given collaborators
    #[must_use]
    pub fn new(
        waitlist: Arc<dyn WaitlistRepository>,
        events: Arc<dyn EventRepository>,
        ledger: Arc<SeatLedger>,
        notifier: Arc<NotificationDispatcher>,
        env: WaitlistEnvironment,
        offer_window: chrono::Duration,
        default_page_limit: usize,
    ) -> Self {
        Self {
            waitlist,
            events,
            ledger,
            notifier,
            reducer: WaitlistReducer::new(),
            env,
            offer_window,
            default_page_limit,
        }
    }

    // ========================================================================
    // Joining and leaving
    // ========================================================================

    /// Put a user in an event's queue.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for unknown events, [`EngineError::Validation`]
    /// for quantities outside `[1, max]`, [`EngineError::EventInPast`],
    /// [`EngineError::AlreadyWaitlisted`] when the user holds an open entry.
    pub async fn join_waitlist(&self, user_id: UserId, event_id: EventId, quantity: u32) -> Result<WaitlistEntry> {
        let _guard = self.ledger.lock(event_id).await;
        let event = self.load_event(event_id).await?;
        let already_waitlisted = self.waitlist.find_open(user_id, event_id).await?.is_some();

        let mut state = WaitlistState::default();
        self.reducer.reduce(
            &mut state,
            WaitlistAction::Join {
                waitlist_id: WaitlistId::new(),
                user_id,
                event,
                quantity,
                priority: 0,
                already_waitlisted,
            },
            &self.env,
        );
        let entry = state.outcome()?.clone();
        self.waitlist.create(&entry).await?;

        metrics::record_waitlist_joined();
        tracing::info!(
            waitlist_id = %entry.id,
            user_id = %user_id,
            event_id = %event_id,
            quantity,
            "Joined waitlist"
        );
        Ok(entry)
    }

    /// Remove the user's open entry. A pending offer's hold is released.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when the user has no open entry.
    pub async fn leave_waitlist(&self, user_id: UserId, event_id: EventId) -> Result<()> {
        let guard = self.ledger.lock(event_id).await;
        let entry = self
            .waitlist
            .find_open(user_id, event_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::WaitlistEntry, format!("user {user_id} event {event_id}")))?;

        self.waitlist.delete(entry.id).await?;
        if entry.status == WaitlistStatus::Notified {
            self.ledger.release_hold(&guard, entry.quantity).await?;
        }

        tracing::info!(waitlist_id = %entry.id, user_id = %user_id, event_id = %event_id, "Left waitlist");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// A user's entries, most recently joined first.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn user_waitlist(&self, user_id: UserId, page: Page) -> Result<Vec<WaitlistEntry>> {
        Ok(self
            .waitlist
            .list_by_user(user_id, page.window(self.default_page_limit))
            .await?)
    }

    /// An event's entries in queue order.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn event_waitlist(&self, event_id: EventId, page: Page) -> Result<Vec<WaitlistEntry>> {
        Ok(self
            .waitlist
            .list_by_event(event_id, page.window(self.default_page_limit))
            .await?)
    }

    /// Fetch one entry.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when absent.
    pub async fn get_by_id(&self, waitlist_id: WaitlistId) -> Result<WaitlistEntry> {
        self.waitlist
            .get(waitlist_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::WaitlistEntry, waitlist_id))
    }

    /// Active entries for an event.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn waitlist_length(&self, event_id: EventId) -> Result<u64> {
        Ok(self.waitlist.count_active(event_id).await?)
    }

    /// 1-based position of the user's active entry.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when the user has no active entry.
    pub async fn waitlist_position(&self, user_id: UserId, event_id: EventId) -> Result<usize> {
        let entries = self.waitlist.list_by_event(event_id, PageWindow::ALL).await?;
        position_of(&entries, user_id)
            .ok_or_else(|| EngineError::not_found(Resource::WaitlistEntry, format!("user {user_id} event {event_id}")))
    }

    // ========================================================================
    // Redistribution
    // ========================================================================

    /// Offer up to `quantity` freed seats to the event's queue.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for unknown events, repository failures while
    /// reading the queue. Per-entry failures are logged and skipped.
    pub async fn process_waitlist_notifications(&self, event_id: EventId, quantity: u32) -> Result<OfferRound> {
        let guard = self.ledger.lock(event_id).await;
        self.redistribute_locked(&guard, quantity).await
    }

    /// Greedy first-fit pass for the locked event.
    ///
    /// The budget is `quantity` capped by the seats nobody holds. Each chosen
    /// entry gets a hold, a notification and the `notified` status; a failure
    /// on one entry releases its hold and the pass moves on.
    pub(crate) async fn redistribute_locked(&self, guard: &EventGuard, quantity: u32) -> Result<OfferRound> {
        let event_id = *guard.key();
        let event = self.load_event(event_id).await?;
        let budget = quantity.min(event.seat_counts().bookable());
        let mut fit = FirstFit::new(budget);
        let mut offered = Vec::new();

        if budget > 0 {
            for candidate in self.waitlist.next_in_queue(event_id, budget).await? {
                if fit.is_exhausted() {
                    break;
                }
                if !fit.admits(candidate.quantity) {
                    continue;
                }
                match self.offer(guard, &event, candidate).await {
                    Ok(Some(entry)) => {
                        fit.commit(entry.quantity);
                        offered.push(entry);
                    },
                    Ok(None) => {},
                    Err(error) => {
                        tracing::warn!(event_id = %event_id, error = %error, "Stopping redistribution, hold rejected");
                        break;
                    },
                }
            }
        }

        tracing::info!(
            event_id = %event_id,
            budget,
            offered = offered.len(),
            remaining = fit.remaining(),
            "Waitlist redistribution finished"
        );
        Ok(OfferRound {
            event_id,
            budget,
            offered,
            remaining: fit.remaining(),
        })
    }

    /// Hold seats for one entry and tell its user.
    ///
    /// `Err` only when the hold itself is rejected; other failures undo the
    /// hold and return `Ok(None)`.
    async fn offer(&self, guard: &EventGuard, event: &Event, candidate: WaitlistEntry) -> Result<Option<WaitlistEntry>> {
        self.ledger.place_hold(guard, candidate.quantity).await?;

        let waitlist_id = candidate.id;
        let quantity = candidate.quantity;
        let mut state = WaitlistState::from_entry(candidate);
        self.reducer.reduce(
            &mut state,
            WaitlistAction::Offer {
                window: self.offer_window,
            },
            &self.env,
        );
        let entry = match state.outcome() {
            Ok(entry) => entry.clone(),
            Err(error) => {
                tracing::warn!(waitlist_id = %waitlist_id, error = %error, "Skipping waitlist entry");
                self.undo_hold(guard, quantity).await;
                return Ok(None);
            },
        };

        if let Err(error) = self.notifier.notify_offer(event, &entry).await {
            tracing::warn!(waitlist_id = %waitlist_id, error = %error, "Offer notification failed, skipping entry");
            self.undo_hold(guard, quantity).await;
            return Ok(None);
        }
        if let Err(error) = self.waitlist.update(&entry).await {
            tracing::error!(waitlist_id = %waitlist_id, error = %error, "Failed to persist offer, skipping entry");
            self.undo_hold(guard, quantity).await;
            return Ok(None);
        }

        metrics::record_offer_made();
        tracing::info!(
            waitlist_id = %entry.id,
            user_id = %entry.user_id,
            quantity,
            expires_at = ?entry.expires_at,
            "Waitlist offer made"
        );
        Ok(Some(entry))
    }

    async fn undo_hold(&self, guard: &EventGuard, quantity: u32) {
        if let Err(error) = self.ledger.release_hold(guard, quantity).await {
            tracing::error!(event_id = %guard.key(), quantity, error = %error, "Failed to release seat hold");
        }
    }

    // ========================================================================
    // Conversion and expiry
    // ========================================================================

    /// Accept an offer. The entry becomes `converted` and its hold returns to
    /// general availability for a follow-up booking.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::InvalidState`] unless
    /// notified, [`EngineError::Expired`] once the window closed.
    pub async fn convert_waitlist_to_booking(&self, waitlist_id: WaitlistId) -> Result<WaitlistEntry> {
        let event_id = self.get_by_id(waitlist_id).await?.event_id;
        let guard = self.ledger.lock(event_id).await;

        let entry = self.get_by_id(waitlist_id).await?;
        let converted = self.check_convert(&guard, &entry)?;
        self.ledger.release_hold(&guard, converted.quantity).await?;
        if let Err(error) = self.store_converted(&converted).await {
            if let Err(undo) = self.ledger.place_hold(&guard, converted.quantity).await {
                tracing::error!(waitlist_id = %waitlist_id, error = %undo, "Failed to restore seat hold");
            }
            return Err(error);
        }
        Ok(converted)
    }

    /// The converted form of `entry`, without persisting anything.
    pub(crate) fn check_convert(&self, guard: &EventGuard, entry: &WaitlistEntry) -> Result<WaitlistEntry> {
        if *guard.key() != entry.event_id {
            return Err(EngineError::Validation(format!(
                "waitlist entry {} belongs to event {}, not {}",
                entry.id,
                entry.event_id,
                guard.key()
            )));
        }

        let mut state = WaitlistState::from_entry(entry.clone());
        self.reducer.reduce(&mut state, WaitlistAction::Convert, &self.env);
        Ok(state.outcome()?.clone())
    }

    /// Persist an entry produced by [`Self::check_convert`].
    pub(crate) async fn store_converted(&self, converted: &WaitlistEntry) -> Result<()> {
        self.waitlist.update(converted).await?;

        metrics::record_offer_converted();
        tracing::info!(waitlist_id = %converted.id, user_id = %converted.user_id, "Waitlist offer converted");
        Ok(())
    }

    /// Write an offer back as it was before a failed conversion.
    pub(crate) async fn restore_offer(&self, offer: &WaitlistEntry) {
        if let Err(error) = self.waitlist.update(offer).await {
            tracing::error!(waitlist_id = %offer.id, error = %error, "Failed to restore waitlist offer");
        }
    }

    /// Expire every lapsed offer and release its hold.
    ///
    /// Entries are handled per event under that event's lock. A failure on
    /// one entry is logged and the sweep continues.
    ///
    /// # Errors
    ///
    /// Repository failures while listing lapsed offers.
    pub async fn cleanup_expired_waitlist(&self) -> Result<Vec<WaitlistEntry>> {
        let lapsed = self.waitlist.lapsed_offers(self.env.clock.now()).await?;

        let mut by_event: BTreeMap<EventId, Vec<WaitlistId>> = BTreeMap::new();
        for entry in lapsed {
            by_event.entry(entry.event_id).or_default().push(entry.id);
        }

        let mut expired = Vec::new();
        for (event_id, ids) in by_event {
            let guard = self.ledger.lock(event_id).await;
            for id in ids {
                match self.expire_locked(&guard, id).await {
                    Ok(Some(entry)) => expired.push(entry),
                    Ok(None) => {},
                    Err(error) => {
                        tracing::error!(waitlist_id = %id, error = %error, "Failed to expire waitlist offer");
                    },
                }
            }
        }

        if !expired.is_empty() {
            metrics::record_offers_expired(expired.len());
        }
        Ok(expired)
    }

    async fn expire_locked(&self, guard: &EventGuard, waitlist_id: WaitlistId) -> Result<Option<WaitlistEntry>> {
        // Re-read under the lock; the user may have converted or left meanwhile.
        let Some(entry) = self.waitlist.get(waitlist_id).await? else {
            return Ok(None);
        };
        if !entry.offer_lapsed(self.env.clock.now()) {
            return Ok(None);
        }

        let mut state = WaitlistState::from_entry(entry);
        self.reducer.reduce(&mut state, WaitlistAction::Expire, &self.env);
        let expired = state.outcome()?.clone();

        self.waitlist
            .update_status(expired.id, WaitlistStatus::Expired, expired.updated_at)
            .await?;
        self.ledger.release_hold(guard, expired.quantity).await?;

        tracing::info!(waitlist_id = %expired.id, user_id = %expired.user_id, "Waitlist offer expired");
        Ok(Some(expired))
    }

    async fn load_event(&self, event_id: EventId) -> Result<Event> {
        self.events
            .get(event_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::Event, event_id))
    }
}

#[async_trait]
impl OfferSweeper for WaitlistManager {
    async fn sweep(&self, redistribute: bool) -> Result<SweepReport> {
        let expired = self.cleanup_expired_waitlist().await?;
        self.ledger.prune_idle_locks().await;

        let mut report = SweepReport {
            expired: expired.len(),
            reoffered: 0,
        };
        if !redistribute {
            return Ok(report);
        }

        let mut released: BTreeMap<EventId, u32> = BTreeMap::new();
        for entry in &expired {
            *released.entry(entry.event_id).or_default() += entry.quantity;
        }
        for (event_id, quantity) in released {
            match self.process_waitlist_notifications(event_id, quantity).await {
                Ok(round) => report.reoffered += round.offered.len(),
                Err(error) => {
                    tracing::warn!(event_id = %event_id, error = %error, "Redistribution after expiry failed");
                },
            }
        }
        Ok(report)
    }
}
