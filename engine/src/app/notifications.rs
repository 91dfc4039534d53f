//! Notification dispatcher.
//!
//! Composes and records user-facing notifications. Delivery beyond the
//! stored record (push, email) belongs to another system.

use crate::error::{EngineError, Resource, Result};
use crate::metrics;
use crate::repository::{EventRepository, NotificationRepository};
use crate::types::{
    Booking, Event, EventId, NewNotification, Notification, NotificationId, NotificationKind, Page,
    UserId, WaitlistEntry,
};
use boxoffice_core::environment::Clock;
use std::sync::Arc;

/// Records notifications for waitlist offers and booking changes.
pub struct NotificationDispatcher {
    notifications: Arc<dyn NotificationRepository>,
    events: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    offer_window_minutes: u64,
    default_page_limit: usize,
}

impl NotificationDispatcher {
    /// Dispatcher over the given repositories
    #[must_use]
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        events: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        offer_window_minutes: u64,
        default_page_limit: usize,
    ) -> Self {
        Self {
            notifications,
            events,
            clock,
            offer_window_minutes,
            default_page_limit,
        }
    }

    /// Stamp identity and timestamps, then persist.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        let now = self.clock.now();
        let notification = Notification {
            id: NotificationId::new(),
            user_id: new.user_id,
            event_id: new.event_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            is_read: false,
            created_at: now,
            updated_at: now,
        };
        self.notifications.create(&notification).await?;

        metrics::record_notification(notification.kind.as_str());
        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "Notification recorded"
        );
        Ok(notification)
    }

    /// Tell a user that `quantity` seats are waiting for them.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for unknown events, repository failures.
    pub async fn send_waitlist_notification(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Notification> {
        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::Event, event_id))?;
        self.create_notification(self.offer_message(user_id, &event, quantity))
            .await
    }

    /// Record the offer made to `entry` for `event`.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn notify_offer(&self, event: &Event, entry: &WaitlistEntry) -> Result<Notification> {
        self.create_notification(self.offer_message(entry.user_id, event, entry.quantity))
            .await
    }

    /// Record a booking confirmation.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn notify_booking_confirmed(&self, event: &Event, booking: &Booking) -> Result<Notification> {
        self.create_notification(NewNotification {
            user_id: booking.user_id,
            event_id: Some(event.id),
            kind: NotificationKind::BookingConfirmed,
            title: "Booking Confirmed".to_string(),
            message: format!(
                "Your booking for {} is confirmed: {} ticket(s), {} total.",
                event.name, booking.quantity, booking.total_amount
            ),
        })
        .await
    }

    /// Record a booking cancellation.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn notify_booking_cancelled(&self, event: &Event, booking: &Booking) -> Result<Notification> {
        self.create_notification(NewNotification {
            user_id: booking.user_id,
            event_id: Some(event.id),
            kind: NotificationKind::BookingCancelled,
            title: "Booking Cancelled".to_string(),
            message: format!(
                "Your booking of {} ticket(s) for {} has been cancelled.",
                booking.quantity, event.name
            ),
        })
        .await
    }

    /// A user's notifications, newest first (default limit 20).
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn user_notifications(&self, user_id: UserId, page: Page) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .list_by_user(user_id, page.window(self.default_page_limit))
            .await?)
    }

    /// Flag one notification as read.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when absent.
    pub async fn mark_as_read(&self, notification_id: NotificationId) -> Result<()> {
        Ok(self
            .notifications
            .mark_as_read(notification_id, self.clock.now())
            .await?)
    }

    /// Flag all of a user's notifications as read; returns how many changed.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn mark_all_as_read(&self, user_id: UserId) -> Result<u64> {
        Ok(self
            .notifications
            .mark_all_as_read(user_id, self.clock.now())
            .await?)
    }

    /// Unread notifications for a user.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        Ok(self.notifications.unread_count(user_id).await?)
    }

    fn offer_message(&self, user_id: UserId, event: &Event, quantity: u32) -> NewNotification {
        NewNotification {
            user_id,
            event_id: Some(event.id),
            kind: NotificationKind::WaitlistSpotAvailable,
            title: "Spot Available!".to_string(),
            message: format!(
                "A spot is now available for {}. You have {} minutes to complete your booking for {} ticket(s).",
                event.name, self.offer_window_minutes, quantity
            ),
        }
    }
}
