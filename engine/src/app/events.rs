//! Event catalog.
//!
//! Edits and deletes run under the event's ledger lock so they cannot
//! interleave with bookings for the same event.

use crate::error::{EngineError, Resource, Result};
use crate::ledger::SeatLedger;
use crate::repository::{BookingRepository, EventRepository};
use crate::types::{Event, EventId, EventPopularity, EventUpdate, NewEvent, Page};
use boxoffice_core::environment::Clock;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Creates, edits and lists events.
pub struct EventCatalog {
    events: Arc<dyn EventRepository>,
    bookings: Arc<dyn BookingRepository>,
    ledger: Arc<SeatLedger>,
    clock: Arc<dyn Clock>,
    default_page_limit: usize,
    popular_limit: usize,
}

impl EventCatalog {
    /// Catalog over the given repositories
    #[must_use]
    pub fn new(
        events: Arc<dyn EventRepository>,
        bookings: Arc<dyn BookingRepository>,
        ledger: Arc<SeatLedger>,
        clock: Arc<dyn Clock>,
        default_page_limit: usize,
        popular_limit: usize,
    ) -> Self {
        Self {
            events,
            bookings,
            ledger,
            clock,
            default_page_limit,
            popular_limit,
        }
    }

    fn validate(name: &str, venue: &str, event_time: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("event name is required".into()));
        }
        if venue.trim().is_empty() {
            return Err(EngineError::Validation("event venue is required".into()));
        }
        if event_time < now {
            return Err(EngineError::Validation("event time must be in the future".into()));
        }
        Ok(())
    }

    /// Create an event with every seat available.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] for a blank name or venue, a past start
    /// time or zero capacity.
    pub async fn create_event(&self, new: NewEvent) -> Result<Event> {
        let now = self.clock.now();
        Self::validate(&new.name, &new.venue, new.event_time, now)?;
        if new.total_capacity == 0 {
            return Err(EngineError::Validation("event capacity must be positive".into()));
        }

        let event = Event {
            id: EventId::new(),
            name: new.name,
            description: new.description,
            venue: new.venue,
            event_time: new.event_time,
            total_capacity: new.total_capacity,
            available_seats: new.total_capacity,
            held_seats: 0,
            price: new.price,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        self.events.create(&event).await?;

        tracing::info!(event_id = %event.id, name = %event.name, capacity = event.total_capacity, "Event created");
        Ok(event)
    }

    /// Edit an event's descriptive fields. Capacity and seat counters stay.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::Validation`].
    pub async fn update_event(&self, event_id: EventId, update: EventUpdate) -> Result<Event> {
        let _guard = self.ledger.lock(event_id).await;
        let now = self.clock.now();
        let mut event = self.get_event(event_id).await?;
        Self::validate(&update.name, &update.venue, update.event_time, now)?;

        event.name = update.name;
        event.description = update.description;
        event.venue = update.venue;
        event.event_time = update.event_time;
        event.price = update.price;
        event.updated_at = now;
        self.events.update(&event).await?;

        tracing::info!(event_id = %event_id, "Event updated");
        self.get_event(event_id).await
    }

    /// Delete an event that has no confirmed bookings.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::HasBookings`].
    pub async fn delete_event(&self, event_id: EventId) -> Result<()> {
        let _guard = self.ledger.lock(event_id).await;
        self.get_event(event_id).await?;
        let confirmed = self.bookings.count_confirmed_by_event(event_id).await?;
        if confirmed > 0 {
            return Err(EngineError::HasBookings { event_id, confirmed });
        }
        self.events.delete(event_id).await?;

        tracing::info!(event_id = %event_id, "Event deleted");
        Ok(())
    }

    /// Fetch one event.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when absent.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event> {
        self.events
            .get(event_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::Event, event_id))
    }

    /// Events that have not started, soonest first.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn list_upcoming(&self, page: Page) -> Result<Vec<Event>> {
        Ok(self
            .events
            .list_upcoming(self.clock.now(), page.window(self.default_page_limit))
            .await?)
    }

    /// All events, latest first.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn list_all(&self, page: Page) -> Result<Vec<Event>> {
        Ok(self.events.list_all(page.window(self.default_page_limit)).await?)
    }

    /// Events ranked by confirmed bookings; `limit <= 0` uses the default.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn most_popular(&self, limit: i64) -> Result<Vec<EventPopularity>> {
        let limit = usize::try_from(limit)
            .ok()
            .filter(|l| *l > 0)
            .unwrap_or(self.popular_limit);
        Ok(self.events.most_popular(limit).await?)
    }
}
