//! Read-only analytics over bookings and events.

use crate::error::{EngineError, Resource, Result};
use crate::repository::{BookingRepository, EventRepository};
use crate::types::{EventId, EventPopularity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Headline numbers across all events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    /// Confirmed bookings across all events
    pub total_bookings: u64,
    /// Most booked events
    pub most_popular: Vec<EventPopularity>,
}

/// Analytics queries.
pub struct Analytics {
    events: Arc<dyn EventRepository>,
    bookings: Arc<dyn BookingRepository>,
    popular_limit: usize,
}

impl Analytics {
    /// Analytics over the given repositories
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>, bookings: Arc<dyn BookingRepository>, popular_limit: usize) -> Self {
        Self {
            events,
            bookings,
            popular_limit,
        }
    }

    /// Confirmed booking total and the most popular events.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn overview(&self) -> Result<Overview> {
        Ok(Overview {
            total_bookings: self.bookings.total_confirmed().await?,
            most_popular: self.events.most_popular(self.popular_limit).await?,
        })
    }

    /// Sales and utilization for one event.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for unknown events.
    pub async fn event_utilization(&self, event_id: EventId) -> Result<EventPopularity> {
        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Resource::Event, event_id))?;
        let analytics = self.bookings.analytics(event_id).await?;
        let counts = event.seat_counts();

        Ok(EventPopularity {
            event_id,
            name: event.name,
            confirmed_bookings: analytics.confirmed,
            revenue: analytics.confirmed_revenue,
            seats_sold: counts.sold(),
            total_capacity: event.total_capacity,
            utilization_rate: counts.utilization_rate(),
        })
    }
}
