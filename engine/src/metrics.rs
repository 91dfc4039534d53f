//! Business metrics for the allocation engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_bookings_total{outcome}` - Booking attempts by outcome
//!   (confirmed, claimed, rejected, failed)
//! - `boxoffice_bookings_cancelled_total` - Cancelled bookings
//! - `boxoffice_tickets_sold_total` - Tickets taken by confirmed bookings
//! - `boxoffice_tickets_returned_total` - Tickets returned by cancellations
//! - `boxoffice_waitlist_joined_total` - Waitlist entries created
//! - `boxoffice_waitlist_offers_total` - Waitlist offers made
//! - `boxoffice_waitlist_converted_total` - Offers accepted
//! - `boxoffice_waitlist_expired_total` - Offers that lapsed
//! - `boxoffice_notifications_created_total{kind}` - Notifications recorded
//! - `boxoffice_ledger_adjustments_total{operation,outcome}` - Seat counter changes
//! - `boxoffice_reaper_sweeps_total{outcome}` - Reaper sweeps
//!
//! ## Gauges
//! - `boxoffice_seats_held` - Seats held by the last adjusted event

use metrics::{describe_counter, describe_gauge};

/// Register descriptions for every business metric.
///
/// Call once at startup, after the recorder is installed.
pub fn register_business_metrics() {
    // Bookings
    describe_counter!(
        "boxoffice_bookings_total",
        "Booking attempts by outcome (confirmed, claimed, rejected, failed)"
    );
    describe_counter!("boxoffice_bookings_cancelled_total", "Cancelled bookings");
    describe_counter!("boxoffice_tickets_sold_total", "Tickets taken by confirmed bookings");
    describe_counter!("boxoffice_tickets_returned_total", "Tickets returned by cancellations");

    // Waitlist
    describe_counter!("boxoffice_waitlist_joined_total", "Waitlist entries created");
    describe_counter!("boxoffice_waitlist_offers_total", "Waitlist offers made");
    describe_counter!("boxoffice_waitlist_converted_total", "Waitlist offers accepted");
    describe_counter!("boxoffice_waitlist_expired_total", "Waitlist offers that lapsed");

    // Notifications
    describe_counter!("boxoffice_notifications_created_total", "Notifications recorded by kind");

    // Ledger and reaper
    describe_counter!(
        "boxoffice_ledger_adjustments_total",
        "Seat counter adjustments by operation and outcome"
    );
    describe_gauge!("boxoffice_seats_held", "Seats held for waitlist offers on the last adjusted event");
    describe_counter!("boxoffice_reaper_sweeps_total", "Reaper sweeps by outcome");

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a booking attempt's outcome.
pub fn record_booking(outcome: &'static str, quantity: u32) {
    metrics::counter!("boxoffice_bookings_total", "outcome" => outcome).increment(1);
    if matches!(outcome, "confirmed" | "claimed") {
        metrics::counter!("boxoffice_tickets_sold_total").increment(u64::from(quantity));
    }
}

/// Record a cancellation.
pub fn record_booking_cancelled(quantity: u32) {
    metrics::counter!("boxoffice_bookings_cancelled_total").increment(1);
    metrics::counter!("boxoffice_tickets_returned_total").increment(u64::from(quantity));
}

/// Record a new waitlist entry.
pub fn record_waitlist_joined() {
    metrics::counter!("boxoffice_waitlist_joined_total").increment(1);
}

/// Record an offer made to a waitlist entry.
pub fn record_offer_made() {
    metrics::counter!("boxoffice_waitlist_offers_total").increment(1);
}

/// Record an accepted offer.
pub fn record_offer_converted() {
    metrics::counter!("boxoffice_waitlist_converted_total").increment(1);
}

/// Record lapsed offers.
pub fn record_offers_expired(count: usize) {
    metrics::counter!("boxoffice_waitlist_expired_total").increment(count as u64);
}

/// Record a stored notification.
pub fn record_notification(kind: &'static str) {
    metrics::counter!("boxoffice_notifications_created_total", "kind" => kind).increment(1);
}

/// Record a seat counter adjustment attempt.
pub fn record_ledger_adjustment(operation: &'static str, outcome: &'static str, held: Option<u32>) {
    metrics::counter!("boxoffice_ledger_adjustments_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    if let Some(held) = held {
        metrics::gauge!("boxoffice_seats_held").set(f64::from(held));
    }
}

/// Record a finished reaper sweep.
pub fn record_reaper_sweep(outcome: &'static str) {
    metrics::counter!("boxoffice_reaper_sweeps_total", "outcome" => outcome).increment(1);
}
