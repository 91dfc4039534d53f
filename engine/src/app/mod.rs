//! Application services.
//!
//! Each manager loads records through the repository traits, runs the
//! matching reducer from [`crate::aggregates`], and persists the result.
//! [`BookingEngine`] wires them together.

pub mod analytics;
pub mod bookings;
pub mod engine;
pub mod events;
pub mod notifications;
pub mod waitlist;

pub use analytics::{Analytics, Overview};
pub use bookings::BookingManager;
pub use engine::{BookingEngine, Reaper, Repositories};
pub use events::EventCatalog;
pub use notifications::NotificationDispatcher;
pub use waitlist::WaitlistManager;
