//! Reducers for bookings, waitlist entries and the expiry reaper.
//!
//! Booking and waitlist reducers hold the status rules and emit no effects;
//! the managers in [`crate::app`] load records, run them and persist the
//! result. The reaper is run by a [`boxoffice_runtime::Store`].

pub mod booking;
pub mod reaper;
pub mod waitlist;

pub use booking::{BookingAction, BookingEnvironment, BookingReducer, BookingState};
pub use reaper::{
    OfferSweeper, ReaperAction, ReaperEnvironment, ReaperReducer, ReaperState, SweepReport,
};
pub use waitlist::{WaitlistAction, WaitlistEnvironment, WaitlistReducer, WaitlistState};
