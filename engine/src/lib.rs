//! Booking and waitlist allocation engine for event ticketing.
//!
//! Keeps seat counters consistent under concurrent demand, diverts overflow
//! to an ordered waitlist, and runs the offer lifecycle
//! (`active → notified → converted | expired`) with a time-boxed window.
//!
//! # Architecture
//!
//! ```text
//!                 ┌─────────────────────────────┐
//!                 │        BookingEngine        │
//!                 └─────────────────────────────┘
//!        │            │             │             │
//!        ▼            ▼             ▼             ▼
//! ┌────────────┐ ┌──────────┐ ┌────────────┐ ┌──────────────┐
//! │  Booking   │ │ Waitlist │ │   Event    │ │ Notification │
//! │  Manager   │ │ Manager  │ │  Catalog   │ │  Dispatcher  │
//! └────────────┘ └──────────┘ └────────────┘ └──────────────┘
//!        │            │
//!        ▼            ▼
//! ┌─────────────────────────┐      ┌─────────────────────────┐
//! │ SeatLedger (per-event   │      │ Reaper (Store running   │
//! │ lock + bounded counters)│◄─────│ ReaperReducer on timer) │
//! └─────────────────────────┘      └─────────────────────────┘
//!              │
//!              ▼
//!      Repository traits (in-memory implementation included)
//! ```
//!
//! Booking and waitlist transitions are pure reducers in [`aggregates`];
//! the managers in [`app`] load records, run the reducer, and persist the
//! result while holding the event's ledger lock.
//!
//! # Seat invariant
//!
//! For every event `0 <= held_seats <= available_seats <= total_capacity`.
//! Only [`ledger::SeatLedger`] changes the counters, and a change that would
//! break the bound fails without writing.
//!
//! # Example
//!
//! ```rust,no_run
//! use boxoffice_core::environment::SystemClock;
//! use boxoffice_engine::{BookingEngine, Config};
//! use std::sync::Arc;
//!
//! # async fn example(event_id: boxoffice_engine::EventId, user: boxoffice_engine::UserId)
//! #     -> Result<(), boxoffice_engine::EngineError> {
//! let config = Config::default();
//! let engine = BookingEngine::in_memory(Arc::new(SystemClock), &config.engine);
//! let booking = engine.create_booking(user, event_id, 2).await?;
//! assert_eq!(booking.quantity, 2);
//! # Ok(())
//! # }
//! ```

pub mod aggregates;
pub mod app;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod queue;
pub mod repository;
pub mod types;

pub use app::{BookingEngine, Reaper, Repositories};
pub use config::Config;
pub use error::{EngineError, ErrorKind, Resource, Result};
pub use types::{
    Booking, BookingAnalytics, BookingId, BookingStatus, Event, EventId, EventPopularity, EventUpdate,
    Money, NewEvent, Notification, NotificationId, NotificationKind, OfferRound, Page, UserId,
    WaitlistEntry, WaitlistId, WaitlistStatus,
};
