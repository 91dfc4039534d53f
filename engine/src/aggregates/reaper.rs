//! Expiry reaper.
//!
//! A reducer that sweeps lapsed waitlist offers on a fixed interval. Each
//! sweep runs as an [`Effect::Future`]; its completion schedules the next one
//! with an [`Effect::Delay`] while the reaper is running. Run it with
//! [`boxoffice_runtime::Store`]:
//!
//! ```ignore
//! let reaper = Store::new(ReaperState::default(), ReaperReducer::new(), env);
//! reaper.send(ReaperAction::Start).await?;
//! // ...
//! reaper.send(ReaperAction::Stop).await?;
//! reaper.shutdown(Duration::from_secs(5)).await?;
//! ```

use crate::error::EngineError;
use crate::metrics;
use async_trait::async_trait;
use boxoffice_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Offers moved to `expired`
    pub expired: usize,
    /// Entries offered the released seats
    pub reoffered: usize,
}

/// Something that can sweep lapsed offers.
#[async_trait]
pub trait OfferSweeper: Send + Sync {
    /// Expire lapsed offers, optionally offering their seats to the queue.
    async fn sweep(&self, redistribute: bool) -> Result<SweepReport, EngineError>;
}

/// Reaper bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct ReaperState {
    /// Sweeps are being rescheduled
    pub running: bool,
    /// A sweep effect is outstanding
    pub in_flight: bool,
    /// Completed sweeps
    pub sweeps: u64,
    /// Offers expired across all sweeps
    pub expired_total: u64,
    /// Entries re-offered across all sweeps
    pub reoffered_total: u64,
    /// Completion time of the last successful sweep
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// Error from the last failed sweep, cleared on success
    pub last_error: Option<EngineError>,
}

/// Reaper actions.
#[derive(Clone, Debug, PartialEq)]
pub enum ReaperAction {
    /// Sweep now and keep sweeping every interval
    Start,
    /// Stop rescheduling; an in-flight sweep still completes
    Stop,
    /// Run one sweep
    Sweep,
    /// A sweep finished
    SweepCompleted {
        /// Offers expired
        expired: usize,
        /// Entries re-offered
        reoffered: usize,
    },
    /// A sweep failed
    SweepFailed {
        /// Why
        error: EngineError,
    },
}

/// Reaper dependencies.
#[derive(Clone)]
pub struct ReaperEnvironment {
    /// Performs the sweep
    pub sweeper: Arc<dyn OfferSweeper>,
    /// Time source for `last_sweep_at`
    pub clock: Arc<dyn Clock>,
    /// Pause between sweeps
    pub interval: Duration,
    /// Offer released seats to the queue after expiring
    pub redistribute: bool,
}

/// Reaper reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReaperReducer;

impl ReaperReducer {
    /// Create a reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn sweep_effect(env: &ReaperEnvironment) -> Effect<ReaperAction> {
        let sweeper = Arc::clone(&env.sweeper);
        let redistribute = env.redistribute;

        boxoffice_core::async_effect! {
            match sweeper.sweep(redistribute).await {
                Ok(report) => Some(ReaperAction::SweepCompleted {
                    expired: report.expired,
                    reoffered: report.reoffered,
                }),
                Err(error) => Some(ReaperAction::SweepFailed { error }),
            }
        }
    }

    fn reschedule(state: &ReaperState, env: &ReaperEnvironment) -> SmallVec<[Effect<ReaperAction>; 4]> {
        if state.running {
            smallvec![boxoffice_core::delay! {
                duration: env.interval,
                action: ReaperAction::Sweep
            }]
        } else {
            SmallVec::new()
        }
    }
}

impl Reducer for ReaperReducer {
    type State = ReaperState;
    type Action = ReaperAction;
    type Environment = ReaperEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ReaperAction::Start => {
                if state.running {
                    return SmallVec::new();
                }
                state.running = true;
                tracing::info!(interval_secs = env.interval.as_secs(), "Reaper started");
                if state.in_flight {
                    return SmallVec::new();
                }
                state.in_flight = true;
                smallvec![Self::sweep_effect(env)]
            },

            ReaperAction::Stop => {
                state.running = false;
                tracing::info!(sweeps = state.sweeps, "Reaper stopped");
                SmallVec::new()
            },

            ReaperAction::Sweep => {
                if !state.running || state.in_flight {
                    return SmallVec::new();
                }
                state.in_flight = true;
                smallvec![Self::sweep_effect(env)]
            },

            ReaperAction::SweepCompleted { expired, reoffered } => {
                state.in_flight = false;
                state.sweeps += 1;
                state.expired_total += expired as u64;
                state.reoffered_total += reoffered as u64;
                state.last_sweep_at = Some(env.clock.now());
                state.last_error = None;

                metrics::record_reaper_sweep("completed");
                if expired > 0 {
                    tracing::info!(expired, reoffered, "Expired lapsed waitlist offers");
                } else {
                    tracing::debug!("Reaper sweep found nothing to expire");
                }

                Self::reschedule(state, env)
            },

            ReaperAction::SweepFailed { error } => {
                state.in_flight = false;
                metrics::record_reaper_sweep("failed");
                tracing::error!(error = %error, "Reaper sweep failed");
                state.last_error = Some(error);

                Self::reschedule(state, env)
            },
        }
    }
}
