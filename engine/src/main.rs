//! Boxoffice demo process.
//!
//! Runs a short booking and waitlist scenario against the in-memory
//! repositories, then keeps the expiry reaper and the metrics endpoint up
//! until interrupted.

use boxoffice_core::environment::{Clock, SystemClock};
use boxoffice_engine::config::Config;
use boxoffice_engine::metrics::register_business_metrics;
use boxoffice_engine::{BookingEngine, EngineError, Money, NewEvent, Page, UserId};
use boxoffice_runtime::metrics::MetricsServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        max_tickets = config.engine.max_tickets_per_request,
        offer_window_secs = config.engine.offer_window_secs,
        reaper_interval_secs = config.reaper.interval_secs,
        "Configuration loaded"
    );

    // Metrics
    let metrics_addr: SocketAddr = config.server.metrics_addr.parse()?;
    let mut metrics_server = MetricsServer::new(metrics_addr);
    metrics_server.start()?;
    register_business_metrics();

    let clock = Arc::new(SystemClock);
    let engine = BookingEngine::in_memory(clock.clone(), &config.engine);

    run_scenario(&engine, clock.as_ref()).await?;

    let reaper = engine.start_reaper(&config.reaper).await?;
    info!("Reaper running, press Ctrl+C to stop");
    shutdown_signal().await;

    reaper.send(boxoffice_engine::aggregates::ReaperAction::Stop).await?;
    reaper
        .shutdown(Duration::from_secs(config.server.shutdown_timeout))
        .await?;

    info!("Stopped");
    Ok(())
}

/// Sell out a small event, queue two users, cancel, and claim the offer.
async fn run_scenario(engine: &BookingEngine, clock: &dyn Clock) -> anyhow::Result<()> {
    let organizer = UserId::new();
    let alice = UserId::new();
    let bob = UserId::new();
    let carol = UserId::new();

    let event = engine
        .create_event(NewEvent {
            name: "Rust Meetup".to_string(),
            description: "Monthly meetup".to_string(),
            venue: "Main Hall".to_string(),
            event_time: clock.now() + chrono::Duration::days(7),
            total_capacity: 4,
            price: Money::from_dollars(25),
            created_by: organizer,
        })
        .await?;
    info!(event_id = %event.id, capacity = event.total_capacity, "Event created");

    let booking = engine.create_booking(alice, event.id, 3).await?;

    match engine.create_booking(bob, event.id, 2).await {
        Err(EngineError::InsufficientCapacity { available, .. }) => {
            info!(available, "Bob could not book, joining the waitlist");
        },
        Err(error) => return Err(error.into()),
        Ok(unexpected) => warn!(booking_id = %unexpected.id, "Bob booked unexpectedly"),
    }
    let bob_entry = engine.join_waitlist(bob, event.id, 2).await?;
    engine.join_waitlist(carol, event.id, 1).await?;
    info!(
        length = engine.waitlist_length(event.id).await?,
        bob_position = engine.get_waitlist_position(bob, event.id).await?,
        "Waitlist formed"
    );

    // Returning three seats offers them down the queue.
    engine.cancel_booking(booking.id, alice).await?;
    let offers = engine.get_event_waitlist(event.id, Page::default()).await?;
    for entry in &offers {
        info!(user_id = %entry.user_id, status = %entry.status, quantity = entry.quantity, "Waitlist entry");
    }

    let claimed = engine.claim_offer(bob_entry.id, bob).await?;
    info!(booking_id = %claimed.id, total = %claimed.total_amount, "Bob claimed the offer");

    let analytics = engine.get_booking_analytics(event.id).await?;
    let overview = engine.analytics_overview().await?;
    info!(
        confirmed = analytics.confirmed,
        cancelled = analytics.cancelled,
        revenue = %analytics.confirmed_revenue,
        total_bookings = overview.total_bookings,
        unread_for_carol = engine.unread_notification_count(carol).await?,
        "Scenario finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(error) => {
                warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
