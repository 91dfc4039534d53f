//! Shared fixtures for the engine integration tests.

#![allow(dead_code)] // Each test binary uses a different subset
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use boxoffice_engine::config::EngineConfig;
use boxoffice_engine::repository::{BookingRepository, InMemoryDatabase, RepositoryError};
use boxoffice_engine::types::PageWindow;
use boxoffice_engine::{
    Booking, BookingAnalytics, BookingEngine, BookingId, Event, EventId, Money, NewEvent, Page, Repositories,
    UserId,
};
use boxoffice_core::environment::Clock;
use boxoffice_testing::{ManualClock, test_clock};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Engine over an in-memory database with a hand-driven clock.
pub struct Harness {
    pub engine: BookingEngine,
    pub clock: Arc<ManualClock>,
    pub db: Arc<InMemoryDatabase>,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(InMemoryDatabase::new());
        Self::with_repositories(Repositories::in_memory(&db), db)
    }

    pub fn with_repositories(repos: Repositories, db: Arc<InMemoryDatabase>) -> Self {
        let clock = Arc::new(ManualClock::starting_at(test_clock().now()));
        let engine = BookingEngine::new(repos, clock.clone(), &EngineConfig::default());
        Self { engine, clock, db }
    }

    /// Engine whose booking writes can be refused mid-test.
    pub fn with_flaky_bookings() -> (Self, Arc<FlakyBookings>) {
        let db = Arc::new(InMemoryDatabase::new());
        let bookings = Arc::new(FlakyBookings::new(db.clone()));
        let mut repos = Repositories::in_memory(&db);
        repos.bookings = bookings.clone();
        (Self::with_repositories(repos, db), bookings)
    }

    /// A $25 event one week out.
    pub async fn event(&self, capacity: u32) -> Event {
        self.engine
            .create_event(NewEvent {
                name: "Spring Concert".to_string(),
                description: "Strings and brass".to_string(),
                venue: "City Hall".to_string(),
                event_time: self.clock.now() + chrono::Duration::days(7),
                total_capacity: capacity,
                price: Money::from_dollars(25),
                created_by: UserId::new(),
            })
            .await
            .unwrap()
    }

    pub async fn seats(&self, event: &Event) -> (u32, u32) {
        let event = self.engine.get_event(event.id).await.unwrap();
        (event.available_seats, event.held_seats)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Step the clock so consecutive joins get distinct timestamps.
    pub fn tick(&self) {
        self.clock.advance(chrono::Duration::seconds(1));
    }
}

/// Every row, for listings that paginate.
pub const ALL: Page = Page::new(1_000, 0);

/// Booking store that refuses inserts or updates while switched on.
pub struct FlakyBookings {
    inner: Arc<InMemoryDatabase>,
    refuse_create: AtomicBool,
    refuse_update: AtomicBool,
}

impl FlakyBookings {
    pub fn new(inner: Arc<InMemoryDatabase>) -> Self {
        Self {
            inner,
            refuse_create: AtomicBool::new(false),
            refuse_update: AtomicBool::new(false),
        }
    }

    pub fn refuse_creates(&self, refuse: bool) {
        self.refuse_create.store(refuse, Ordering::SeqCst);
    }

    pub fn refuse_updates(&self, refuse: bool) {
        self.refuse_update.store(refuse, Ordering::SeqCst);
    }
}

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("booking store offline".to_string())
}

#[async_trait]
impl BookingRepository for FlakyBookings {
    async fn create(&self, booking: &Booking) -> Result<(), RepositoryError> {
        if self.refuse_create.load(Ordering::SeqCst) {
            return Err(offline());
        }
        BookingRepository::create(self.inner.as_ref(), booking).await
    }

    async fn update(&self, booking: &Booking) -> Result<(), RepositoryError> {
        if self.refuse_update.load(Ordering::SeqCst) {
            return Err(offline());
        }
        BookingRepository::update(self.inner.as_ref(), booking).await
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        BookingRepository::get(self.inner.as_ref(), id).await
    }

    async fn list_by_user(&self, user_id: UserId, window: PageWindow) -> Result<Vec<Booking>, RepositoryError> {
        BookingRepository::list_by_user(self.inner.as_ref(), user_id, window).await
    }

    async fn list_by_event(&self, event_id: EventId, window: PageWindow) -> Result<Vec<Booking>, RepositoryError> {
        BookingRepository::list_by_event(self.inner.as_ref(), event_id, window).await
    }

    async fn count_confirmed_by_event(&self, event_id: EventId) -> Result<u64, RepositoryError> {
        self.inner.count_confirmed_by_event(event_id).await
    }

    async fn total_confirmed(&self) -> Result<u64, RepositoryError> {
        self.inner.total_confirmed().await
    }

    async fn analytics(&self, event_id: EventId) -> Result<BookingAnalytics, RepositoryError> {
        self.inner.analytics(event_id).await
    }
}
