//! The engine facade: every component wired over one set of repositories.

use crate::aggregates::{
    BookingEnvironment, OfferSweeper, ReaperAction, ReaperEnvironment, ReaperReducer, ReaperState,
    WaitlistEnvironment,
};
use crate::app::analytics::{Analytics, Overview};
use crate::app::bookings::BookingManager;
use crate::app::events::EventCatalog;
use crate::app::notifications::NotificationDispatcher;
use crate::app::waitlist::WaitlistManager;
use crate::config::{EngineConfig, ReaperConfig};
use crate::error::Result;
use crate::ledger::SeatLedger;
use crate::repository::{
    BookingRepository, EventRepository, InMemoryDatabase, NotificationRepository, WaitlistRepository,
};
use crate::types::{
    Booking, BookingAnalytics, BookingId, Event, EventId, EventPopularity, EventUpdate, NewEvent,
    Notification, NotificationId, OfferRound, Page, UserId, WaitlistEntry, WaitlistId,
};
use boxoffice_core::environment::Clock;
use boxoffice_runtime::{Store, StoreError};
use std::sync::Arc;

/// The expiry reaper running on the runtime store.
pub type Reaper = Store<ReaperState, ReaperAction, ReaperEnvironment, ReaperReducer>;

/// Repository handles the engine runs against.
#[derive(Clone)]
pub struct Repositories {
    /// Events and seat counters
    pub events: Arc<dyn EventRepository>,
    /// Bookings
    pub bookings: Arc<dyn BookingRepository>,
    /// Waitlist entries
    pub waitlist: Arc<dyn WaitlistRepository>,
    /// Notifications
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Repositories {
    /// All four repositories backed by one in-memory database
    #[must_use]
    pub fn in_memory(db: &Arc<InMemoryDatabase>) -> Self {
        Self {
            events: db.clone(),
            bookings: db.clone(),
            waitlist: db.clone(),
            notifications: db.clone(),
        }
    }
}

/// Booking and waitlist allocation engine.
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
pub struct BookingEngine {
    clock: Arc<dyn Clock>,
    ledger: Arc<SeatLedger>,
    catalog: EventCatalog,
    bookings: BookingManager,
    waitlist: Arc<WaitlistManager>,
    notifications: Arc<NotificationDispatcher>,
    analytics: Analytics,
}

impl BookingEngine {
    /// Wire the engine over `repos`.
    #[must_use]
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        let ledger = Arc::new(SeatLedger::new(repos.events.clone(), clock.clone()));
        let notifications = Arc::new(NotificationDispatcher::new(
            repos.notifications.clone(),
            repos.events.clone(),
            clock.clone(),
            config.offer_window_minutes(),
            config.notification_page_limit,
        ));
        let waitlist = Arc::new(WaitlistManager::new(
            repos.waitlist.clone(),
            repos.events.clone(),
            ledger.clone(),
            notifications.clone(),
            WaitlistEnvironment::new(clock.clone(), config.max_tickets_per_request),
            config.offer_window(),
            config.default_page_limit,
        ));
        let bookings = BookingManager::new(
            repos.bookings.clone(),
            repos.events.clone(),
            ledger.clone(),
            waitlist.clone(),
            notifications.clone(),
            BookingEnvironment::new(clock.clone(), config.max_tickets_per_request),
            config.default_page_limit,
        );
        let catalog = EventCatalog::new(
            repos.events.clone(),
            repos.bookings.clone(),
            ledger.clone(),
            clock.clone(),
            config.default_page_limit,
            config.popular_limit,
        );
        let analytics = Analytics::new(repos.events, repos.bookings, config.popular_limit);

        Self {
            clock,
            ledger,
            catalog,
            bookings,
            waitlist,
            notifications,
            analytics,
        }
    }

    /// Engine over a fresh in-memory database.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self::new(Repositories::in_memory(&Arc::new(InMemoryDatabase::new())), clock, config)
    }

    /// Start the expiry reaper on a runtime store.
    ///
    /// # Errors
    ///
    /// [`StoreError`] if the first sweep cannot be sent.
    pub async fn start_reaper(&self, config: &ReaperConfig) -> std::result::Result<Reaper, StoreError> {
        let sweeper: Arc<dyn OfferSweeper> = self.waitlist.clone();
        let reaper = Store::new(
            ReaperState::default(),
            ReaperReducer::new(),
            ReaperEnvironment {
                sweeper,
                clock: self.clock.clone(),
                interval: config.interval(),
                redistribute: config.redistribute,
            },
        );
        reaper.send(ReaperAction::Start).await?;
        Ok(reaper)
    }

    /// Seat ledger
    #[must_use]
    pub fn ledger(&self) -> &SeatLedger {
        &self.ledger
    }

    /// Event catalog
    #[must_use]
    pub const fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Booking lifecycle manager
    #[must_use]
    pub const fn bookings(&self) -> &BookingManager {
        &self.bookings
    }

    /// Waitlist queue manager
    #[must_use]
    pub fn waitlist(&self) -> &WaitlistManager {
        &self.waitlist
    }

    /// Notification dispatcher
    #[must_use]
    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    /// Analytics queries
    #[must_use]
    pub const fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// See [`EventCatalog::create_event`].
    ///
    /// # Errors
    ///
    /// Validation and repository failures.
    pub async fn create_event(&self, new: NewEvent) -> Result<Event> {
        self.catalog.create_event(new).await
    }

    /// See [`EventCatalog::update_event`].
    ///
    /// # Errors
    ///
    /// Not found, validation and repository failures.
    pub async fn update_event(&self, event_id: EventId, update: EventUpdate) -> Result<Event> {
        self.catalog.update_event(event_id, update).await
    }

    /// See [`EventCatalog::delete_event`].
    ///
    /// # Errors
    ///
    /// Not found, has-bookings and repository failures.
    pub async fn delete_event(&self, event_id: EventId) -> Result<()> {
        self.catalog.delete_event(event_id).await
    }

    /// See [`EventCatalog::get_event`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event> {
        self.catalog.get_event(event_id).await
    }

    /// See [`EventCatalog::list_upcoming`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn list_upcoming_events(&self, page: Page) -> Result<Vec<Event>> {
        self.catalog.list_upcoming(page).await
    }

    /// See [`EventCatalog::list_all`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn list_all_events(&self, page: Page) -> Result<Vec<Event>> {
        self.catalog.list_all(page).await
    }

    /// See [`EventCatalog::most_popular`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn most_popular_events(&self, limit: i64) -> Result<Vec<EventPopularity>> {
        self.catalog.most_popular(limit).await
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    /// See [`BookingManager::create_booking`].
    ///
    /// # Errors
    ///
    /// Not found, validation, capacity and repository failures.
    pub async fn create_booking(&self, user_id: UserId, event_id: EventId, quantity: u32) -> Result<Booking> {
        self.bookings.create_booking(user_id, event_id, quantity).await
    }

    /// See [`BookingManager::cancel_booking`].
    ///
    /// # Errors
    ///
    /// Not found, ownership, status, timing and repository failures.
    pub async fn cancel_booking(&self, booking_id: BookingId, user_id: UserId) -> Result<Booking> {
        self.bookings.cancel_booking(booking_id, user_id).await
    }

    /// See [`BookingManager::get_booking`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.bookings.get_booking(booking_id).await
    }

    /// See [`BookingManager::user_bookings`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn get_user_bookings(&self, user_id: UserId, page: Page) -> Result<Vec<Booking>> {
        self.bookings.user_bookings(user_id, page).await
    }

    /// See [`BookingManager::event_bookings`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn get_event_bookings(&self, event_id: EventId, page: Page) -> Result<Vec<Booking>> {
        self.bookings.event_bookings(event_id, page).await
    }

    /// See [`BookingManager::booking_analytics`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn get_booking_analytics(&self, event_id: EventId) -> Result<BookingAnalytics> {
        self.bookings.booking_analytics(event_id).await
    }

    /// See [`BookingManager::claim_offer`].
    ///
    /// # Errors
    ///
    /// Not found, ownership, status, expiry and repository failures.
    pub async fn claim_offer(&self, waitlist_id: WaitlistId, user_id: UserId) -> Result<Booking> {
        self.bookings.claim_offer(waitlist_id, user_id).await
    }

    // ========================================================================
    // Waitlist
    // ========================================================================

    /// See [`WaitlistManager::join_waitlist`].
    ///
    /// # Errors
    ///
    /// Not found, validation, duplicate and repository failures.
    pub async fn join_waitlist(&self, user_id: UserId, event_id: EventId, quantity: u32) -> Result<WaitlistEntry> {
        self.waitlist.join_waitlist(user_id, event_id, quantity).await
    }

    /// See [`WaitlistManager::leave_waitlist`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn leave_waitlist(&self, user_id: UserId, event_id: EventId) -> Result<()> {
        self.waitlist.leave_waitlist(user_id, event_id).await
    }

    /// See [`WaitlistManager::user_waitlist`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn get_user_waitlist(&self, user_id: UserId, page: Page) -> Result<Vec<WaitlistEntry>> {
        self.waitlist.user_waitlist(user_id, page).await
    }

    /// See [`WaitlistManager::event_waitlist`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn get_event_waitlist(&self, event_id: EventId, page: Page) -> Result<Vec<WaitlistEntry>> {
        self.waitlist.event_waitlist(event_id, page).await
    }

    /// See [`WaitlistManager::get_by_id`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn get_waitlist_by_id(&self, waitlist_id: WaitlistId) -> Result<WaitlistEntry> {
        self.waitlist.get_by_id(waitlist_id).await
    }

    /// See [`WaitlistManager::waitlist_length`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn waitlist_length(&self, event_id: EventId) -> Result<u64> {
        self.waitlist.waitlist_length(event_id).await
    }

    /// See [`WaitlistManager::waitlist_position`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn get_waitlist_position(&self, user_id: UserId, event_id: EventId) -> Result<usize> {
        self.waitlist.waitlist_position(user_id, event_id).await
    }

    /// See [`WaitlistManager::process_waitlist_notifications`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn process_waitlist_notifications(&self, event_id: EventId, quantity: u32) -> Result<OfferRound> {
        self.waitlist.process_waitlist_notifications(event_id, quantity).await
    }

    /// See [`WaitlistManager::convert_waitlist_to_booking`].
    ///
    /// # Errors
    ///
    /// Not found, status, expiry and repository failures.
    pub async fn convert_waitlist_to_booking(&self, waitlist_id: WaitlistId) -> Result<WaitlistEntry> {
        self.waitlist.convert_waitlist_to_booking(waitlist_id).await
    }

    /// See [`WaitlistManager::cleanup_expired_waitlist`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn cleanup_expired_waitlist(&self) -> Result<Vec<WaitlistEntry>> {
        self.waitlist.cleanup_expired_waitlist().await
    }

    // ========================================================================
    // Notifications and analytics
    // ========================================================================

    /// See [`NotificationDispatcher::user_notifications`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn get_user_notifications(&self, user_id: UserId, page: Page) -> Result<Vec<Notification>> {
        self.notifications.user_notifications(user_id, page).await
    }

    /// See [`NotificationDispatcher::mark_as_read`].
    ///
    /// # Errors
    ///
    /// Not found and repository failures.
    pub async fn mark_notification_read(&self, notification_id: NotificationId) -> Result<()> {
        self.notifications.mark_as_read(notification_id).await
    }

    /// See [`NotificationDispatcher::mark_all_as_read`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn mark_all_notifications_read(&self, user_id: UserId) -> Result<u64> {
        self.notifications.mark_all_as_read(user_id).await
    }

    /// See [`NotificationDispatcher::unread_count`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn unread_notification_count(&self, user_id: UserId) -> Result<u64> {
        self.notifications.unread_count(user_id).await
    }

    /// See [`Analytics::overview`].
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn analytics_overview(&self) -> Result<Overview> {
        self.analytics.overview().await
    }

    /// See [`Analytics::event_utilization`].
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::NotFound`] for unknown events.
    pub async fn event_utilization(&self, event_id: EventId) -> Result<EventPopularity> {
        self.analytics.event_utilization(event_id).await
    }
}
