use carshare_catalog::{
    NewRide, Ride, RideCatalog, RidePatch, RideStatus, ViewContext, VisibilityFilter, DEFAULT_MAX_SEATS_PER_RIDE,
};
use carshare_core::{Actor, CoreResult, DocumentStore, Notifier, RetryPolicy, TransactionRunner, UserId};
use carshare_ledger::{ProfileDirectory, RequestLedger, RequestStatus, RideRequest, UserProfile};
use carshare_store::{Config, StoreError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::dispatch::NotificationDispatcher;
use crate::engine::{AllocationEngine, Decision, DecisionOutcome};

/// Tunables for the engine, usually taken from `Config`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_seats_per_ride: u32,
    pub transactions: RetryPolicy,
    pub notifications: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_seats_per_ride: DEFAULT_MAX_SEATS_PER_RIDE,
            transactions: RetryPolicy::default(),
            notifications: RetryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(5)),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_seats_per_ride: config.rules.max_seats_per_ride,
            transactions: config.transactions.policy(),
            notifications: config.notifications.policy(),
        }
    }
}

/// The engine's surface: every ride, request and profile operation, wired
/// over one document store and one notifier.
#[derive(Clone)]
pub struct RideService {
    catalog: RideCatalog,
    ledger: Arc<RequestLedger>,
    engine: AllocationEngine,
    profiles: ProfileDirectory,
}

impl RideService {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>, settings: EngineSettings) -> Self {
        let runner = TransactionRunner::new(Arc::clone(&store), settings.transactions);
        let profiles = ProfileDirectory::new(Arc::clone(&store));
        let ledger = Arc::new(RequestLedger::new(runner.clone(), profiles.clone()));

        let visibility = VisibilityFilter::new(Arc::clone(&store), ledger.clone());
        let catalog = RideCatalog::new(runner.clone(), visibility)
            .with_max_seats(settings.max_seats_per_ride)
            .with_cascade(ledger.clone());

        let dispatcher = NotificationDispatcher::new(notifier, profiles.clone(), settings.notifications);
        let engine = AllocationEngine::new(runner, ledger.clone(), dispatcher);

        Self { catalog, ledger, engine, profiles }
    }

    /// Connect the configured store and notifier
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = carshare_store::connect(config).await?;
        let notifier = carshare_store::notifier(config)?;
        Ok(Self::new(store, notifier, EngineSettings::from(config)))
    }

    pub async fn create_ride(&self, actor: &Actor, new_ride: NewRide) -> CoreResult<Ride> {
        self.catalog.create_ride(actor, new_ride).await
    }

    pub async fn get_ride(&self, ride_id: Uuid) -> CoreResult<Ride> {
        self.catalog.get_ride(ride_id).await
    }

    pub async fn edit_ride(&self, ride_id: Uuid, patch: RidePatch, actor: &Actor) -> CoreResult<Ride> {
        self.catalog.edit_ride(ride_id, patch, actor).await
    }

    pub async fn delete_ride(&self, ride_id: Uuid, actor: &Actor) -> CoreResult<()> {
        self.catalog.delete_ride(ride_id, actor).await
    }

    pub async fn toggle_status(&self, ride_id: Uuid, actor: &Actor) -> CoreResult<RideStatus> {
        self.catalog.toggle_status(ride_id, actor).await
    }

    pub async fn list_my_rides(&self, actor: &Actor) -> CoreResult<Vec<Ride>> {
        self.catalog.list_my_rides(actor).await
    }

    pub async fn list_visible(&self, actor: &Actor, context: ViewContext) -> CoreResult<Vec<Ride>> {
        self.catalog.list_visible(actor, context).await
    }

    pub async fn submit_request(&self, ride_id: Uuid, actor: &Actor, seats_requested: u32) -> CoreResult<RideRequest> {
        self.engine.submit_request(ride_id, actor, seats_requested).await
    }

    pub async fn decide(&self, request_id: Uuid, decision: Decision, actor: &Actor) -> CoreResult<DecisionOutcome> {
        self.engine.decide(request_id, decision, actor).await
    }

    pub async fn get_request(&self, request_id: Uuid) -> CoreResult<RideRequest> {
        self.ledger.get_request(request_id).await
    }

    pub async fn get_requests_for_ride(&self, ride_id: Uuid) -> CoreResult<Vec<RideRequest>> {
        self.ledger.requests_for_ride(ride_id).await
    }

    pub async fn get_requests_by_user(&self, user_id: &UserId) -> CoreResult<Vec<RideRequest>> {
        self.ledger.requests_by_user(user_id).await
    }

    pub async fn request_status(&self, ride_id: Uuid, user_id: &UserId) -> CoreResult<Option<RequestStatus>> {
        self.ledger.request_status(ride_id, user_id).await
    }

    pub async fn accepted_requests(&self, actor: &Actor) -> CoreResult<Vec<RideRequest>> {
        self.ledger.accepted_requests(actor).await
    }

    pub async fn pending_requests_for_my_rides(&self, actor: &Actor) -> CoreResult<Vec<RideRequest>> {
        self.ledger.pending_requests_for_my_rides(actor).await
    }

    pub async fn get_profile(&self, user_id: &UserId) -> CoreResult<UserProfile> {
        self.profiles.get_profile(user_id).await
    }

    pub async fn update_profile(&self, actor: &Actor, profile: UserProfile) -> CoreResult<UserProfile> {
        self.profiles.update_profile(actor, profile).await
    }
}
