use async_trait::async_trait;
use carshare_core::{
    assert_owner, Actor, Collection, CoreError, CoreResult, Filter, Transaction, TransactionRunner,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::ride::{NewRide, Ride, RidePatch, RideStatus};
use crate::visibility::{ViewContext, VisibilityFilter};

pub const DEFAULT_MAX_SEATS_PER_RIDE: u32 = 8;

/// Hook run inside the delete transaction, before the ride document goes away
#[async_trait]
pub trait DeletionCascade: Send + Sync {
    async fn on_ride_deleted(&self, tx: &mut Transaction, ride: &Ride) -> CoreResult<()>;
}

/// Owns ride offers: creation, owner edits, dormancy and deletion
#[derive(Clone)]
pub struct RideCatalog {
    runner: TransactionRunner,
    visibility: VisibilityFilter,
    cascade: Option<Arc<dyn DeletionCascade>>,
    max_seats_per_ride: u32,
}

impl RideCatalog {
    pub fn new(runner: TransactionRunner, visibility: VisibilityFilter) -> Self {
        Self {
            runner,
            visibility,
            cascade: None,
            max_seats_per_ride: DEFAULT_MAX_SEATS_PER_RIDE,
        }
    }

    pub fn with_max_seats(mut self, max_seats_per_ride: u32) -> Self {
        self.max_seats_per_ride = max_seats_per_ride.max(1);
        self
    }

    pub fn with_cascade(mut self, cascade: Arc<dyn DeletionCascade>) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn max_seats_per_ride(&self) -> u32 {
        self.max_seats_per_ride
    }

    pub async fn create_ride(&self, actor: &Actor, new_ride: NewRide) -> CoreResult<Ride> {
        let owner = actor.require()?.clone();
        self.validate_new(&new_ride, today())?;

        let ride = Ride::new(owner, new_ride);
        let created = ride.clone();
        self.runner
            .run("create_ride", move |tx| {
                let ride = ride.clone();
                Box::pin(async move { tx.create(Collection::Rides, &ride.doc_id(), &ride) })
            })
            .await?;

        info!(
            "Ride {} created by {} for {} {} with {} seats",
            created.id, created.owner_id, created.date, created.time, created.total_seats
        );
        Ok(created)
    }

    pub async fn get_ride(&self, ride_id: Uuid) -> CoreResult<Ride> {
        self.runner
            .store()
            .get_document(Collection::Rides, &ride_id.to_string())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {}", ride_id)))?
            .decode()
    }

    pub async fn edit_ride(&self, ride_id: Uuid, patch: RidePatch, actor: &Actor) -> CoreResult<Ride> {
        actor.require()?;

        let actor = actor.clone();
        let ride = self
            .runner
            .run("edit_ride", move |tx| {
                let actor = actor.clone();
                let patch = patch.clone();
                Box::pin(async move {
                    let mut ride = Ride::load(tx, ride_id).await?;
                    assert_owner(&ride, &actor)?;
                    validate_patch(&patch, today())?;
                    if ride.status == RideStatus::PendingDecision {
                        return Err(CoreError::InvalidState(format!(
                            "ride {} has a request awaiting decision",
                            ride.id
                        )));
                    }

                    ride.apply_patch(patch);
                    ride.save(tx)?;
                    Ok(ride)
                })
            })
            .await?;

        info!("Ride {} edited", ride.id);
        Ok(ride)
    }

    /// Owner-only delete. Requests still pending on the ride are resolved by
    /// the cascade hook in the same transaction.
    pub async fn delete_ride(&self, ride_id: Uuid, actor: &Actor) -> CoreResult<()> {
        actor.require()?;

        let actor = actor.clone();
        let cascade = self.cascade.clone();
        self.runner
            .run("delete_ride", move |tx| {
                let actor = actor.clone();
                let cascade = cascade.clone();
                Box::pin(async move {
                    let ride = Ride::load(tx, ride_id).await?;
                    assert_owner(&ride, &actor)?;
                    if let Some(cascade) = cascade {
                        cascade.on_ride_deleted(tx, &ride).await?;
                    }
                    tx.delete(Collection::Rides, &ride.doc_id());
                    Ok(())
                })
            })
            .await?;

        info!("Ride {} deleted", ride_id);
        Ok(())
    }

    /// Active ↔ Dormant. Returns the new status.
    pub async fn toggle_status(&self, ride_id: Uuid, actor: &Actor) -> CoreResult<RideStatus> {
        actor.require()?;

        let actor = actor.clone();
        let status = self
            .runner
            .run("toggle_status", move |tx| {
                let actor = actor.clone();
                Box::pin(async move {
                    let mut ride = Ride::load(tx, ride_id).await?;
                    assert_owner(&ride, &actor)?;
                    let status = ride.toggle_dormancy()?;
                    ride.save(tx)?;
                    Ok(status)
                })
            })
            .await?;

        info!("Ride {} is now {}", ride_id, status.as_str());
        Ok(status)
    }

    /// Every ride the actor owns, any status, by departure
    pub async fn list_my_rides(&self, actor: &Actor) -> CoreResult<Vec<Ride>> {
        let owner = actor.require()?;
        let docs = self
            .runner
            .store()
            .query_documents(Collection::Rides, &[Filter::eq("ownerId", owner.as_str())])
            .await?;

        let mut rides = docs.iter().map(|d| d.decode::<Ride>()).collect::<CoreResult<Vec<_>>>()?;
        rides.sort_by_key(|r| r.departure());
        Ok(rides)
    }

    pub async fn list_visible(&self, actor: &Actor, context: ViewContext) -> CoreResult<Vec<Ride>> {
        self.visibility.list_visible(actor, context).await
    }

    fn validate_new(&self, new_ride: &NewRide, today: NaiveDate) -> CoreResult<()> {
        if new_ride.total_seats < 1 || new_ride.total_seats > self.max_seats_per_ride {
            return Err(CoreError::Validation(format!(
                "seats must be between 1 and {}, got {}",
                self.max_seats_per_ride, new_ride.total_seats
            )));
        }
        validate_date(new_ride.date, today)?;
        validate_pickup(&new_ride.pickup)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn validate_patch(patch: &RidePatch, today: NaiveDate) -> CoreResult<()> {
    if patch.is_empty() {
        return Err(CoreError::Validation("nothing to change".to_string()));
    }
    if let Some(date) = patch.date {
        validate_date(date, today)?;
    }
    if let Some(pickup) = &patch.pickup {
        validate_pickup(pickup)?;
    }
    Ok(())
}

fn validate_date(date: NaiveDate, today: NaiveDate) -> CoreResult<()> {
    if date < today {
        return Err(CoreError::Validation(format!("date {} is in the past", date)));
    }
    Ok(())
}

fn validate_pickup(pickup: &str) -> CoreResult<()> {
    if pickup.trim().is_empty() {
        return Err(CoreError::Validation("pickup location is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::SeatHolderIndex;
    use carshare_core::{DocumentStore, MemoryStore, RetryPolicy, UserId};
    use chrono::{Duration, NaiveTime};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoSeatHolders;

    #[async_trait]
    impl SeatHolderIndex for NoSeatHolders {
        async fn rides_with_accepted_request(&self, _user_id: &UserId) -> CoreResult<HashSet<Uuid>> {
            Ok(HashSet::new())
        }
    }

    #[derive(Default)]
    struct CountingCascade(AtomicU32);

    #[async_trait]
    impl DeletionCascade for CountingCascade {
        async fn on_ride_deleted(&self, _tx: &mut Transaction, _ride: &Ride) -> CoreResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn catalog(store: Arc<MemoryStore>) -> RideCatalog {
        let runner = TransactionRunner::new(store.clone(), RetryPolicy::immediate(5));
        RideCatalog::new(runner, VisibilityFilter::new(store, Arc::new(NoSeatHolders)))
    }

    fn tomorrow_ride(seats: u32) -> NewRide {
        NewRide {
            date: today() + Duration::days(1),
            time: NaiveTime::from_hms_opt(8, 15, 0).unwrap(),
            pickup: "Village square".to_string(),
            total_seats: seats,
        }
    }

    #[tokio::test]
    async fn test_create_ride() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone());

        let ride = catalog.create_ride(&Actor::user("owner"), tomorrow_ride(3)).await.unwrap();
        assert_eq!(ride.status, RideStatus::Active);
        assert_eq!(ride.remaining_seats, 3);
        assert_eq!(catalog.get_ride(ride.id).await.unwrap(), ride);
    }

    #[tokio::test]
    async fn test_create_ride_validation() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone()).with_max_seats(4);
        let owner = Actor::user("owner");

        for seats in [0, 5] {
            let result = catalog.create_ride(&owner, tomorrow_ride(seats)).await;
            assert!(matches!(result, Err(CoreError::Validation(_))));
        }

        let mut past = tomorrow_ride(2);
        past.date = today() - Duration::days(1);
        assert!(matches!(catalog.create_ride(&owner, past).await, Err(CoreError::Validation(_))));

        let mut blank = tomorrow_ride(2);
        blank.pickup = "   ".to_string();
        assert!(matches!(catalog.create_ride(&owner, blank).await, Err(CoreError::Validation(_))));

        let anonymous = catalog.create_ride(&Actor::anonymous(), tomorrow_ride(2)).await;
        assert_eq!(anonymous, Err(CoreError::Unauthenticated));
        assert_eq!(store.len(Collection::Rides).await, 0);
    }

    #[tokio::test]
    async fn test_edit_ride_checks_owner_then_state() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone());
        let ride = catalog.create_ride(&Actor::user("owner"), tomorrow_ride(2)).await.unwrap();

        let patch = RidePatch { pickup: Some("Station".to_string()), ..Default::default() };
        let stranger = catalog.edit_ride(ride.id, patch.clone(), &Actor::user("stranger")).await;
        assert!(matches!(stranger, Err(CoreError::Unauthorized(_))));

        let edited = catalog.edit_ride(ride.id, patch.clone(), &Actor::user("owner")).await.unwrap();
        assert_eq!(edited.pickup, "Station");
        assert_eq!(edited.total_seats, 2);

        let mut held = edited.clone();
        held.hold_for_decision().unwrap();
        store
            .put_document(Collection::Rides, &held.doc_id(), serde_json::to_value(&held).unwrap())
            .await
            .unwrap();

        // Owner check still comes first
        let stranger = catalog.edit_ride(ride.id, patch.clone(), &Actor::user("stranger")).await;
        assert!(matches!(stranger, Err(CoreError::Unauthorized(_))));
        let owner = catalog.edit_ride(ride.id, patch, &Actor::user("owner")).await;
        assert!(matches!(owner, Err(CoreError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_edit_ride_rejects_stranger_before_validating() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store);
        let ride = catalog.create_ride(&Actor::user("owner"), tomorrow_ride(2)).await.unwrap();
        let stranger = Actor::user("stranger");

        let past = RidePatch { date: Some(today() - Duration::days(1)), ..Default::default() };
        let blank = RidePatch { pickup: Some("  ".to_string()), ..Default::default() };
        for patch in [RidePatch::default(), past.clone(), blank] {
            let result = catalog.edit_ride(ride.id, patch, &stranger).await;
            assert!(matches!(result, Err(CoreError::Unauthorized(_))));
        }

        let owner = catalog.edit_ride(ride.id, past, &Actor::user("owner")).await;
        assert!(matches!(owner, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_toggle_status() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store);
        let ride = catalog.create_ride(&Actor::user("owner"), tomorrow_ride(2)).await.unwrap();

        assert!(matches!(
            catalog.toggle_status(ride.id, &Actor::user("stranger")).await,
            Err(CoreError::Unauthorized(_))
        ));
        assert_eq!(catalog.toggle_status(ride.id, &Actor::user("owner")).await.unwrap(), RideStatus::Dormant);
        assert_eq!(catalog.toggle_status(ride.id, &Actor::user("owner")).await.unwrap(), RideStatus::Active);
        assert_eq!(catalog.get_ride(ride.id).await.unwrap().remaining_seats, 2);
    }

    #[tokio::test]
    async fn test_delete_ride_runs_cascade() {
        let store = Arc::new(MemoryStore::new());
        let cascade = Arc::new(CountingCascade::default());
        let catalog = catalog(store.clone()).with_cascade(cascade.clone());
        let ride = catalog.create_ride(&Actor::user("owner"), tomorrow_ride(2)).await.unwrap();

        let denied = catalog.delete_ride(ride.id, &Actor::user("stranger")).await;
        assert!(matches!(denied, Err(CoreError::Unauthorized(_))));
        assert_eq!(cascade.0.load(Ordering::SeqCst), 0);

        catalog.delete_ride(ride.id, &Actor::user("owner")).await.unwrap();
        assert_eq!(cascade.0.load(Ordering::SeqCst), 1);
        assert!(matches!(catalog.get_ride(ride.id).await, Err(CoreError::NotFound(_))));

        let again = catalog.delete_ride(ride.id, &Actor::user("owner")).await;
        assert!(matches!(again, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_my_rides_sorted() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store);
        let owner = Actor::user("owner");

        let mut later = tomorrow_ride(1);
        later.date = today() + Duration::days(5);
        let later = catalog.create_ride(&owner, later).await.unwrap();
        let sooner = catalog.create_ride(&owner, tomorrow_ride(1)).await.unwrap();
        catalog.create_ride(&Actor::user("someone"), tomorrow_ride(1)).await.unwrap();

        let mine: Vec<Uuid> = catalog.list_my_rides(&owner).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(mine, vec![sooner.id, later.id]);
    }
}
