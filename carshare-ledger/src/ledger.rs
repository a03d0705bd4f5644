use async_trait::async_trait;
use carshare_catalog::{DeletionCascade, Ride, RideStatus, SeatHolderIndex};
use carshare_core::{Actor, Collection, CoreError, CoreResult, Filter, Transaction, TransactionRunner, UserId};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use crate::models::{ContactSnapshot, RequestStatus, RideRequest};
use crate::profile::ProfileDirectory;

/// Owns seat requests: submission and the read side over them
#[derive(Clone)]
pub struct RequestLedger {
    runner: TransactionRunner,
    profiles: ProfileDirectory,
}

impl RequestLedger {
    pub fn new(runner: TransactionRunner, profiles: ProfileDirectory) -> Self {
        Self { runner, profiles }
    }

    pub fn profiles(&self) -> &ProfileDirectory {
        &self.profiles
    }

    /// Create a Pending request and put the ride on hold for the owner's decision.
    ///
    /// Checks, in order: seat count, ride exists, requester is not the owner,
    /// ride is Active, enough seats remain, no pending request by this user.
    pub async fn submit_request(&self, ride_id: Uuid, actor: &Actor, seats_requested: u32) -> CoreResult<RideRequest> {
        let requester = actor.require()?.clone();
        if seats_requested < 1 {
            return Err(CoreError::Validation("at least one seat must be requested".to_string()));
        }

        let contact = ContactSnapshot::from(self.profiles.get_profile(&requester).await?);

        let request = self
            .runner
            .run("submit_request", move |tx| {
                let requester = requester.clone();
                let contact = contact.clone();
                Box::pin(async move {
                    let mut ride = Ride::load(tx, ride_id).await?;
                    if ride.owner_id == requester {
                        return Err(CoreError::InvalidState(format!(
                            "{} cannot request seats on their own ride",
                            requester
                        )));
                    }
                    if ride.status != RideStatus::Active {
                        return Err(CoreError::InvalidState(format!(
                            "ride {} is {} and not accepting requests",
                            ride.id,
                            ride.status.as_str()
                        )));
                    }
                    if seats_requested > ride.remaining_seats {
                        return Err(CoreError::CapacityExceeded {
                            requested: seats_requested,
                            remaining: ride.remaining_seats,
                        });
                    }

                    let pending: Vec<RideRequest> = tx
                        .query(
                            Collection::RideRequests,
                            &[
                                Filter::eq("rideId", ride_id.to_string()),
                                Filter::eq("requesterId", requester.as_str()),
                                Filter::eq("status", RequestStatus::Pending.as_str()),
                            ],
                        )
                        .await?;
                    if !pending.is_empty() {
                        return Err(CoreError::InvalidState(format!(
                            "{} already has a pending request on ride {}",
                            requester, ride_id
                        )));
                    }

                    let request = RideRequest::new(ride_id, requester, contact, seats_requested);
                    tx.create(Collection::RideRequests, &request.doc_id(), &request)?;
                    ride.hold_for_decision()?;
                    ride.save(tx)?;
                    Ok(request)
                })
            })
            .await?;

        info!(
            "Request {} for {} seats on ride {} submitted by {}",
            request.id, request.seats_requested, request.ride_id, request.requester_id
        );
        Ok(request)
    }

    pub async fn get_request(&self, request_id: Uuid) -> CoreResult<RideRequest> {
        self.runner
            .store()
            .get_document(Collection::RideRequests, &request_id.to_string())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("request {}", request_id)))?
            .decode()
    }

    /// All requests on a ride, newest first
    pub async fn requests_for_ride(&self, ride_id: Uuid) -> CoreResult<Vec<RideRequest>> {
        self.find(&[Filter::eq("rideId", ride_id.to_string())]).await
    }

    /// All requests a user has made, newest first
    pub async fn requests_by_user(&self, user_id: &UserId) -> CoreResult<Vec<RideRequest>> {
        self.find(&[Filter::eq("requesterId", user_id.as_str())]).await
    }

    /// Status of the user's most recent request on the ride
    pub async fn request_status(&self, ride_id: Uuid, user_id: &UserId) -> CoreResult<Option<RequestStatus>> {
        let requests = self
            .find(&[
                Filter::eq("rideId", ride_id.to_string()),
                Filter::eq("requesterId", user_id.as_str()),
            ])
            .await?;
        Ok(requests.first().map(|r| r.status))
    }

    pub async fn accepted_requests(&self, actor: &Actor) -> CoreResult<Vec<RideRequest>> {
        let user_id = actor.require()?;
        self.find(&[
            Filter::eq("requesterId", user_id.as_str()),
            Filter::eq("status", RequestStatus::Accepted.as_str()),
        ])
        .await
    }

    /// The owner's inbox: pending requests on rides the actor owns
    pub async fn pending_requests_for_my_rides(&self, actor: &Actor) -> CoreResult<Vec<RideRequest>> {
        let owner = actor.require()?;
        let rides = self
            .runner
            .store()
            .query_documents(Collection::Rides, &[Filter::eq("ownerId", owner.as_str())])
            .await?;
        if rides.is_empty() {
            return Ok(Vec::new());
        }

        self.find(&[
            Filter::one_of("rideId", rides.into_iter().map(|doc| doc.id)),
            Filter::eq("status", RequestStatus::Pending.as_str()),
        ])
        .await
    }

    async fn find(&self, filters: &[Filter]) -> CoreResult<Vec<RideRequest>> {
        let docs = self.runner.store().query_documents(Collection::RideRequests, filters).await?;
        let mut requests = docs.iter().map(|d| d.decode::<RideRequest>()).collect::<CoreResult<Vec<_>>>()?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }
}

#[async_trait]
impl SeatHolderIndex for RequestLedger {
    async fn rides_with_accepted_request(&self, user_id: &UserId) -> CoreResult<HashSet<Uuid>> {
        let accepted = self
            .find(&[
                Filter::eq("requesterId", user_id.as_str()),
                Filter::eq("status", RequestStatus::Accepted.as_str()),
            ])
            .await?;
        Ok(accepted.into_iter().map(|r| r.ride_id).collect())
    }
}

/// Pending requests on a deleted ride are rejected; decided ones stay as history.
#[async_trait]
impl DeletionCascade for RequestLedger {
    async fn on_ride_deleted(&self, tx: &mut Transaction, ride: &Ride) -> CoreResult<()> {
        let pending: Vec<RideRequest> = tx
            .query(
                Collection::RideRequests,
                &[
                    Filter::eq("rideId", ride.doc_id()),
                    Filter::eq("status", RequestStatus::Pending.as_str()),
                ],
            )
            .await?;

        for mut request in pending {
            request.decide(RequestStatus::Rejected)?;
            request.save(tx)?;
            info!("Request {} rejected: ride {} deleted", request.id, ride.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;
    use carshare_catalog::{NewRide, RideCatalog, VisibilityFilter};
    use carshare_core::{DocumentStore, MemoryStore, RetryPolicy};
    use carshare_shared::Masked;
    use chrono::{Duration, NaiveTime, Utc};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        catalog: RideCatalog,
        ledger: Arc<RequestLedger>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let runner = TransactionRunner::new(store.clone(), RetryPolicy::immediate(5));
        let ledger = Arc::new(RequestLedger::new(runner.clone(), ProfileDirectory::new(store.clone())));
        let catalog = RideCatalog::new(runner, VisibilityFilter::new(store.clone(), ledger.clone()))
            .with_cascade(ledger.clone());
        Fixture { store, catalog, ledger }
    }

    async fn offer(catalog: &RideCatalog, owner: &str, seats: u32) -> Ride {
        let new_ride = NewRide {
            date: Utc::now().date_naive() + Duration::days(2),
            time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            pickup: "Library".to_string(),
            total_seats: seats,
        };
        catalog.create_ride(&Actor::user(owner), new_ride).await.unwrap()
    }

    #[tokio::test]
    async fn test_submit_request_holds_ride() {
        let f = fixture();
        let ride = offer(&f.catalog, "owner", 3).await;
        f.ledger
            .profiles()
            .update_profile(
                &Actor::user("rider"),
                UserProfile {
                    name: "Rider".to_string(),
                    telephone: Masked("0700".to_string()),
                    email: Masked("rider@example.com".to_string()),
                },
            )
            .await
            .unwrap();

        let request = f.ledger.submit_request(ride.id, &Actor::user("rider"), 2).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.contact.name, "Rider");
        assert_eq!(request.contact.email.expose(), "rider@example.com");

        let ride = f.catalog.get_ride(ride.id).await.unwrap();
        assert_eq!(ride.status, RideStatus::PendingDecision);
        assert_eq!(ride.remaining_seats, 3);

        assert_eq!(
            f.ledger.request_status(ride.id, &UserId::from("rider")).await.unwrap(),
            Some(RequestStatus::Pending)
        );
        assert_eq!(f.ledger.request_status(ride.id, &UserId::from("nobody")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_submit_request_rejections() {
        let f = fixture();
        let ride = offer(&f.catalog, "owner", 2).await;

        let zero = f.ledger.submit_request(ride.id, &Actor::user("rider"), 0).await;
        assert!(matches!(zero, Err(CoreError::Validation(_))));

        let missing = f.ledger.submit_request(Uuid::new_v4(), &Actor::user("rider"), 1).await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        let own = f.ledger.submit_request(ride.id, &Actor::user("owner"), 1).await;
        assert!(matches!(own, Err(CoreError::InvalidState(_))));

        let too_many = f.ledger.submit_request(ride.id, &Actor::user("rider"), 3).await;
        assert_eq!(too_many, Err(CoreError::CapacityExceeded { requested: 3, remaining: 2 }));

        let anonymous = f.ledger.submit_request(ride.id, &Actor::anonymous(), 1).await;
        assert_eq!(anonymous, Err(CoreError::Unauthenticated));

        f.ledger.submit_request(ride.id, &Actor::user("rider"), 1).await.unwrap();
        let held = f.ledger.submit_request(ride.id, &Actor::user("second"), 1).await;
        assert!(matches!(held, Err(CoreError::InvalidState(_))));

        assert_eq!(f.store.len(Collection::RideRequests).await, 1);
    }

    #[tokio::test]
    async fn test_pending_inbox_and_queries() {
        let f = fixture();
        let mine = offer(&f.catalog, "owner", 2).await;
        let other = offer(&f.catalog, "someone", 2).await;

        let first = f.ledger.submit_request(mine.id, &Actor::user("rider"), 1).await.unwrap();
        f.ledger.submit_request(other.id, &Actor::user("rider"), 1).await.unwrap();

        let inbox = f.ledger.pending_requests_for_my_rides(&Actor::user("owner")).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, first.id);

        assert!(f.ledger.pending_requests_for_my_rides(&Actor::user("rider")).await.unwrap().is_empty());
        assert_eq!(f.ledger.requests_by_user(&UserId::from("rider")).await.unwrap().len(), 2);
        assert_eq!(f.ledger.requests_for_ride(mine.id).await.unwrap().len(), 1);
        assert!(f.ledger.accepted_requests(&Actor::user("rider")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_ride_rejects_pending_requests() {
        let f = fixture();
        let ride = offer(&f.catalog, "owner", 2).await;
        let request = f.ledger.submit_request(ride.id, &Actor::user("rider"), 1).await.unwrap();

        f.catalog.delete_ride(ride.id, &Actor::user("owner")).await.unwrap();

        let request = f.ledger.get_request(request.id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);
        assert!(request.decided_at.is_some());
        assert!(f.store.get_document(Collection::Rides, &ride.doc_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seat_holder_index() {
        let f = fixture();
        let ride = offer(&f.catalog, "owner", 2).await;
        let mut request = f.ledger.submit_request(ride.id, &Actor::user("rider"), 1).await.unwrap();

        assert!(f.ledger.rides_with_accepted_request(&UserId::from("rider")).await.unwrap().is_empty());

        request.decide(RequestStatus::Accepted).unwrap();
        f.store
            .put_document(Collection::RideRequests, &request.doc_id(), serde_json::to_value(&request).unwrap())
            .await
            .unwrap();

        let rides = f.ledger.rides_with_accepted_request(&UserId::from("rider")).await.unwrap();
        assert_eq!(rides, HashSet::from([ride.id]));
    }
}
