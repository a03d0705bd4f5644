use carshare_catalog::Ride;
use carshare_core::{assert_owner, Actor, CoreError, CoreResult, TransactionRunner};
use carshare_ledger::{RequestLedger, RequestStatus, RideRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::dispatch::NotificationDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accept,
    Reject,
}

/// Committed state of the ride and request after a decision
#[derive(Debug)]
pub struct DecisionOutcome {
    pub ride: Ride,
    pub request: RideRequest,
    /// Set after an accept; completes once every notification was delivered or dropped.
    pub notifications: Option<JoinHandle<()>>,
}

/// Atomic transitions across a ride and its requests
#[derive(Clone)]
pub struct AllocationEngine {
    runner: TransactionRunner,
    ledger: Arc<RequestLedger>,
    dispatcher: NotificationDispatcher,
}

impl AllocationEngine {
    pub fn new(runner: TransactionRunner, ledger: Arc<RequestLedger>, dispatcher: NotificationDispatcher) -> Self {
        Self { runner, ledger, dispatcher }
    }

    pub async fn submit_request(&self, ride_id: Uuid, actor: &Actor, seats_requested: u32) -> CoreResult<RideRequest> {
        self.ledger.submit_request(ride_id, actor, seats_requested).await
    }

    /// Accept or reject a pending request as the ride owner.
    ///
    /// Accept consumes the requested seats and leaves the ride Dormant when
    /// none remain, Active otherwise. Reject returns the ride to Active with
    /// seats unchanged. Notifications go out only after the commit.
    pub async fn decide(&self, request_id: Uuid, decision: Decision, actor: &Actor) -> CoreResult<DecisionOutcome> {
        actor.require()?;

        let actor = actor.clone();
        let (ride, request) = self
            .runner
            .run("decide", move |tx| {
                let actor = actor.clone();
                Box::pin(async move {
                    let mut request = RideRequest::load(tx, request_id).await?;
                    let mut ride = Ride::load(tx, request.ride_id).await?;
                    assert_owner(&ride, &actor)?;

                    if request.status != RequestStatus::Pending {
                        return Err(CoreError::InvalidState(format!(
                            "request {} is already {}",
                            request.id,
                            request.status.as_str()
                        )));
                    }

                    match decision {
                        Decision::Accept => {
                            ride.consume_seats(request.seats_requested)?;
                            request.decide(RequestStatus::Accepted)?;
                        }
                        Decision::Reject => {
                            ride.release_hold();
                            request.decide(RequestStatus::Rejected)?;
                        }
                    }

                    ride.save(tx)?;
                    request.save(tx)?;
                    Ok((ride, request))
                })
            })
            .await?;

        info!(
            "Request {} {}; ride {} is {} with {}/{} seats left",
            request.id,
            request.status.as_str(),
            ride.id,
            ride.status.as_str(),
            ride.remaining_seats,
            ride.total_seats
        );

        let notifications = match decision {
            Decision::Accept => Some(self.dispatcher.dispatch_acceptance(ride.clone(), request.clone())),
            Decision::Reject => None,
        };

        Ok(DecisionOutcome { ride, request, notifications })
    }
}
