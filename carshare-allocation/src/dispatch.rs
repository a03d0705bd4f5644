use carshare_catalog::Ride;
use carshare_core::{Notifier, NotifyError, RetryPolicy};
use carshare_ledger::{ProfileDirectory, RideRequest, UserProfile};
use carshare_shared::{Masked, PushMessage, RecipientRole, RideConfirmationEmail};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const ACCEPTED_PUSH_TITLE: &str = "Ride request accepted";

/// Post-commit side effects of an accepted request.
///
/// Runs detached from the caller. Each message is retried on its own; a
/// message that keeps failing is logged and dropped.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    profiles: ProfileDirectory,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, profiles: ProfileDirectory, policy: RetryPolicy) -> Self {
        Self { notifier, profiles, policy }
    }

    /// Spawn delivery of both confirmation emails and the rider push
    pub fn dispatch_acceptance(&self, ride: Ride, request: RideRequest) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.deliver_acceptance(&ride, &request).await })
    }

    pub async fn deliver_acceptance(&self, ride: &Ride, request: &RideRequest) {
        let owner = match self.profiles.get_profile(&ride.owner_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Owner profile for ride {} unavailable, emailing without it: {}", ride.id, e);
                UserProfile::default()
            }
        };
        let rider = &request.contact;

        let owner_email = confirmation(
            ride,
            request,
            RecipientRole::Owner,
            (&owner.name, &owner.email),
            (&rider.name, &rider.email),
        );
        let rider_email = confirmation(
            ride,
            request,
            RecipientRole::Rider,
            (&rider.name, &rider.email),
            (&owner.name, &owner.email),
        );
        let push = acceptance_push(ride, request);

        tokio::join!(
            self.send_email(owner_email),
            self.send_email(rider_email),
            self.with_retry("push", &push.recipient_id, || self.notifier.send_push(&push)),
        );
    }

    async fn send_email(&self, email: RideConfirmationEmail) -> bool {
        if email.to_email.is_blank() {
            warn!("No email address for the {:?} of request {}; skipping confirmation", email.role, email.request_id);
            return false;
        }
        let target = format!("{:?} of request {}", email.role, email.request_id);
        self.with_retry("email", &target, || self.notifier.send_email(&email)).await
    }

    async fn with_retry<F, Fut>(&self, kind: &str, target: &str, mut send: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), NotifyError>>,
    {
        let mut attempt = 1;
        loop {
            match send().await {
                Ok(()) => {
                    debug!("Delivered {} to {} (attempt {})", kind, target, attempt);
                    return true;
                }
                Err(NotifyError::NoAddress(reason)) => {
                    warn!("Dropping {} to {}: {}", kind, target, reason);
                    return false;
                }
                Err(e) if self.policy.allows_retry(attempt) => {
                    let delay = self.policy.backoff(attempt);
                    debug!("{} to {} failed (attempt {}): {}; retrying in {:?}", kind, target, attempt, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Giving up on {} to {} after {} attempts: {}", kind, target, attempt, e);
                    return false;
                }
            }
        }
    }
}

fn confirmation(
    ride: &Ride,
    request: &RideRequest,
    role: RecipientRole,
    to: (&String, &Masked<String>),
    counterpart: (&String, &Masked<String>),
) -> RideConfirmationEmail {
    RideConfirmationEmail {
        ride_id: ride.id,
        request_id: request.id,
        role,
        to_name: to.0.clone(),
        to_email: to.1.clone(),
        counterpart_name: counterpart.0.clone(),
        counterpart_email: counterpart.1.clone(),
        date: ride.date.format("%Y-%m-%d").to_string(),
        time: ride.time.format("%H:%M").to_string(),
        pickup: ride.pickup.clone(),
        seats: request.seats_requested,
    }
}

fn acceptance_push(ride: &Ride, request: &RideRequest) -> PushMessage {
    let seats = match request.seats_requested {
        1 => "1 seat".to_string(),
        n => format!("{} seats", n),
    };
    PushMessage {
        recipient_id: request.requester_id.to_string(),
        title: ACCEPTED_PUSH_TITLE.to_string(),
        body: format!(
            "{} confirmed for {} at {} from {}",
            seats,
            ride.date.format("%Y-%m-%d"),
            ride.time.format("%H:%M"),
            ride.pickup
        ),
        tag: format!("ride-{}", ride.id),
    }
}
