#![allow(dead_code)]

use async_trait::async_trait;
use carshare_allocation::{EngineSettings, RideService};
use carshare_catalog::{NewRide, Ride};
use carshare_core::{Actor, MemoryStore, Notifier, NotifyError, RetryPolicy};
use carshare_shared::{PushMessage, RideConfirmationEmail};
use chrono::{Duration, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Email(RideConfirmationEmail),
    Push(PushMessage),
}

/// Forwards every delivered notification to a channel
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Sent>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_email(&self, email: &RideConfirmationEmail) -> Result<(), NotifyError> {
        let _ = self.tx.send(Sent::Email(email.clone()));
        Ok(())
    }

    async fn send_push(&self, message: &PushMessage) -> Result<(), NotifyError> {
        let _ = self.tx.send(Sent::Push(message.clone()));
        Ok(())
    }
}

/// Every delivery fails
pub struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn send_email(&self, _email: &RideConfirmationEmail) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("mail relay unreachable".to_string()))
    }

    async fn send_push(&self, _message: &PushMessage) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("push gateway unreachable".to_string()))
    }
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        transactions: RetryPolicy::new(20, StdDuration::from_millis(1), StdDuration::from_millis(10)),
        notifications: RetryPolicy::immediate(3),
        ..EngineSettings::default()
    }
}

pub fn service_with(notifier: Arc<dyn Notifier>) -> (RideService, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    (RideService::new(store.clone(), notifier, settings()), store)
}

pub fn new_ride(seats: u32) -> NewRide {
    NewRide {
        date: Utc::now().date_naive() + Duration::days(3),
        time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        pickup: "Market cross".to_string(),
        total_seats: seats,
    }
}

pub async fn offer(service: &RideService, owner: &str, seats: u32) -> Ride {
    service.create_ride(&Actor::user(owner), new_ride(seats)).await.unwrap()
}

pub fn assert_seats_invariant(ride: &Ride) {
    assert!(ride.remaining_seats <= ride.total_seats, "ride {} has {}/{} seats", ride.id, ride.remaining_seats, ride.total_seats);
    assert!(ride.total_seats >= 1);
}
