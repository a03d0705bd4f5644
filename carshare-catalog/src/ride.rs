use carshare_core::{Collection, CoreError, CoreResult, Owned, Transaction, UserId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ride status in the offer lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Active,
    PendingDecision,
    Dormant,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Active => "ACTIVE",
            RideStatus::PendingDecision => "PENDING_DECISION",
            RideStatus::Dormant => "DORMANT",
        }
    }
}

/// A published trip with seat capacity, owned by its creator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: Uuid,
    pub owner_id: UserId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub pickup: String,
    /// Fixed at creation
    pub total_seats: u32,
    pub remaining_seats: u32,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new ride offer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRide {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub pickup: String,
    pub total_seats: u32,
}

/// Owner edits. Seat counts are not editable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RidePatch {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub pickup: Option<String>,
}

impl RidePatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.time.is_none() && self.pickup.is_none()
    }
}

impl Ride {
    pub fn new(owner_id: UserId, new_ride: NewRide) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            date: new_ride.date,
            time: new_ride.time,
            pickup: new_ride.pickup.trim().to_string(),
            total_seats: new_ride.total_seats,
            remaining_seats: new_ride.total_seats,
            status: RideStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn doc_id(&self) -> String {
        self.id.to_string()
    }

    /// Load a ride inside a transaction, or `NotFound`
    pub async fn load(tx: &mut Transaction, ride_id: Uuid) -> CoreResult<Ride> {
        tx.get::<Ride>(Collection::Rides, &ride_id.to_string())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {}", ride_id)))
    }

    /// Buffer this ride as a write of the transaction
    pub fn save(&self, tx: &mut Transaction) -> CoreResult<()> {
        tx.put(Collection::Rides, &self.doc_id(), self)
    }

    pub fn departure(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn update_status(&mut self, new_status: RideStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Transition: Active → PendingDecision (a seat request arrived)
    pub fn hold_for_decision(&mut self) -> CoreResult<()> {
        if self.status != RideStatus::Active {
            return Err(CoreError::InvalidState(format!(
                "ride {} is {} and not accepting requests",
                self.id,
                self.status.as_str()
            )));
        }
        self.update_status(RideStatus::PendingDecision);
        Ok(())
    }

    /// Transition: PendingDecision → Active (request rejected), seats untouched
    pub fn release_hold(&mut self) {
        self.update_status(RideStatus::Active);
    }

    /// Transition on accept: takes `seats` off the remaining capacity and goes
    /// Dormant when nothing is left.
    pub fn consume_seats(&mut self, seats: u32) -> CoreResult<()> {
        if seats > self.remaining_seats {
            return Err(CoreError::CapacityExceeded {
                requested: seats,
                remaining: self.remaining_seats,
            });
        }

        self.remaining_seats -= seats;
        let next = if self.remaining_seats == 0 {
            RideStatus::Dormant
        } else {
            RideStatus::Active
        };
        self.update_status(next);
        Ok(())
    }

    /// Manual Active ↔ Dormant flip; seat counts are left alone
    pub fn toggle_dormancy(&mut self) -> CoreResult<RideStatus> {
        let next = match self.status {
            RideStatus::Active => RideStatus::Dormant,
            RideStatus::Dormant => RideStatus::Active,
            RideStatus::PendingDecision => {
                return Err(CoreError::InvalidState(format!(
                    "ride {} has a request awaiting decision",
                    self.id
                )))
            }
        };
        self.update_status(next);
        Ok(next)
    }

    pub fn apply_patch(&mut self, patch: RidePatch) {
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(time) = patch.time {
            self.time = time;
        }
        if let Some(pickup) = patch.pickup {
            self.pickup = pickup.trim().to_string();
        }
        self.updated_at = Utc::now();
    }

    pub fn seats_invariant_holds(&self) -> bool {
        self.total_seats >= 1 && self.remaining_seats <= self.total_seats
    }
}

impl Owned for Ride {
    fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    fn describe(&self) -> String {
        format!("ride {}", self.id)
    }
}
