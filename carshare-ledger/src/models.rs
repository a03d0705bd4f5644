use carshare_core::{Collection, CoreError, CoreResult, Transaction, UserId};
use carshare_shared::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request status in the lifecycle. Accepted and Rejected are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// Contact details a user keeps on file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub telephone: Masked<String>,
    #[serde(default)]
    pub email: Masked<String>,
}

/// Requester contact copied onto the request when it is submitted.
/// Later profile edits do not change it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactSnapshot {
    pub name: String,
    pub telephone: Masked<String>,
    pub email: Masked<String>,
}

impl From<UserProfile> for ContactSnapshot {
    fn from(profile: UserProfile) -> Self {
        Self {
            name: profile.name,
            telephone: profile.telephone,
            email: profile.email,
        }
    }
}

/// A user's request for seats on one ride
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub requester_id: UserId,
    pub contact: ContactSnapshot,
    pub seats_requested: u32,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl RideRequest {
    pub fn new(ride_id: Uuid, requester_id: UserId, contact: ContactSnapshot, seats_requested: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id,
            requester_id,
            contact,
            seats_requested,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn doc_id(&self) -> String {
        self.id.to_string()
    }

    pub async fn load(tx: &mut Transaction, request_id: Uuid) -> CoreResult<RideRequest> {
        tx.get::<RideRequest>(Collection::RideRequests, &request_id.to_string())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("request {}", request_id)))
    }

    pub fn save(&self, tx: &mut Transaction) -> CoreResult<()> {
        tx.put(Collection::RideRequests, &self.doc_id(), self)
    }

    /// Transition: Pending → Accepted | Rejected, exactly once
    pub fn decide(&mut self, outcome: RequestStatus) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "request {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        if outcome == RequestStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "request {} cannot be decided as PENDING",
                self.id
            )));
        }

        self.status = outcome;
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}
