use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pii::Masked;

/// Which side of an accepted ride a confirmation email is addressed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Owner,
    Rider,
}

/// Confirmation email sent to each party once a seat request is accepted.
/// Template rendering is left to the delivery side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideConfirmationEmail {
    pub ride_id: Uuid,
    pub request_id: Uuid,
    pub role: RecipientRole,
    pub to_name: String,
    pub to_email: Masked<String>,
    pub counterpart_name: String,
    pub counterpart_email: Masked<String>,
    pub date: String,
    pub time: String,
    pub pickup: String,
    pub seats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    pub recipient_id: String,
    pub title: String,
    pub body: String,
    /// Collapse key so repeated updates about one ride replace each other on the device
    pub tag: String,
}
