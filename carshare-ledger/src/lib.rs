pub mod models;
pub mod profile;
pub mod ledger;

pub use models::{ContactSnapshot, RequestStatus, RideRequest, UserProfile};
pub use profile::ProfileDirectory;
pub use ledger::RequestLedger;
