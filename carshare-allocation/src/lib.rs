pub mod dispatch;
pub mod engine;
pub mod service;

pub use dispatch::NotificationDispatcher;
pub use engine::{AllocationEngine, Decision, DecisionOutcome};
pub use service::{EngineSettings, RideService};
