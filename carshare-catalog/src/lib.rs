pub mod ride;
pub mod catalog;
pub mod visibility;

pub use ride::{NewRide, Ride, RidePatch, RideStatus};
pub use catalog::{DeletionCascade, RideCatalog, DEFAULT_MAX_SEATS_PER_RIDE};
pub use visibility::{SeatHolderIndex, ViewContext, VisibilityFilter};
