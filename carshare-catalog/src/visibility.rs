use async_trait::async_trait;
use carshare_core::{Actor, Collection, CoreResult, DocumentStore, Filter, UserId};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::ride::{Ride, RideStatus};

/// Which listing the viewer is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewContext {
    /// Rides the viewer could join; their own offers are left out.
    Discover,
    All,
}

/// Lookup of rides on which a user holds an accepted seat
#[async_trait]
pub trait SeatHolderIndex: Send + Sync {
    async fn rides_with_accepted_request(&self, user_id: &UserId) -> CoreResult<HashSet<Uuid>>;
}

/// Read-side policy deciding which rides a viewer may see
#[derive(Clone)]
pub struct VisibilityFilter {
    store: Arc<dyn DocumentStore>,
    seat_holders: Arc<dyn SeatHolderIndex>,
}

impl VisibilityFilter {
    pub fn new(store: Arc<dyn DocumentStore>, seat_holders: Arc<dyn SeatHolderIndex>) -> Self {
        Self { store, seat_holders }
    }

    pub async fn list_visible(&self, viewer: &Actor, context: ViewContext) -> CoreResult<Vec<Ride>> {
        self.list_visible_as_of(viewer, context, Utc::now().date_naive()).await
    }

    /// Rides dated `today` or later that `viewer` may see, ordered by departure
    pub async fn list_visible_as_of(
        &self,
        viewer: &Actor,
        context: ViewContext,
        today: NaiveDate,
    ) -> CoreResult<Vec<Ride>> {
        let viewer_id = viewer.require()?;

        let docs = self
            .store
            .query_documents(Collection::Rides, &[Filter::gte("date", today.to_string())])
            .await?;
        let rides = docs.iter().map(|d| d.decode::<Ride>()).collect::<CoreResult<Vec<_>>>()?;

        // Only dormant rides need the seat-holder lookup
        let accepted = if rides.iter().any(|r| r.status == RideStatus::Dormant) {
            self.seat_holders.rides_with_accepted_request(viewer_id).await?
        } else {
            HashSet::new()
        };

        let mut visible: Vec<Ride> = rides
            .into_iter()
            .filter(|ride| is_visible(ride, viewer_id, context, &accepted))
            .collect();
        visible.sort_by_key(|r| r.departure());

        debug!("{} rides visible to {} ({:?})", visible.len(), viewer_id, context);
        Ok(visible)
    }
}

/// Visibility rule for one ride. `accepted` holds the rides on which the
/// viewer has an accepted request.
pub fn is_visible(ride: &Ride, viewer: &UserId, context: ViewContext, accepted: &HashSet<Uuid>) -> bool {
    if context == ViewContext::Discover && &ride.owner_id == viewer {
        return false;
    }

    match ride.status {
        RideStatus::Active | RideStatus::PendingDecision => true,
        RideStatus::Dormant => accepted.contains(&ride.id),
    }
}
