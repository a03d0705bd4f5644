use carshare_core::{Actor, Collection, CoreError, CoreResult, DocumentStore, UserId};
use std::sync::Arc;
use tracing::info;

use crate::models::UserProfile;

/// Contact profiles, keyed by user id
#[derive(Clone)]
pub struct ProfileDirectory {
    store: Arc<dyn DocumentStore>,
}

impl ProfileDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// A user without a stored profile reads as a blank one.
    pub async fn get_profile(&self, user_id: &UserId) -> CoreResult<UserProfile> {
        match self.store.get_document(Collection::Users, user_id.as_str()).await? {
            Some(doc) => doc.decode(),
            None => Ok(UserProfile::default()),
        }
    }

    /// Replace the actor's own profile
    pub async fn update_profile(&self, actor: &Actor, profile: UserProfile) -> CoreResult<UserProfile> {
        let user_id = actor.require()?;
        if profile.name.trim().is_empty() {
            return Err(CoreError::Validation("name is required".to_string()));
        }

        let profile = UserProfile {
            name: profile.name.trim().to_string(),
            telephone: profile.telephone.into_inner().trim().to_string().into(),
            email: profile.email.into_inner().trim().to_string().into(),
        };
        self.store
            .put_document(Collection::Users, user_id.as_str(), serde_json::to_value(&profile)?)
            .await?;

        info!("Profile updated for {}", user_id);
        Ok(profile)
    }
}
