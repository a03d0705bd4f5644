use async_trait::async_trait;

use crate::{CoreError, CoreResult, UserId};

/// The caller of an engine operation, if the identity provider knows one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor(Option<UserId>);

impl Actor {
    pub fn user(id: impl Into<UserId>) -> Self {
        Self(Some(id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn id(&self) -> Option<&UserId> {
        self.0.as_ref()
    }

    /// The caller's id, or `Unauthenticated`
    pub fn require(&self) -> CoreResult<&UserId> {
        self.0.as_ref().ok_or(CoreError::Unauthenticated)
    }

    pub fn is(&self, user: &UserId) -> bool {
        self.0.as_ref() == Some(user)
    }

    pub async fn resolve(identity: &dyn IdentityProvider) -> Self {
        match identity.current_user_id().await {
            Ok(id) => Self::user(id),
            Err(_) => Self::anonymous(),
        }
    }
}

/// Identity collaborator. Session handling lives behind it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fails with `Unauthenticated` when nobody is signed in.
    async fn current_user_id(&self) -> CoreResult<UserId>;
}

/// Fixed identity, for hosts that authenticate upstream and for tests
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    pub fn signed_in(id: impl Into<UserId>) -> Self {
        Self(Some(id.into()))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user_id(&self) -> CoreResult<UserId> {
        self.0.clone().ok_or(CoreError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_actor() {
        let actor = Actor::resolve(&StaticIdentity::signed_in("alice")).await;
        assert_eq!(actor.require().unwrap().as_str(), "alice");
        assert!(actor.is(&UserId::from("alice")));

        let nobody = Actor::resolve(&StaticIdentity::signed_out()).await;
        assert_eq!(nobody.require(), Err(CoreError::Unauthenticated));
        assert!(nobody.id().is_none());
    }
}
