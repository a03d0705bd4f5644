use tracing::warn;

use crate::identity::Actor;
use crate::{CoreError, CoreResult, UserId};

/// A resource that exactly one user may mutate
pub trait Owned {
    fn owner_id(&self) -> &UserId;

    /// Short label for error messages, e.g. `ride 1f0c...`
    fn describe(&self) -> String;
}

/// The one ownership check used by every owner-only operation.
///
/// Absent actor is `Unauthenticated`; any other user is `Unauthorized`.
pub fn assert_owner<'a, R: Owned + ?Sized>(resource: &R, actor: &'a Actor) -> CoreResult<&'a UserId> {
    let user = actor.require()?;
    if resource.owner_id() != user {
        warn!("User {} denied access to {}", user, resource.describe());
        return Err(CoreError::Unauthorized(format!(
            "{} belongs to another user",
            resource.describe()
        )));
    }
    Ok(user)
}
