use async_trait::async_trait;
use carshare_shared::{PushMessage, RideConfirmationEmail};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Recipient has no address: {0}")]
    NoAddress(String),
}

/// Outbound email / push collaborator. Fire-and-forget from the engine's side.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, email: &RideConfirmationEmail) -> Result<(), NotifyError>;

    async fn send_push(&self, message: &PushMessage) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, email: &RideConfirmationEmail) -> Result<(), NotifyError> {
        info!(
            "Confirmation email for request {} ({:?}) to {} <{}>",
            email.request_id, email.role, email.to_name, email.to_email
        );
        Ok(())
    }

    async fn send_push(&self, message: &PushMessage) -> Result<(), NotifyError> {
        info!("Push to {}: {} - {}", message.recipient_id, message.title, message.body);
        Ok(())
    }
}
