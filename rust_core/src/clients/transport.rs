use crate::error::DeliveryError;
use async_trait::async_trait;

/// Delivers one text message to one recipient.
///
/// Errors must distinguish a recipient that is gone for good
/// ([`DeliveryError::Terminal`]) from everything else.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<(), DeliveryError>;
}
