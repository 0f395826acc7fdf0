//! `MailTransport` trait.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::forward::types::{OutgoingEnvelope, OutgoingMessage};

/// Delivers a fully assembled message to its envelope recipients.
///
/// The forwarding core never calls this itself; the invocation host does,
/// after assembly succeeded. Outcomes are reported, never retried here.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Send `message` using `envelope`. Returns a transport-specific receipt.
    async fn send(
        &self,
        envelope: &OutgoingEnvelope,
        message: &OutgoingMessage,
    ) -> Result<String, TransportError>;
}
