//! Invocation host — one arrival event in, one forwarded message out.
//!
//! Flow:
//! 1. `MessageStore::fetch()` — raw bytes for the event's message id
//! 2. `MessageAssembler::assemble()` — pure transformation
//! 3. `MailTransport::send()` — delivery
//!
//! On a transport failure an error notice goes to the same destination,
//! once. Nothing is queued or retried.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::ForwarderConfig;
use crate::error::Error;
use crate::forward::assembler::MessageAssembler;
use crate::store::MessageStore;
use crate::transport::MailTransport;

/// Notification that a message was captured by the ingestion path.
#[derive(Debug, Clone)]
pub struct ArrivalEvent {
    /// Storage identifier of the raw message.
    pub message_id: String,
    /// Envelope recipients reported by the receiving server, if known.
    pub recipients: Vec<String>,
}

impl ArrivalEvent {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            recipients: Vec::new(),
        }
    }

    pub fn with_recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = recipients;
        self
    }
}

/// Wires the storage and transport collaborators around the forwarding core.
pub struct Forwarder {
    config: Arc<ForwarderConfig>,
    store: Arc<dyn MessageStore>,
    transport: Arc<dyn MailTransport>,
}

impl Forwarder {
    pub fn new(
        config: Arc<ForwarderConfig>,
        store: Arc<dyn MessageStore>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
        }
    }

    /// Forward the message named by `event`. Returns the transport receipt.
    pub async fn handle(&self, event: &ArrivalEvent) -> Result<String, Error> {
        info!(id = %event.message_id, store = self.store.name(), "Received message");

        let inbound = self
            .store
            .fetch(&event.message_id)
            .await?
            .with_envelope_recipients(event.recipients.clone());

        let assembler = MessageAssembler::new(&self.config, &self.config.email_list);
        let (message, envelope) = assembler.assemble(&inbound, Utc::now()).inspect_err(|e| {
            error!(id = %event.message_id, error = %e, "Failed to assemble forwarded message");
        })?;

        match self.transport.send(&envelope, &message).await {
            Ok(receipt) => {
                info!(
                    id = %event.message_id,
                    transport = self.transport.name(),
                    receipt = %receipt,
                    "Message forwarded"
                );
                Ok(receipt)
            }
            Err(e) => {
                error!(id = %event.message_id, error = %e, "Failed to send forwarded message");

                match assembler.error_notice(&inbound, &envelope, &e.to_string(), Utc::now()) {
                    Ok((notice, notice_envelope)) => {
                        if let Err(notice_err) = self.transport.send(&notice_envelope, &notice).await {
                            warn!(
                                id = %event.message_id,
                                error = %notice_err,
                                "Failed to send error notice"
                            );
                        }
                    }
                    Err(notice_err) => {
                        warn!(id = %event.message_id, error = %notice_err, "Failed to build error notice");
                    }
                }
                Err(e.into())
            }
        }
    }
}
