//! SMTP relay transport via lettre.

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ConfigError, TransportError};
use crate::forward::types::{OutgoingEnvelope, OutgoingMessage};
use crate::transport::traits::MailTransport;

pub const SMTP_HOST: &str = "SmtpHost";
pub const SMTP_PORT: &str = "SmtpPort";
pub const SMTP_USERNAME: &str = "SmtpUsername";
pub const SMTP_PASSWORD: &str = "SmtpPassword";

const DEFAULT_SMTP_PORT: u16 = 587;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(SMTP_HOST)
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(SMTP_HOST.to_string()))?;

        let port = match lookup(SMTP_PORT) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(SMTP_PORT, format!("{raw:?}: {e}")))?,
            None => DEFAULT_SMTP_PORT,
        };

        Ok(Self {
            host,
            port,
            username: lookup(SMTP_USERNAME).unwrap_or_default(),
            password: SecretString::from(lookup(SMTP_PASSWORD).unwrap_or_default()),
        })
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// Sends through an authenticated SMTP relay (STARTTLS/TLS via lettre).
pub struct SmtpRelay {
    transport: SmtpTransport,
}

impl SmtpRelay {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let mut builder = SmtpTransport::relay(&config.host)
            .map_err(|e| TransportError::SendFailed(format!("SMTP relay error: {e}")))?
            .port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ));
        }

        tracing::info!(host = %config.host, port = config.port, "SMTP relay configured");
        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Convert an outgoing envelope into lettre's validated form.
pub fn lettre_envelope(envelope: &OutgoingEnvelope) -> Result<Envelope, TransportError> {
    let parse = |address: &str| {
        address
            .parse::<Address>()
            .map_err(|e| TransportError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })
    };

    let sender = parse(&envelope.sender)?;
    let recipients = envelope
        .recipients
        .iter()
        .map(|r| parse(r))
        .collect::<Result<Vec<_>, _>>()?;

    Envelope::new(Some(sender), recipients).map_err(|e| TransportError::InvalidAddress {
        address: envelope.recipients.join(", "),
        reason: e.to_string(),
    })
}

#[async_trait]
impl MailTransport for SmtpRelay {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(
        &self,
        envelope: &OutgoingEnvelope,
        message: &OutgoingMessage,
    ) -> Result<String, TransportError> {
        let lettre_envelope = lettre_envelope(envelope)?;
        let bytes = message.formatted();
        let transport = self.transport.clone();

        let response = tokio::task::spawn_blocking(move || transport.send_raw(&lettre_envelope, &bytes))
            .await
            .map_err(|e| TransportError::SendFailed(format!("SMTP send task panicked: {e}")))?
            .map_err(|e| TransportError::SendFailed(format!("SMTP send failed: {e}")))?;

        let receipt = response
            .message()
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            recipients = %envelope.recipients.join(", "),
            code = %response.code(),
            "Message relayed"
        );
        Ok(receipt)
    }
}
