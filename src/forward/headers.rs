//! Outgoing header construction.
//!
//! Two strategies:
//! - `Resent`: prepend a `Resent-*` block and keep every original header,
//!   so the reader still sees the original `From`/`Date`/`Message-ID`.
//! - `Reenveloped`: a new header set sent from the infrastructure address,
//!   with the original sender kept in `Reply-To` and `X-Original-From`.

use chrono::{DateTime, Utc};

use crate::config::ForwarderConfig;
use crate::error::ForwardError;
use crate::forward::message::ParsedMessage;
use crate::forward::rules::Destination;
use crate::forward::types::{Header, is_content_header};

/// Provenance header injected when `AddHeader` is enabled.
pub const PROVENANCE_HEADER: &str = "X-Forward-Received";

/// Carries the original `From` in re-enveloped mode.
pub const ORIGINAL_FROM_HEADER: &str = "X-Original-From";

/// How the outgoing header set is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderStrategy {
    Resent,
    Reenveloped { sender: String },
}

impl HeaderStrategy {
    /// Resolve the strategy once from configuration.
    pub fn from_config(config: &ForwarderConfig) -> Result<Self, ForwardError> {
        if config.use_resent_header {
            return Ok(Self::Resent);
        }
        match &config.mail_from {
            Some(sender) => Ok(Self::Reenveloped {
                sender: sender.clone(),
            }),
            None => Err(ForwardError::MissingSenderConfiguration),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Resent => "resent",
            Self::Reenveloped { .. } => "reenveloped",
        }
    }
}

/// Builds the outgoing header list.
pub struct HeaderTransformer<'a> {
    strategy: &'a HeaderStrategy,
    add_provenance: bool,
    now: DateTime<Utc>,
}

impl<'a> HeaderTransformer<'a> {
    pub fn new(strategy: &'a HeaderStrategy, add_provenance: bool, now: DateTime<Utc>) -> Self {
        Self {
            strategy,
            add_provenance,
            now,
        }
    }

    /// Build headers for `original` addressed to `destination`.
    ///
    /// Content headers of the original (`Content-Type` and friends) are
    /// carried over; the assembler replaces them when the body changes.
    pub fn build(&self, original: &ParsedMessage<'_>, destination: &Destination) -> Vec<Header> {
        let mut headers = match self.strategy {
            HeaderStrategy::Resent => self.resent_headers(original, destination),
            HeaderStrategy::Reenveloped { sender } => {
                self.reenveloped_headers(original, destination, sender)
            }
        };

        if self.add_provenance {
            headers.insert(0, self.provenance_header(original));
        }
        headers
    }

    fn resent_headers(&self, original: &ParsedMessage<'_>, destination: &Destination) -> Vec<Header> {
        let mut headers = Vec::with_capacity(original.headers().len() + 4);
        if let Some(from) = original.header("From") {
            headers.push(Header::new("Resent-From", from));
        }
        headers.push(Header::new("Resent-To", destination.joined()));
        headers.push(Header::new("Resent-Date", self.now.to_rfc2822()));
        if let Some(id) = original.message_id() {
            headers.push(Header::new("Resent-Message-ID", id));
        }
        headers.extend(original.headers().iter().cloned());
        headers
    }

    fn reenveloped_headers(
        &self,
        original: &ParsedMessage<'_>,
        destination: &Destination,
        sender: &str,
    ) -> Vec<Header> {
        let mut headers = vec![
            Header::new("From", sender),
            Header::new("To", destination.joined()),
        ];

        let reply_to = original.header("Reply-To").or_else(|| original.header("From"));
        if let Some(reply_to) = reply_to {
            headers.push(Header::new("Reply-To", reply_to));
        }
        if let Some(from) = original.header("From") {
            headers.push(Header::new(ORIGINAL_FROM_HEADER, from));
        }
        if let Some(subject) = original.header("Subject") {
            headers.push(Header::new("Subject", subject));
        }
        headers.push(Header::new("Date", self.now.to_rfc2822()));
        headers.push(Header::new(
            "Message-ID",
            generate_message_id(original.id(), sender, self.now),
        ));

        headers.extend(
            original
                .headers()
                .iter()
                .filter(|h| is_content_header(h))
                .cloned(),
        );
        headers
    }

    /// `Received:`-style record of where the original was delivered.
    fn provenance_header(&self, original: &ParsedMessage<'_>) -> Header {
        let recipients = original
            .recipient_candidates()
            .iter()
            .map(|r| format!("<{r}>"))
            .collect::<Vec<_>>()
            .join(", ");
        let envelope_from = original.from_address().unwrap_or("");
        let arrived = original.received_at().unwrap_or(self.now);

        Header::new(
            PROVENANCE_HEADER,
            format!(
                "from <{envelope_from}> by mail-forwarder with id {}\r\n\tfor {}; {}",
                original.id(),
                if recipients.is_empty() { "<>".to_string() } else { recipients },
                arrived.to_rfc2822()
            ),
        )
    }
}

/// Deterministic `Message-ID` for a re-enveloped message.
pub fn generate_message_id(storage_id: &str, sender: &str, now: DateTime<Utc>) -> String {
    let domain = sender.rsplit_once('@').map_or("localhost", |(_, d)| d);
    let local: String = storage_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("<forward.{local}.{}@{domain}>", now.timestamp())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::forward::message::InboundMail;
    use crate::forward::types::find_header;

    const RAW: &str = "Received: from mx.example.org\r\n\
From: Alice <alice@example.org>\r\n\
To: test@domain.com\r\n\
Subject: Quarterly numbers\r\n\
Date: Tue, 29 Jun 2021 18:53:26 -0400\r\n\
Message-ID: <orig-1@example.org>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Hi\r\n";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn reenveloped() -> HeaderStrategy {
        HeaderStrategy::Reenveloped {
            sender: "sender@infra.com".into(),
        }
    }

    #[test]
    fn strategy_from_config() {
        let mut config = ForwarderConfig {
            use_resent_header: true,
            ..Default::default()
        };
        assert_eq!(HeaderStrategy::from_config(&config).unwrap(), HeaderStrategy::Resent);

        config.use_resent_header = false;
        assert!(matches!(
            HeaderStrategy::from_config(&config),
            Err(ForwardError::MissingSenderConfiguration)
        ));

        config.mail_from = Some("sender@infra.com".into());
        assert_eq!(HeaderStrategy::from_config(&config).unwrap(), reenveloped());
    }

    #[test]
    fn resent_mode_prepends_block_and_keeps_originals() {
        let inbound = InboundMail::new("id-1", RAW);
        let msg = ParsedMessage::parse(&inbound).unwrap();
        let strategy = HeaderStrategy::Resent;
        let headers = HeaderTransformer::new(&strategy, false, now())
            .build(&msg, &Destination::single("dest@example.com"));

        assert_eq!(headers[0], Header::new("Resent-From", "Alice <alice@example.org>"));
        assert_eq!(headers[1], Header::new("Resent-To", "dest@example.com"));
        assert_eq!(headers[2], Header::new("Resent-Date", "Fri, 15 Mar 2024 12:00:00 +0000"));
        assert_eq!(headers[3], Header::new("Resent-Message-ID", "<orig-1@example.org>"));
        assert_eq!(&headers[4..], msg.headers());
        assert_eq!(find_header(&headers, "From"), Some("Alice <alice@example.org>"));
    }

    #[test]
    fn reenveloped_mode_replaces_sender() {
        let inbound = InboundMail::new("id-1", RAW);
        let msg = ParsedMessage::parse(&inbound).unwrap();
        let strategy = reenveloped();
        let headers = HeaderTransformer::new(&strategy, false, now())
            .build(&msg, &Destination::single("dest@example.com"));

        assert_eq!(find_header(&headers, "From"), Some("sender@infra.com"));
        assert_eq!(find_header(&headers, "To"), Some("dest@example.com"));
        assert_eq!(find_header(&headers, "Reply-To"), Some("Alice <alice@example.org>"));
        assert_eq!(
            find_header(&headers, ORIGINAL_FROM_HEADER),
            Some("Alice <alice@example.org>")
        );
        assert_eq!(find_header(&headers, "Subject"), Some("Quarterly numbers"));
        assert_eq!(find_header(&headers, "Date"), Some("Fri, 15 Mar 2024 12:00:00 +0000"));
        assert_eq!(
            find_header(&headers, "Message-ID"),
            Some("<forward.id-1.1710504000@infra.com>")
        );
        assert_eq!(
            find_header(&headers, "Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(find_header(&headers, "Received").is_none());
        assert_eq!(headers.iter().filter(|h| h.is("From")).count(), 1);
    }

    #[test]
    fn reenveloped_prefers_original_reply_to() {
        let raw = "From: a@example.org\r\nReply-To: list@example.org\r\n\r\nx";
        let inbound = InboundMail::new("id-2", raw);
        let msg = ParsedMessage::parse(&inbound).unwrap();
        let strategy = reenveloped();
        let headers = HeaderTransformer::new(&strategy, false, now())
            .build(&msg, &Destination::single("dest@example.com"));
        assert_eq!(find_header(&headers, "Reply-To"), Some("list@example.org"));
    }

    #[test]
    fn provenance_header_goes_first_without_reordering() {
        let inbound = InboundMail::new("id-3", RAW)
            .with_envelope_recipients(vec!["test@domain.com".into()])
            .with_received_at(Utc.with_ymd_and_hms(2024, 3, 15, 11, 59, 0).unwrap());
        let msg = ParsedMessage::parse(&inbound).unwrap();
        let strategy = HeaderStrategy::Resent;
        let dest = Destination::single("dest@example.com");

        let plain = HeaderTransformer::new(&strategy, false, now()).build(&msg, &dest);
        let with = HeaderTransformer::new(&strategy, true, now()).build(&msg, &dest);

        assert!(with[0].is(PROVENANCE_HEADER));
        assert_eq!(&with[1..], &plain[..]);
        assert_eq!(
            with[0].value,
            "from <alice@example.org> by mail-forwarder with id id-3\r\n\
             \tfor <test@domain.com>; Fri, 15 Mar 2024 11:59:00 +0000"
        );
    }

    #[test]
    fn message_id_is_sanitized() {
        assert_eq!(
            generate_message_id("a/b c", "x@infra.com", now()),
            "<forward.a-b-c.1710504000@infra.com>"
        );
        assert_eq!(
            generate_message_id("id", "no-domain", now()),
            "<forward.id.1710504000@localhost>"
        );
    }
}
