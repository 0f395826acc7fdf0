//! End-to-end forwarding transformation.
//!
//! parse → loop guard → rule match → headers → body → envelope.
//!
//! Pure: the transformation time is an input and nothing is performed
//! outside the return value, so identical inputs give identical bytes.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::ForwarderConfig;
use crate::error::ForwardError;
use crate::forward::attachment::{AttachmentPacker, AttachmentPart, encode_for_smtp};
use crate::forward::headers::{HeaderStrategy, HeaderTransformer, generate_message_id};
use crate::forward::message::{InboundMail, ParsedMessage};
use crate::forward::rules::{RuleMatcher, RuleTable};
use crate::forward::types::{Header, OutgoingEnvelope, OutgoingMessage, is_content_header};

/// Text used when the original has no readable text part.
pub const BODY_PLACEHOLDER: &str = "The original message is attached.";

const MULTIPART_PREAMBLE: &str = "This is a multi-part message in MIME format.";

const MIXED_BOUNDARY_PREFIX: &str = "=_forward_";
const ALTERNATIVE_BOUNDARY_PREFIX: &str = "=_alternative_";

/// Forwarding orchestrator. Holds only shared read-only configuration.
pub struct MessageAssembler<'a> {
    config: &'a ForwarderConfig,
    rules: &'a RuleTable,
}

impl<'a> MessageAssembler<'a> {
    pub fn new(config: &'a ForwarderConfig, rules: &'a RuleTable) -> Self {
        Self { config, rules }
    }

    /// Build the outgoing message and its envelope for one inbound message.
    pub fn assemble(
        &self,
        inbound: &InboundMail,
        now: DateTime<Utc>,
    ) -> Result<(OutgoingMessage, OutgoingEnvelope), ForwardError> {
        let original = ParsedMessage::parse(inbound)?;
        self.check_forward_loop(&original)?;

        let destination = RuleMatcher::new(self.rules).resolve(&original)?;
        let strategy = HeaderStrategy::from_config(self.config)?;

        let mut headers =
            HeaderTransformer::new(&strategy, self.config.add_header, now).build(&original, destination);

        let body = if self.config.use_eml_attachment {
            let attachment = AttachmentPacker::new(self.config).pack(&original);
            let readable = readable_part(&original, self.config.add_header);
            let (content_headers, body) = multipart_mixed(original.id(), &readable, &attachment);
            replace_content_headers(&mut headers, content_headers);
            debug!(
                id = %original.id(),
                filename = %attachment.filename,
                encoding = attachment.encoding.as_str(),
                "Packed original message as attachment"
            );
            body
        } else {
            original.raw_body().to_vec()
        };

        let sender = match &strategy {
            HeaderStrategy::Reenveloped { sender } => sender.clone(),
            HeaderStrategy::Resent => original
                .from_address()
                .ok_or_else(|| {
                    ForwardError::MalformedMessage(
                        "no From address to use as envelope sender".into(),
                    )
                })?
                .to_string(),
        };
        let envelope = OutgoingEnvelope {
            sender,
            recipients: destination.addresses().to_vec(),
        };

        info!(
            id = %original.id(),
            strategy = strategy.label(),
            destination = %destination,
            attachment = self.config.use_eml_attachment,
            "Assembled forwarded message"
        );

        Ok((OutgoingMessage::new(headers, body), envelope))
    }

    /// Build a notice telling the destination a forward could not be delivered.
    ///
    /// Sent from the configured sending address to the recipients of the
    /// failed forward.
    pub fn error_notice(
        &self,
        inbound: &InboundMail,
        failed: &OutgoingEnvelope,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(OutgoingMessage, OutgoingEnvelope), ForwardError> {
        let original = ParsedMessage::parse(inbound)?;
        let sender = self
            .config
            .mail_from
            .clone()
            .ok_or(ForwardError::MissingSenderConfiguration)?;

        let mut text = String::from("FORWARD EMAIL ERROR ! This email cannot be forwarded !\r\n");
        text.push_str(&format!("ERROR : {error}\r\n"));
        text.push_str(&forward_banner(&original));

        let mut html = String::from("FORWARD EMAIL ERROR ! This email cannot be forwarded !<br>\r\n");
        html.push_str(&format!("ERROR : {}<br>\r\n", escape_html(error)));
        html.push_str(&forward_banner_html(&original));

        let (content_headers, body) = alternative(original.id(), &text, &html);

        let subject = original.header("Subject").unwrap_or("");
        let mut headers = vec![
            Header::new("From", sender.clone()),
            Header::new("To", failed.recipients.join(", ")),
            Header::new("Subject", format!("ERROR {subject}")),
            Header::new("Date", now.to_rfc2822()),
            Header::new(
                "Message-ID",
                generate_message_id(&format!("{}.error", original.id()), &sender, now),
            ),
            Header::new("MIME-Version", "1.0"),
        ];
        headers.extend(content_headers);

        let envelope = OutgoingEnvelope {
            sender,
            recipients: failed.recipients.clone(),
        };
        Ok((OutgoingMessage::new(headers, body), envelope))
    }

    /// Refuse messages only addressed to the forwarder itself.
    ///
    /// These are typically auto-replies bouncing back to the sending address.
    fn check_forward_loop(&self, original: &ParsedMessage<'_>) -> Result<(), ForwardError> {
        let Some(own) = self.config.mail_from.as_deref() else {
            return Ok(());
        };
        let candidates = original.recipient_candidates();
        if !candidates.is_empty() && candidates.iter().all(|c| c.eq_ignore_ascii_case(own)) {
            return Err(ForwardError::ForwardLoop {
                address: own.to_string(),
            });
        }
        Ok(())
    }
}

/// Convenience wrapper around `MessageAssembler::assemble`.
pub fn assemble(
    inbound: &InboundMail,
    config: &ForwarderConfig,
    rules: &RuleTable,
    now: DateTime<Utc>,
) -> Result<(OutgoingMessage, OutgoingEnvelope), ForwardError> {
    MessageAssembler::new(config, rules).assemble(inbound, now)
}

// ── Body construction ───────────────────────────────────────────────

/// Summary of the original message, shown above forwarded content.
pub fn forward_banner(original: &ParsedMessage<'_>) -> String {
    banner_lines(original)
        .iter()
        .map(|line| format!("{line}\r\n"))
        .collect::<String>()
        + "\r\n"
}

/// HTML rendering of `forward_banner`, every field escaped.
pub fn forward_banner_html(original: &ParsedMessage<'_>) -> String {
    banner_lines(original)
        .iter()
        .map(|line| format!("{}<br>\r\n", escape_html(line)))
        .collect::<String>()
        + "<br>\r\n"
}

fn banner_lines(original: &ParsedMessage<'_>) -> [String; 5] {
    let from = match (original.from_display(), original.from_address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        _ => original.header("From").unwrap_or("").to_string(),
    };
    [
        "________________________________".to_string(),
        format!("From : {from}"),
        format!("Date : {}", original.date().unwrap_or("")),
        format!("To : {}", original.header_recipients().join(", ")),
        format!("Subject : {}", original.subject().unwrap_or("")),
    ]
}

fn escape_html(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// The human-readable part shown before the attachment.
///
/// With the banner enabled this is a `multipart/alternative` carrying plain
/// and HTML renderings; otherwise a single `text/plain` part.
fn readable_part(original: &ParsedMessage<'_>, with_banner: bool) -> (Vec<Header>, Vec<u8>) {
    let body = match original.text_body() {
        Some(body) if !body.trim().is_empty() => to_crlf(body),
        _ => BODY_PLACEHOLDER.to_string(),
    };
    if !with_banner {
        return text_part(&body, "plain");
    }

    let text = forward_banner(original) + &body;
    let html_body = body
        .split("\r\n")
        .map(escape_html)
        .collect::<Vec<_>>()
        .join("<br>\r\n");
    let html = forward_banner_html(original) + &html_body;
    alternative(original.id(), &text, &html)
}

/// Normalize line endings to CRLF.
fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// A UTF-8 `text/<subtype>` part: its content headers and encoded body.
fn text_part(text: &str, subtype: &str) -> (Vec<Header>, Vec<u8>) {
    let (encoding, body) = encode_for_smtp(text.as_bytes());
    let headers = vec![
        Header::new("Content-Type", format!("text/{subtype}; charset=\"utf-8\"")),
        Header::new("Content-Transfer-Encoding", encoding.as_str()),
    ];
    (headers, body)
}

/// `multipart/alternative` with plain text first and HTML second.
fn alternative(id: &str, text: &str, html: &str) -> (Vec<Header>, Vec<u8>) {
    let (text_headers, text_body) = text_part(text, "plain");
    let (html_headers, html_body) = text_part(html, "html");
    let (content_type, body) = multipart(
        "alternative",
        ALTERNATIVE_BOUNDARY_PREFIX,
        id,
        None,
        &[
            (text_headers.as_slice(), text_body.as_slice()),
            (html_headers.as_slice(), html_body.as_slice()),
        ],
    );
    (vec![content_type], body)
}

/// `multipart/mixed` body with the readable part first and the original attached.
fn multipart_mixed(
    id: &str,
    readable: &(Vec<Header>, Vec<u8>),
    attachment: &AttachmentPart,
) -> (Vec<Header>, Vec<u8>) {
    let (content_type, body) = multipart(
        "mixed",
        MIXED_BOUNDARY_PREFIX,
        id,
        Some(MULTIPART_PREAMBLE),
        &[
            (readable.0.as_slice(), readable.1.as_slice()),
            (attachment.headers.as_slice(), attachment.body.as_slice()),
        ],
    );
    (vec![Header::new("MIME-Version", "1.0"), content_type], body)
}

fn multipart(
    subtype: &str,
    boundary_prefix: &str,
    id: &str,
    preamble: Option<&str>,
    parts: &[(&[Header], &[u8])],
) -> (Header, Vec<u8>) {
    let bodies: Vec<&[u8]> = parts.iter().map(|(_, body)| *body).collect();
    let boundary = choose_boundary(boundary_prefix, id, &bodies);

    let mut body = Vec::with_capacity(bodies.iter().map(|b| b.len()).sum::<usize>() + 512);
    if let Some(preamble) = preamble {
        body.extend_from_slice(preamble.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (headers, part) in parts {
        write_part(&mut body, &boundary, headers, part);
    }
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let content_type = Header::new(
        "Content-Type",
        format!("multipart/{subtype}; boundary=\"{boundary}\""),
    );
    (content_type, body)
}

fn write_part(out: &mut Vec<u8>, boundary: &str, headers: &[Header], body: &[u8]) {
    out.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    for header in headers {
        out.extend_from_slice(format!("{}: {}\r\n", header.name, header.value).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
}

/// Deterministic boundary that occurs in none of `parts`.
fn choose_boundary(prefix: &str, id: &str, parts: &[&[u8]]) -> String {
    let stem: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(40)
        .collect();
    (0u32..)
        .map(|n| format!("{prefix}{stem}_{n}"))
        .find(|candidate| {
            let needle = candidate.as_bytes();
            !parts
                .iter()
                .any(|part| part.windows(needle.len()).any(|w| w == needle))
        })
        .unwrap_or_default()
}

/// Drop the original body-describing headers and append `replacement`.
fn replace_content_headers(headers: &mut Vec<Header>, replacement: Vec<Header>) {
    headers.retain(|h| !is_content_header(h));
    headers.extend(replacement);
}
