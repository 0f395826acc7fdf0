//! Parsing adapter — turns stored raw bytes into a read-only `ParsedMessage`.
//!
//! The header block is split by hand so that every original header can be
//! reproduced verbatim, in order, duplicates included. Decoded views
//! (addresses, subject, readable text) come from `mail-parser`.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use crate::error::ForwardError;
use crate::forward::types::{Header, find_header};

// ── Inbound mail ────────────────────────────────────────────────────

/// A stored inbound message as handed over by the storage collaborator.
#[derive(Debug, Clone)]
pub struct InboundMail {
    /// Storage identifier of the raw object.
    pub id: String,
    /// The raw message, byte for byte.
    pub raw: Vec<u8>,
    /// Envelope recipients reported by the ingestion path, if any.
    pub envelope_recipients: Vec<String>,
    /// When the stored object was last written.
    pub received_at: Option<DateTime<Utc>>,
}

impl InboundMail {
    pub fn new(id: impl Into<String>, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
            envelope_recipients: Vec::new(),
            received_at: None,
        }
    }

    pub fn with_envelope_recipients(mut self, recipients: Vec<String>) -> Self {
        self.envelope_recipients = recipients;
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }
}

// ── Parsed message ──────────────────────────────────────────────────

/// Immutable view of an inbound message.
#[derive(Debug)]
pub struct ParsedMessage<'a> {
    inbound: &'a InboundMail,
    headers: Vec<Header>,
    body_offset: usize,
    from_address: Option<String>,
    from_display: Option<String>,
    subject: Option<String>,
    recipients: Vec<String>,
    text_body: Option<String>,
}

impl<'a> ParsedMessage<'a> {
    /// Parse an inbound message.
    ///
    /// Fails with `MalformedMessage` when the header block is not valid
    /// RFC 5322 field syntax or not decodable as UTF-8.
    pub fn parse(inbound: &'a InboundMail) -> Result<Self, ForwardError> {
        if inbound.raw.is_empty() {
            return Err(ForwardError::MalformedMessage("empty message".into()));
        }

        let (headers, body_offset) = split_header_block(&inbound.raw)?;

        let parsed = MessageParser::default()
            .parse(&inbound.raw[..])
            .ok_or_else(|| ForwardError::MalformedMessage("MIME parser rejected message".into()))?;

        let from = parsed.from().and_then(|addr| addr.first());
        let from_address = from
            .and_then(|a| a.address())
            .map(|s| s.to_string());
        let from_display = from.and_then(|a| a.name()).map(|s| s.to_string());

        let mut recipients = Vec::new();
        for addr in extract_addresses(parsed.to())
            .into_iter()
            .chain(extract_addresses(parsed.cc()))
        {
            if !recipients.iter().any(|r: &String| r.eq_ignore_ascii_case(&addr)) {
                recipients.push(addr);
            }
        }

        Ok(Self {
            inbound,
            headers,
            body_offset,
            from_address,
            from_display,
            subject: parsed.subject().map(|s| s.to_string()),
            recipients,
            text_body: parsed.body_text(0).map(|t| t.into_owned()),
        })
    }

    /// Storage identifier of the original message.
    pub fn id(&self) -> &str {
        &self.inbound.id
    }

    /// The original message, byte for byte.
    pub fn raw(&self) -> &'a [u8] {
        &self.inbound.raw
    }

    /// Everything after the blank line that ends the header block.
    pub fn raw_body(&self) -> &'a [u8] {
        &self.inbound.raw[self.body_offset..]
    }

    /// Original headers, in wire order.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Raw value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn from_address(&self) -> Option<&str> {
        self.from_address.as_deref()
    }

    pub fn from_display(&self) -> Option<&str> {
        self.from_display.as_deref()
    }

    /// Decoded subject.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Raw `Message-ID` header value, brackets included.
    pub fn message_id(&self) -> Option<&str> {
        self.header("Message-ID")
    }

    /// Raw `Date` header value.
    pub fn date(&self) -> Option<&str> {
        self.header("Date")
    }

    /// Deduplicated `To` and `Cc` addresses, in header order.
    pub fn header_recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn envelope_recipients(&self) -> &[String] {
        &self.inbound.envelope_recipients
    }

    /// Addresses the message was delivered for.
    ///
    /// Envelope recipients win over display headers when present.
    pub fn recipient_candidates(&self) -> &[String] {
        if self.inbound.envelope_recipients.is_empty() {
            &self.recipients
        } else {
            &self.inbound.envelope_recipients
        }
    }

    /// First readable text part, decoded.
    pub fn text_body(&self) -> Option<&str> {
        self.text_body.as_deref()
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.inbound.received_at
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Split a raw message into its header fields and the offset of the body.
///
/// Accepts both CRLF and bare LF line endings. A message without a blank
/// line is all headers with an empty body.
fn split_header_block(raw: &[u8]) -> Result<(Vec<Header>, usize), ForwardError> {
    let mut headers: Vec<Header> = Vec::new();
    let mut pos = 0;
    let mut line_no = 0;

    while pos < raw.len() {
        line_no += 1;
        let line_end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |i| pos + i + 1);
        let mut line = &raw[pos..line_end];
        if let Some(stripped) = line.strip_suffix(b"\n") {
            line = stripped;
        }
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        pos = line_end;

        if line.is_empty() {
            if headers.is_empty() {
                return Err(ForwardError::MalformedMessage("no header fields".into()));
            }
            return Ok((headers, pos));
        }

        let text = std::str::from_utf8(line).map_err(|_| {
            ForwardError::MalformedMessage(format!("header line {line_no} is not valid UTF-8"))
        })?;

        if text.starts_with([' ', '\t']) {
            let Some(last) = headers.last_mut() else {
                return Err(ForwardError::MalformedMessage(
                    "continuation line before first header".into(),
                ));
            };
            last.value.push_str("\r\n");
            last.value.push_str(text);
            continue;
        }

        let Some((name, value)) = text.split_once(':') else {
            return Err(ForwardError::MalformedMessage(format!(
                "header line {line_no} has no field name"
            )));
        };
        // Obsolete syntax allows whitespace between the name and the colon.
        let name = name.trim_end_matches([' ', '\t']);
        if name.is_empty() || !name.bytes().all(|b| (33..=126).contains(&b)) {
            return Err(ForwardError::MalformedMessage(format!(
                "invalid header field name {name:?}"
            )));
        }
        headers.push(Header::new(name, value.trim_start()));
    }

    if headers.is_empty() {
        return Err(ForwardError::MalformedMessage("no header fields".into()));
    }
    Ok((headers, raw.len()))
}

/// Extract email addresses from an optional mail_parser Address field.
fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}
