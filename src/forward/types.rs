//! Shared types for the forwarding pipeline.

// ── Headers ─────────────────────────────────────────────────────────

/// A single header field, kept in wire order.
///
/// `value` is stored as it appeared after the colon (leading whitespace
/// trimmed). Folded values keep their continuation lines, joined by CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Find the first header named `name` (case-insensitive).
pub fn find_header<'h>(headers: &'h [Header], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|h| h.is(name))
        .map(|h| h.value.as_str())
}

/// Headers describing the body of a message rather than the message itself.
///
/// These move with the body when the body is replaced.
pub const CONTENT_HEADERS: &[&str] = &[
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-Disposition",
    "Content-ID",
    "Content-Description",
];

pub fn is_content_header(header: &Header) -> bool {
    CONTENT_HEADERS.iter().any(|name| header.is(name))
}

// ── Outgoing message ────────────────────────────────────────────────

/// A fully assembled message, ready for the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl OutgoingMessage {
    pub(crate) fn new(headers: Vec<Header>, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// First value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// All values of the named header, in order.
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.is(name))
            .map(|h| h.value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize to wire bytes (CRLF header lines, blank line, body).
    pub fn formatted(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + self.headers.len() * 64);
        for header in &self.headers {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Transport-level sender and recipients.
///
/// Distinct from the `From`/`To` headers when forwarding re-envelopes a
/// message or annotates it with `Resent-*` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEnvelope {
    pub sender: String,
    pub recipients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_writes_crlf_headers_then_body() {
        let msg = OutgoingMessage::new(
            vec![Header::new("From", "a@example.com"), Header::new("To", "b@example.com")],
            b"hello\r\n".to_vec(),
        );
        assert_eq!(
            msg.formatted(),
            b"From: a@example.com\r\nTo: b@example.com\r\n\r\nhello\r\n".to_vec()
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let msg = OutgoingMessage::new(
            vec![
                Header::new("Received", "one"),
                Header::new("received", "two"),
            ],
            Vec::new(),
        );
        assert_eq!(msg.header("RECEIVED"), Some("one"));
        assert_eq!(msg.header_all("Received").collect::<Vec<_>>(), vec!["one", "two"]);
        assert!(msg.header("Subject").is_none());
    }

    #[test]
    fn content_headers_detected() {
        assert!(is_content_header(&Header::new("content-type", "text/plain")));
        assert!(is_content_header(&Header::new("MIME-Version", "1.0")));
        assert!(!is_content_header(&Header::new("Subject", "hi")));
    }
}
