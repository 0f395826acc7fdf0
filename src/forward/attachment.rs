//! Packs the original message as a `message/rfc822` attachment.
//!
//! The embedded content is the stored raw message, byte for byte. With
//! base64 enabled it is encoded (some mobile clients cannot open base64
//! `.eml` parts); otherwise it is embedded as-is with a 7bit or 8bit
//! transfer encoding, falling back to quoted-printable when a line is
//! too long or carries bytes SMTP cannot relay unencoded.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::config::ForwarderConfig;
use crate::forward::message::ParsedMessage;
use crate::forward::types::Header;

/// Longest filename stem kept after sanitizing, extension excluded.
pub const MAX_FILENAME_STEM: usize = 100;

/// Stem used when a subject sanitizes to nothing.
pub const FALLBACK_FILENAME_STEM: &str = "message";

/// RFC 5322 line length limit, CRLF excluded.
const MAX_LINE_LENGTH: usize = 998;

/// Base64 output line width.
const BASE64_LINE_WIDTH: usize = 76;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z]+").expect("static regex"));

// ── Transfer encoding ───────────────────────────────────────────────

/// Content-Transfer-Encoding of a body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    /// Smallest identity encoding that can carry `content` unchanged.
    pub fn detect(content: &[u8]) -> Self {
        let mut ascii = true;
        for line in content.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.len() > MAX_LINE_LENGTH || line.iter().any(|&b| b == 0 || b == b'\r') {
                return Self::Binary;
            }
            if !line.is_ascii() {
                ascii = false;
            }
        }
        if ascii { Self::SevenBit } else { Self::EightBit }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        }
    }
}

/// Base64-encode with CRLF-separated 76 column lines.
pub fn encode_base64_lines(content: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(content);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Encode `content` with an identity encoding when SMTP can carry it,
/// quoted-printable otherwise.
pub fn encode_for_smtp(content: &[u8]) -> (TransferEncoding, Vec<u8>) {
    match TransferEncoding::detect(content) {
        TransferEncoding::Binary => (
            TransferEncoding::QuotedPrintable,
            quoted_printable::encode(content),
        ),
        identity => (identity, content.to_vec()),
    }
}

/// Failure to reverse a part's transfer encoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid quoted-printable: {0}")]
    QuotedPrintable(#[from] quoted_printable::QuotedPrintableError),
}

// ── Attachment part ─────────────────────────────────────────────────

/// The packed original message.
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    pub filename: String,
    pub encoding: TransferEncoding,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl AttachmentPart {
    /// Reverse the transfer encoding, yielding the embedded message.
    pub fn decoded_content(&self) -> Result<Vec<u8>, DecodeError> {
        match self.encoding {
            TransferEncoding::Base64 => {
                let compact: Vec<u8> = self
                    .body
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                Ok(STANDARD.decode(compact)?)
            }
            TransferEncoding::QuotedPrintable => Ok(quoted_printable::decode(
                &self.body,
                quoted_printable::ParseMode::Robust,
            )?),
            _ => Ok(self.body.clone()),
        }
    }
}

/// Builds the `.eml` attachment for a message.
pub struct AttachmentPacker<'c> {
    config: &'c ForwarderConfig,
}

impl<'c> AttachmentPacker<'c> {
    pub fn new(config: &'c ForwarderConfig) -> Self {
        Self { config }
    }

    pub fn pack(&self, original: &ParsedMessage<'_>) -> AttachmentPart {
        let filename = self.filename(original);
        let raw = original.raw();

        let (encoding, body) = if self.config.use_eml_base64_format {
            (TransferEncoding::Base64, encode_base64_lines(raw))
        } else {
            encode_for_smtp(raw)
        };

        let mut disposition = format!("attachment; filename=\"{filename}\"");
        if encoding == TransferEncoding::Base64 {
            // Encoded content is stable in transit, so size and dates stay accurate.
            disposition.push_str(&format!(";\r\n\tsize={}", raw.len()));
            if let Some(stored) = original.received_at() {
                let date = stored.to_rfc2822();
                disposition.push_str(&format!(
                    ";\r\n\tcreation-date=\"{date}\";\r\n\tmodification-date=\"{date}\""
                ));
            }
        }

        let headers = vec![
            Header::new("Content-Type", format!("message/rfc822; name=\"{filename}\"")),
            Header::new("Content-Description", filename.clone()),
            Header::new("Content-Disposition", disposition),
            Header::new("Content-Transfer-Encoding", encoding.as_str()),
        ];

        AttachmentPart {
            filename,
            encoding,
            headers,
            body,
        }
    }

    /// `.eml` filename from the subject or the storage identifier.
    pub fn filename(&self, original: &ParsedMessage<'_>) -> String {
        let stem = if self.config.use_subject_eml_filename {
            original.subject().unwrap_or("")
        } else {
            original.id()
        };
        format!("{}.eml", sanitize_filename(stem))
    }
}

/// Reduce `input` to a safe filename stem.
///
/// Accents are stripped (NFKD, combining marks dropped), then runs of
/// anything other than ASCII letters and digits become a single `_`, leading and trailing `_` are dropped, and the result is capped at
/// `MAX_FILENAME_STEM` characters. Idempotent.
pub fn sanitize_filename(input: &str) -> String {
    let unaccented: String = input.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let replaced = UNSAFE_FILENAME_CHARS.replace_all(&unaccented, "_");
    let mut stem: String = replaced
        .trim_matches('_')
        .chars()
        .take(MAX_FILENAME_STEM)
        .collect();
    while stem.ends_with('_') {
        stem.pop();
    }
    if stem.is_empty() {
        FALLBACK_FILENAME_STEM.to_string()
    } else {
        stem
    }
}
