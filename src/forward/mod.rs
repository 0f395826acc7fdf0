//! Forwarding pipeline.
//!
//! Every inbound message flows through:
//! 1. `ParsedMessage::parse()` — non-lossy header split plus decoded views
//! 2. `RuleMatcher::resolve()` — ordered prefix rules, catch-all fallback
//! 3. `HeaderTransformer::build()` — `Resent-*` or re-enveloped headers
//! 4. `AttachmentPacker::pack()` — optional `.eml` attachment
//! 5. `MessageAssembler::assemble()` — outgoing message plus envelope
//!
//! No stage performs I/O or keeps state between messages.

pub mod assembler;
pub mod attachment;
pub mod headers;
pub mod message;
pub mod rules;
pub mod types;

pub use assembler::{MessageAssembler, assemble};
pub use attachment::{AttachmentPacker, sanitize_filename};
pub use headers::{HeaderStrategy, HeaderTransformer};
pub use message::{InboundMail, ParsedMessage};
pub use rules::{Destination, RuleEntry, RuleMatcher, RuleTable};
pub use types::{Header, OutgoingEnvelope, OutgoingMessage};
