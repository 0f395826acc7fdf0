//! Transport collaborator. Hands assembled messages to a mail relay.

pub mod smtp;
pub mod traits;

pub use smtp::{SmtpConfig, SmtpRelay};
pub use traits::MailTransport;
