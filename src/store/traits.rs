//! `MessageStore` trait — read access to captured inbound mail.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::forward::message::InboundMail;

/// Where the ingestion path left the raw inbound messages.
///
/// Implementations return the stored bytes untouched along with whatever
/// object metadata they have (last-modified time).
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Fetch a stored message by its identifier.
    async fn fetch(&self, id: &str) -> Result<InboundMail, StorageError>;
}

/// Object key for a message identifier under an optional prefix.
pub fn object_key(prefix: &str, id: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        id.to_string()
    } else {
        format!("{prefix}/{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_without_prefix_is_the_id() {
        assert_eq!(object_key("", "abc"), "abc");
    }

    #[test]
    fn key_with_prefix() {
        assert_eq!(object_key("incoming", "abc"), "incoming/abc");
        assert_eq!(object_key("incoming/", "abc"), "incoming/abc");
    }
}
