//! Configuration types.
//!
//! All options arrive as string key/value pairs (normally the process
//! environment). Boolean options must be exactly `"True"` or `"False"`.

use crate::error::ConfigError;
use crate::forward::rules::RuleTable;

pub const ADD_HEADER: &str = "AddHeader";
pub const EMAIL_LIST: &str = "EmailList";
pub const MAIL_FROM_EMAIL_ADDRESS: &str = "MailFromEmailAddress";
pub const REGION: &str = "Region";
pub const S3_BUCKET: &str = "S3Bucket";
pub const S3_PREFIX: &str = "S3Prefix";
pub const USE_EML_ATTACHMENT: &str = "UseEMLAttachment";
pub const USE_EML_BASE64_FORMAT: &str = "UseEMLBase64Format";
pub const USE_RESENT_HEADER: &str = "UseResentHeader";
pub const USE_SUBJECT_EML_FILENAME: &str = "UseSubjectEMLFilename";

/// Forwarder configuration. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct ForwarderConfig {
    /// Inject a provenance header describing the original arrival.
    pub add_header: bool,
    /// Ordered forwarding rules.
    pub email_list: RuleTable,
    /// Infrastructure sending address. `None` when unset or empty.
    pub mail_from: Option<String>,
    /// Passed through to the storage/transport collaborators.
    pub region: String,
    pub s3_bucket: String,
    pub s3_prefix: String,
    /// Attach the original message as an `.eml` part.
    pub use_eml_attachment: bool,
    /// Base64-encode the attached original.
    pub use_eml_base64_format: bool,
    /// Forward with `Resent-*` headers instead of re-enveloping.
    pub use_resent_header: bool,
    /// Name the attachment after the subject instead of the storage id.
    pub use_subject_eml_filename: bool,
}

impl ForwarderConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build config from any key/value lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let email_list = lookup(EMAIL_LIST)
            .ok_or_else(|| ConfigError::MissingEnvVar(EMAIL_LIST.to_string()))?;
        let email_list = RuleTable::from_json(&email_list)?;

        let mail_from = lookup(MAIL_FROM_EMAIL_ADDRESS)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(ref address) = mail_from
            && let Err(e) = address.parse::<lettre::Address>()
        {
            return Err(ConfigError::invalid(
                MAIL_FROM_EMAIL_ADDRESS,
                format!("{address:?} is not a valid address: {e}"),
            ));
        }

        Ok(Self {
            add_header: parse_flag(ADD_HEADER, lookup(ADD_HEADER))?,
            email_list,
            mail_from,
            region: lookup(REGION).unwrap_or_default(),
            s3_bucket: lookup(S3_BUCKET).unwrap_or_default(),
            s3_prefix: lookup(S3_PREFIX).unwrap_or_default(),
            use_eml_attachment: parse_flag(USE_EML_ATTACHMENT, lookup(USE_EML_ATTACHMENT))?,
            use_eml_base64_format: parse_flag(
                USE_EML_BASE64_FORMAT,
                lookup(USE_EML_BASE64_FORMAT),
            )?,
            use_resent_header: parse_flag(USE_RESENT_HEADER, lookup(USE_RESENT_HEADER))?,
            use_subject_eml_filename: parse_flag(
                USE_SUBJECT_EML_FILENAME,
                lookup(USE_SUBJECT_EML_FILENAME),
            )?,
        })
    }
}

/// Decode a `"True"`/`"False"` option. Absent options are `false`.
pub fn parse_flag(key: &str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref() {
        None => Ok(false),
        Some("True") => Ok(true),
        Some("False") => Ok(false),
        Some(other) => Err(ConfigError::invalid(
            key,
            format!("expected \"True\" or \"False\", got {other:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_full_configuration() {
        let config = ForwarderConfig::from_vars(vars(&[
            (ADD_HEADER, "True"),
            (EMAIL_LIST, r#"{"test@": "dest@example.com", "catch-all": "fallback@example.com"}"#),
            (MAIL_FROM_EMAIL_ADDRESS, "sender@infra.com"),
            (REGION, "us-east-1"),
            (S3_BUCKET, "incoming"),
            (S3_PREFIX, "mail"),
            (USE_EML_ATTACHMENT, "True"),
            (USE_EML_BASE64_FORMAT, "False"),
            (USE_RESENT_HEADER, "False"),
            (USE_SUBJECT_EML_FILENAME, "True"),
        ]))
        .unwrap();

        assert!(config.add_header);
        assert_eq!(config.email_list.entries().len(), 1);
        assert!(config.email_list.catch_all().is_some());
        assert_eq!(config.mail_from.as_deref(), Some("sender@infra.com"));
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.s3_bucket, "incoming");
        assert_eq!(config.s3_prefix, "mail");
        assert!(config.use_eml_attachment);
        assert!(!config.use_eml_base64_format);
        assert!(!config.use_resent_header);
        assert!(config.use_subject_eml_filename);
    }

    #[test]
    fn missing_flags_default_to_false() {
        let config =
            ForwarderConfig::from_vars(vars(&[(EMAIL_LIST, r#"{"catch-all": "a@example.com"}"#)]))
                .unwrap();
        assert!(!config.add_header);
        assert!(!config.use_resent_header);
        assert!(config.mail_from.is_none());
    }

    #[test]
    fn flags_are_exact_literals() {
        assert!(parse_flag(ADD_HEADER, Some("True".into())).unwrap());
        assert!(!parse_flag(ADD_HEADER, Some("False".into())).unwrap());
        for bad in ["true", "TRUE", "1", "yes", ""] {
            let err = parse_flag(ADD_HEADER, Some(bad.into())).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ADD_HEADER));
        }
    }

    #[test]
    fn missing_email_list_is_an_error() {
        let err = ForwarderConfig::from_vars(vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == EMAIL_LIST));
    }

    #[test]
    fn invalid_email_list_is_an_error() {
        let err = ForwarderConfig::from_vars(vars(&[(EMAIL_LIST, "{oops")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == EMAIL_LIST));
    }

    #[test]
    fn empty_mail_from_is_unset() {
        let config = ForwarderConfig::from_vars(vars(&[
            (EMAIL_LIST, r#"{"catch-all": "a@example.com"}"#),
            (MAIL_FROM_EMAIL_ADDRESS, "  "),
        ]))
        .unwrap();
        assert!(config.mail_from.is_none());
    }

    #[test]
    fn invalid_mail_from_is_an_error() {
        let err = ForwarderConfig::from_vars(vars(&[
            (EMAIL_LIST, r#"{"catch-all": "a@example.com"}"#),
            (MAIL_FROM_EMAIL_ADDRESS, "not-an-address"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(MAIL_FROM_EMAIL_ADDRESS));
    }

    #[test]
    fn bad_flag_surfaces_before_processing() {
        let err = ForwarderConfig::from_vars(vars(&[
            (EMAIL_LIST, r#"{"catch-all": "a@example.com"}"#),
            (USE_RESENT_HEADER, "maybe"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(USE_RESENT_HEADER));
    }
}
