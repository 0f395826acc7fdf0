//! Forwarding rule table — ordered prefix rules with a catch-all fallback.
//!
//! Rules are scanned in table order and the first rule whose pattern is a
//! prefix of any recipient candidate wins. Patterns are matched literally
//! against the full address, so `"test@"` matches `test@domain.com` while
//! `"test"` also matches `testing@domain.com`.

use std::fmt;

use serde::Deserialize;
use serde::de::{self, MapAccess, Visitor};
use tracing::debug;

use crate::error::{ConfigError, ForwardError};
use crate::forward::message::ParsedMessage;

/// Key that designates the fallback destination in `EmailList`.
pub const CATCH_ALL_KEY: &str = "catch-all";

// ── Rule data ───────────────────────────────────────────────────────

/// One or more addresses a message is forwarded to. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(Vec<String>);

impl Destination {
    pub fn new(addresses: Vec<String>) -> Option<Self> {
        if addresses.is_empty() {
            None
        } else {
            Some(Self(addresses))
        }
    }

    pub fn single(address: impl Into<String>) -> Self {
        Self(vec![address.into()])
    }

    pub fn addresses(&self) -> &[String] {
        &self.0
    }

    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    /// Header form: addresses joined by `", "`.
    pub fn joined(&self) -> String {
        self.0.join(", ")
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// A single prefix rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub pattern: String,
    pub destination: Destination,
}

impl RuleEntry {
    pub fn new(pattern: impl Into<String>, destination: Destination) -> Self {
        Self {
            pattern: pattern.into(),
            destination,
        }
    }

    /// Whether any candidate starts with this rule's pattern.
    pub fn matches(&self, candidates: &[String]) -> bool {
        candidates.iter().any(|c| c.starts_with(&self.pattern))
    }
}

/// Ordered rules plus an optional catch-all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    entries: Vec<RuleEntry>,
    catch_all: Option<Destination>,
}

impl RuleTable {
    pub fn new(entries: Vec<RuleEntry>, catch_all: Option<Destination>) -> Self {
        Self { entries, catch_all }
    }

    /// Decode the `EmailList` JSON object, keeping key order.
    ///
    /// Values are either one address or an array of addresses. The
    /// `"catch-all"` key may appear at most once, anywhere in the object.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let list: RawRuleList = serde_json::from_str(json)
            .map_err(|e| ConfigError::invalid("EmailList", e.to_string()))?;

        let mut entries = Vec::with_capacity(list.0.len());
        let mut catch_all = None;
        for (key, addresses) in list.0 {
            let destination = Destination::new(addresses).ok_or_else(|| {
                ConfigError::invalid("EmailList", format!("rule {key:?} has no destination"))
            })?;
            for address in destination.addresses() {
                if address.parse::<lettre::Address>().is_err() {
                    return Err(ConfigError::invalid(
                        "EmailList",
                        format!("rule {key:?} has invalid destination {address:?}"),
                    ));
                }
            }

            if key == CATCH_ALL_KEY {
                if catch_all.is_some() {
                    return Err(ConfigError::invalid(
                        "EmailList",
                        "more than one catch-all entry",
                    ));
                }
                catch_all = Some(destination);
            } else {
                entries.push(RuleEntry::new(key, destination));
            }
        }

        Ok(Self { entries, catch_all })
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn catch_all(&self) -> Option<&Destination> {
        self.catch_all.as_ref()
    }

    /// Resolve candidates to a destination.
    ///
    /// First matching entry in table order, then the catch-all, otherwise
    /// `NoRuleMatched`.
    pub fn resolve(&self, candidates: &[String]) -> Result<&Destination, ForwardError> {
        if let Some(entry) = self.entries.iter().find(|e| e.matches(candidates)) {
            debug!(
                pattern = %entry.pattern,
                destination = %entry.destination,
                "Recipient matched forwarding rule"
            );
            return Ok(&entry.destination);
        }

        match &self.catch_all {
            Some(destination) => {
                debug!(destination = %destination, "No rule matched, using catch-all");
                Ok(destination)
            }
            None => Err(ForwardError::NoRuleMatched {
                candidates: candidates.to_vec(),
            }),
        }
    }
}

// ── Matcher ─────────────────────────────────────────────────────────

/// Resolves a parsed message to its forwarding destination.
pub struct RuleMatcher<'t> {
    table: &'t RuleTable,
}

impl<'t> RuleMatcher<'t> {
    pub fn new(table: &'t RuleTable) -> Self {
        Self { table }
    }

    pub fn resolve(&self, message: &ParsedMessage<'_>) -> Result<&'t Destination, ForwardError> {
        self.table.resolve(message.recipient_candidates())
    }
}

// ── JSON decoding ───────────────────────────────────────────────────

/// `EmailList` entries in document order, duplicates preserved.
struct RawRuleList(Vec<(String, Vec<String>)>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDestination {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for RawRuleList {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ListVisitor;

        impl<'de> Visitor<'de> for ListVisitor {
            type Value = RawRuleList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping recipient patterns to addresses")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, RawDestination>()? {
                    let addresses = match value {
                        RawDestination::One(a) => vec![a],
                        RawDestination::Many(list) => list,
                    };
                    entries.push((key, addresses));
                }
                Ok(RawRuleList(entries))
            }
        }

        deserializer.deserialize_map(ListVisitor)
    }
}
