//! Recipient addressing policy.
//!
//! Classifies RCPT TO addresses for the SMTP session: whether the address is
//! syntactically acceptable, which mailbox it routes to, and whether the
//! message should actually be stored or silently discarded.

pub mod address;

pub use address::{parse_email_address, AddressError};

use serde::{Deserialize, Serialize};

/// Addressing policy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Mail addressed to these domains is accepted on the wire but never
    /// stored. Matching is case-insensitive.
    #[serde(default)]
    pub discard_domains: Vec<String>,
}

/// Derive the mailbox name a local part routes to.
///
/// Mailbox names are case-insensitive, and plus-detail addressing
/// (`user+anything`) routes to the base mailbox.
#[must_use]
pub fn mailbox_for(local_part: &str) -> String {
    let base = local_part
        .split_once('+')
        .map_or(local_part, |(base, _detail)| base);
    base.to_ascii_lowercase()
}

/// The session's decorated view of one RCPT TO address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    address: String,
    local_part: String,
    domain: String,
    mailbox: String,
    store: bool,
}

impl Recipient {
    /// The full address as received, `local@domain`.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The local part, before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    /// The domain, after the `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The mailbox this recipient routes to.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Whether an accepted message should be written to storage.
    #[must_use]
    pub const fn should_store(&self) -> bool {
        self.store
    }
}

/// Applies [`PolicyConfig`] to recipient addresses.
#[derive(Debug, Clone, Default)]
pub struct AddressPolicy {
    config: PolicyConfig,
}

impl AddressPolicy {
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Validate a RCPT TO address and build its [`Recipient`].
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] when the address fails syntactic validation.
    pub fn new_recipient(&self, text: &str) -> Result<Recipient, AddressError> {
        let (local_part, domain) = parse_email_address(text)?;
        let store = !self
            .config
            .discard_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&domain));

        Ok(Recipient {
            address: text.to_string(),
            mailbox: mailbox_for(&local_part),
            local_part,
            domain,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_names_are_folded() {
        assert_eq!(mailbox_for("James"), "james");
        assert_eq!(mailbox_for("First.Last"), "first.last");
        assert_eq!(mailbox_for("user+tag"), "user");
        assert_eq!(mailbox_for("User+Tag+More"), "user");
    }

    #[test]
    fn recipient_carries_address_parts() {
        let policy = AddressPolicy::default();
        let recip = policy.new_recipient("First.Last+qa@Example.com").unwrap();

        assert_eq!(recip.address(), "First.Last+qa@Example.com");
        assert_eq!(recip.local_part(), "First.Last+qa");
        assert_eq!(recip.domain(), "Example.com");
        assert_eq!(recip.mailbox(), "first.last");
        assert!(recip.should_store());
    }

    #[test]
    fn discard_domains_suppress_storage() {
        let policy = AddressPolicy::new(PolicyConfig {
            discard_domains: vec!["bitbucket.local".to_string()],
        });

        let kept = policy.new_recipient("user@example.com").unwrap();
        assert!(kept.should_store());

        let dropped = policy.new_recipient("user@BitBucket.LOCAL").unwrap();
        assert!(!dropped.should_store());
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let policy = AddressPolicy::default();
        assert!(policy.new_recipient("not-an-address").is_err());
        assert!(policy.new_recipient("").is_err());
    }
}
