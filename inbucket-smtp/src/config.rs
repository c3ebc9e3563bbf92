use std::{net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};

/// SMTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Address the listener binds.
    ///
    /// Default: `0.0.0.0:2500`
    #[serde(default = "defaults::addr")]
    pub addr: SocketAddr,

    /// The name the server greets with and stamps into Received headers.
    ///
    /// Default: `inbucket`
    #[serde(default = "defaults::domain")]
    pub domain: String,

    /// Message size ceiling, enforced against the declared ESMTP SIZE and
    /// again while reading the data phase.
    ///
    /// Default: 10240000
    #[serde(default = "defaults::max_message_bytes")]
    pub max_message_bytes: usize,

    /// Per-message recipient cap.
    ///
    /// Default: 200
    #[serde(default = "defaults::max_recipients")]
    pub max_recipients: usize,

    /// Idle deadline applied to every socket read and write, in seconds.
    ///
    /// Default: 300
    #[serde(default = "defaults::max_idle_secs")]
    pub max_idle_secs: u64,
}

impl SmtpConfig {
    /// The idle deadline as a [`Duration`].
    #[must_use]
    pub const fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            addr: defaults::addr(),
            domain: defaults::domain(),
            max_message_bytes: defaults::max_message_bytes(),
            max_recipients: defaults::max_recipients(),
            max_idle_secs: defaults::max_idle_secs(),
        }
    }
}

/// Default configuration values.
mod defaults {
    use std::net::SocketAddr;

    pub fn addr() -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], 2500))
    }

    pub fn domain() -> String {
        "inbucket".to_string()
    }

    pub const fn max_message_bytes() -> usize {
        10_240_000
    }

    pub const fn max_recipients() -> usize {
        200
    }

    pub const fn max_idle_secs() -> u64 {
        300
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SmtpConfig::default();
        assert_eq!(config.addr.port(), 2500);
        assert_eq!(config.domain, "inbucket");
        assert_eq!(config.max_message_bytes, 10_240_000);
        assert_eq!(config.max_recipients, 200);
        assert_eq!(config.max_idle(), Duration::from_secs(300));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: SmtpConfig = toml::from_str(
            r#"
            domain = "mail.test"
            max_message_bytes = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.domain, "mail.test");
        assert_eq!(config.max_message_bytes, 1000);
        assert_eq!(config.max_recipients, 200);
        assert_eq!(config.addr.port(), 2500);
    }
}
