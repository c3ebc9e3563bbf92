use std::sync::{Arc, LazyLock};

use inbucket_common::{internal, logging, Signal};
use inbucket_policy::{AddressPolicy, PolicyConfig};
use inbucket_smtp::{Server, SmtpConfig};
use inbucket_storage::{DeliveryManager, MemoryStore, StorageConfig, Store};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Config file consulted when no path is given on the command line.
pub const DEFAULT_CONFIG: &str = "inbucket.toml";

/// The whole server, as read from the configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct Inbucket {
    #[serde(default)]
    smtp: SmtpConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    policy: PolicyConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for ctrl-c or SIGTERM, broadcast shutdown, then let the server
/// drain; a second ctrl-c forces the select in [`Inbucket::run`] to give up.
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| anyhow::anyhow!("shutdown broadcast failed: {e}"))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Inbucket {
    /// Load the server definition from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_config(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("unable to read config {path}: {err}"))?;
        toml::from_str(&raw).map_err(|err| anyhow::anyhow!("unable to parse config {path}: {err}"))
    }

    /// Run the server and everything it controls until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or accept.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        internal!(level = INFO, "Inbucket starting");

        let store = Arc::new(MemoryStore::with_cap(self.storage.cap())) as Arc<dyn Store>;
        let manager = DeliveryManager::new(store);
        let policy = AddressPolicy::new(self.policy);
        let server = Server::new(self.smtp, policy, manager);

        let ret = tokio::select! {
            r = server.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(Into::into)
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let server: Inbucket = toml::from_str(
            r#"
            [smtp]
            addr = "127.0.0.1:2500"
            domain = "mail.test"
            max_message_bytes = 1000
            max_recipients = 2
            max_idle_secs = 60

            [storage]
            mailbox_message_cap = 100

            [policy]
            discard_domains = ["blackhole.test"]
            "#,
        )
        .unwrap();

        assert_eq!(server.smtp.domain, "mail.test");
        assert_eq!(server.smtp.max_recipients, 2);
        assert_eq!(server.storage.mailbox_message_cap, 100);
        assert_eq!(server.policy.discard_domains, ["blackhole.test"]);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let server: Inbucket = toml::from_str("").unwrap();
        assert_eq!(server.smtp.domain, "inbucket");
        assert_eq!(server.smtp.addr.port(), 2500);
        assert_eq!(server.storage.mailbox_message_cap, 500);
        assert!(server.policy.discard_domains.is_empty());
    }
}
