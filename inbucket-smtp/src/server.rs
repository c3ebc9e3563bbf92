//! The TCP acceptor feeding SMTP sessions.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use futures_util::future::join_all;
use inbucket_common::{error::ListenerError, internal, Signal};
use inbucket_metrics::metrics;
use inbucket_policy::AddressPolicy;
use inbucket_storage::DeliveryManager;
use tokio::net::TcpListener;

use crate::{config::SmtpConfig, session::Session};

/// Owns the listener socket and spawns one session task per accepted
/// connection. Shared read-mostly state (config, policy, delivery manager)
/// hangs off this struct behind `Arc`s.
pub struct Server {
    config: Arc<SmtpConfig>,
    policy: Arc<AddressPolicy>,
    manager: Arc<DeliveryManager>,
    next_id: AtomicU64,
}

impl Server {
    #[must_use]
    pub fn new(config: SmtpConfig, policy: AddressPolicy, manager: DeliveryManager) -> Self {
        Self {
            config: Arc::new(config),
            policy: Arc::new(policy),
            manager: Arc::new(manager),
            next_id: AtomicU64::new(0),
        }
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] if the bind or a later accept fails.
    pub async fn serve(
        &self,
        shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ListenerError> {
        let listener =
            TcpListener::bind(self.config.addr)
                .await
                .map_err(|source| ListenerError::BindFailed {
                    address: self.config.addr.to_string(),
                    source,
                })?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener until shutdown.
    ///
    /// On the shutdown signal the listener stops accepting and waits for
    /// live sessions to drain before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] if an accept fails.
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            internal!(level = INFO, "SMTP listening on {addr}");
        }

        let mut sessions = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(_)) {
                        break;
                    }
                }

                connection = listener.accept() => {
                    let (stream, peer) = connection?;
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                    internal!(level = INFO, "Connection from {peer}, starting session <{id}>");

                    let session = Session::create(
                        stream,
                        peer,
                        id,
                        Arc::clone(&self.config),
                        Arc::clone(&self.policy),
                        Arc::clone(&self.manager),
                    );
                    sessions.push(tokio::spawn(async move {
                        metrics().record_connection();
                        session.run().await;
                        metrics().record_connection_closed();
                    }));
                }
            }
        }

        // Stop accepting before the drain so late connects are refused
        drop(listener);
        internal!(
            level = INFO,
            "SMTP listener received shutdown, draining {} session(s) ...",
            sessions.len()
        );
        join_all(sessions).await;

        Ok(())
    }
}
