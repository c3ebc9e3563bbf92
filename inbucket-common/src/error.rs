//! Error types shared by the session and listener layers.

use std::io;

use thiserror::Error;

/// Errors that end an SMTP session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer closed the connection (EOF on read).
    #[error("Connection closed by peer")]
    Closed,

    /// An idle deadline expired while waiting on the socket.
    #[error("Session idle for more than {0} seconds")]
    Timeout(u64),

    /// Any other socket failure.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),
}

impl SessionError {
    /// Returns `true` for the deadline-expired case, which gets its own
    /// farewell reply on the wire.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to the configured socket address.
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[from] io::Error),
}
