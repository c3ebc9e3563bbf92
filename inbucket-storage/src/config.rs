use serde::{Deserialize, Serialize};

/// Message store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Maximum messages retained per mailbox; the oldest message is evicted
    /// when a mailbox would exceed it. `0` disables the cap.
    ///
    /// Default: 500
    #[serde(default = "defaults::mailbox_message_cap")]
    pub mailbox_message_cap: usize,
}

impl StorageConfig {
    /// The cap as an `Option`, `None` meaning unbounded.
    #[must_use]
    pub const fn cap(&self) -> Option<usize> {
        match self.mailbox_message_cap {
            0 => None,
            cap => Some(cap),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mailbox_message_cap: defaults::mailbox_message_cap(),
        }
    }
}

/// Default configuration values.
mod defaults {
    pub const fn mailbox_message_cap() -> usize {
        500
    }
}
