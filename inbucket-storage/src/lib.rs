//! Mailbox-addressed message storage.
//!
//! Holds the messages the SMTP front-end captures: the [`Store`] trait, the
//! in-memory implementation backing a running server, and the
//! [`DeliveryManager`] the session hands assembled messages to.

pub mod config;
pub mod error;
pub mod manager;
pub mod message;
pub mod store;

pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use manager::DeliveryManager;
pub use message::StoredMessage;
pub use store::{MemoryStore, Store};
