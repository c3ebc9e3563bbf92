use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;

use crate::{Result, StorageError, StoredMessage};

/// The interface the rest of the server uses to interact with storage
/// implementations.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Store a message in its mailbox, returning the message id.
    async fn add_message(&self, message: StoredMessage) -> Result<String>;

    /// Fetch one message by mailbox and id.
    async fn get_message(&self, mailbox: &str, id: &str) -> Result<StoredMessage>;

    /// Fetch every message in a mailbox, oldest first.
    async fn get_messages(&self, mailbox: &str) -> Result<Vec<StoredMessage>>;

    /// Remove one message by mailbox and id.
    async fn remove_message(&self, mailbox: &str, id: &str) -> Result<()>;

    /// Remove every message in a mailbox.
    async fn purge_messages(&self, mailbox: &str) -> Result<()>;

    /// The names of all mailboxes currently holding messages, sorted.
    async fn mailboxes(&self) -> Result<Vec<String>>;
}

/// In-memory store implementation
///
/// Messages live in a `HashMap` keyed by mailbox name, protected by an
/// `RwLock`. Each mailbox keeps its messages in arrival order.
///
/// # Capacity Management
/// A per-mailbox cap bounds memory use; adding a message to a full mailbox
/// evicts the oldest one. A capture sink should keep accepting mail rather
/// than refuse it once a busy test run fills a mailbox.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    mailboxes: Arc<RwLock<HashMap<String, Vec<StoredMessage>>>>,
    cap: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that keeps at most `cap` messages per mailbox.
    #[must_use]
    pub fn with_cap(cap: Option<usize>) -> Self {
        Self {
            mailboxes: Arc::new(RwLock::new(HashMap::new())),
            cap,
        }
    }

    /// Total number of messages across all mailboxes.
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the
    /// underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Check if the store holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_message(&self, message: StoredMessage) -> Result<String> {
        let id = message.id().to_string();
        let mut mailboxes = self
            .mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let messages = mailboxes.entry(message.mailbox().to_string()).or_default();
        messages.push(message);
        if let Some(cap) = self.cap {
            if messages.len() > cap {
                messages.remove(0);
            }
        }

        Ok(id)
    }

    async fn get_message(&self, mailbox: &str, id: &str) -> Result<StoredMessage> {
        self.mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mailbox)
            .and_then(|messages| messages.iter().find(|m| m.id() == id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                mailbox: mailbox.to_string(),
                id: id.to_string(),
            })
    }

    async fn get_messages(&self, mailbox: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mailbox)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_message(&self, mailbox: &str, id: &str) -> Result<()> {
        let mut mailboxes = self
            .mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let messages = mailboxes
            .get_mut(mailbox)
            .ok_or_else(|| StorageError::NotFound {
                mailbox: mailbox.to_string(),
                id: id.to_string(),
            })?;

        let idx = messages
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| StorageError::NotFound {
                mailbox: mailbox.to_string(),
                id: id.to_string(),
            })?;
        messages.remove(idx);

        if messages.is_empty() {
            mailboxes.remove(mailbox);
        }
        Ok(())
    }

    async fn purge_messages(&self, mailbox: &str) -> Result<()> {
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(mailbox);
        Ok(())
    }

    async fn mailboxes(&self) -> Result<Vec<String>> {
        let mut names: Vec<_> = self
            .mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(mailbox: &str, body: &str) -> StoredMessage {
        StoredMessage::new(
            mailbox.to_string(),
            "sender@example.com".to_string(),
            vec![format!("{mailbox}@example.com")],
            body.as_bytes().to_vec(),
        )
    }

    #[tokio::test]
    async fn add_get_remove_roundtrip() {
        let store = MemoryStore::new();

        let id = store.add_message(message("james", "one")).await.unwrap();
        store.add_message(message("james", "two")).await.unwrap();

        let fetched = store.get_message("james", &id).await.unwrap();
        assert_eq!(fetched.source(), b"one");

        let all = store.get_messages("james").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source(), b"one");
        assert_eq!(all[1].source(), b"two");

        store.remove_message("james", &id).await.unwrap();
        assert_eq!(store.get_messages("james").await.unwrap().len(), 1);

        assert!(matches!(
            store.get_message("james", &id).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_mailbox_is_empty_not_an_error() {
        let store = MemoryStore::new();
        assert!(store.get_messages("nobody").await.unwrap().is_empty());
        assert!(store.purge_messages("nobody").await.is_ok());
    }

    #[tokio::test]
    async fn cap_evicts_oldest() {
        let store = MemoryStore::with_cap(Some(2));

        store.add_message(message("m", "first")).await.unwrap();
        store.add_message(message("m", "second")).await.unwrap();
        store.add_message(message("m", "third")).await.unwrap();

        let all = store.get_messages("m").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source(), b"second");
        assert_eq!(all[1].source(), b"third");
    }

    #[tokio::test]
    async fn purge_clears_one_mailbox() {
        let store = MemoryStore::new();
        store.add_message(message("a", "x")).await.unwrap();
        store.add_message(message("b", "y")).await.unwrap();

        store.purge_messages("a").await.unwrap();

        assert!(store.get_messages("a").await.unwrap().is_empty());
        assert_eq!(store.get_messages("b").await.unwrap().len(), 1);
        assert_eq!(store.mailboxes().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn mailboxes_are_sorted() {
        let store = MemoryStore::new();
        store.add_message(message("zeta", "1")).await.unwrap();
        store.add_message(message("alpha", "2")).await.unwrap();

        assert_eq!(
            store.mailboxes().await.unwrap(),
            vec!["alpha".to_string(), "zeta".to_string()]
        );
        assert_eq!(store.len(), 2);
    }
}
