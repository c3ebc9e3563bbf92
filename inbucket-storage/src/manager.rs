use std::sync::Arc;

use inbucket_policy::Recipient;

use crate::{Result, Store, StoredMessage};

/// Writes assembled messages into the store.
///
/// The SMTP session calls [`deliver`](Self::deliver) once per stored
/// recipient after the data phase terminates; everything else about storage
/// is this crate's concern.
#[derive(Debug, Clone)]
pub struct DeliveryManager {
    store: Arc<dyn Store>,
}

impl DeliveryManager {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The store this manager writes into.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Store one message for `recipient`.
    ///
    /// The stored source is `prefix` (the Received trace header built by the
    /// session) followed by `body`, byte for byte. `recipients` is the full
    /// envelope recipient list of the transaction and is recorded as the
    /// message's To metadata.
    ///
    /// # Errors
    ///
    /// Propagates the store's failure; the session maps this to a 451 reply.
    pub async fn deliver(
        &self,
        recipient: &Recipient,
        from: &str,
        recipients: &[Recipient],
        prefix: &str,
        body: &[u8],
    ) -> Result<String> {
        let mut source = Vec::with_capacity(prefix.len() + body.len());
        source.extend_from_slice(prefix.as_bytes());
        source.extend_from_slice(body);

        let message = StoredMessage::new(
            recipient.mailbox().to_string(),
            from.to_string(),
            recipients.iter().map(|r| r.address().to_string()).collect(),
            source,
        );

        self.store.add_message(message).await
    }
}
