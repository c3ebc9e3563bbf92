use chrono::{DateTime, Utc};
use mailparse::MailHeaderMap;

/// One captured message, addressed to a single mailbox.
///
/// The source is the exact bytes the capture pipeline assembled: the
/// per-recipient Received header followed by the body as received on the
/// wire. Nothing else is synthesised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    mailbox: String,
    id: String,
    from: String,
    to: Vec<String>,
    date: DateTime<Utc>,
    source: Vec<u8>,
}

impl StoredMessage {
    /// Create a message captured now, with a fresh identifier.
    #[must_use]
    pub fn new(mailbox: String, from: String, to: Vec<String>, source: Vec<u8>) -> Self {
        Self {
            mailbox,
            // ULIDs sort lexicographically by creation time
            id: ulid::Ulid::new().to_string(),
            from,
            to,
            date: Utc::now(),
            source,
        }
    }

    /// The mailbox this message belongs to.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// The message identifier, unique within the store.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The envelope sender.
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// All envelope recipients of the originating transaction.
    #[must_use]
    pub fn to(&self) -> &[String] {
        &self.to
    }

    /// When the message was captured.
    #[must_use]
    pub const fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// The raw stored bytes, Received header included.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Stored size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.source.len()
    }

    /// The Subject header, if the source parses and carries one.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        let (headers, _) = mailparse::parse_headers(&self.source).ok()?;
        headers.get_first_value("Subject")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_parsed_from_source() {
        let source = b"Received: from client ([127.0.0.1]) by inbucket\r\n  for <a@ex>; now\r\n\
                       Subject: Greetings\r\n\r\nhello\r\n"
            .to_vec();
        let msg = StoredMessage::new(
            "a".to_string(),
            "sender@ex".to_string(),
            vec!["a@ex".to_string()],
            source,
        );

        assert_eq!(msg.subject().as_deref(), Some("Greetings"));
        assert_eq!(msg.size(), msg.source().len());
    }

    #[test]
    fn subject_absent_when_headers_lack_one() {
        let msg = StoredMessage::new(
            "a".to_string(),
            "sender@ex".to_string(),
            vec![],
            b"X-Nothing: here\r\n\r\nbody\r\n".to_vec(),
        );
        assert_eq!(msg.subject(), None);
    }

    #[test]
    fn ids_are_unique() {
        let a = StoredMessage::new("m".into(), "f".into(), vec![], vec![]);
        let b = StoredMessage::new("m".into(), "f".into(), vec![], vec![]);
        assert_ne!(a.id(), b.id());
    }
}
