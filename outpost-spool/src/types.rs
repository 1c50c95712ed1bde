/// Identifier for a spooled message
///
/// This is the message's filename inside the maildir. Messages enqueued by
/// this crate are named with a ULID, which sorts by creation time, but any
/// plain filename dropped into the maildir by another producer is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpooledMessageId {
    name: String,
}

impl SpooledMessageId {
    /// Parse a message ID from a maildir filename
    ///
    /// # Security
    /// This function explicitly rejects:
    /// - Path separators (/ and \)
    /// - Directory traversal patterns (..)
    /// - Dot-files, which hold locks, rejected messages and partial writes
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.is_empty()
            || filename.starts_with('.')
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return None;
        }

        Some(Self {
            name: filename.to_string(),
        })
    }

    /// Generate a new unique message ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            name: ulid::Ulid::new().to_string(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The creation time encoded in the ID, if it is a ULID
    #[must_use]
    pub fn timestamp_ms(&self) -> Option<u64> {
        ulid::Ulid::from_string(&self.name)
            .ok()
            .map(|id| id.timestamp_ms())
    }
}

impl std::fmt::Display for SpooledMessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
