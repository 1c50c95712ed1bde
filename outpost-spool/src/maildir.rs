use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    time::{Duration, SystemTime},
};

use outpost_common::{Transport, internal};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::{
    SpoolConfig, SpoolError, SpoolMessage, SpooledMessageId, ValidationError, error::Result,
};

const TMP: &str = "tmp";
const NEW: &str = "new";
const CUR: &str = "cur";

const SENDING_PREFIX: &str = ".sending-";
const REJECTED_PREFIX: &str = ".rejected-";

/// Outcome of draining the spool once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Accepted by the transport and removed
    pub delivered: usize,
    /// Permanently rejected (or unreadable) and set aside
    pub rejected: usize,
    /// Transiently failed and left queued
    pub deferred: usize,
    /// Locked by another sender, or gone before it could be read
    pub skipped: usize,
}

impl DrainReport {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.delivered + self.rejected + self.deferred + self.skipped
    }
}

enum Outcome {
    Delivered,
    Rejected,
    Deferred,
    Skipped,
}

/// Maildir-backed spool
///
/// ```text
/// <root>/tmp   partially written messages and `.sending-` locks
/// <root>/new   complete messages waiting for delivery (watched for changes)
/// <root>/cur   messages moved aside by other tools, plus `.rejected-` files
/// ```
///
/// # Atomicity
/// Messages are written to `tmp/` and renamed into `new/`, so a reader never
/// sees a partial message. Only one dispatcher may drain a maildir at a time;
/// the per-message lock files protect against overlapping sends, not against
/// two dispatchers racing over the same queue.
#[derive(Debug, Clone)]
pub struct Maildir {
    root: PathBuf,
    config: SpoolConfig,
}

impl Maildir {
    /// Open the maildir at `path`
    ///
    /// With `create`, missing `tmp/`, `new/` and `cur/` directories are
    /// created; otherwise they must already exist.
    ///
    /// # Errors
    /// - If the path contains `..` or lies in a system directory
    /// - If the directories do not exist (and `create` is false) or cannot
    ///   be created
    pub fn open(path: impl Into<PathBuf>, create: bool) -> Result<Self> {
        let root = std::path::absolute(path.into())?;
        Self::validate_path(&root)?;

        internal!("Opening maildir at {}", root.display());

        for sub in [TMP, NEW, CUR] {
            let dir = root.join(sub);
            if !dir.try_exists()? {
                if !create {
                    return Err(ValidationError::PathNotFound(dir.display().to_string()).into());
                }
                internal!("{} does not exist, creating...", dir.display());
                std::fs::create_dir_all(&dir)?;
            } else if !dir.is_dir() {
                return Err(ValidationError::NotDirectory(dir.display().to_string()).into());
            }
        }

        Ok(Self {
            root,
            config: SpoolConfig::default(),
        })
    }

    #[must_use]
    pub fn with_config(mut self, config: SpoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate a spool path for security
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Rejects paths to sensitive system directories
    fn validate_path(path: &Path) -> Result<()> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentComponent(path.display().to_string()).into());
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        for prefix in sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(ValidationError::SystemDirectory {
                    prefix,
                    path: path.display().to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The directory new messages appear in
    #[must_use]
    pub fn incoming_dir(&self) -> PathBuf {
        self.root.join(NEW)
    }

    /// Queue a message
    ///
    /// The message is written under `tmp/` and atomically renamed into
    /// `new/`, which is what makes it visible to the dispatcher.
    ///
    /// # Errors
    /// - [`SpoolError::InvalidEnvelope`] if the envelope cannot be stored
    /// - If either the write or the rename fails
    pub async fn enqueue(
        &self,
        from: &str,
        to: &[String],
        data: &[u8],
    ) -> Result<SpooledMessageId> {
        let bytes = SpoolMessage::to_spool_bytes(from, to, data)?;

        let id = SpooledMessageId::generate();
        let tmp_path = self.root.join(TMP).join(id.as_str());
        let new_path = self.incoming_dir().join(id.as_str());

        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, &new_path).await?;

        internal!(level = DEBUG, "Spooled message {id} to {}", new_path.display());

        Ok(id)
    }

    /// List queued messages in `new/` and `cur/`, sorted by name
    ///
    /// # Errors
    /// If either directory cannot be read
    pub async fn list(&self) -> Result<Vec<SpooledMessageId>> {
        let mut ids = Vec::new();

        for sub in [NEW, CUR] {
            let mut entries = fs::read_dir(self.root.join(sub)).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                if let Some(id) = SpooledMessageId::from_filename(&entry.file_name().to_string_lossy())
                {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        ids.dedup();

        internal!(level = DEBUG, "Found {} messages in spool", ids.len());

        Ok(ids)
    }

    /// Number of queued messages
    ///
    /// # Errors
    /// If the maildir cannot be read
    pub async fn len(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    /// # Errors
    /// If the maildir cannot be read
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn locate(&self, id: &SpooledMessageId) -> Result<PathBuf> {
        for sub in [NEW, CUR] {
            let path = self.root.join(sub).join(id.as_str());
            if fs::try_exists(&path).await? {
                return Ok(path);
            }
        }

        Err(SpoolError::NotFound(id.clone()))
    }

    /// Read a queued message
    ///
    /// # Errors
    /// - [`SpoolError::NotFound`] if the message is not queued
    /// - [`SpoolError::InvalidMessage`] if its envelope cannot be parsed
    pub async fn read(&self, id: &SpooledMessageId) -> Result<SpoolMessage> {
        let path = self.locate(id).await?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        SpoolMessage::from_spool_bytes(id.clone(), path, &bytes)
    }

    /// Remove a queued message
    ///
    /// # Errors
    /// - [`SpoolError::NotFound`] if the message is not queued
    pub async fn remove(&self, id: &SpooledMessageId) -> Result<()> {
        let path = self.locate(id).await?;
        fs::remove_file(&path).await?;
        internal!(level = DEBUG, "Deleted message {id} from spool");
        Ok(())
    }

    /// Move a message out of the queue, keeping it for inspection as
    /// `cur/.rejected-<id>`
    async fn reject(&self, id: &SpooledMessageId, path: &Path) -> Result<()> {
        let rejected = self
            .root
            .join(CUR)
            .join(format!("{REJECTED_PREFIX}{id}"));
        fs::rename(path, &rejected).await?;
        Ok(())
    }

    /// Drain the queue through `transport`
    ///
    /// Every queued message is handed to the transport in name order:
    /// - accepted messages are removed
    /// - permanently rejected messages, and files without a readable
    ///   envelope, are moved aside and never retried
    /// - transiently failed messages stay queued for the next drain
    ///
    /// # Errors
    /// - If the maildir cannot be listed
    /// - [`SpoolError::Transport`] if the transport becomes unreachable; the
    ///   current message and everything after it stay queued
    pub async fn drain(&self, transport: &mut dyn Transport) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        for id in self.list().await? {
            let Some(lock) = self.lock(&id).await? else {
                debug!(message_id = %id, "Message is locked by another sender, skipping");
                report.skipped += 1;
                continue;
            };

            let outcome = self.deliver(&id, transport).await;
            self.unlock(&lock).await;

            match outcome {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Rejected) => report.rejected += 1,
                Ok(Outcome::Deferred) => report.deferred += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(SpoolError::Transport(e)) => {
                    warn!(message_id = %id, error = %e, "Transport lost during drain, stopping");
                    return Err(SpoolError::Transport(e));
                }
                Err(e) => {
                    error!(message_id = %id, error = %e, "Failed to process spooled message");
                    report.deferred += 1;
                }
            }
        }

        if report.total() > 0 {
            info!(
                delivered = report.delivered,
                rejected = report.rejected,
                deferred = report.deferred,
                skipped = report.skipped,
                "Drained spool"
            );
        }

        Ok(report)
    }

    async fn deliver(&self, id: &SpooledMessageId, transport: &mut dyn Transport) -> Result<Outcome> {
        let message = match self.read(id).await {
            Ok(message) => message,
            Err(SpoolError::NotFound(_)) => return Ok(Outcome::Skipped),
            Err(SpoolError::InvalidMessage(reason)) => {
                error!(message_id = %id, %reason, "Discarding unreadable spool file");
                let path = self.locate(id).await?;
                self.reject(id, &path).await?;
                return Ok(Outcome::Rejected);
            }
            Err(e) => return Err(e),
        };

        match transport.send(&message.from, &message.to, &message.data).await {
            Ok(()) => {
                fs::remove_file(&message.path).await?;
                info!(
                    message_id = %id,
                    from = %message.from,
                    to = ?message.to,
                    "Mail delivered"
                );
                Ok(Outcome::Delivered)
            }
            Err(e) if e.is_permanent() => {
                error!(
                    message_id = %id,
                    from = %message.from,
                    to = ?message.to,
                    error = %e,
                    "Discarding email after permanent failure"
                );
                self.reject(id, &message.path).await?;
                Ok(Outcome::Rejected)
            }
            Err(e @ outpost_common::TransportError::Unreachable(_)) => Err(SpoolError::Transport(e)),
            Err(e) => {
                warn!(message_id = %id, error = %e, "Delivery failed, will retry");
                Ok(Outcome::Deferred)
            }
        }
    }

    /// Take the `.sending-` lock for a message, replacing stale locks
    ///
    /// Returns `None` if another sender holds a fresh lock.
    async fn lock(&self, id: &SpooledMessageId) -> Result<Option<PathBuf>> {
        let lock = self.root.join(TMP).join(format!("{SENDING_PREFIX}{id}"));
        let stale_after = Duration::from_secs(self.config.stale_lock_secs);

        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock)
                .await
            {
                Ok(_) => return Ok(Some(lock)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let age = fs::metadata(&lock)
                        .await?
                        .modified()?
                        .elapsed()
                        .unwrap_or_default();
                    if age < stale_after {
                        return Ok(None);
                    }

                    warn!(message_id = %id, age_secs = age.as_secs(), "Removing stale send lock");
                    match fs::remove_file(&lock).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    async fn unlock(&self, lock: &Path) {
        if let Err(e) = fs::remove_file(lock).await
            && e.kind() != ErrorKind::NotFound
        {
            warn!(lock = %lock.display(), error = %e, "Failed to remove send lock");
        }
    }

    /// Modification time of the incoming directory
    ///
    /// # Errors
    /// If the directory cannot be inspected
    pub async fn incoming_modified(&self) -> Result<SystemTime> {
        Ok(fs::metadata(self.incoming_dir()).await?.modified()?)
    }
}
