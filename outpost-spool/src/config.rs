use serde::Deserialize;

const fn default_stale_lock_secs() -> u64 {
    60 * 60 * 3
}

/// Tunables for the maildir spool
///
/// ```ron
/// spool: (
///     stale_lock_secs: 10800,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SpoolConfig {
    /// How long a `.sending-` lock is honoured before it is considered left
    /// over from a crashed dispatcher and replaced (in seconds)
    ///
    /// Default: 10800 seconds (3 hours)
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}
