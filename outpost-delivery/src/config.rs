use serde::Deserialize;

const fn default_poll_interval() -> u64 {
    120
}

const fn default_cooldown() -> u64 {
    10
}

/// Timing for the two dispatch policies
///
/// ```ron
/// dispatcher: (
///     poll_interval_secs: 120,
///     cooldown_secs: 10,
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DispatcherConfig {
    /// How long the polling policy sleeps between cycles (in seconds)
    ///
    /// Default: 120 seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// How long the change-driven policy suppresses further cycles after one
    /// has started (in seconds)
    ///
    /// Changes seen during the window are coalesced into a single cycle when
    /// it expires.
    ///
    /// Default: 10 seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            cooldown_secs: default_cooldown(),
        }
    }
}
