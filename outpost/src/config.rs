use std::path::{Path, PathBuf};

use outpost_delivery::{DispatcherConfig, HttpTransportConfig};
use outpost_spool::SpoolConfig;
use outpost_verp::{FALLBACK_REALNAME, RealnameResolver, SigningConfig, VerpCodec};
use serde::Deserialize;

pub const CONFIG_ENV: &str = "OUTPOST_CONFIG";

fn default_fallback_realname() -> String {
    FALLBACK_REALNAME.to_string()
}

/// How sender display names are chosen when an address has none
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    /// e.g. `"Janux <janux@ou.edu>"`; only the realname is used
    #[serde(default)]
    pub default_sender: Option<String>,

    #[serde(default = "default_fallback_realname")]
    pub fallback_realname: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            default_sender: None,
            fallback_realname: default_fallback_realname(),
        }
    }
}

impl SenderConfig {
    pub fn resolver(&self) -> RealnameResolver {
        let resolver = RealnameResolver::new().with_fallback(self.fallback_realname.clone());
        match &self.default_sender {
            Some(sender) => resolver.with_default_sender(sender.clone()),
            None => resolver,
        }
    }
}

/// Top level configuration, read from `outpost.config.ron`
///
/// ```ron
/// (
///     dispatcher: (poll_interval_secs: 120, cooldown_secs: 10),
///     transport: (endpoint: "https://relay.{region}.example.com", region: "us-east-1"),
///     signing: (secret: Some("shared-secret")),
///     sender: (default_sender: Some("Janux <janux@ou.edu>")),
///     spool: (stale_lock_secs: 10800),
/// )
/// ```
///
/// Every section, and every field within one, may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Outpost {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub transport: HttpTransportConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub spool: SpoolConfig,
}

impl Outpost {
    /// Load the configuration, falling back to the built-in defaults when no
    /// file is found
    ///
    /// # Errors
    /// If a configuration file was named but is missing, cannot be read, or
    /// does not parse.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = find_config_file(explicit)? else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
    }

    /// Codec for `site_key`, signing with that site's secret if one is
    /// configured
    pub fn codec(&self, site_key: &str) -> VerpCodec {
        VerpCodec::new(self.signing.context_for(site_key), self.sender.resolver())
    }
}

/// Find the configuration file using the following precedence:
/// 1. an explicitly given path (`--config`)
/// 2. `OUTPOST_CONFIG` environment variable
/// 3. ./outpost.config.ron (current working directory)
/// 4. /etc/outpost/outpost.config.ron (system-wide config)
///
/// # Errors
/// If an explicitly named file (1 or 2) does not exist.
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    find_config_file_with(explicit, std::env::var(CONFIG_ENV).ok())
}

fn find_config_file_with(
    explicit: Option<&Path>,
    env_path: Option<String>,
) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    Ok([
        PathBuf::from("./outpost.config.ron"),
        PathBuf::from("/etc/outpost/outpost.config.ron"),
    ]
    .into_iter()
    .find(|path| path.exists()))
}
