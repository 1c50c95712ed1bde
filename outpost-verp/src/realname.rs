use std::{fmt, sync::Arc};

use crate::address::split_mailbox;

/// Display name used when nothing else is configured.
pub const FALLBACK_REALNAME: &str = "NextThought";

/// A site-registered source of sender display names.
pub trait DisplayNameProvider: Send + Sync {
    /// The display name for the current site, if it has one.
    fn display_name(&self) -> Option<String>;
}

impl<F> DisplayNameProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn display_name(&self) -> Option<String> {
        self()
    }
}

/// Picks the human readable name shown in a sender address.
///
/// First match wins:
/// 1. a realname already present on the address
/// 2. the site's [`DisplayNameProvider`]
/// 3. the realname of the configured default sender
/// 4. the fallback brand name
///
/// Missing providers or configuration fall through to the next step.
#[derive(Clone)]
pub struct RealnameResolver {
    provider: Option<Arc<dyn DisplayNameProvider>>,
    default_sender: Option<String>,
    fallback: String,
}

impl RealnameResolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: None,
            default_sender: None,
            fallback: FALLBACK_REALNAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn DisplayNameProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// The configured default sender, e.g. `Janux <janux@ou.edu>`; only its
    /// realname is used.
    #[must_use]
    pub fn with_default_sender(mut self, sender: impl Into<String>) -> Self {
        self.default_sender = Some(sender.into());
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Resolve the realname, preferring `explicit` when it is non-empty.
    #[must_use]
    pub fn resolve(&self, explicit: Option<&str>) -> String {
        if let Some(name) = explicit.map(str::trim).filter(|name| !name.is_empty()) {
            return name.to_string();
        }

        self.provider
            .as_ref()
            .and_then(|provider| provider.display_name())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.default_sender
                    .as_deref()
                    .and_then(split_mailbox)
                    .and_then(|(realname, _)| realname)
            })
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for RealnameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RealnameResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealnameResolver")
            .field("provider", &self.provider.is_some())
            .field("default_sender", &self.default_sender)
            .field("fallback", &self.fallback)
            .finish()
    }
}
