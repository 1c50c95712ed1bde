use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of the signature appended to an identity segment.
///
/// Six characters of the URL-safe base64 alphabet carry 36 bits. That keeps
/// the local part short enough for mail systems that limit its length while
/// still defeating casual tampering and replay across sites.
pub const SIGNATURE_LEN: usize = 6;

/// Site key and secret used to sign and verify identity segments.
///
/// The site key is mixed into every signature, so a signature minted for one
/// site never validates on another even if the secrets are shared.
#[derive(Clone)]
pub struct SigningContext {
    site_key: String,
    mac: HmacSha256,
}

impl SigningContext {
    /// Create a signing context.
    ///
    /// Returns `None` if either the site key or the secret is empty; callers
    /// treat that the same as having no context at all.
    #[must_use]
    pub fn new(site_key: impl Into<String>, secret: impl AsRef<[u8]>) -> Option<Self> {
        let site_key = site_key.into();
        let secret = secret.as_ref();
        if site_key.is_empty() || secret.is_empty() {
            return None;
        }

        let mac = HmacSha256::new_from_slice(secret).ok()?;
        Some(Self { site_key, mac })
    }

    #[must_use]
    pub fn site_key(&self) -> &str {
        &self.site_key
    }

    /// Compute the signature over the unsigned part of a local part,
    /// e.g. `no-reply+label+foo%2B` for `no-reply+label+foo%2B.<sig>`.
    pub(crate) fn sign(&self, unsigned: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(unsigned.as_bytes());
        mac.update(&[0]);
        mac.update(self.site_key.as_bytes());
        let digest = mac.finalize().into_bytes();

        let mut signature = URL_SAFE_NO_PAD.encode(&digest[..SIGNATURE_LEN]);
        signature.truncate(SIGNATURE_LEN);
        signature
    }

    /// Check `signature` against the unsigned part without short-circuiting
    /// on the first differing byte.
    pub(crate) fn verify(&self, unsigned: &str, signature: &str) -> bool {
        let expected = self.sign(unsigned);
        expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("site_key", &self.site_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Per-site signing secret.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSigning {
    pub secret: String,
}

/// Signing configuration.
///
/// ```ron
/// signing: (
///     secret: Some("shared-secret"),
///     sites: {
///         "alpha.nextthought.com": (secret: "alpha-only"),
///     },
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SigningConfig {
    /// Secret used for any site without its own entry
    #[serde(default)]
    pub secret: Option<String>,

    /// Secrets for individual sites, keyed by site key
    #[serde(default)]
    pub sites: HashMap<String, SiteSigning>,
}

impl SigningConfig {
    /// Build the signing context for `site_key`.
    ///
    /// A site-specific secret takes precedence over the shared one. Returns
    /// `None` when no secret can be resolved for the site.
    #[must_use]
    pub fn context_for(&self, site_key: &str) -> Option<SigningContext> {
        let secret = self
            .sites
            .get(site_key)
            .map(|site| site.secret.as_str())
            .or(self.secret.as_deref())?;

        SigningContext::new(site_key, secret)
    }
}
