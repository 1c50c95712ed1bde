use std::collections::BTreeSet;

use outpost_common::internal;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::{
    address::{Label, SignedIdentity, VerpAddress},
    context::SigningContext,
    error::VerpError,
    realname::RealnameResolver,
};

/// Characters left untouched in an identity segment. Everything else,
/// including `+`, `%` and `@`, is escaped. A `.` is only kept where the
/// result stays a valid dot-atom, see [`escape_identity`].
const IDENTITY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Practical limit on the local part (RFC 5321 section 4.5.3.1.1).
const MAX_LOCAL_PART: usize = 64;

/// A message recipient as seen by the codec.
///
/// The caller resolves the recipient's account (if any) before encoding; the
/// codec only ever sees the resulting identity string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Only used for diagnostics
    pub email: String,
    pub principal: Option<String>,
}

impl Recipient {
    /// A recipient with no known account.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            principal: None,
        }
    }

    /// A recipient whose account identity is known.
    pub fn with_principal(email: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            principal: Some(principal.into()),
        }
    }
}

/// Ensure `from` carries a realname, leaving its local part untouched.
///
/// # Errors
/// [`VerpError::InvalidSender`] if `from` is not a single mailbox.
pub fn with_realname(from: &str, realnames: &RealnameResolver) -> Result<String, VerpError> {
    let mut address = VerpAddress::parse(from)
        .ok_or_else(|| VerpError::InvalidSender(from.to_string()))?;
    address.realname = Some(realnames.resolve(address.realname.as_deref()));
    Ok(address.to_string())
}

/// Rewrite `from` so bounces can be attributed to the recipient's account.
///
/// Labels already present on `from` are kept and `labels` are appended in
/// order. If the recipients resolve to exactly one distinct identity and a
/// signing context is available, a signed identity segment is appended as
/// well; zero or several identities leave the address without one, since
/// picking one of them would misattribute the bounce.
///
/// The result is always in `Realname <local@domain>` form.
///
/// # Errors
/// [`VerpError::InvalidSender`] if `from` is not a single mailbox.
pub fn encode(
    from: &str,
    recipients: &[Recipient],
    labels: &[Label],
    context: Option<&SigningContext>,
    realnames: &RealnameResolver,
) -> Result<String, VerpError> {
    let mut address = VerpAddress::parse(from)
        .ok_or_else(|| VerpError::InvalidSender(from.to_string()))?;

    address.realname = Some(realnames.resolve(address.realname.as_deref()));

    // A trailing component we did not sign is part of the caller's address
    let ours = address.identity.as_ref().is_some_and(|existing| {
        context.is_some_and(|ctx| ctx.verify(&address.unsigned_local_part(), &existing.signature))
    });
    if let Some(existing) = address.identity.take().filter(|_| !ours) {
        address
            .labels
            .push(format!("{}.{}", existing.encoded, existing.signature));
    }

    address
        .labels
        .extend(labels.iter().map(|label| label.as_str().to_string()));

    let identities: BTreeSet<&str> = recipients
        .iter()
        .filter_map(|recipient| recipient.principal.as_deref())
        .filter(|principal| !principal.is_empty())
        .collect();

    address.identity = match (identities.len(), context) {
        (1, Some(context)) => identities.first().map(|identity| {
            let encoded = escape_identity(identity);
            let unsigned = format!("{}+{encoded}", unsigned_prefix(&address));
            SignedIdentity {
                signature: context.sign(&unsigned),
                encoded,
            }
        }),
        (1, None) => {
            internal!(
                level = DEBUG,
                "No signing context, sending {} without an identity",
                address.addr_spec()
            );
            None
        }
        (count, _) => {
            let emails: Vec<&str> = recipients.iter().map(|r| r.email.as_str()).collect();
            internal!(
                level = DEBUG,
                identities = count,
                recipients = ?emails,
                "Recipients do not resolve to a single identity, not embedding one"
            );
            None
        }
    };

    let local_len = address.local_part().len();
    if local_len > MAX_LOCAL_PART {
        internal!(
            level = WARN,
            length = local_len,
            "VERP local part exceeds {MAX_LOCAL_PART} octets and may be rejected"
        );
    }

    Ok(address.to_string())
}

/// Recover the identity embedded in `address`.
///
/// Returns an empty vector whenever the identity cannot be trusted: no
/// signing context, an unparseable address, no identity segment, a signature
/// mismatch or an identity that does not decode. This never fails loudly; a
/// forged address is simply one that names nobody.
#[must_use]
pub fn decode(address: &str, context: Option<&SigningContext>) -> Vec<String> {
    let Some(context) = context else {
        internal!(level = DEBUG, "No signing context, ignoring VERP identity");
        return Vec::new();
    };

    let Some(parsed) = VerpAddress::parse(address) else {
        internal!(level = DEBUG, "Unparseable VERP address {address:?}");
        return Vec::new();
    };

    let Some(identity) = &parsed.identity else {
        return Vec::new();
    };

    if !context.verify(&parsed.unsigned_local_part(), &identity.signature) {
        internal!(
            level = DEBUG,
            site = context.site_key(),
            "VERP signature mismatch for {address:?}"
        );
        return Vec::new();
    }

    percent_decode_str(&identity.encoded)
        .decode_utf8()
        .map(|decoded| vec![decoded.into_owned()])
        .unwrap_or_default()
}

/// Percent-encode an identity for the local part.
///
/// Interior dots are kept, but a leading or trailing dot, or one next to
/// another dot, becomes `%2E` so the local part stays a dot-atom once the
/// `.signature` suffix is added.
fn escape_identity(identity: &str) -> String {
    let encoded = utf8_percent_encode(identity, IDENTITY).to_string();
    let bytes = encoded.as_bytes();
    let mut escaped = String::with_capacity(encoded.len());

    for (index, c) in encoded.char_indices() {
        let lone_dot = index > 0
            && index + 1 < bytes.len()
            && bytes[index - 1] != b'.'
            && bytes[index + 1] != b'.';
        if c == '.' && !lone_dot {
            escaped.push_str("%2E");
        } else {
            escaped.push(c);
        }
    }

    escaped
}

/// The local part up to, but not including, the identity segment.
fn unsigned_prefix(address: &VerpAddress) -> String {
    VerpAddress {
        identity: None,
        ..address.clone()
    }
    .unsigned_local_part()
}

/// Encoder/decoder bound to one site's signing context and realname chain.
///
/// Construct one per site (or per request); contexts are never shared
/// between sites.
#[derive(Debug, Clone, Default)]
pub struct VerpCodec {
    context: Option<SigningContext>,
    realnames: RealnameResolver,
}

impl VerpCodec {
    #[must_use]
    pub const fn new(context: Option<SigningContext>, realnames: RealnameResolver) -> Self {
        Self { context, realnames }
    }

    #[must_use]
    pub const fn context(&self) -> Option<&SigningContext> {
        self.context.as_ref()
    }

    /// See [`encode`].
    ///
    /// # Errors
    /// [`VerpError::InvalidSender`] if `from` is not a single mailbox.
    pub fn encode(
        &self,
        from: &str,
        recipients: &[Recipient],
        labels: &[Label],
    ) -> Result<String, VerpError> {
        encode(from, recipients, labels, self.context.as_ref(), &self.realnames)
    }

    /// See [`decode`].
    #[must_use]
    pub fn decode(&self, address: &str) -> Vec<String> {
        decode(address, self.context.as_ref())
    }

    /// See [`with_realname`].
    ///
    /// # Errors
    /// [`VerpError::InvalidSender`] if `from` is not a single mailbox.
    pub fn with_realname(&self, from: &str) -> Result<String, VerpError> {
        with_realname(from, &self.realnames)
    }
}
