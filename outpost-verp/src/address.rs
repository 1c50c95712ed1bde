use std::{fmt, str::FromStr};

use mailparse::MailAddr;

use crate::{SIGNATURE_LEN, error::VerpError};

/// A caller-supplied tag embedded in the local part, e.g. a mail stream name.
///
/// Labels are delimiter-safe by construction: they may not contain `+`, `%`,
/// `.`, `@` or whitespace, so they never need escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    /// # Errors
    /// [`VerpError::InvalidLabel`] if the token is empty or contains a
    /// structural delimiter.
    pub fn new(token: impl Into<String>) -> Result<Self, VerpError> {
        let token = token.into();
        let valid = !token.is_empty()
            && !token
                .chars()
                .any(|c| matches!(c, '+' | '%' | '.' | '@' | '<' | '>') || c.is_whitespace());

        if valid {
            Ok(Self(token))
        } else {
            Err(VerpError::InvalidLabel(token))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Label {
    type Err = VerpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Label {
    type Error = VerpError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The trailing `identity.signature` component of a VERP local part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIdentity {
    /// Percent-encoded identity
    pub encoded: String,
    pub signature: String,
}

/// A sender address split into its VERP components.
///
/// The identity and its signature are held together, so one can never be
/// present without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerpAddress {
    pub realname: Option<String>,
    /// Local part before the first `+`
    pub base: String,
    pub labels: Vec<String>,
    pub identity: Option<SignedIdentity>,
    pub domain: String,
}

impl VerpAddress {
    /// Parse either `Realname <local@domain>` or a bare `local@domain`.
    ///
    /// Returns `None` if the input is not a single mailbox with a non-empty
    /// local part and domain. A trailing component only counts as a signed
    /// identity if its suffix after the rightmost `.` has the shape of a
    /// signature; otherwise every component after the base is a label.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let (realname, addr) = split_mailbox(input)?;
        let (local, domain) = addr.rsplit_once('@')?;
        if local.is_empty() || domain.is_empty() {
            return None;
        }

        let mut components = local.split('+');
        let base = components.next().filter(|base| !base.is_empty())?;
        let mut labels: Vec<String> = components.map(str::to_string).collect();

        let identity = labels
            .last()
            .and_then(|last| last.rsplit_once('.'))
            .filter(|(encoded, signature)| !encoded.is_empty() && looks_like_signature(signature))
            .map(|(encoded, signature)| SignedIdentity {
                encoded: encoded.to_string(),
                signature: signature.to_string(),
            });

        if identity.is_some() {
            labels.pop();
        }

        Some(Self {
            realname,
            base: base.to_string(),
            labels,
            identity,
            domain: domain.to_string(),
        })
    }

    /// The local part without the signature suffix; this is what gets signed.
    #[must_use]
    pub fn unsigned_local_part(&self) -> String {
        let mut local = self.base.clone();
        for label in &self.labels {
            local.push('+');
            local.push_str(label);
        }

        if let Some(identity) = &self.identity {
            local.push('+');
            local.push_str(&identity.encoded);
        }

        local
    }

    #[must_use]
    pub fn local_part(&self) -> String {
        let mut local = self.unsigned_local_part();
        if let Some(identity) = &self.identity {
            local.push('.');
            local.push_str(&identity.signature);
        }
        local
    }

    /// The bare `local@domain` form, without any realname.
    #[must_use]
    pub fn addr_spec(&self) -> String {
        format!("{}@{}", self.local_part(), self.domain)
    }
}

impl fmt::Display for VerpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.realname.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => write!(f, "{} <{}>", quote_realname(name), self.addr_spec()),
            None => f.write_str(&self.addr_spec()),
        }
    }
}

impl FromStr for VerpAddress {
    type Err = VerpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| VerpError::InvalidSender(s.to_string()))
    }
}

/// Split a mailbox into its display name and address.
pub(crate) fn split_mailbox(input: &str) -> Option<(Option<String>, String)> {
    let list = mailparse::addrparse(input.trim()).ok()?;
    if list.len() != 1 {
        return None;
    }

    match list.first()? {
        MailAddr::Single(info) => {
            let realname = info
                .display_name
                .as_ref()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty());
            Some((realname, info.addr.clone()))
        }
        MailAddr::Group(_) => None,
    }
}

fn looks_like_signature(candidate: &str) -> bool {
    candidate.len() == SIGNATURE_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Quote a display name if it contains RFC 5322 specials.
fn quote_realname(name: &str) -> String {
    const SPECIALS: &[char] = &[
        '(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"',
    ];

    if name.contains(SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        name.to_string()
    }
}
