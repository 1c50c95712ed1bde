//! Signed VERP (Variable Envelope Return Path) sender addresses.
//!
//! The local part of a sender address is extended with optional labels and,
//! when exactly one recipient account can be identified, a percent-encoded
//! identity followed by a short keyed signature:
//!
//! ```text
//! local-part = base *("+" label) ["+" identity "." signature]
//! ```
//!
//! A bounce or complaint that comes back to such an address can be
//! attributed to the recipient without any server-side state, and a
//! tampered or foreign address never resolves to an identity.

mod address;
mod codec;
mod context;
mod error;
mod realname;

pub use address::{Label, SignedIdentity, VerpAddress};
pub use codec::{Recipient, VerpCodec, decode, encode, with_realname};
pub use context::{SIGNATURE_LEN, SigningConfig, SigningContext, SiteSigning};
pub use error::VerpError;
pub use realname::{DisplayNameProvider, FALLBACK_REALNAME, RealnameResolver};
