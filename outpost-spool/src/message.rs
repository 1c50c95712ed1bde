use std::{path::PathBuf, sync::Arc};

use crate::{SpoolError, SpooledMessageId};

const ACTUALLY_FROM: &str = "X-Actually-From";
const ACTUALLY_TO: &str = "X-Actually-To";

/// A queued message as read back from the spool
///
/// The envelope travels in `X-Actually-From` / `X-Actually-To` headers
/// prepended to the message on disk, one `X-Actually-To` per recipient;
/// `data` is the message without them.
#[derive(Debug, Clone)]
pub struct SpoolMessage {
    pub id: SpooledMessageId,
    /// Where the message currently lives inside the maildir
    pub path: PathBuf,
    pub from: String,
    pub to: Vec<String>,
    pub data: Arc<[u8]>,
}

impl SpoolMessage {
    /// Check that an envelope survives being written as header lines
    ///
    /// # Errors
    /// [`SpoolError::InvalidEnvelope`] if there are no recipients, or an
    /// address contains a line break.
    pub fn check_envelope(from: &str, to: &[String]) -> crate::Result<()> {
        if to.is_empty() {
            return Err(SpoolError::InvalidEnvelope("no recipients".to_string()));
        }

        let broken = std::iter::once(from)
            .chain(to.iter().map(String::as_str))
            .find(|addr| addr.contains(['\r', '\n']));
        if let Some(addr) = broken {
            return Err(SpoolError::InvalidEnvelope(format!(
                "line break in address {addr:?}"
            )));
        }

        Ok(())
    }

    /// Serialise an envelope and message into the on-disk spool format
    ///
    /// # Errors
    /// See [`SpoolMessage::check_envelope`].
    pub fn to_spool_bytes(from: &str, to: &[String], data: &[u8]) -> crate::Result<Vec<u8>> {
        Self::check_envelope(from, to)?;

        let mut header = format!("{ACTUALLY_FROM}: {from}\r\n");
        for recipient in to {
            header.push_str(&format!("{ACTUALLY_TO}: {recipient}\r\n"));
        }

        let mut bytes = header.into_bytes();
        bytes.extend_from_slice(data);
        Ok(bytes)
    }

    /// Parse a spool file
    ///
    /// # Errors
    /// [`SpoolError::InvalidMessage`] if either envelope header is missing
    /// or the recipient list is empty.
    pub fn from_spool_bytes(
        id: SpooledMessageId,
        path: PathBuf,
        bytes: &[u8],
    ) -> crate::Result<Self> {
        let mut offset = 0;
        let mut from = None;
        let mut to = Vec::new();

        while offset < bytes.len() {
            let Ok((header, consumed)) = mailparse::parse_header(&bytes[offset..]) else {
                break;
            };

            let key = header.get_key();
            if key.eq_ignore_ascii_case(ACTUALLY_FROM) {
                from = Some(header.get_value().trim().to_string());
            } else if key.eq_ignore_ascii_case(ACTUALLY_TO) {
                let addr = header.get_value();
                let addr = addr.trim();
                if !addr.is_empty() {
                    to.push(addr.to_string());
                }
            } else {
                break;
            }

            offset += consumed;
        }

        let from = from
            .ok_or_else(|| SpoolError::InvalidMessage(format!("{id}: missing {ACTUALLY_FROM}")))?;
        if to.is_empty() {
            return Err(SpoolError::InvalidMessage(format!(
                "{id}: missing {ACTUALLY_TO}"
            )));
        }

        Ok(Self {
            id,
            path,
            from,
            to,
            data: Arc::from(&bytes[offset..]),
        })
    }
}
