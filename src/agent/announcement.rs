//! Update announcements.
//!
//! A single JSON message on the update topic proposes a firmware update:
//!
//! ```json
//! { "command": "update",
//!   "version": "1.2.3",
//!   "firmware_url": "https://host/firmware.bin",
//!   "checksum": "<64 hex chars>" }
//! ```
//!
//! Every field is required and must be a JSON string; a numeric or object
//! value for any of them is a malformed announcement, which serde enforces
//! for free.  Unknown extra fields are ignored.  Messages whose `command`
//! is not `"update"` are valid but silently skipped.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::OtaError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAnnouncement {
    pub command: String,
    pub version: String,
    #[serde(rename = "firmware_url")]
    pub firmware_url: String,
    pub checksum: String,
}

/// Parse a complete announcement payload.
///
/// Returns `Ok(Some(_))` for an accepted update announcement,
/// `Ok(None)` for a well-formed message with a non-update command, and
/// `Err(MalformedAnnouncement)` for everything else.
pub fn parse(payload: &[u8]) -> Result<Option<UpdateAnnouncement>, OtaError> {
    let ann: UpdateAnnouncement = serde_json::from_slice(payload)
        .map_err(|_| OtaError::MalformedAnnouncement("missing or non-string required field"))?;

    if ann.version.is_empty()
        || ann.firmware_url.is_empty()
        || ann.checksum.is_empty()
        || ann.command.is_empty()
    {
        return Err(OtaError::MalformedAnnouncement("empty required field"));
    }

    if ann.command != "update" {
        info!("ignoring non-update command: {}", ann.command);
        return Ok(None);
    }

    Ok(Some(ann))
}
