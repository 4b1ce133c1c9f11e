//! Back-channel control protocol: accepting a pending connection request
//! out-of-band, through channel metadata instead of ordinary chat text.
//!
//! Wire shape, keyed under the configured marker in the activity's
//! `channelData` bag:
//!
//! ```json
//! { "backchannel": { "conversationId": "<serialized Party JSON>" } }
//! ```
//!
//! The marker must also appear as a prefix of the activity text, so plain
//! chat traffic is never mistaken for control traffic.

use tandem_common::{Activity, Party};

use crate::error::{Error, Result};

/// Default text marker and metadata key for back-channel messages.
pub const DEFAULT_MARKER: &str = "backchannel";

/// Property under the marker holding the serialized target-client party.
pub const CONVERSATION_ID_KEY: &str = "conversationId";

/// Extract the target client party from a back-channel activity.
///
/// Returns `None` when the activity is not back-channel traffic (no marker
/// prefix on the text), so the caller falls through to normal handling.
/// Marker present but payload missing or malformed is an error; the caller
/// must check the outcome and assume no side effects occurred.
pub fn extract_client_party(activity: &Activity, marker: &str) -> Option<Result<Party>> {
    // An empty marker would classify every message as control traffic;
    // treat it as unset.
    let marker = if marker.is_empty() {
        DEFAULT_MARKER
    } else {
        marker
    };
    if !activity.text().starts_with(marker) {
        return None;
    }
    Some(decode_payload(activity, marker))
}

fn decode_payload(activity: &Activity, marker: &str) -> Result<Party> {
    let data = activity
        .channel_data
        .as_ref()
        .ok_or_else(|| Error::backchannel("activity carries no channel data"))?;
    let entry = data
        .get(marker)
        .ok_or_else(|| Error::backchannel(format!("channel data has no '{marker}' entry")))?;
    let payload = entry.get(CONVERSATION_ID_KEY).ok_or_else(|| {
        Error::backchannel(format!(
            "back-channel entry has no '{CONVERSATION_ID_KEY}' property"
        ))
    })?;

    // The party document is normally a string-embedded JSON value, but a
    // directly embedded object is accepted too.
    let party = match payload.as_str() {
        Some(raw) => Party::from_json_str(raw)
            .map_err(|e| Error::backchannel(format!("party document did not parse: {e}")))?,
        None => serde_json::from_value::<Party>(payload.clone())?,
    };
    Ok(party)
}
