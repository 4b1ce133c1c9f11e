use serde::Deserialize;

use crate::backchannel;

/// Router configuration, deserializable from the host process's config file.
///
/// Everything here has a working default; a router built with
/// `RouterSettings::default()` behaves per the stock protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Text marker and metadata key identifying back-channel control
    /// messages.
    pub backchannel_marker: String,
    /// Conversations the bot should treat as aggregation channels, i.e.
    /// broadcast targets for routing notifications.
    pub aggregation: Vec<AggregationChannel>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            backchannel_marker: backchannel::DEFAULT_MARKER.to_string(),
            aggregation: Vec::new(),
        }
    }
}

/// The bot's seat in one aggregation conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationChannel {
    pub channel_id: String,
    pub service_url: String,
    /// The bot's account id on this channel.
    pub account_id: String,
    pub conversation_id: String,
}
