use serde::{Deserialize, Serialize};

/// An account on a chat channel (a user, an agent, or the bot itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
        }
    }
}

/// The conversation a message belongs to on its channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConversationAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// An inbound or outbound event on a channel, in the Bot-Framework-style
/// wire shape channel connectors post to us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "serviceUrl")]
    pub service_url: String,
    #[serde(rename = "channelId")]
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    pub conversation: ConversationAccount,
    /// Channel-specific metadata bag. Back-channel payloads ride here.
    #[serde(rename = "channelData", skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<serde_json::Value>,
}

impl Activity {
    /// A plain chat message on the given channel and conversation.
    pub fn message(
        channel_id: impl Into<String>,
        service_url: impl Into<String>,
        conversation: ConversationAccount,
        text: impl Into<String>,
    ) -> Self {
        Self {
            activity_type: "message".to_string(),
            id: None,
            text: Some(text.into()),
            service_url: service_url.into(),
            channel_id: channel_id.into(),
            from: None,
            recipient: None,
            conversation,
            channel_data: None,
        }
    }

    pub fn with_from(mut self, from: ChannelAccount) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_recipient(mut self, recipient: ChannelAccount) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_channel_data(mut self, data: serde_json::Value) -> Self {
        self.channel_data = Some(data);
        self
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
