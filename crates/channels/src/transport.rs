use {anyhow::Result, async_trait::async_trait, tandem_common::Party};

/// Acknowledgement for a delivered message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeliveryReceipt {
    /// Channel-assigned id of the delivered message, when the channel
    /// reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl DeliveryReceipt {
    pub fn new(message_id: Option<String>) -> Self {
        Self { message_id }
    }
}

/// A freshly created direct 1:1 conversation on a channel.
///
/// `id` is the channel's conversation id. `raw` carries the channel's full
/// creation response untouched, since some channels put data there that the
/// caller may need (and some report unreliable ids, see the router's
/// engagement setup).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreatedConversation {
    pub id: String,
    pub raw: serde_json::Value,
}

/// Delivery side of a channel connector. One implementation typically fans
/// out to the per-channel connectors it owns, keyed by the party's channel.
///
/// Retry and backoff live behind this trait, never in the routing core: a
/// returned error is final from the router's point of view.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Deliver `text` to the party's conversation on its channel.
    async fn send_message(&self, recipient: &Party, text: &str) -> Result<DeliveryReceipt>;

    /// Create a direct 1:1 conversation between the bot identity and the
    /// given party on the bot's channel.
    async fn create_direct_conversation(
        &self,
        bot: &Party,
        counterpart: &Party,
    ) -> Result<CreatedConversation>;
}
