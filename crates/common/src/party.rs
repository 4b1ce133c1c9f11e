use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::types::{Activity, ChannelAccount, ConversationAccount};

/// One addressable endpoint: an account bound to a specific channel and
/// conversation.
///
/// Identity is (channel id, account id, conversation id). The service URL
/// and display names are delivery details, not identity: the same logical
/// user reached over two transport endpoints is still one party, while the
/// same account in two conversations is two distinct parties.
///
/// A party is immutable. Rebinding to another conversation (e.g. after a
/// direct conversation is created) produces a new value via
/// [`Party::with_conversation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    #[serde(rename = "serviceUrl")]
    pub service_url: String,
    #[serde(rename = "channelId")]
    pub channel_id: String,
    #[serde(rename = "channelAccount")]
    pub channel_account: ChannelAccount,
    #[serde(rename = "conversationAccount")]
    pub conversation_account: ConversationAccount,
}

impl Party {
    pub fn new(
        service_url: impl Into<String>,
        channel_id: impl Into<String>,
        channel_account: ChannelAccount,
        conversation_account: ConversationAccount,
    ) -> Self {
        Self {
            service_url: service_url.into(),
            channel_id: channel_id.into(),
            channel_account,
            conversation_account,
        }
    }

    /// The party that sent this activity, if the activity names a sender.
    pub fn from_sender(activity: &Activity) -> Option<Self> {
        activity.from.as_ref().map(|from| {
            Self::new(
                activity.service_url.clone(),
                activity.channel_id.clone(),
                from.clone(),
                activity.conversation.clone(),
            )
        })
    }

    /// The party this activity is addressed to (on inbound traffic, the bot).
    pub fn from_recipient(activity: &Activity) -> Option<Self> {
        activity.recipient.as_ref().map(|recipient| {
            Self::new(
                activity.service_url.clone(),
                activity.channel_id.clone(),
                recipient.clone(),
                activity.conversation.clone(),
            )
        })
    }

    /// A new party for the same account rebound to another conversation.
    #[must_use]
    pub fn with_conversation(&self, conversation_account: ConversationAccount) -> Self {
        Self {
            service_url: self.service_url.clone(),
            channel_id: self.channel_id.clone(),
            channel_account: self.channel_account.clone(),
            conversation_account,
        }
    }

    /// Same channel and account, conversation ignored. Used to recognize a
    /// party whose tracked conversation binding differs from the one on an
    /// inbound activity.
    pub fn matches_channel_account(&self, channel_id: &str, account: &ChannelAccount) -> bool {
        self.channel_id == channel_id && self.channel_account.id == account.id
    }

    /// Serialize to the wire form carried in back-channel payloads.
    pub fn to_json_string(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a party document from its wire form.
    pub fn from_json_str(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn display_name(&self) -> &str {
        self.channel_account
            .name
            .as_deref()
            .unwrap_or(&self.channel_account.id)
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.channel_id == other.channel_id
            && self.channel_account.id == other.channel_account.id
            && self.conversation_account.id == other.conversation_account.id
    }
}

impl Eq for Party {}

// Hash must agree with PartialEq: only the identity triple participates.
impl Hash for Party {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.channel_id.hash(state);
        self.channel_account.id.hash(state);
        self.conversation_account.id.hash(state);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::collections::HashSet};

    fn party(service_url: &str, channel: &str, account: &str, conversation: &str) -> Party {
        Party::new(
            service_url,
            channel,
            ChannelAccount::new(account, Some("Display Name")),
            ConversationAccount::new(conversation),
        )
    }

    #[test]
    fn equality_ignores_service_url_and_names() {
        let a = party("https://a.example.com", "slack", "u1", "c1");
        let mut b = party("https://b.example.com", "slack", "u1", "c1");
        b.channel_account.name = Some("Other Name".into());
        assert_eq!(a, b);
    }

    #[test]
    fn equality_requires_full_identity_triple() {
        let base = party("https://x", "slack", "u1", "c1");
        assert_ne!(base, party("https://x", "telegram", "u1", "c1"));
        assert_ne!(base, party("https://x", "slack", "u2", "c1"));
        assert_ne!(base, party("https://x", "slack", "u1", "c2"));
    }

    #[test]
    fn hash_agrees_with_equality() {
        let mut set = HashSet::new();
        set.insert(party("https://a", "slack", "u1", "c1"));
        // Same identity, different service URL: no second entry.
        set.insert(party("https://b", "slack", "u1", "c1"));
        assert_eq!(set.len(), 1);
        set.insert(party("https://a", "slack", "u1", "c2"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn with_conversation_builds_a_new_party() {
        let original = party("https://x", "slack", "u1", "c1");
        let rebound = original.with_conversation(ConversationAccount::new("direct-9"));
        assert_eq!(original.conversation_account.id, "c1");
        assert_eq!(rebound.conversation_account.id, "direct-9");
        assert_eq!(rebound.channel_account.id, original.channel_account.id);
        assert_ne!(original, rebound);
    }

    #[test]
    fn sender_and_recipient_from_activity() {
        let activity = Activity::message(
            "slack",
            "https://slack.example.com",
            ConversationAccount::new("c1"),
            "hi",
        )
        .with_from(ChannelAccount::new("u1", Some("Ada")))
        .with_recipient(ChannelAccount::new("bot", Some("Relay")));

        let sender = Party::from_sender(&activity).unwrap();
        assert_eq!(sender.channel_account.id, "u1");
        assert_eq!(sender.conversation_account.id, "c1");

        let recipient = Party::from_recipient(&activity).unwrap();
        assert_eq!(recipient.channel_account.id, "bot");
        assert_eq!(recipient.channel_id, "slack");
    }

    #[test]
    fn wire_form_round_trip_preserves_identity() {
        let original = party("https://a", "slack", "u1", "c1");
        let json = original.to_json_string().unwrap();
        let back = Party::from_json_str(&json).unwrap();
        assert_eq!(original, back);
        assert_eq!(back.service_url, "https://a");
    }

    #[test]
    fn garbled_wire_form_is_an_error() {
        assert!(Party::from_json_str("{not json").is_err());
    }

    #[test]
    fn display_name_falls_back_to_account_id() {
        let mut p = party("https://a", "slack", "u1", "c1");
        assert_eq!(p.display_name(), "Display Name");
        p.channel_account.name = None;
        assert_eq!(p.display_name(), "u1");
    }
}
