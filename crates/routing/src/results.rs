use {serde::Serialize, tandem_channels::CreatedConversation, tandem_common::Party};

/// Which side of an engagement a party holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementRole {
    /// The party providing service (e.g. an agent).
    Owner,
    /// The party being served.
    Client,
}

/// Outcome of a routing operation.
///
/// Every expected outcome is a value, never an error: callers match on the
/// result instead of catching. Variants carry enough context (the parties
/// involved, error text, the raw conversation-creation response) for the
/// caller to react without re-deriving routing state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingResult {
    /// The activity required nothing from the router.
    NoActionTaken,
    /// The operation completed (e.g. a message was forwarded).
    Ok,
    /// A pending connection request was stored for the party.
    PendingRequestAdded { party: Party },
    /// An owner/client engagement was established.
    EngagementAdded {
        owner: Party,
        client: Party,
        /// Raw conversation-creation response, when the engagement involved
        /// setting up a new direct conversation.
        #[serde(skip_serializing_if = "Option::is_none")]
        created_conversation: Option<CreatedConversation>,
    },
    /// An engagement was closed.
    EngagementRemoved { owner: Party, client: Party },
    /// A pending connection request was rejected and removed.
    EngagementRejected { party: Party },
    /// The counterpart could not be resolved or delivery failed.
    FailedToForwardMessage { message: String },
    /// The operation could not be performed.
    Error { message: String },
}

impl RoutingResult {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed_to_forward(message: impl Into<String>) -> Self {
        Self::FailedToForwardMessage {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoActionTaken => "no_action_taken",
            Self::Ok => "ok",
            Self::PendingRequestAdded { .. } => "pending_request_added",
            Self::EngagementAdded { .. } => "engagement_added",
            Self::EngagementRemoved { .. } => "engagement_removed",
            Self::EngagementRejected { .. } => "engagement_rejected",
            Self::FailedToForwardMessage { .. } => "failed_to_forward_message",
            Self::Error { .. } => "error",
        }
    }
}
