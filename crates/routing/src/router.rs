use std::sync::Arc;

use {
    tandem_channels::ChannelTransport,
    tandem_common::{Activity, ChannelAccount, ConversationAccount, Party},
    tracing::{debug, warn},
};

use crate::{
    backchannel,
    results::{EngagementRole, RoutingResult},
    settings::RouterSettings,
    store::RoutingData,
};

/// Per-activity handling flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleOptions {
    /// When the sender is not engaged, open a pending connection request
    /// instead of taking no action.
    pub initiate_if_unengaged: bool,
    /// Prefix messages forwarded from an engaged client with the client's
    /// display name.
    pub add_client_name_to_message: bool,
    /// Prefix messages forwarded from an engaged owner with the owner's
    /// display name.
    pub add_owner_name_to_message: bool,
}

/// Orchestrator for the relay: consumes inbound activities, consults routing
/// state, and delegates delivery to the channel transport.
///
/// The store lock is internal to [`RoutingData`] and is never held across a
/// transport call; identity data is snapshotted first, then the network I/O
/// happens.
pub struct MessageRouter {
    data: Arc<dyn RoutingData>,
    transport: Arc<dyn ChannelTransport>,
    settings: RouterSettings,
}

impl MessageRouter {
    pub fn new(data: Arc<dyn RoutingData>, transport: Arc<dyn ChannelTransport>) -> Self {
        Self::with_settings(data, transport, RouterSettings::default())
    }

    /// Build a router and apply the configured aggregation seats to the
    /// routing data up front.
    pub fn with_settings(
        data: Arc<dyn RoutingData>,
        transport: Arc<dyn ChannelTransport>,
        settings: RouterSettings,
    ) -> Self {
        for seat in &settings.aggregation {
            let party = Party::new(
                seat.service_url.clone(),
                seat.channel_id.clone(),
                ChannelAccount::new(seat.account_id.clone(), None),
                ConversationAccount::new(seat.conversation_id.clone()),
            );
            data.add_party(party.clone(), false);
            data.add_aggregation_party(party);
        }
        Self {
            data,
            transport,
            settings,
        }
    }

    pub fn data(&self) -> &Arc<dyn RoutingData> {
        &self.data
    }

    /// Main entry point: decide and perform the routing action for one
    /// inbound activity.
    pub async fn handle_activity(
        &self,
        activity: &Activity,
        options: HandleOptions,
    ) -> RoutingResult {
        self.make_sure_parties_are_tracked(activity);

        match self.handle_backchannel_message(activity) {
            // Not a control message; fall through to normal handling.
            RoutingResult::NoActionTaken => {},
            RoutingResult::EngagementAdded { owner, client, .. } => {
                debug!(
                    owner = owner.display_name(),
                    client = client.display_name(),
                    "engagement accepted over back-channel"
                );
                return RoutingResult::Ok;
            },
            // Malformed control traffic is never forwarded as chat.
            other => return other,
        }

        let result = self.handle_message(activity, options).await;
        if matches!(result, RoutingResult::NoActionTaken) && options.initiate_if_unengaged {
            return self.initiate_engagement(activity);
        }
        result
    }

    /// Register the activity's endpoints: the recipient is always the bot's
    /// own identity on that channel; the sender is an ordinary party unless
    /// it is itself a known bot identity.
    pub fn make_sure_parties_are_tracked(&self, activity: &Activity) {
        if let Some(recipient) = Party::from_recipient(activity) {
            self.data.add_party(recipient, false);
        }
        if let Some(sender) = Party::from_sender(activity)
            && !self.data.bot_parties().contains(&sender)
        {
            self.data.add_party(sender, true);
        }
    }

    /// Untrack a party, cascading to any pending request or engagement.
    pub fn remove_party(&self, party: &Party) -> Vec<RoutingResult> {
        self.data.remove_party(party)
    }

    /// Detect and apply a back-channel engagement acceptance. The sender of
    /// the control message becomes the engaging owner; the decoded payload
    /// names the client. Non-control traffic yields `NoActionTaken`.
    pub fn handle_backchannel_message(&self, activity: &Activity) -> RoutingResult {
        match backchannel::extract_client_party(activity, &self.settings.backchannel_marker) {
            None => RoutingResult::NoActionTaken,
            Some(Err(e)) => {
                warn!(channel_id = %activity.channel_id, "bad back-channel payload: {e}");
                RoutingResult::error(e.to_string())
            },
            Some(Ok(client)) => {
                let Some(owner) = Party::from_sender(activity) else {
                    return RoutingResult::error("back-channel activity names no sender");
                };
                self.data.add_engagement_and_clear_pending(&owner, &client)
            },
        }
    }

    /// Forward a message between engaged parties, in either direction.
    /// `NoActionTaken` when the sender is not engaged.
    pub async fn handle_message(
        &self,
        activity: &Activity,
        options: HandleOptions,
    ) -> RoutingResult {
        let Some(sender) = Party::from_sender(activity) else {
            return RoutingResult::NoActionTaken;
        };

        // The tracked engaged instance may carry a different conversation
        // binding than the inbound activity (e.g. a direct conversation
        // created at engagement time), so resolve by channel + account.
        let engaged = self
            .data
            .engaged_party_by_channel(&activity.channel_id, &sender.channel_account);
        let Some(engaged) = engaged else {
            return RoutingResult::NoActionTaken;
        };

        let add_name = if self.data.is_engaged(&engaged, EngagementRole::Owner) {
            options.add_owner_name_to_message
        } else if self.data.is_engaged(&engaged, EngagementRole::Client) {
            options.add_client_name_to_message
        } else {
            return RoutingResult::NoActionTaken;
        };

        let Some(counterpart) = self.data.engaged_counterpart(&engaged) else {
            return RoutingResult::failed_to_forward(format!(
                "no counterpart found for engaged party '{}'",
                engaged.display_name()
            ));
        };

        let text = if add_name {
            format!("{}: {}", engaged.display_name(), activity.text())
        } else {
            activity.text().to_string()
        };

        match self.transport.send_message(&counterpart, &text).await {
            Ok(receipt) => {
                debug!(
                    to = counterpart.display_name(),
                    message_id = receipt.message_id.as_deref().unwrap_or(""),
                    "forwarded message"
                );
                RoutingResult::Ok
            },
            Err(e) => {
                warn!(to = counterpart.display_name(), "delivery failed: {e}");
                RoutingResult::failed_to_forward(format!(
                    "failed to forward message to '{}': {e}",
                    counterpart.display_name()
                ))
            },
        }
    }

    /// Open a pending connection request for the activity's sender.
    pub fn initiate_engagement(&self, activity: &Activity) -> RoutingResult {
        let Some(sender) = Party::from_sender(activity) else {
            return RoutingResult::error("cannot initiate engagement: activity names no sender");
        };
        let result = self.data.add_pending_request(sender);
        debug!(outcome = result.kind(), "initiate engagement");
        result
    }

    /// Reject and drop a party's pending connection request.
    pub fn reject_pending_request(
        &self,
        party: &Party,
        rejecter: Option<&Party>,
    ) -> RoutingResult {
        if self.data.remove_pending_request(party) {
            debug!(
                party = party.display_name(),
                rejecter = rejecter.map(|p| p.display_name()).unwrap_or(""),
                "pending request rejected"
            );
            RoutingResult::EngagementRejected {
                party: party.clone(),
            }
        } else {
            RoutingResult::error(format!(
                "no pending connection request found for party '{}'",
                party.display_name()
            ))
        }
    }

    /// Establish an engagement, setting up a direct 1:1 conversation for the
    /// owner first. Routing state commits only after the conversation was
    /// created; a transport failure leaves no partial state behind.
    ///
    /// The owner ends up bound to the direct conversation through a newly
    /// synthesized party. Some channels report an unreliable id on the
    /// creation response, so the owner's pre-existing conversation id is
    /// reused whenever it is non-empty; the raw response is attached to the
    /// result either way.
    pub async fn add_engagement(&self, owner: &Party, client: &Party) -> RoutingResult {
        if owner.channel_account.id.is_empty() || client.channel_account.id.is_empty() {
            return RoutingResult::error("invalid party: empty channel account id");
        }
        for (party, role) in [(owner, "owner"), (client, "client")] {
            if self.data.engaged_counterpart(party).is_some() {
                return RoutingResult::error(format!(
                    "cannot engage: {role} '{}' is already engaged",
                    party.display_name()
                ));
            }
        }

        let Some(bot) = self
            .data
            .bot_party_by_conversation(&owner.channel_id, &owner.conversation_account)
        else {
            return RoutingResult::error(format!(
                "no bot identity tracked for channel '{}' and conversation '{}'",
                owner.channel_id, owner.conversation_account.id
            ));
        };

        let created = match self.transport.create_direct_conversation(&bot, owner).await {
            Ok(created) => created,
            Err(e) => {
                warn!(owner = owner.display_name(), "direct conversation setup failed: {e}");
                return RoutingResult::error(format!(
                    "failed to create a direct conversation with '{}': {e}",
                    owner.display_name()
                ));
            },
        };

        let conversation_id = if owner.conversation_account.id.is_empty() {
            created.id.clone()
        } else {
            owner.conversation_account.id.clone()
        };
        let engaged_owner = owner.with_conversation(ConversationAccount::new(conversation_id));
        self.data.add_party(engaged_owner.clone(), true);

        match self
            .data
            .add_engagement_and_clear_pending(&engaged_owner, client)
        {
            RoutingResult::EngagementAdded { owner, client, .. } => {
                RoutingResult::EngagementAdded {
                    owner,
                    client,
                    created_conversation: Some(created),
                }
            },
            other => other,
        }
    }

    /// Close the engagement owned by this identity. The engaged instance is
    /// resolved by channel + account first, since its conversation binding
    /// may differ from the literal input.
    pub fn end_engagement(&self, owner: &Party) -> Vec<RoutingResult> {
        let engaged = self
            .data
            .engaged_party_by_channel(&owner.channel_id, &owner.channel_account);
        let Some(engaged) = engaged else {
            return vec![RoutingResult::error(format!(
                "no engagement found for party '{}'",
                owner.display_name()
            ))];
        };

        let role = if self.data.is_engaged(&engaged, EngagementRole::Owner) {
            EngagementRole::Owner
        } else {
            EngagementRole::Client
        };
        let results = self.data.remove_engagement(&engaged, role);
        if results.is_empty() {
            return vec![RoutingResult::error(format!(
                "no engagement found for party '{}'",
                owner.display_name()
            ))];
        }
        results
    }

    /// Deliver `text` to a tracked party. The bot must hold an identity on
    /// the target channel and conversation; identity tokens are
    /// channel-scoped and are never reused across channels.
    pub async fn send_message_to_party(&self, party: &Party, text: &str) -> RoutingResult {
        if self
            .data
            .bot_party_by_conversation(&party.channel_id, &party.conversation_account)
            .is_none()
        {
            return RoutingResult::error(format!(
                "no bot identity tracked for channel '{}' and conversation '{}'",
                party.channel_id, party.conversation_account.id
            ));
        }
        match self.transport.send_message(party, text).await {
            Ok(_) => RoutingResult::Ok,
            Err(e) => RoutingResult::failed_to_forward(format!(
                "failed to send message to '{}': {e}",
                party.display_name()
            )),
        }
    }

    /// Send a notification to every aggregation conversation, one result per
    /// target.
    pub async fn broadcast_to_aggregation_channels(&self, text: &str) -> Vec<RoutingResult> {
        let targets = self.data.aggregation_parties();
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(self.send_message_to_party(&target, text).await);
        }
        results
    }
}
