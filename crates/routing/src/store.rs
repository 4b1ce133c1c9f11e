use std::{
    collections::HashSet,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    tandem_common::{ChannelAccount, ConversationAccount, Party},
    tracing::debug,
};

use crate::results::{EngagementRole, RoutingResult};

/// A party's outstanding ask to be connected to a counterpart.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub party: Party,
    /// Unix seconds. Advisory only; the core imposes no expiry itself.
    pub requested_at: i64,
}

/// An active owner/client relay pairing.
#[derive(Debug, Clone)]
pub struct Engagement {
    pub owner: Party,
    pub client: Party,
}

impl Engagement {
    pub fn member(&self, role: EngagementRole) -> &Party {
        match role {
            EngagementRole::Owner => &self.owner,
            EngagementRole::Client => &self.client,
        }
    }

    pub fn involves(&self, party: &Party) -> bool {
        self.owner == *party || self.client == *party
    }
}

/// All routing state behind one injectable interface: tracked parties (users,
/// bot identities, aggregation channels), pending connection requests, and
/// engagements. Constructed once per process and handed to the router; no
/// other component mutates routing state directly.
///
/// Implementations must keep every compound transition atomic: a reader may
/// never observe a pending request cleared while the matching engagement is
/// not yet visible.
pub trait RoutingData: Send + Sync {
    /// Track a party. `is_user` distinguishes ordinary parties from the
    /// bot's own per-channel identities. Re-adding an equal identity is a
    /// no-op; returns whether a new entry was inserted.
    fn add_party(&self, party: Party, is_user: bool) -> bool;

    /// Untrack a party and cascade: any pending request or engagement
    /// referencing the identity is removed, one result per side effect.
    fn remove_party(&self, party: &Party) -> Vec<RoutingResult>;

    /// The bot's own identity bound to exactly this channel and
    /// conversation. Looked up before any cross-channel send, since a bot
    /// identity token is channel-scoped and must never be reused on another
    /// channel.
    fn bot_party_by_conversation(
        &self,
        channel_id: &str,
        conversation: &ConversationAccount,
    ) -> Option<Party>;

    /// A currently engaged party matching channel + account, regardless of
    /// which conversation it was tracked under.
    fn engaged_party_by_channel(
        &self,
        channel_id: &str,
        account: &ChannelAccount,
    ) -> Option<Party>;

    fn bot_parties(&self) -> Vec<Party>;
    fn user_parties(&self) -> Vec<Party>;

    /// Channels designated to receive broadcast notifications.
    fn aggregation_parties(&self) -> Vec<Party>;
    fn add_aggregation_party(&self, party: Party) -> bool;

    /// Store a pending connection request for the party. Fails with an
    /// `Error` result if an equal identity already has one, or if the party
    /// is currently engaged.
    fn add_pending_request(&self, party: Party) -> RoutingResult;

    /// True if a matching request was found and removed.
    fn remove_pending_request(&self, party: &Party) -> bool;

    fn pending_requests(&self) -> Vec<PendingRequest>;

    /// True iff the party currently holds `role` in some engagement.
    fn is_engaged(&self, party: &Party, role: EngagementRole) -> bool;

    /// The other member of the engagement the party belongs to, whichever
    /// role the party holds.
    fn engaged_counterpart(&self, party: &Party) -> Option<Party>;

    /// Atomic compound transition: clears any pending request held by either
    /// party and inserts the engagement, all under one critical section.
    /// Fails with an `Error` result if either party is already a member of
    /// an engagement; nothing is cleared in that case.
    fn add_engagement_and_clear_pending(&self, owner: &Party, client: &Party) -> RoutingResult;

    /// Close the engagement in which `party` holds `role`. Returns one
    /// result describing the closed engagement, or an empty list if none
    /// matched.
    fn remove_engagement(&self, party: &Party, role: EngagementRole) -> Vec<RoutingResult>;
}

#[derive(Debug, Default)]
struct RoutingState {
    user_parties: HashSet<Party>,
    bot_parties: HashSet<Party>,
    aggregation_parties: HashSet<Party>,
    pending_requests: Vec<PendingRequest>,
    engagements: Vec<Engagement>,
}

impl RoutingState {
    fn is_engaged_any_role(&self, party: &Party) -> bool {
        self.engagements.iter().any(|e| e.involves(party))
    }

    fn has_pending_request(&self, party: &Party) -> bool {
        self.pending_requests.iter().any(|p| p.party == *party)
    }
}

/// Process-local [`RoutingData`] implementation. One lock guards the whole
/// state so readers always see fully applied transitions; callers must not
/// hold results of one call across another expecting consistency.
#[derive(Default)]
pub struct InMemoryRoutingData {
    state: RwLock<RoutingState>,
}

impl InMemoryRoutingData {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl RoutingData for InMemoryRoutingData {
    fn add_party(&self, party: Party, is_user: bool) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let inserted = if is_user {
            state.user_parties.insert(party)
        } else {
            state.bot_parties.insert(party)
        };
        if inserted {
            debug!(is_user, "tracking new party");
        }
        inserted
    }

    fn remove_party(&self, party: &Party) -> Vec<RoutingResult> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.user_parties.remove(party);
        state.bot_parties.remove(party);
        state.aggregation_parties.remove(party);

        let mut results = Vec::new();

        let before = state.pending_requests.len();
        state.pending_requests.retain(|p| p.party != *party);
        if state.pending_requests.len() != before {
            results.push(RoutingResult::EngagementRejected {
                party: party.clone(),
            });
        }

        let mut remaining = Vec::with_capacity(state.engagements.len());
        for engagement in state.engagements.drain(..) {
            if engagement.involves(party) {
                results.push(RoutingResult::EngagementRemoved {
                    owner: engagement.owner,
                    client: engagement.client,
                });
            } else {
                remaining.push(engagement);
            }
        }
        state.engagements = remaining;

        if !results.is_empty() {
            debug!(cascaded = results.len(), "party removal cascaded");
        }
        results
    }

    fn bot_party_by_conversation(
        &self,
        channel_id: &str,
        conversation: &ConversationAccount,
    ) -> Option<Party> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .bot_parties
            .iter()
            .find(|p| p.channel_id == channel_id && p.conversation_account.id == conversation.id)
            .cloned()
    }

    fn engaged_party_by_channel(
        &self,
        channel_id: &str,
        account: &ChannelAccount,
    ) -> Option<Party> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.engagements.iter().find_map(|e| {
            [&e.owner, &e.client]
                .into_iter()
                .find(|p| p.matches_channel_account(channel_id, account))
                .cloned()
        })
    }

    fn bot_parties(&self) -> Vec<Party> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.bot_parties.iter().cloned().collect()
    }

    fn user_parties(&self) -> Vec<Party> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.user_parties.iter().cloned().collect()
    }

    fn aggregation_parties(&self) -> Vec<Party> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.aggregation_parties.iter().cloned().collect()
    }

    fn add_aggregation_party(&self, party: Party) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.aggregation_parties.insert(party)
    }

    fn add_pending_request(&self, party: Party) -> RoutingResult {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.is_engaged_any_role(&party) {
            return RoutingResult::error(format!(
                "party '{}' is already engaged and cannot request a connection",
                party.display_name()
            ));
        }
        if state.has_pending_request(&party) {
            return RoutingResult::error(format!(
                "a pending connection request already exists for party '{}'",
                party.display_name()
            ));
        }
        let result = RoutingResult::PendingRequestAdded {
            party: party.clone(),
        };
        state.pending_requests.push(PendingRequest {
            party,
            requested_at: unix_now(),
        });
        result
    }

    fn remove_pending_request(&self, party: &Party) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let before = state.pending_requests.len();
        state.pending_requests.retain(|p| p.party != *party);
        state.pending_requests.len() != before
    }

    fn pending_requests(&self) -> Vec<PendingRequest> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.pending_requests.clone()
    }

    fn is_engaged(&self, party: &Party, role: EngagementRole) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.engagements.iter().any(|e| e.member(role) == party)
    }

    fn engaged_counterpart(&self, party: &Party) -> Option<Party> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.engagements.iter().find_map(|e| {
            if e.owner == *party {
                Some(e.client.clone())
            } else if e.client == *party {
                Some(e.owner.clone())
            } else {
                None
            }
        })
    }

    fn add_engagement_and_clear_pending(&self, owner: &Party, client: &Party) -> RoutingResult {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        for party in [owner, client] {
            if state.is_engaged_any_role(party) {
                return RoutingResult::error(format!(
                    "party '{}' is already a member of an engagement",
                    party.display_name()
                ));
            }
        }
        // Clear-pending and insert commit together under the one write
        // guard; no reader can see the intermediate state.
        state
            .pending_requests
            .retain(|p| p.party != *owner && p.party != *client);
        state.engagements.push(Engagement {
            owner: owner.clone(),
            client: client.clone(),
        });
        debug!(
            owner = owner.display_name(),
            client = client.display_name(),
            "engagement added"
        );
        RoutingResult::EngagementAdded {
            owner: owner.clone(),
            client: client.clone(),
            created_conversation: None,
        }
    }

    fn remove_engagement(&self, party: &Party, role: EngagementRole) -> Vec<RoutingResult> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let position = state
            .engagements
            .iter()
            .position(|e| e.member(role) == party);
        let Some(position) = position else {
            return Vec::new();
        };
        let engagement = state.engagements.swap_remove(position);
        debug!(
            owner = engagement.owner.display_name(),
            client = engagement.client.display_name(),
            "engagement removed"
        );
        vec![RoutingResult::EngagementRemoved {
            owner: engagement.owner,
            client: engagement.client,
        }]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn party(channel: &str, account: &str, conversation: &str) -> Party {
        Party::new(
            format!("https://{channel}.example.com"),
            channel,
            ChannelAccount::new(account, Some(account)),
            ConversationAccount::new(conversation),
        )
    }

    #[test]
    fn add_party_is_idempotent() {
        let data = InMemoryRoutingData::new();
        assert!(data.add_party(party("slack", "u1", "c1"), true));
        assert!(!data.add_party(party("slack", "u1", "c1"), true));
        assert_eq!(data.user_parties().len(), 1);
    }

    #[test]
    fn bot_and_user_entries_are_kept_apart() {
        let data = InMemoryRoutingData::new();
        data.add_party(party("slack", "bot", "c1"), false);
        data.add_party(party("slack", "u1", "c1"), true);
        assert_eq!(data.bot_parties().len(), 1);
        assert_eq!(data.user_parties().len(), 1);
        assert_eq!(data.bot_parties()[0].channel_account.id, "bot");
    }

    #[test]
    fn bot_party_lookup_is_conversation_scoped() {
        let data = InMemoryRoutingData::new();
        data.add_party(party("slack", "bot", "lobby"), false);
        data.add_party(party("telegram", "bot", "lobby"), false);

        let found = data
            .bot_party_by_conversation("slack", &ConversationAccount::new("lobby"))
            .unwrap();
        assert_eq!(found.channel_id, "slack");
        assert!(
            data.bot_party_by_conversation("slack", &ConversationAccount::new("other"))
                .is_none()
        );
    }

    #[test]
    fn pending_request_lifecycle() {
        let data = InMemoryRoutingData::new();
        let p = party("slack", "u1", "c1");

        let result = data.add_pending_request(p.clone());
        assert!(matches!(result, RoutingResult::PendingRequestAdded { .. }));
        assert_eq!(data.pending_requests().len(), 1);
        assert!(data.pending_requests()[0].requested_at > 0);

        // Duplicate identity is refused without inserting a second entry.
        let dup = data.add_pending_request(party("slack", "u1", "c1"));
        assert!(dup.is_error());
        assert_eq!(data.pending_requests().len(), 1);

        assert!(data.remove_pending_request(&p));
        assert!(!data.remove_pending_request(&p));
        assert!(data.pending_requests().is_empty());
    }

    #[test]
    fn engaged_party_cannot_go_pending() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "c1");
        let client = party("telegram", "u1", "c2");
        data.add_engagement_and_clear_pending(&owner, &client);

        assert!(data.add_pending_request(owner.clone()).is_error());
        assert!(data.add_pending_request(client.clone()).is_error());
    }

    #[test]
    fn engagement_clears_pending_on_both_sides() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "c1");
        let client = party("telegram", "u1", "c2");
        data.add_pending_request(owner.clone());
        data.add_pending_request(client.clone());

        let result = data.add_engagement_and_clear_pending(&owner, &client);
        assert!(matches!(result, RoutingResult::EngagementAdded { .. }));

        assert!(data.pending_requests().is_empty());
        assert!(data.is_engaged(&owner, EngagementRole::Owner));
        assert!(data.is_engaged(&client, EngagementRole::Client));
        assert!(!data.is_engaged(&owner, EngagementRole::Client));
    }

    #[test]
    fn second_engagement_for_a_member_is_refused() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "c1");
        let client = party("telegram", "u1", "c2");
        let other = party("telegram", "u2", "c3");
        data.add_engagement_and_clear_pending(&owner, &client);

        let second = data.add_engagement_and_clear_pending(&owner, &other);
        assert!(second.is_error());
        // The refused call must not have cleared other's pending slot.
        data.add_pending_request(other.clone());
        let refused = data.add_engagement_and_clear_pending(&party("slack", "x", "c9"), &client);
        assert!(refused.is_error());
        assert_eq!(data.pending_requests().len(), 1);
    }

    #[test]
    fn counterpart_resolves_from_either_role() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "c1");
        let client = party("telegram", "u1", "c2");
        data.add_engagement_and_clear_pending(&owner, &client);

        assert_eq!(data.engaged_counterpart(&owner).unwrap(), client);
        assert_eq!(data.engaged_counterpart(&client).unwrap(), owner);
        assert!(
            data.engaged_counterpart(&party("slack", "stranger", "c1"))
                .is_none()
        );
    }

    #[test]
    fn engaged_party_lookup_ignores_conversation_binding() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "direct-7");
        let client = party("telegram", "u1", "c2");
        data.add_engagement_and_clear_pending(&owner, &client);

        // Inbound activity sees the agent in a different conversation.
        let found = data
            .engaged_party_by_channel("slack", &ChannelAccount::new("agent", None))
            .unwrap();
        assert_eq!(found.conversation_account.id, "direct-7");
        assert!(
            data.engaged_party_by_channel("slack", &ChannelAccount::new("nobody", None))
                .is_none()
        );
    }

    #[test]
    fn remove_engagement_by_role() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "c1");
        let client = party("telegram", "u1", "c2");
        data.add_engagement_and_clear_pending(&owner, &client);

        // Wrong role finds nothing.
        assert!(data.remove_engagement(&owner, EngagementRole::Client).is_empty());

        let results = data.remove_engagement(&owner, EngagementRole::Owner);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], RoutingResult::EngagementRemoved { .. }));
        assert!(!data.is_engaged(&owner, EngagementRole::Owner));
        assert!(!data.is_engaged(&client, EngagementRole::Client));
    }

    #[test]
    fn closing_an_engagement_allows_a_new_pending_request() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "c1");
        let client = party("telegram", "u1", "c2");
        data.add_engagement_and_clear_pending(&owner, &client);
        data.remove_engagement(&owner, EngagementRole::Owner);

        let result = data.add_pending_request(client.clone());
        assert!(matches!(result, RoutingResult::PendingRequestAdded { .. }));
    }

    #[test]
    fn remove_party_cascades_to_pending_and_engagements() {
        let data = InMemoryRoutingData::new();
        let owner = party("slack", "agent", "c1");
        let client = party("telegram", "u1", "c2");
        data.add_party(owner.clone(), true);
        data.add_party(client.clone(), true);
        data.add_engagement_and_clear_pending(&owner, &client);

        let results = data.remove_party(&client);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], RoutingResult::EngagementRemoved { .. }));
        assert!(!data.is_engaged(&owner, EngagementRole::Owner));
        assert!(data.pending_requests().is_empty());
        assert_eq!(data.user_parties().len(), 1);
    }

    #[test]
    fn remove_untracked_party_produces_no_results() {
        let data = InMemoryRoutingData::new();
        assert!(data.remove_party(&party("slack", "ghost", "c1")).is_empty());
    }

    #[test]
    fn remove_party_with_pending_request_reports_rejection() {
        let data = InMemoryRoutingData::new();
        let p = party("slack", "u1", "c1");
        data.add_party(p.clone(), true);
        data.add_pending_request(p.clone());

        let results = data.remove_party(&p);
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            RoutingResult::EngagementRejected { .. }
        ));
        assert!(data.pending_requests().is_empty());
    }

    #[test]
    fn aggregation_parties_are_tracked_separately() {
        let data = InMemoryRoutingData::new();
        let lobby = party("slack", "relay", "agents-lobby");
        assert!(data.add_aggregation_party(lobby.clone()));
        assert!(!data.add_aggregation_party(lobby));
        assert_eq!(data.aggregation_parties().len(), 1);
        assert!(data.user_parties().is_empty());
    }
}
