//! Conversation-routing core for the tandem relay.
//!
//! For every inbound activity the router decides whether it is silently
//! tracked, forwarded to an engaged counterpart, used to open a pending
//! connection request, or rejected. All routing state (tracked parties,
//! pending requests, owner/client engagements) lives behind the
//! [`RoutingData`] trait; message delivery is delegated to the
//! [`tandem_channels::ChannelTransport`] collaborator.

pub mod backchannel;
pub mod error;
pub mod results;
pub mod router;
pub mod settings;
pub mod store;

pub use {
    error::{Error, Result},
    results::{EngagementRole, RoutingResult},
    router::{HandleOptions, MessageRouter},
    settings::RouterSettings,
    store::{Engagement, InMemoryRoutingData, PendingRequest, RoutingData},
};
