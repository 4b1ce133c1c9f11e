//! Transport boundary between the routing core and concrete channel
//! connectors. Connectors implement [`ChannelTransport`]; the router never
//! talks to a channel API directly.

pub mod error;
pub mod transport;

pub use {
    error::{Error, Result},
    transport::{ChannelTransport, CreatedConversation, DeliveryReceipt},
};
