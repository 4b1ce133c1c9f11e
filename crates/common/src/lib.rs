//! Shared wire types and the party identity model used across tandem crates.

pub mod error;
pub mod party;
pub mod types;

pub use {
    error::{Error, Result},
    party::Party,
    types::{Activity, ChannelAccount, ConversationAccount},
};
