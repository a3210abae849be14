//! Channel subscriptions.
//!
//! - [`channel_key`]: logical channel identities and their broker topics
//! - [`registry`]: the one-subscription-per-key registry and typed dispatch

pub mod channel_key;
pub mod registry;

pub use channel_key::{destinations, ChannelKey, ChannelKind};
pub use registry::{ChannelEvent, Subscription, SubscriptionRegistry};
