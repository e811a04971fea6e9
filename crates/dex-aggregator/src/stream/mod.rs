/*
[INPUT]:  Channel parameters and application callbacks
[OUTPUT]: Multiplexed real-time subscriptions with typed adapters
[POS]:    Stream layer - public real-time API
[UPDATE]: When adding channels or changing subscription lifecycle
*/

pub mod api;
pub mod channel;
pub mod multiplexer;

pub use api::StreamApi;
pub use channel::ChannelKind;
pub use multiplexer::{ChannelMultiplexer, Listener, SubscriptionGuard, SubscriptionHandle};
