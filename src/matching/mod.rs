//! Queue-matching notifications.
//!
//! One channel per waiting party, subscribed to that party's topic on the
//! matching bus. Terminal match events are deduplicated per subscription
//! epoch and delivered to the session controller.

pub mod channel;
pub mod messages;

pub use channel::{MatchChannel, MatchEvent, MatchGate, MatchKind, MatchNotice, Party};
pub use messages::QueueMessage;
