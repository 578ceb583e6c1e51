pub mod channel;
pub mod message;

pub use channel::{ChannelMetadata, UserMetadata};
pub use message::{Content, Message, MessageKey};

/// Backend identifier of a channel.
pub type ChannelId = i64;
