pub mod events;

pub use events::{ChatInfo, ChatType, InboundMessage, Mention};
