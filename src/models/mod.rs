pub mod message;
pub mod message_type;

pub use message::{Message, MessageDto, ZonedTimestamp};
pub use message_type::MessageType;
