mod attachment;
mod composer;
mod message;
mod options;
mod store;

pub use attachment::{parse_data_url, Attachment};
pub use composer::{Composer, SendRequest, REUSE_INSTRUCTION};
pub use message::{Citation, Message, MessageKind, MessageMetadata, Role};
pub use options::{AspectRatio, ImageStyle, Mode};
pub use store::Conversation;
