//! Messaging inbox core for a guidance & counseling portal: normalizes the
//! backend's loosely-typed message records into conversations and applies
//! user actions optimistically with deterministic rollback.

pub mod api;
pub mod avatar;
pub mod config;
pub mod conversation;
pub mod inbox;
pub mod normalize;
pub mod utils;

pub use api::client::ApiClient;
pub use api::error::ApiError;
pub use avatar::{AvatarContext, resolve_avatar_src};
pub use conversation::{Conversation, build_conversations, merge_drafts};
pub use inbox::{Inbox, InboxState};
pub use normalize::{MessageId, NormalizedMessage, SenderRole, normalize};
