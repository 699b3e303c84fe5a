//! Session Manager (C3), Conversation Router (C4), and Identity Context
//! resolution for the gateway control plane.

mod identity;
mod manager;
mod router;

pub use identity::{IdentityContext, IdentityResolver};
pub use manager::{RegisterOutcome, Session, SessionManager};
pub use router::{
    parse_conversation_key, resolve_conversation_key, ConversationKeyError, ConversationScope,
    MessageType, ParsedConversationKey, ResolvedConversation, RoutingContext,
};
