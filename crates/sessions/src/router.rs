use ag_domain::TraceEvent;

/// Requested conversation scope, widest to narrowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationScope {
    Main,
    PerPeer,
    PerChannelPeer,
    PerAccountChannelPeer,
}

impl ConversationScope {
    fn as_str(self) -> &'static str {
        match self {
            ConversationScope::Main => "main",
            ConversationScope::PerPeer => "per-peer",
            ConversationScope::PerChannelPeer => "per-channel-peer",
            ConversationScope::PerAccountChannelPeer => "per-account-channel-peer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Dm,
    Group,
}

#[derive(Debug, Clone)]
pub struct RoutingContext<'a> {
    pub scope: ConversationScope,
    pub agent_id: &'a str,
    pub channel_id: &'a str,
    pub peer_id: Option<&'a str>,
    pub account_id: Option<&'a str>,
    pub group_id: Option<&'a str>,
    pub message_type: MessageType,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationKeyError {
    #[error("colon not allowed in routing context field: {0}")]
    ColonInField(&'static str),
    #[error("groupId is required for group messages")]
    MissingGroupId,
    #[error("peerId is required for scope {0}")]
    MissingPeerId(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConversation {
    pub key: String,
    pub requested_scope: String,
    pub effective_scope: String,
    pub degraded: bool,
    pub warnings: Vec<String>,
}

fn non_empty(field: Option<&str>) -> Option<&str> {
    field.filter(|s| !s.is_empty())
}

fn check_no_colon(field: &str, name: &'static str) -> Result<(), ConversationKeyError> {
    if field.contains(':') {
        Err(ConversationKeyError::ColonInField(name))
    } else {
        Ok(())
    }
}

/// Derives a deterministic conversation key from routing context, with the
/// one permitted graceful degradation (missing `accountId` for
/// `per-account-channel-peer`). Every other missing required field is a
/// hard error.
pub fn resolve_conversation_key(
    ctx: &RoutingContext<'_>,
) -> Result<ResolvedConversation, ConversationKeyError> {
    check_no_colon(ctx.agent_id, "agentId")?;
    check_no_colon(ctx.channel_id, "channelId")?;
    if let Some(peer_id) = non_empty(ctx.peer_id) {
        check_no_colon(peer_id, "peerId")?;
    }
    if let Some(account_id) = non_empty(ctx.account_id) {
        check_no_colon(account_id, "accountId")?;
    }
    if let Some(group_id) = non_empty(ctx.group_id) {
        check_no_colon(group_id, "groupId")?;
    }

    let requested_scope = ctx.scope.as_str().to_string();

    if ctx.message_type == MessageType::Group {
        let group_id = non_empty(ctx.group_id).ok_or(ConversationKeyError::MissingGroupId)?;
        let key = format!("agent:{}:{}:group:{}", ctx.agent_id, ctx.channel_id, group_id);
        return Ok(ResolvedConversation {
            key,
            requested_scope: requested_scope.clone(),
            effective_scope: requested_scope,
            degraded: false,
            warnings: Vec::new(),
        });
    }

    if ctx.scope == ConversationScope::Main {
        let key = format!("agent:{}:main", ctx.agent_id);
        return Ok(ResolvedConversation {
            key,
            requested_scope: requested_scope.clone(),
            effective_scope: requested_scope,
            degraded: false,
            warnings: Vec::new(),
        });
    }

    let peer_id = non_empty(ctx.peer_id)
        .ok_or(ConversationKeyError::MissingPeerId(scope_name(ctx.scope)))?;

    match ctx.scope {
        ConversationScope::PerPeer => Ok(ResolvedConversation {
            key: format!("agent:{}:dm:{}", ctx.agent_id, peer_id),
            requested_scope: requested_scope.clone(),
            effective_scope: requested_scope,
            degraded: false,
            warnings: Vec::new(),
        }),
        ConversationScope::PerChannelPeer => Ok(ResolvedConversation {
            key: format!("agent:{}:{}:dm:{}", ctx.agent_id, ctx.channel_id, peer_id),
            requested_scope: requested_scope.clone(),
            effective_scope: requested_scope,
            degraded: false,
            warnings: Vec::new(),
        }),
        ConversationScope::PerAccountChannelPeer => {
            match non_empty(ctx.account_id) {
                Some(account_id) => Ok(ResolvedConversation {
                    key: format!(
                        "agent:{}:{}:{}:dm:{}",
                        ctx.agent_id, ctx.channel_id, account_id, peer_id
                    ),
                    requested_scope: requested_scope.clone(),
                    effective_scope: requested_scope,
                    degraded: false,
                    warnings: Vec::new(),
                }),
                None => {
                    let warning = "accountId missing: degraded from per-account-channel-peer to per-channel-peer".to_string();
                    let resolved = ResolvedConversation {
                        key: format!("agent:{}:{}:dm:{}", ctx.agent_id, ctx.channel_id, peer_id),
                        requested_scope: requested_scope.clone(),
                        effective_scope: ConversationScope::PerChannelPeer.as_str().to_string(),
                        degraded: true,
                        warnings: vec![warning.clone()],
                    };
                    TraceEvent::ConversationDegraded {
                        requested_scope,
                        effective_scope: resolved.effective_scope.clone(),
                        warnings: vec![warning],
                    }
                    .emit();
                    Ok(resolved)
                }
            }
        }
        ConversationScope::Main => unreachable!("handled above"),
    }
}

fn scope_name(scope: ConversationScope) -> &'static str {
    scope.as_str()
}

/// Parsed fields recovered from a conversation key by [`parse_conversation_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConversationKey {
    pub agent_id: String,
    pub channel_id: Option<String>,
    pub peer_id: Option<String>,
    pub group_id: Option<String>,
    pub scope: String,
}

/// Inverse of [`resolve_conversation_key`]. Returns `None` for malformed or
/// unrecognised shapes rather than erroring — callers treat an unparseable
/// key as opaque.
pub fn parse_conversation_key(key: &str) -> Option<ParsedConversationKey> {
    let parts: Vec<&str> = key.split(':').collect();
    if parts.first() != Some(&"agent") {
        return None;
    }

    match parts.as_slice() {
        ["agent", agent_id, "main"] => Some(ParsedConversationKey {
            agent_id: agent_id.to_string(),
            channel_id: None,
            peer_id: None,
            group_id: None,
            scope: "main".into(),
        }),
        ["agent", agent_id, "dm", peer_id] => Some(ParsedConversationKey {
            agent_id: agent_id.to_string(),
            channel_id: None,
            peer_id: Some(peer_id.to_string()),
            group_id: None,
            scope: "per-peer".into(),
        }),
        ["agent", agent_id, channel_id, "dm", peer_id] => Some(ParsedConversationKey {
            agent_id: agent_id.to_string(),
            channel_id: Some(channel_id.to_string()),
            peer_id: Some(peer_id.to_string()),
            group_id: None,
            scope: "per-channel-peer".into(),
        }),
        ["agent", agent_id, channel_id, "group", group_id] => Some(ParsedConversationKey {
            agent_id: agent_id.to_string(),
            channel_id: Some(channel_id.to_string()),
            peer_id: None,
            group_id: Some(group_id.to_string()),
            scope: "group".into(),
        }),
        ["agent", agent_id, channel_id, account_id, "dm", peer_id] => Some(ParsedConversationKey {
            agent_id: agent_id.to_string(),
            channel_id: Some(channel_id.to_string()),
            peer_id: Some(peer_id.to_string()),
            group_id: None,
            scope: format!("per-account-channel-peer:{account_id}"),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        scope: ConversationScope,
        peer_id: Option<&'a str>,
        account_id: Option<&'a str>,
        group_id: Option<&'a str>,
        message_type: MessageType,
    ) -> RoutingContext<'a> {
        RoutingContext {
            scope,
            agent_id: "a1",
            channel_id: "whatsapp",
            peer_id,
            account_id,
            group_id,
            message_type,
        }
    }

    #[test]
    fn main_scope_ignores_peer() {
        let resolved = resolve_conversation_key(&ctx(
            ConversationScope::Main,
            None,
            None,
            None,
            MessageType::Dm,
        ))
        .unwrap();
        assert_eq!(resolved.key, "agent:a1:main");
        assert!(!resolved.degraded);
    }

    #[test]
    fn per_peer_requires_peer_id() {
        let err = resolve_conversation_key(&ctx(
            ConversationScope::PerPeer,
            None,
            None,
            None,
            MessageType::Dm,
        ))
        .unwrap_err();
        assert_eq!(err, ConversationKeyError::MissingPeerId("per-peer"));
    }

    #[test]
    fn per_channel_peer_key_format() {
        let resolved = resolve_conversation_key(&ctx(
            ConversationScope::PerChannelPeer,
            Some("p1"),
            None,
            None,
            MessageType::Dm,
        ))
        .unwrap();
        assert_eq!(resolved.key, "agent:a1:whatsapp:dm:p1");
    }

    #[test]
    fn per_account_channel_peer_full_key() {
        let resolved = resolve_conversation_key(&ctx(
            ConversationScope::PerAccountChannelPeer,
            Some("p1"),
            Some("acct1"),
            None,
            MessageType::Dm,
        ))
        .unwrap();
        assert_eq!(resolved.key, "agent:a1:whatsapp:acct1:dm:p1");
        assert!(!resolved.degraded);
    }

    #[test]
    fn missing_account_id_degrades_to_per_channel_peer() {
        let resolved = resolve_conversation_key(&ctx(
            ConversationScope::PerAccountChannelPeer,
            Some("p1"),
            None,
            None,
            MessageType::Dm,
        ))
        .unwrap();
        assert_eq!(resolved.key, "agent:a1:whatsapp:dm:p1");
        assert_eq!(resolved.effective_scope, "per-channel-peer");
        assert!(resolved.degraded);
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn empty_account_id_is_treated_as_missing() {
        let resolved = resolve_conversation_key(&ctx(
            ConversationScope::PerAccountChannelPeer,
            Some("p1"),
            Some(""),
            None,
            MessageType::Dm,
        ))
        .unwrap();
        assert!(resolved.degraded);
    }

    #[test]
    fn group_message_requires_group_id() {
        let err = resolve_conversation_key(&ctx(
            ConversationScope::Main,
            None,
            None,
            None,
            MessageType::Group,
        ))
        .unwrap_err();
        assert_eq!(err, ConversationKeyError::MissingGroupId);
    }

    #[test]
    fn group_message_key_format() {
        let resolved = resolve_conversation_key(&ctx(
            ConversationScope::Main,
            None,
            None,
            Some("g1"),
            MessageType::Group,
        ))
        .unwrap();
        assert_eq!(resolved.key, "agent:a1:whatsapp:group:g1");
    }

    #[test]
    fn colon_in_peer_id_is_rejected() {
        let err = resolve_conversation_key(&ctx(
            ConversationScope::PerPeer,
            Some("p:1"),
            None,
            None,
            MessageType::Dm,
        ))
        .unwrap_err();
        assert_eq!(err, ConversationKeyError::ColonInField("peerId"));
    }

    #[test]
    fn parse_round_trips_per_channel_peer() {
        let resolved = resolve_conversation_key(&ctx(
            ConversationScope::PerChannelPeer,
            Some("p1"),
            None,
            None,
            MessageType::Dm,
        ))
        .unwrap();
        let parsed = parse_conversation_key(&resolved.key).unwrap();
        assert_eq!(parsed.agent_id, "a1");
        assert_eq!(parsed.channel_id.as_deref(), Some("whatsapp"));
        assert_eq!(parsed.peer_id.as_deref(), Some("p1"));
    }

    #[test]
    fn parse_rejects_malformed_key() {
        assert!(parse_conversation_key("not:a:real:key:at:all:nope").is_none());
        assert!(parse_conversation_key("agent:a1:whatsapp:unknown:p1").is_none());
    }
}
