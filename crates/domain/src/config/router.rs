use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation Router (hot-reloadable)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Requested conversation-key scope. `PerChannelPeer` is the safe default
/// for multi-user inboxes (prevents cross-peer context leakage).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationScope {
    /// `agent:<agentId>:main` — one shared session.
    Main,
    /// `agent:<agentId>:dm:<peerId>` — isolated per peer.
    PerPeer,
    /// `agent:<agentId>:<channelId>:dm:<peerId>` — isolated per channel+peer.
    #[default]
    PerChannelPeer,
    /// `agent:<agentId>:<channelId>:<accountId>:dm:<peerId>` — full isolation.
    PerAccountChannelPeer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub default_conversation_scope: ConversationScope,

    /// Upper bound on distinct conversation keys retained in the router's
    /// bookkeeping (eviction policy is the caller's concern; the router
    /// only enforces the cap).
    #[serde(default = "d_max_conversations")]
    pub max_conversations: usize,

    /// How long an idle conversation key is retained before it is eligible
    /// for eviction.
    #[serde(default = "d_conversation_ttl_secs")]
    pub conversation_ttl_secs: u64,

    /// Routing rules evaluated in order; first match wins.
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_conversation_scope: ConversationScope::default(),
            max_conversations: d_max_conversations(),
            conversation_ttl_secs: d_conversation_ttl_secs(),
            bindings: Vec::new(),
        }
    }
}

/// Routes an inbound message to the node registered for `agent_id`, subject
/// to glob-matching on channel/account/peer. An empty `match_` is a
/// catch-all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub agent_id: String,
    #[serde(default, rename = "match")]
    pub match_: BindingMatch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindingMatch {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub peer_id: Option<String>,
}

fn d_max_conversations() -> usize {
    100_000
}
fn d_conversation_ttl_secs() -> u64 {
    86_400
}

impl BindingMatch {
    /// An absent pattern field matches anything; a present one must
    /// glob-match the corresponding value (`None` value never matches a
    /// present pattern).
    pub fn is_match(&self, channel: Option<&str>, account_id: Option<&str>, peer_id: Option<&str>) -> bool {
        field_matches(self.channel.as_deref(), channel)
            && field_matches(self.account_id.as_deref(), account_id)
            && field_matches(self.peer_id.as_deref(), peer_id)
    }
}

fn field_matches(pattern: Option<&str>, value: Option<&str>) -> bool {
    match pattern {
        None => true,
        Some(p) => match value {
            Some(v) => glob_match(p, v),
            None => false,
        },
    }
}

/// `*` (match-all), a leading or trailing `*` (suffix/prefix match), or an
/// exact match.
fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    pattern == value
}

/// Evaluates `bindings` in order and returns the first whose `match`
/// pattern admits the given fields — an empty `match` admits everything,
/// so a catch-all binding should be placed last.
pub fn resolve_binding<'a>(
    bindings: &'a [Binding],
    channel: Option<&str>,
    account_id: Option<&str>,
    peer_id: Option<&str>,
) -> Option<&'a Binding> {
    bindings
        .iter()
        .find(|b| b.match_.is_match(channel, account_id, peer_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(agent_id: &str, channel: Option<&str>) -> Binding {
        Binding {
            agent_id: agent_id.into(),
            match_: BindingMatch {
                channel: channel.map(String::from),
                ..Default::default()
            },
        }
    }

    #[test]
    fn exact_channel_match() {
        let bindings = vec![binding("a1", Some("whatsapp"))];
        assert_eq!(
            resolve_binding(&bindings, Some("whatsapp"), None, None).map(|b| b.agent_id.as_str()),
            Some("a1")
        );
        assert!(resolve_binding(&bindings, Some("telegram"), None, None).is_none());
    }

    #[test]
    fn wildcard_prefix_match() {
        let bindings = vec![binding("a1", Some("chat-*"))];
        assert!(resolve_binding(&bindings, Some("chat-ops"), None, None).is_some());
        assert!(resolve_binding(&bindings, Some("ops-chat"), None, None).is_none());
    }

    #[test]
    fn wildcard_suffix_match() {
        let bindings = vec![binding("a1", Some("*-ops"))];
        assert!(resolve_binding(&bindings, Some("chat-ops"), None, None).is_some());
        assert!(resolve_binding(&bindings, Some("ops-chat"), None, None).is_none());
    }

    #[test]
    fn catch_all_binding_matches_anything() {
        let bindings = vec![binding("a1", None)];
        assert!(resolve_binding(&bindings, Some("anything"), Some("acct"), Some("peer")).is_some());
    }

    #[test]
    fn first_match_wins() {
        let bindings = vec![binding("specific", Some("whatsapp")), binding("fallback", None)];
        assert_eq!(
            resolve_binding(&bindings, Some("whatsapp"), None, None).map(|b| b.agent_id.as_str()),
            Some("specific")
        );
        assert_eq!(
            resolve_binding(&bindings, Some("telegram"), None, None).map(|b| b.agent_id.as_str()),
            Some("fallback")
        );
    }

    #[test]
    fn missing_value_does_not_match_present_pattern() {
        let bindings = vec![binding("a1", Some("whatsapp"))];
        assert!(resolve_binding(&bindings, None, None, None).is_none());
    }
}
