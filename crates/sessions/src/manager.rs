use std::collections::HashMap;

use ag_domain::TraceEvent;
use ag_protocol::SessionState;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::identity::IdentityContext;

/// One node's session record. `connected_at <= last_activity_at` always;
/// `disconnected` is terminal.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub node_id: String,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub reconnect_count: u32,
    pub identity_context: Option<IdentityContext>,
    idle_since: Option<DateTime<Utc>>,
}

impl Session {
    fn fresh(node_id: &str, now: DateTime<Utc>, reconnect_count: u32, identity_context: Option<IdentityContext>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            state: SessionState::Connected,
            connected_at: now,
            last_activity_at: now,
            reconnect_count,
            identity_context,
            idle_since: None,
        }
    }
}

/// Outcome of accepting a `node.register` (or reattach) for a node.
pub struct RegisterOutcome {
    pub session: Session,
    /// `Some(old_session_id)` if an existing non-disconnected session was
    /// superseded — the caller (connection supervisor) must close that
    /// connection with a policy close code.
    pub superseded_session_id: Option<String>,
}

/// Authoritative per-node session state machine. Exactly one instance
/// across the gateway process; exclusively owns all `Session` records.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    session_timeout: ChronoDuration,
    suspend_timeout: ChronoDuration,
}

impl SessionManager {
    pub fn new(session_timeout_secs: u64, suspend_timeout_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_timeout: ChronoDuration::seconds(session_timeout_secs as i64),
            suspend_timeout: ChronoDuration::seconds(suspend_timeout_secs as i64),
        }
    }

    pub fn get(&self, node_id: &str) -> Option<Session> {
        self.sessions.read().get(node_id).cloned()
    }

    /// Accepts a `node.register`. If a non-disconnected session already
    /// exists for `node_id` it is superseded: a new session id is minted,
    /// `reconnectCount` increments, and the identity context carries over.
    /// Otherwise a brand new session is created (`reconnectCount = 0`).
    pub fn register(&self, node_id: &str, now: DateTime<Utc>) -> RegisterOutcome {
        let mut sessions = self.sessions.write();
        let existing = sessions.get(node_id);

        let (reconnect_count, identity_context, superseded_session_id) = match existing {
            Some(s) if s.state != SessionState::Disconnected => {
                (s.reconnect_count + 1, s.identity_context.clone(), Some(s.session_id.clone()))
            }
            _ => (0, None, None),
        };

        let session = Session::fresh(node_id, now, reconnect_count, identity_context);
        sessions.insert(node_id.to_string(), session.clone());

        if let Some(old_id) = &superseded_session_id {
            TraceEvent::NodeSuperseded {
                node_id: node_id.to_string(),
                old_session_id: old_id.clone(),
            }
            .emit();
        }
        TraceEvent::NodeRegistered {
            node_id: node_id.to_string(),
            session_id: session.session_id.clone(),
            reconnect_count: session.reconnect_count,
        }
        .emit();

        RegisterOutcome {
            session,
            superseded_session_id,
        }
    }

    /// `heartbeat`/`message` event: resets activity timers. From
    /// `connected` or `idle`, moves (back) to `connected`. No-op
    /// (warning, not error) from `suspended`/`disconnected`, or if no
    /// session exists for `node_id`.
    pub fn record_activity(&self, node_id: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(node_id)?;

        match session.state {
            SessionState::Connected | SessionState::Idle => {
                let changed = session.state != SessionState::Connected;
                session.state = SessionState::Connected;
                session.last_activity_at = now;
                session.idle_since = None;
                let out = session.clone();
                if changed {
                    TraceEvent::SessionStateChanged {
                        node_id: node_id.to_string(),
                        session_id: out.session_id.clone(),
                        from: "idle".into(),
                        to: "connected".into(),
                    }
                    .emit();
                }
                Some(out)
            }
            SessionState::Suspended | SessionState::Disconnected => {
                TraceEvent::SessionNoop {
                    node_id: node_id.to_string(),
                    state: session.state.to_string(),
                    event: "activity".into(),
                }
                .emit();
                None
            }
        }
    }

    /// Evaluates the idle/suspend timers for `node_id` against `now` and
    /// applies at most one transition (`connected -> idle` or
    /// `idle -> suspended`). Returns the session if a transition fired.
    pub fn check_timers(&self, node_id: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(node_id)?;

        match session.state {
            SessionState::Connected => {
                if now.signed_duration_since(session.last_activity_at) >= self.session_timeout {
                    session.state = SessionState::Idle;
                    session.idle_since = Some(now);
                    let out = session.clone();
                    TraceEvent::SessionStateChanged {
                        node_id: node_id.to_string(),
                        session_id: out.session_id.clone(),
                        from: "connected".into(),
                        to: "idle".into(),
                    }
                    .emit();
                    Some(out)
                } else {
                    None
                }
            }
            SessionState::Idle => {
                let idle_since = session.idle_since.unwrap_or(session.last_activity_at);
                if now.signed_duration_since(idle_since) >= self.suspend_timeout {
                    session.state = SessionState::Suspended;
                    let out = session.clone();
                    TraceEvent::SessionStateChanged {
                        node_id: node_id.to_string(),
                        session_id: out.session_id.clone(),
                        from: "idle".into(),
                        to: "suspended".into(),
                    }
                    .emit();
                    Some(out)
                } else {
                    None
                }
            }
            SessionState::Suspended | SessionState::Disconnected => None,
        }
    }

    /// `disconnect` event: terminal, from any non-disconnected state.
    /// No-op if already disconnected or unknown.
    pub fn disconnect(&self, node_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(node_id)?;
        if session.state == SessionState::Disconnected {
            TraceEvent::SessionNoop {
                node_id: node_id.to_string(),
                state: "disconnected".into(),
                event: "disconnect".into(),
            }
            .emit();
            return None;
        }
        let from = session.state.to_string();
        session.state = SessionState::Disconnected;
        let out = session.clone();
        TraceEvent::SessionStateChanged {
            node_id: node_id.to_string(),
            session_id: out.session_id.clone(),
            from,
            to: "disconnected".into(),
        }
        .emit();
        Some(out)
    }

    /// `reconnect` event per the C3 state table: only fires from
    /// `suspended`, moving directly to `connected` without a fresh
    /// `node.register`. Mints a new session id, increments
    /// `reconnectCount`, preserves identity context — the same contract
    /// as [`SessionManager::register`] applies when superseding, but this
    /// path is for a still-live (not yet disconnected) suspended session
    /// resuming in place.
    pub fn reconnect(&self, node_id: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let existing = sessions.get(node_id)?;
        if existing.state != SessionState::Suspended {
            TraceEvent::SessionNoop {
                node_id: node_id.to_string(),
                state: existing.state.to_string(),
                event: "reconnect".into(),
            }
            .emit();
            return None;
        }
        let session = Session::fresh(
            node_id,
            now,
            existing.reconnect_count + 1,
            existing.identity_context.clone(),
        );
        sessions.insert(node_id.to_string(), session.clone());
        TraceEvent::SessionStateChanged {
            node_id: node_id.to_string(),
            session_id: session.session_id.clone(),
            from: "suspended".into(),
            to: "connected".into(),
        }
        .emit();
        Some(session)
    }

    pub fn set_identity_context(&self, node_id: &str, identity: IdentityContext) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(node_id)?;
        session.identity_context = Some(identity);
        Some(session.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + ChronoDuration::seconds(secs)
    }

    #[test]
    fn register_creates_connected_session() {
        let m = SessionManager::new(60, 300);
        let out = m.register("n1", t(0));
        assert_eq!(out.session.state, SessionState::Connected);
        assert_eq!(out.session.reconnect_count, 0);
        assert!(out.superseded_session_id.is_none());
    }

    #[test]
    fn second_register_supersedes_and_increments_reconnect_count() {
        let m = SessionManager::new(60, 300);
        let first = m.register("n1", t(0)).session;
        let second_out = m.register("n1", t(1));
        assert_eq!(second_out.superseded_session_id, Some(first.session_id.clone()));
        assert_eq!(second_out.session.reconnect_count, 1);
        assert_ne!(second_out.session.session_id, first.session_id);
    }

    #[test]
    fn idle_timeout_transitions_connected_to_idle() {
        let m = SessionManager::new(60, 300);
        m.register("n1", t(0));
        assert!(m.check_timers("n1", t(30)).is_none());
        let session = m.check_timers("n1", t(61)).expect("should go idle");
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn suspend_timeout_transitions_idle_to_suspended() {
        let m = SessionManager::new(60, 300);
        m.register("n1", t(0));
        m.check_timers("n1", t(61));
        assert!(m.check_timers("n1", t(100)).is_none());
        let session = m.check_timers("n1", t(362)).expect("should suspend");
        assert_eq!(session.state, SessionState::Suspended);
    }

    #[test]
    fn activity_resets_idle_back_to_connected() {
        let m = SessionManager::new(60, 300);
        m.register("n1", t(0));
        m.check_timers("n1", t(61));
        let session = m.record_activity("n1", t(62)).expect("reactivated");
        assert_eq!(session.state, SessionState::Connected);
    }

    #[test]
    fn activity_on_suspended_session_is_noop() {
        let m = SessionManager::new(60, 300);
        m.register("n1", t(0));
        m.check_timers("n1", t(61));
        m.check_timers("n1", t(362));
        assert!(m.record_activity("n1", t(400)).is_none());
    }

    #[test]
    fn disconnect_is_terminal() {
        let m = SessionManager::new(60, 300);
        m.register("n1", t(0));
        let session = m.disconnect("n1").expect("disconnects");
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(m.disconnect("n1").is_none());
        assert!(m.record_activity("n1", t(1)).is_none());
    }

    #[test]
    fn reconnect_from_suspended_preserves_identity_and_bumps_count() {
        let m = SessionManager::new(60, 300);
        m.register("n1", t(0));
        m.set_identity_context(
            "n1",
            IdentityContext {
                name: Some("Alice".into()),
                avatar: None,
                bio: None,
                system_prompt_prefix: None,
            },
        );
        m.check_timers("n1", t(61));
        m.check_timers("n1", t(362));

        let reconnected = m.reconnect("n1", t(400)).expect("reconnects");
        assert_eq!(reconnected.state, SessionState::Connected);
        assert_eq!(reconnected.reconnect_count, 1);
        assert_eq!(
            reconnected.identity_context.unwrap().name,
            Some("Alice".into())
        );
    }

    #[test]
    fn reconnect_from_connected_is_noop() {
        let m = SessionManager::new(60, 300);
        m.register("n1", t(0));
        assert!(m.reconnect("n1", t(1)).is_none());
    }
}
