use crate::frame::{Frame, IdentityUpdate};

const MAX_NAME_LEN: usize = 80;
const MAX_BIO_LEN: usize = 512;
const MAX_SYSTEM_PROMPT_PREFIX_LEN: usize = 4096;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("list '{0}' must not be empty")]
    EmptyList(&'static str),

    #[error("timestamp must be a positive integer")]
    NonPositiveTimestamp,

    #[error("field '{field}' must be at most {max} characters (was {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("max_concurrency must be greater than 0")]
    ZeroConcurrency,
}

impl Frame {
    /// Checks the invariants `serde` deserialization alone cannot express:
    /// non-empty strings, positive timestamps, length bounds. Shape
    /// (field presence/types) is already guaranteed by a successful
    /// deserialize; this is the second half of "parse, don't validate".
    pub fn validate(&self) -> Result<(), FrameError> {
        match self {
            Frame::NodeRegister {
                node_id,
                capabilities,
                token,
                signature,
                public_key,
            } => {
                non_empty(node_id, "nodeId")?;
                if capabilities.max_concurrency == 0 {
                    return Err(FrameError::ZeroConcurrency);
                }
                non_empty_opt(token.as_deref(), "token")?;
                non_empty_opt(signature.as_deref(), "signature")?;
                non_empty_opt(public_key.as_deref(), "publicKey")?;
                Ok(())
            }
            Frame::NodeRegisterAck { node_id, session_id } => {
                non_empty(node_id, "nodeId")?;
                non_empty(session_id, "sessionId")?;
                Ok(())
            }
            Frame::NodeDeregister { node_id } => non_empty(node_id, "nodeId"),
            Frame::HeartbeatPing { timestamp } | Frame::HeartbeatPong { timestamp } => {
                positive_timestamp(*timestamp)
            }
            Frame::LaneMessage { message, .. } => {
                non_empty(&message.id, "id")?;
                non_empty(&message.channel_id, "channelId")?;
                positive_timestamp(message.timestamp)
            }
            Frame::LaneMessageAck { message_id } => non_empty(message_id, "messageId"),
            Frame::SessionUpdate {
                session_id,
                node_id,
                timestamp,
                ..
            } => {
                non_empty(session_id, "sessionId")?;
                non_empty(node_id, "nodeId")?;
                positive_timestamp(*timestamp)
            }
            Frame::SessionIdentityUpdate {
                session_id,
                node_id,
                identity,
                timestamp,
            } => {
                non_empty(session_id, "sessionId")?;
                non_empty(node_id, "nodeId")?;
                validate_identity(identity)?;
                positive_timestamp(*timestamp)
            }
            Frame::ConfigChanged { fields, timestamp } => {
                if fields.is_empty() {
                    return Err(FrameError::EmptyList("fields"));
                }
                for field in fields {
                    non_empty(field, "fields[]")?;
                }
                positive_timestamp(*timestamp)
            }
            Frame::Error { timestamp, .. } => positive_timestamp(*timestamp),
        }
    }
}

fn validate_identity(identity: &IdentityUpdate) -> Result<(), FrameError> {
    if let Some(name) = &identity.name {
        bounded(name, "name", MAX_NAME_LEN)?;
    }
    if let Some(bio) = &identity.bio {
        bounded(bio, "bio", MAX_BIO_LEN)?;
    }
    if let Some(prefix) = &identity.system_prompt_prefix {
        bounded(prefix, "systemPromptPrefix", MAX_SYSTEM_PROMPT_PREFIX_LEN)?;
    }
    Ok(())
}

fn non_empty(value: &str, field: &'static str) -> Result<(), FrameError> {
    if value.is_empty() {
        Err(FrameError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn non_empty_opt(value: Option<&str>, field: &'static str) -> Result<(), FrameError> {
    match value {
        Some(v) => non_empty(v, field),
        None => Ok(()),
    }
}

fn positive_timestamp(ts: i64) -> Result<(), FrameError> {
    if ts > 0 {
        Ok(())
    } else {
        Err(FrameError::NonPositiveTimestamp)
    }
}

fn bounded(value: &str, field: &'static str, max: usize) -> Result<(), FrameError> {
    let len = value.chars().count();
    if len > max {
        Err(FrameError::TooLong {
            field,
            max,
            actual: len,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Lane, LaneMessageBody, NodeCapabilities, ProblemDetails, SessionState};

    fn capabilities() -> NodeCapabilities {
        NodeCapabilities {
            agent_types: vec!["high".into()],
            agent_ids: None,
            tools: vec!["s".into()],
            max_concurrency: 4,
            channels: vec!["c".into()],
        }
    }

    #[test]
    fn heartbeat_rejects_zero_timestamp() {
        let frame = Frame::HeartbeatPing { timestamp: 0 };
        assert_eq!(frame.validate(), Err(FrameError::NonPositiveTimestamp));
    }

    #[test]
    fn heartbeat_accepts_positive_timestamp() {
        let frame = Frame::HeartbeatPing { timestamp: 1000 };
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn register_rejects_empty_node_id() {
        let frame = Frame::NodeRegister {
            node_id: "".into(),
            capabilities: capabilities(),
            token: Some("t".into()),
            signature: None,
            public_key: None,
        };
        assert_eq!(frame.validate(), Err(FrameError::EmptyField("nodeId")));
    }

    #[test]
    fn register_rejects_zero_concurrency() {
        let mut caps = capabilities();
        caps.max_concurrency = 0;
        let frame = Frame::NodeRegister {
            node_id: "n1".into(),
            capabilities: caps,
            token: Some("t".into()),
            signature: None,
            public_key: None,
        };
        assert_eq!(frame.validate(), Err(FrameError::ZeroConcurrency));
    }

    #[test]
    fn identity_name_boundary() {
        let ok = IdentityUpdate {
            name: Some("a".repeat(80)),
            ..Default::default()
        };
        assert!(validate_identity(&ok).is_ok());

        let too_long = IdentityUpdate {
            name: Some("a".repeat(81)),
            ..Default::default()
        };
        assert_eq!(
            validate_identity(&too_long),
            Err(FrameError::TooLong {
                field: "name",
                max: 80,
                actual: 81
            })
        );
    }

    #[test]
    fn identity_bio_boundary() {
        let ok = IdentityUpdate {
            bio: Some("a".repeat(512)),
            ..Default::default()
        };
        assert!(validate_identity(&ok).is_ok());

        let too_long = IdentityUpdate {
            bio: Some("a".repeat(513)),
            ..Default::default()
        };
        assert!(validate_identity(&too_long).is_err());
    }

    #[test]
    fn identity_system_prompt_prefix_boundary() {
        let ok = IdentityUpdate {
            system_prompt_prefix: Some("a".repeat(4096)),
            ..Default::default()
        };
        assert!(validate_identity(&ok).is_ok());

        let too_long = IdentityUpdate {
            system_prompt_prefix: Some("a".repeat(4097)),
            ..Default::default()
        };
        assert!(validate_identity(&too_long).is_err());
    }

    #[test]
    fn config_changed_rejects_empty_field_list() {
        let frame = Frame::ConfigChanged {
            fields: vec![],
            timestamp: 1,
        };
        assert_eq!(frame.validate(), Err(FrameError::EmptyList("fields")));
    }

    #[test]
    fn lane_message_round_trip() {
        let frame = Frame::LaneMessage {
            lane: Lane::Steer,
            message: LaneMessageBody {
                id: "m1".into(),
                channel_id: "c1".into(),
                payload: serde_json::json!({"text": "hi"}),
                timestamp: 1234,
                routing_context: None,
            },
        };
        assert!(frame.validate().is_ok());
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, parsed);
    }

    #[test]
    fn error_frame_round_trip() {
        let frame = Frame::Error {
            request_id: Some("r1".into()),
            error: ProblemDetails::new("LaneOverflow", "lane overflow", 507),
            timestamp: 42,
        };
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, parsed);
    }

    #[test]
    fn session_update_round_trip() {
        let frame = Frame::SessionUpdate {
            session_id: "s1".into(),
            node_id: "n1".into(),
            state: SessionState::Connected,
            timestamp: 7,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"kind\":\"session.update\""));
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, parsed);
    }
}
