//! Wire format for the Gateway <-> Node control plane.
//!
//! `Frame` is a discriminated union tagged on `kind`; it is the only type
//! that crosses the wire. `serde` establishes shape, [`Frame::validate`]
//! establishes the numeric and length invariants the schema alone cannot
//! express (positive timestamps, non-empty ids, bounded identity fields).
//!
//! Connection flow: a node sends `NodeRegister`, the gateway replies
//! `NodeRegisterAck` or closes with a policy code; after that either side
//! may send `LaneMessage`/`HeartbeatPing`/`HeartbeatPong`/`SessionUpdate`
//! etc. at any time, subject to the ordering guarantees in the component
//! design (heartbeats precede unrelated outbound frames produced after
//! them; session updates precede lane messages produced after the state
//! change they describe).

mod frame;
mod validate;

pub use frame::{
    Frame, IdentityUpdate, Lane, LaneMessageBody, MessageType, NodeCapabilities, ProblemDetails,
    RoutingContext, SessionState, MAX_FRAME_BYTES,
};
pub use validate::FrameError;
