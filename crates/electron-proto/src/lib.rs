//! Electron wire protocol.
//!
//! Every message on a connection is a JSON text frame shaped as an event
//! envelope: `{"event": "<name>", "data": <payload>}`. Inbound events are
//! modelled by [`ClientMessage`], outbound events by [`ServerMessage`].
//!
//! Payload field names are camelCase. Session references accept both
//! `sessionId` and the legacy `sessId` spelling so older player pages keep
//! working.
//!
//! # Components
//!
//! - [`channel`]: per-channel parameter and pain-burst payloads
//! - [`message`]: the inbound/outbound event envelopes
//! - [`config`]: automated-session configuration and its boundary validation

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod config;
pub mod errors;
pub mod message;

pub use channel::{Channel, ChannelMessage, PainMessage, RiderCount, TrafficLight};
pub use config::{AmTypes, AutomatedDriverConfig, ConfigError};
pub use errors::{ProtocolError, Result};
pub use message::{
    AutomatedSessionGrant, ClientMessage, DriverCredentials, DriverTokenGrant, Rejection,
    SessionRef, ServerMessage, TrafficLightUpdate,
};

/// Largest inbound text frame we attempt to decode, in bytes.
///
/// Channel updates are a few hundred bytes; anything far beyond that is not a
/// legitimate client.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
