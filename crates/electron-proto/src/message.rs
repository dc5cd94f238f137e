//! Event envelopes.
//!
//! Both directions use serde's adjacently tagged representation, so every
//! frame reads `{"event": "...", "data": {...}}`. Events without a payload
//! (`riderRejected`, `driverRejected`) omit `data` entirely.
//!
//! # Invariants
//!
//! - Each event name maps to exactly one variant (enforced by serde renames).
//! - Decoding never panics; oversized or malformed frames return
//!   [`ProtocolError`].

use serde::{Deserialize, Serialize};

use crate::{
    MAX_MESSAGE_SIZE,
    channel::{Channel, ChannelMessage, PainMessage, RiderCount},
    config::AutomatedDriverConfig,
    errors::{ProtocolError, Result},
};

/// Reference to a session by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    /// Session ID
    #[serde(alias = "sessId")]
    pub session_id: String,
}

/// Credentials a driver presents for driver-only queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverCredentials {
    /// Session ID
    #[serde(alias = "sessId")]
    pub session_id: Option<String>,
    /// Driver capability token
    pub driver_token: Option<String>,
}

/// A rider's traffic-light report.
///
/// `color` stays a raw string on the wire; unknown codes are ignored by the
/// relay instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficLightUpdate {
    /// Session the rider is observing
    #[serde(alias = "sessId")]
    pub session_id: String,
    /// Color code: `R`, `Y`, `G` or `N`
    pub color: String,
}

/// Token granted to a newly registered driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverTokenGrant {
    /// Capability token for all later driver messages
    pub token: String,
}

/// Reply to a successful automated-session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedSessionGrant {
    /// ID riders use to join the automated session
    pub session_id: String,
}

/// Generic rejection with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Why the request was refused
    pub reason: String,
}

/// Events sent from a participant to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join a session as a passive observer
    RegisterRider(SessionRef),
    /// Ask for the cached state of both channels
    RequestLast(SessionRef),
    /// Claim control of a session
    RegisterDriver(SessionRef),
    /// Left channel update from a driver
    Left(ChannelMessage),
    /// Right channel update from a driver
    Right(ChannelMessage),
    /// Left channel pain burst from a driver
    #[serde(rename = "pain-left")]
    PainLeft(PainMessage),
    /// Right channel pain burst from a driver
    #[serde(rename = "pain-right")]
    PainRight(PainMessage),
    /// Driver asks for the traffic-light aggregate
    GetRiderCount(DriverCredentials),
    /// Rider reports its traffic light
    TrafficLight(TrafficLightUpdate),
    /// Start a self-driving session with the given configuration
    StartAutomatedSession(AutomatedDriverConfig),
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        check_size(text)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wrap a channel update in the event for its channel.
    pub fn channel_update(channel: Channel, message: ChannelMessage) -> Self {
        match channel {
            Channel::Left => Self::Left(message),
            Channel::Right => Self::Right(message),
        }
    }

    /// Wrap a pain burst in the event for its channel.
    pub fn pain(channel: Channel, message: PainMessage) -> Self {
        match channel {
            Channel::Left => Self::PainLeft(message),
            Channel::Right => Self::PainRight(message),
        }
    }

    /// Event name, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RegisterRider(_) => "registerRider",
            Self::RequestLast(_) => "requestLast",
            Self::RegisterDriver(_) => "registerDriver",
            Self::Left(_) => Channel::Left.as_str(),
            Self::Right(_) => Channel::Right.as_str(),
            Self::PainLeft(_) => Channel::Left.pain_event(),
            Self::PainRight(_) => Channel::Right.pain_event(),
            Self::GetRiderCount(_) => "getRiderCount",
            Self::TrafficLight(_) => "trafficLight",
            Self::StartAutomatedSession(_) => "startAutomatedSession",
        }
    }
}

/// Events sent from the relay to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Rider tried to join a session that does not exist
    RiderRejected,
    /// Driver registration accepted
    DriverToken(DriverTokenGrant),
    /// Session already has a controller
    DriverRejected,
    /// Left channel state
    Left(ChannelMessage),
    /// Right channel state
    Right(ChannelMessage),
    /// Left channel pain burst
    #[serde(rename = "pain-left")]
    PainLeft(PainMessage),
    /// Right channel pain burst
    #[serde(rename = "pain-right")]
    PainRight(PainMessage),
    /// Traffic-light aggregate for a driver
    RiderCount(RiderCount),
    /// Automated session is running
    AutomatedSessionStarted(AutomatedSessionGrant),
    /// Automated session could not be started
    AutomatedSessionRejected(Rejection),
}

impl ServerMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        check_size(text)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wrap a channel state in the event for its channel.
    pub fn channel_update(channel: Channel, message: ChannelMessage) -> Self {
        match channel {
            Channel::Left => Self::Left(message),
            Channel::Right => Self::Right(message),
        }
    }

    /// Wrap a pain burst in the event for its channel.
    pub fn pain(channel: Channel, message: PainMessage) -> Self {
        match channel {
            Channel::Left => Self::PainLeft(message),
            Channel::Right => Self::PainRight(message),
        }
    }
}

fn check_size(text: &str) -> Result<()> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: text.len(), max: MAX_MESSAGE_SIZE });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_register_rider() {
        let msg = ClientMessage::decode(r#"{"event":"registerRider","data":{"sessId":"ABCDEFGHJK"}}"#)
            .unwrap();

        assert_eq!(
            msg,
            ClientMessage::RegisterRider(SessionRef { session_id: "ABCDEFGHJK".to_string() })
        );
    }

    #[test]
    fn decode_pain_event_uses_dashed_name() {
        let msg = ClientMessage::decode(
            r#"{"event":"pain-right","data":{"sessionId":"S","driverToken":"T","volume":0.5,"frequency":900,"shockDuration":0.2,"timeBetweenShocks":0.5,"numberOfShocks":3}}"#,
        )
        .unwrap();

        match msg {
            ClientMessage::PainRight(pain) => {
                assert_eq!(pain.number_of_shocks, 3);
                assert_eq!(pain.driver_token.as_deref(), Some("T"));
            },
            other => panic!("expected pain-right, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_event() {
        let result = ClientMessage::decode(r#"{"event":"selfDestruct","data":{}}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let text = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let result = ClientMessage::decode(&text);
        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
    }

    #[test]
    fn unit_events_have_no_data() {
        let encoded = ServerMessage::RiderRejected.encode().unwrap();
        insta::assert_snapshot!(encoded, @r#"{"event":"riderRejected"}"#);
    }

    #[test]
    fn rider_count_wire_format() {
        let encoded = ServerMessage::RiderCount(RiderCount {
            red: 1,
            yellow: 0,
            green: 2,
            none: 0,
            total: 3,
        })
        .encode()
        .unwrap();

        insta::assert_snapshot!(
            encoded,
            @r#"{"event":"riderCount","data":{"red":1,"yellow":0,"green":2,"none":0,"total":3}}"#
        );
    }

    #[test]
    fn driver_token_wire_format() {
        let encoded =
            ServerMessage::DriverToken(DriverTokenGrant { token: "abc".to_string() }).encode().unwrap();

        insta::assert_snapshot!(encoded, @r#"{"event":"driverToken","data":{"token":"abc"}}"#);
    }

    #[test]
    fn event_names_match_wire_tags() {
        let msg = ClientMessage::pain(Channel::Left, PainMessage::default());
        let encoded = msg.encode().unwrap();
        assert!(encoded.starts_with(r#"{"event":"pain-left""#));
        assert_eq!(msg.event_name(), "pain-left");
    }
}
