//! Property-based and snapshot tests for the event envelopes.

use electron_proto::{
    AutomatedSessionGrant, Channel, ChannelMessage, ClientMessage, PainMessage, ProtocolError,
    ServerMessage,
};
use proptest::prelude::*;

fn arb_channel_message() -> impl Strategy<Value = ChannelMessage> {
    (
        0.0f64..=100.0,
        100.0f64..=3000.0,
        prop::sample::select(vec!["none", "sine", "square", "triangle", "sawtooth"]),
        0.0f64..=10.0,
        0.0f64..=10.0,
        any::<bool>(),
    )
        .prop_map(|(volume, freq, am_type, am_depth, am_freq, active)| ChannelMessage {
            volume,
            freq,
            am_type: am_type.to_string(),
            am_depth,
            am_freq,
            active,
            ramp_target: volume,
            ..ChannelMessage::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: decoding arbitrary text never panics
    #[test]
    fn prop_decode_never_panics(text in ".{0,512}") {
        let _ = ClientMessage::decode(&text);
        let _ = ServerMessage::decode(&text);
    }

    /// Property: a channel update is tagged with its channel's event name
    #[test]
    fn prop_channel_update_tagged_by_channel(
        msg in arb_channel_message(),
        right in any::<bool>(),
    ) {
        let channel = if right { Channel::Right } else { Channel::Left };
        let encoded = ServerMessage::channel_update(channel, msg).encode()?;
        let prefix = format!(r#"{{"event":"{}","data":"#, channel.as_str());

        prop_assert!(encoded.starts_with(&prefix));
    }

    /// Property: relayed updates never carry credentials
    #[test]
    fn prop_stripped_update_has_no_token(msg in arb_channel_message(), token in "[A-Za-z0-9]{16}") {
        let msg = ChannelMessage { driver_token: Some(token.clone()), ..msg };
        let encoded = ServerMessage::Left(msg.without_token()).encode()?;

        prop_assert!(!encoded.contains("driverToken"));
        prop_assert!(!encoded.contains(&token));
    }
}

#[test]
fn binary_frames_are_reported_as_unsupported() {
    let err = ProtocolError::UnsupportedFrame("binary");
    assert_eq!(err.to_string(), "unsupported frame: binary");
}

#[test]
fn automated_channel_update_wire_format() {
    let msg = ChannelMessage {
        volume: 52.0,
        freq: 1203.5,
        am_type: "sine".to_string(),
        am_depth: 3.12,
        am_freq: 1.5,
        active: true,
        fm_depth: 10.0,
        ramp_target: 52.0,
        ..ChannelMessage::default()
    };

    let encoded = ServerMessage::Right(msg).encode().unwrap();

    insta::assert_snapshot!(
        encoded,
        @r#"{"event":"right","data":{"volume":52.0,"freq":1203.5,"amType":"sine","amDepth":3.12,"amFreq":1.5,"active":true,"fmType":"none","fmDepth":10.0,"fmFreq":0.0,"rampTarget":52.0,"rampRate":0.0}}"#
    );
}

#[test]
fn pain_burst_wire_format() {
    let msg = PainMessage {
        volume: 0.6,
        frequency: 1200.0,
        shock_duration: 0.25,
        time_between_shocks: 0.5,
        number_of_shocks: 4,
        ..PainMessage::default()
    };

    let encoded = ServerMessage::pain(Channel::Left, msg).encode().unwrap();

    insta::assert_snapshot!(
        encoded,
        @r#"{"event":"pain-left","data":{"volume":0.6,"frequency":1200.0,"shockDuration":0.25,"timeBetweenShocks":0.5,"numberOfShocks":4}}"#
    );
}

#[test]
fn automated_session_started_wire_format() {
    let encoded = ServerMessage::AutomatedSessionStarted(AutomatedSessionGrant {
        session_id: "AUTO123456".to_string(),
    })
    .encode()
    .unwrap();

    insta::assert_snapshot!(
        encoded,
        @r#"{"event":"automatedSessionStarted","data":{"sessionId":"AUTO123456"}}"#
    );
}

#[test]
fn start_automated_session_accepts_partial_config() {
    let msg = ClientMessage::decode(
        r#"{"event":"startAutomatedSession","data":{"sessionDuration":30,"startVolume":50}}"#,
    )
    .unwrap();

    match msg {
        ClientMessage::StartAutomatedSession(config) => {
            assert_eq!(config.session_duration, 30);
            assert_eq!(config.start_volume, 50);
            assert_eq!(config.ms_between_updates, 15_000);
        },
        other => panic!("expected startAutomatedSession, got {other:?}"),
    }
}
