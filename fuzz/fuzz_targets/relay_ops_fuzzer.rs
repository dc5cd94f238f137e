//! Fuzz target for relay operation sequences
//!
//! Drives the simulated relay with arbitrary interleavings of registrations,
//! driver updates, traffic lights, disconnects and clock jumps.
//!
//! # Invariants
//!
//! - A session is never controlled by a driver token and an automated driver
//! - Riders never receive a driver token
//! - Every rider count adds up to the number of riders
//! - Driver errors only come from unknown connections or malformed frames

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use electron_harness::SimRelay;
use electron_proto::{
    AutomatedDriverConfig, ChannelMessage, ClientMessage, DriverCredentials, ServerMessage,
    SessionRef, TrafficLightUpdate,
};
use electron_server::DriverError;
use libfuzzer_sys::fuzz_target;

const SESSIONS: [&str; 3] = ["ALPHA", "BRAVO", "CHARLIE"];
const COLORS: [&str; 5] = ["R", "Y", "G", "N", "?"];

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Connect,
    Disconnect { conn: u8 },
    RegisterDriver { conn: u8, session: u8 },
    RegisterRider { conn: u8, session: u8 },
    RequestLast { conn: u8, session: u8 },
    Update { conn: u8, session: u8, forged: bool, volume: u8 },
    RiderCount { conn: u8, session: u8 },
    Light { conn: u8, session: u8, color: u8 },
    StartAutomated { conn: u8, pain: u8 },
    Advance { secs: u16 },
    RawText { conn: u8, text: String },
}

fn pick(conns: &[u64], i: u8) -> Option<u64> {
    conns.get(usize::from(i) % conns.len().max(1)).copied()
}

fn name(sessions: &[String], i: u8) -> String {
    sessions[usize::from(i) % sessions.len()].clone()
}

fuzz_target!(|scenario: Scenario| {
    let mut relay = SimRelay::with_seed(scenario.seed);
    let mut conns = Vec::new();
    let mut tokens: Vec<(String, String)> = Vec::new();
    let mut sessions: Vec<String> = SESSIONS.iter().map(ToString::to_string).collect();

    for op in scenario.ops {

        let result = match op {
            Op::Connect => relay.connect().map(|c| conns.push(c)),
            Op::Disconnect { conn } => pick(&conns, conn).map_or(Ok(()), |c| relay.disconnect(c)),
            Op::RegisterDriver { conn, session } => {
                let Some(c) = pick(&conns, conn) else { continue };
                let session_id = name(&sessions, session);
                let register = SessionRef { session_id: session_id.clone() };
                let r = relay.send(c, ClientMessage::RegisterDriver(register));
                for m in relay.messages(c) {
                    if let ServerMessage::DriverToken(grant) = m {
                        tokens.push((session_id.clone(), grant.token.clone()));
                    }
                }
                r
            },
            Op::RegisterRider { conn, session } => {
                let Some(c) = pick(&conns, conn) else { continue };
                let session_id = name(&sessions, session);
                relay.send(c, ClientMessage::RegisterRider(SessionRef { session_id }))
            },
            Op::RequestLast { conn, session } => {
                let Some(c) = pick(&conns, conn) else { continue };
                let session_id = name(&sessions, session);
                relay.send(c, ClientMessage::RequestLast(SessionRef { session_id }))
            },
            Op::Update { conn, session, forged, volume } => {
                let Some(c) = pick(&conns, conn) else { continue };
                let session_id = name(&sessions, session);
                let token = tokens
                    .iter()
                    .find(|(s, _)| *s == session_id)
                    .map(|(_, t)| t.clone())
                    .filter(|_| !forged)
                    .unwrap_or_else(|| "forged".to_string());
                let msg = ChannelMessage {
                    session_id: Some(session_id),
                    driver_token: Some(token),
                    volume: f64::from(volume),
                    ..ChannelMessage::default()
                };
                relay.send(c, ClientMessage::Left(msg))
            },
            Op::RiderCount { conn, session } => {
                let Some(c) = pick(&conns, conn) else { continue };
                let session_id = name(&sessions, session);
                let token = tokens.iter().find(|(s, _)| *s == session_id).map(|(_, t)| t.clone());
                let credentials =
                    DriverCredentials { session_id: Some(session_id), driver_token: token };
                relay.send(c, ClientMessage::GetRiderCount(credentials))
            },
            Op::Light { conn, session, color } => {
                let Some(c) = pick(&conns, conn) else { continue };
                let update = TrafficLightUpdate {
                    session_id: name(&sessions, session),
                    color: COLORS[usize::from(color) % COLORS.len()].to_string(),
                };
                relay.send(c, ClientMessage::TrafficLight(update))
            },
            Op::StartAutomated { conn, pain } => {
                let Some(c) = pick(&conns, conn) else { continue };
                let config = AutomatedDriverConfig {
                    session_duration: 30,
                    ms_between_updates: 1000,
                    pain_probability: f64::from(pain % 31),
                    ..AutomatedDriverConfig::default()
                };
                let r = relay.send(c, ClientMessage::StartAutomatedSession(config));
                for m in relay.messages(c) {
                    if let ServerMessage::AutomatedSessionStarted(grant) = m {
                        if !sessions.contains(&grant.session_id) {
                            sessions.push(grant.session_id.clone());
                        }
                    }
                }
                r
            },
            Op::Advance { secs } => relay.advance(Duration::from_secs(u64::from(secs % 600))),
            Op::RawText { conn, text } => {
                let Some(c) = pick(&conns, conn) else { continue };
                relay.send_text(c, &text)
            },
        };

        match result {
            Ok(()) | Err(DriverError::ConnectionNotFound(_) | DriverError::Protocol(_)) => {},
            Err(e) => panic!("unexpected driver error: {e}"),
        }

        for session_id in &sessions {
            let state = relay.state();
            let tokened = tokens
                .iter()
                .any(|(s, t)| s == session_id && state.validate_driver_token(s, t));
            assert!(!(tokened && state.automated_driver(session_id).is_some()));

            let riders = state.rider_connections(session_id);
            let count = state.rider_aggregate(session_id);
            assert_eq!(count.total as usize, riders.len());
            assert_eq!(count.red + count.yellow + count.green + count.none, count.total);

            for rider in riders {
                for m in relay.messages(*rider) {
                    if let ServerMessage::Left(msg) | ServerMessage::Right(msg) = m {
                        assert!(msg.driver_token.is_none(), "token leaked to rider");
                    }
                }
            }
        }
    }
});
