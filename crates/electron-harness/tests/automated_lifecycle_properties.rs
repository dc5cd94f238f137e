//! Property-based tests for automated session lifecycle on the simulated
//! relay.

use std::time::Duration;

use electron_harness::SimRelay;
use electron_proto::{AutomatedDriverConfig, ClientMessage, ServerMessage, SessionRef};
use proptest::prelude::*;

fn start(relay: &mut SimRelay, config: AutomatedDriverConfig) -> String {
    let conn = relay.connect().unwrap();
    relay.send(conn, ClientMessage::StartAutomatedSession(config)).unwrap();
    relay
        .take_messages(conn)
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::AutomatedSessionStarted(grant) => Some(grant.session_id),
            _ => None,
        })
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: a ridden session runs until exactly its configured length
    #[test]
    fn prop_session_ends_at_configured_length(
        seed in any::<u64>(),
        duration in 30u32..=60,
        interval_secs in 5u64..=60,
    ) {
        let config = AutomatedDriverConfig {
            session_duration: duration,
            ms_between_updates: interval_secs * 1000,
            ..Default::default()
        };
        let length = config.session_length();
        let mut relay = SimRelay::with_seed(seed);
        let id = start(&mut relay, config);

        let rider = relay.connect().unwrap();
        relay.send(rider, ClientMessage::RegisterRider(SessionRef { session_id: id.clone() }))
            .unwrap();

        relay.advance(length - Duration::from_secs(1)).unwrap();
        prop_assert!(relay.state().session_exists(&id));

        relay.advance(Duration::from_secs(1)).unwrap();
        prop_assert!(!relay.state().session_exists(&id));
        prop_assert!(!relay.has_timers(&id));
    }

    /// Property: riders only ever see the automated session's own messages,
    /// and none of them carries a driver token
    #[test]
    fn prop_riders_never_see_tokens(seed in any::<u64>(), pain in 0.0f64..=30.0) {
        let config = AutomatedDriverConfig { pain_probability: pain, ..Default::default() };
        let mut relay = SimRelay::with_seed(seed);
        let id = start(&mut relay, config);

        let rider = relay.connect().unwrap();
        relay.send(rider, ClientMessage::RegisterRider(SessionRef { session_id: id })).unwrap();
        relay.advance(Duration::from_secs(10 * 60)).unwrap();

        for message in relay.messages(rider) {
            match message {
                ServerMessage::Left(msg) | ServerMessage::Right(msg) => {
                    prop_assert!(msg.driver_token.is_none());
                },
                ServerMessage::PainLeft(msg) | ServerMessage::PainRight(msg) => {
                    prop_assert!(msg.driver_token.is_none());
                    prop_assert!(msg.volume <= 1.0);
                },
                other => prop_assert!(false, "unexpected message {:?}", other),
            }
        }
    }
}
