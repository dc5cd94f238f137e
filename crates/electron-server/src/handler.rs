//! Per-connection event handling.
//!
//! A [`SocketHandler`] binds the inbound events of one connection to
//! registry operations. Authorization failures are never errors: they are
//! silent drops or explicit rejection events.

use electron_core::{Environment, token};
use electron_proto::{
    AutomatedDriverConfig, AutomatedSessionGrant, Channel, ChannelMessage, ClientMessage,
    DriverCredentials, DriverTokenGrant, PainMessage, Rejection, ServerMessage, SessionRef,
    TrafficLightUpdate,
};

use crate::{
    driver::{LogLevel, ServerAction},
    state::{ConnectionId, SessionState},
};

/// Attempts at finding an unused automated session ID before giving up.
const MAX_SESSION_ID_ATTEMPTS: usize = 16;

/// Caps on running automated sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomatedLimits {
    /// Sessions one connection may have running at once
    pub per_connection: usize,
    /// Sessions the whole relay may have running at once
    pub total: usize,
}

impl Default for AutomatedLimits {
    fn default() -> Self {
        Self { per_connection: 4, total: 64 }
    }
}

/// Event handler for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHandler {
    connection_id: ConnectionId,
    limits: AutomatedLimits,
}

impl SocketHandler {
    /// Handler for the given connection with the default limits.
    pub fn new(connection_id: ConnectionId) -> Self {
        Self::with_limits(connection_id, AutomatedLimits::default())
    }

    /// Handler for the given connection.
    pub fn with_limits(connection_id: ConnectionId, limits: AutomatedLimits) -> Self {
        Self { connection_id, limits }
    }

    /// Connection this handler serves.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Handle one inbound event.
    pub fn handle<E: Environment>(
        &self,
        state: &mut SessionState<E::Instant>,
        env: &E,
        message: ClientMessage,
    ) -> Vec<ServerAction> {
        match message {
            ClientMessage::RegisterRider(SessionRef { session_id }) => {
                self.register_rider(state, &session_id)
            },
            ClientMessage::RequestLast(SessionRef { session_id }) => {
                self.request_last(state, &session_id)
            },
            ClientMessage::RegisterDriver(SessionRef { session_id }) => {
                self.register_driver(state, env, &session_id)
            },
            ClientMessage::Left(msg) => self.channel_update(state, Channel::Left, msg),
            ClientMessage::Right(msg) => self.channel_update(state, Channel::Right, msg),
            ClientMessage::PainLeft(msg) => self.pain(state, Channel::Left, msg),
            ClientMessage::PainRight(msg) => self.pain(state, Channel::Right, msg),
            ClientMessage::GetRiderCount(credentials) => self.rider_count(state, &credentials),
            ClientMessage::TrafficLight(update) => self.traffic_light(state, &update),
            ClientMessage::StartAutomatedSession(config) => {
                self.start_automated_session(state, env, config)
            },
        }
    }

    /// Forget this connection in the registry.
    pub fn disconnect<I>(&self, state: &mut SessionState<I>) {
        state.on_disconnect(self.connection_id);
    }

    fn reply(&self, message: ServerMessage) -> ServerAction {
        ServerAction::SendToConnection { connection_id: self.connection_id, message }
    }

    fn register_rider<I>(
        &self,
        state: &mut SessionState<I>,
        session_id: &str,
    ) -> Vec<ServerAction> {
        let id = self.connection_id;
        if !state.session_exists(session_id) {
            return vec![
                self.reply(ServerMessage::RiderRejected),
                ServerAction::log(
                    LogLevel::Info,
                    format!("connection {id} rejected as rider for {session_id}"),
                ),
            ];
        }

        state.add_rider_connection(session_id, id);
        vec![ServerAction::log(
            LogLevel::Info,
            format!("connection {id} approved as rider for {session_id}"),
        )]
    }

    fn request_last<I>(&self, state: &SessionState<I>, session_id: &str) -> Vec<ServerAction> {
        Channel::ALL
            .into_iter()
            .filter_map(|channel| {
                let msg = state.last_message(session_id, channel)?;
                Some(self.reply(ServerMessage::channel_update(channel, msg.clone())))
            })
            .collect()
    }

    fn register_driver<E: Environment>(
        &self,
        state: &mut SessionState<E::Instant>,
        env: &E,
        session_id: &str,
    ) -> Vec<ServerAction> {
        let id = self.connection_id;
        if state.session_exists(session_id) {
            return vec![
                self.reply(ServerMessage::DriverRejected),
                ServerAction::log(
                    LogLevel::Info,
                    format!("connection {id} rejected as driver for {session_id}"),
                ),
            ];
        }

        let token = token::generate_driver_token(&mut env.rng());
        state.add_driver_token(session_id, token.clone());
        state.bind_driver_connection(session_id, id);

        vec![
            self.reply(ServerMessage::DriverToken(DriverTokenGrant { token })),
            ServerAction::log(
                LogLevel::Info,
                format!("connection {id} approved as driver for {session_id}"),
            ),
        ]
    }

    fn channel_update<I>(
        &self,
        state: &mut SessionState<I>,
        channel: Channel,
        msg: ChannelMessage,
    ) -> Vec<ServerAction> {
        let Some(session_id) =
            authorize(state, msg.session_id.as_deref(), msg.driver_token.as_deref())
        else {
            return Vec::new();
        };

        state.bind_driver_connection(&session_id, self.connection_id);
        let relayed = msg.without_token();
        state.store_last_message(&session_id, channel, relayed.clone());
        state
            .broadcast(&session_id, ServerMessage::channel_update(channel, relayed))
            .into_iter()
            .collect()
    }

    fn pain<I>(
        &self,
        state: &mut SessionState<I>,
        channel: Channel,
        msg: PainMessage,
    ) -> Vec<ServerAction> {
        let Some(session_id) =
            authorize(state, msg.session_id.as_deref(), msg.driver_token.as_deref())
        else {
            return Vec::new();
        };

        state.bind_driver_connection(&session_id, self.connection_id);
        state
            .broadcast(&session_id, ServerMessage::pain(channel, msg.without_token()))
            .into_iter()
            .collect()
    }

    fn rider_count<I>(
        &self,
        state: &mut SessionState<I>,
        credentials: &DriverCredentials,
    ) -> Vec<ServerAction> {
        let Some(session_id) = authorize(
            state,
            credentials.session_id.as_deref(),
            credentials.driver_token.as_deref(),
        ) else {
            return Vec::new();
        };

        state.bind_driver_connection(&session_id, self.connection_id);
        vec![self.reply(ServerMessage::RiderCount(state.rider_aggregate(&session_id)))]
    }

    fn traffic_light<I>(
        &self,
        state: &mut SessionState<I>,
        update: &TrafficLightUpdate,
    ) -> Vec<ServerAction> {
        let session_id = update.session_id.as_str();
        if !state.set_rider_traffic_light(session_id, self.connection_id, &update.color) {
            return Vec::new();
        }

        // Keep the human driver's dashboard current.
        state
            .driver_connection(session_id)
            .map(|driver| ServerAction::SendToConnection {
                connection_id: driver,
                message: ServerMessage::RiderCount(state.rider_aggregate(session_id)),
            })
            .into_iter()
            .collect()
    }

    fn automated_limit_reached<I>(&self, state: &SessionState<I>) -> Option<&'static str> {
        if state.automated_count() >= self.limits.total {
            Some("too many automated sessions running")
        } else if state.automated_count_for(self.connection_id) >= self.limits.per_connection {
            Some("too many automated sessions for this connection")
        } else {
            None
        }
    }

    fn start_automated_session<E: Environment>(
        &self,
        state: &mut SessionState<E::Instant>,
        env: &E,
        config: AutomatedDriverConfig,
    ) -> Vec<ServerAction> {
        if let Err(err) = config.validate() {
            return vec![
                self.reply(ServerMessage::AutomatedSessionRejected(Rejection {
                    reason: err.to_string(),
                })),
                ServerAction::log(LogLevel::Warn, format!("invalid automated config: {err}")),
            ];
        }

        let id = self.connection_id;
        if let Some(reason) = self.automated_limit_reached(state) {
            return vec![
                self.reply(ServerMessage::AutomatedSessionRejected(Rejection {
                    reason: reason.to_string(),
                })),
                ServerAction::log(
                    LogLevel::Warn,
                    format!("connection {id} refused automated session: {reason}"),
                ),
            ];
        }

        let update_interval = config.update_interval();
        let session_length = config.session_length();
        let now = env.now();
        let mut rng = env.rng();

        let started = (0..MAX_SESSION_ID_ATTEMPTS).find_map(|_| {
            let candidate = token::generate_automated_session_id(&mut rng);
            state.start_automated_driver(&candidate, config.clone(), now).then_some(candidate)
        });

        let Some(session_id) = started else {
            return vec![
                self.reply(ServerMessage::AutomatedSessionRejected(Rejection {
                    reason: "no free automated session ID".to_string(),
                })),
                ServerAction::log(LogLevel::Error, "automated session ID space exhausted"),
            ];
        };

        state.set_automated_owner(&session_id, id);
        let mut actions = vec![
            ServerAction::log(
                LogLevel::Info,
                format!("automated session {session_id} started by connection {id}"),
            ),
            ServerAction::ScheduleAutomatedTimers {
                session_id: session_id.clone(),
                update_interval,
                session_length,
            },
        ];
        actions.extend(state.automated_kickoff(&session_id, &mut rng));
        let grant = AutomatedSessionGrant { session_id };
        actions.push(self.reply(ServerMessage::AutomatedSessionStarted(grant)));
        actions
    }
}

/// Session ID of a driver message whose token checks out.
fn authorize<I>(
    state: &SessionState<I>,
    session_id: Option<&str>,
    token: Option<&str>,
) -> Option<String> {
    let session_id = session_id.filter(|id| !id.is_empty())?;
    state.validate_driver_token(session_id, token?).then(|| session_id.to_string())
}
