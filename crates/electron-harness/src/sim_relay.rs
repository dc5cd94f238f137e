//! In-memory relay for deterministic testing.
//!
//! `SimRelay` wraps `ServerDriver` with in-memory connections and virtual
//! timers. Outbound messages land in per-connection inboxes; automated
//! session timers fire only when the test advances the clock.
//!
//! This relay is designed for test-driven usage where tests explicitly
//! drive it rather than having it run autonomously.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    time::Duration,
};

use electron_core::Environment;
use electron_proto::{ClientMessage, ServerMessage};
use electron_server::{
    ConnectionId, DriverConfig, DriverError, LogLevel, ServerAction, ServerDriver, ServerEvent,
    SessionState,
};

use crate::SimEnv;

/// Virtual timers of one automated session.
#[derive(Debug, Clone, Copy)]
struct SimTimers {
    next_update: Duration,
    update_interval: Duration,
    end_at: Duration,
}

/// Simulated relay.
pub struct SimRelay {
    /// The action-based server driver
    driver: ServerDriver<SimEnv>,
    /// Shared handle to the driver's clock
    env: SimEnv,
    /// Messages delivered to each open connection
    inboxes: HashMap<ConnectionId, Vec<ServerMessage>>,
    /// Pending timers (session ID → timers)
    timers: BTreeMap<String, SimTimers>,
    /// Every `Log` action, in order
    logs: Vec<(LogLevel, String)>,
    /// Next connection ID
    next_connection_id: ConnectionId,
}

impl Default for SimRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRelay {
    /// Relay seeded with zero.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Relay with the given RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_config(seed, DriverConfig::default())
    }

    /// Relay with the given RNG seed and driver config.
    pub fn with_config(seed: u64, config: DriverConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        Self {
            driver: ServerDriver::new(env.clone(), config),
            env,
            inboxes: HashMap::new(),
            timers: BTreeMap::new(),
            logs: Vec::new(),
            next_connection_id: 1,
        }
    }

    /// Open a connection and return its ID.
    ///
    /// A connection over the limit is closed straight away; its ID is still
    /// returned but [`Self::is_open`] reports false.
    pub fn connect(&mut self) -> Result<ConnectionId, DriverError> {
        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;

        self.inboxes.insert(connection_id, Vec::new());
        let actions = self.driver.process_event(ServerEvent::ConnectionAccepted { connection_id })?;
        self.execute(actions)?;

        Ok(connection_id)
    }

    /// Deliver a message from a connection.
    pub fn send(
        &mut self,
        connection_id: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), DriverError> {
        let actions =
            self.driver.process_event(ServerEvent::MessageReceived { connection_id, message })?;
        self.execute(actions)
    }

    /// Deliver a raw text frame from a connection.
    ///
    /// Frames that do not decode are rejected before reaching the driver.
    pub fn send_text(
        &mut self,
        connection_id: ConnectionId,
        text: &str,
    ) -> Result<(), DriverError> {
        let message = ClientMessage::decode(text)?;
        self.send(connection_id, message)
    }

    /// Close a connection.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Result<(), DriverError> {
        self.inboxes.remove(&connection_id);
        let actions = self.driver.process_event(ServerEvent::ConnectionClosed {
            connection_id,
            reason: "client disconnect".to_string(),
        })?;
        self.execute(actions)
    }

    /// Advance virtual time, firing every timer that falls due on the way.
    ///
    /// Timers fire in instant order. At equal instants an update fires
    /// before an end, and sessions fire in ID order.
    pub fn advance(&mut self, by: Duration) -> Result<(), DriverError> {
        let target = self.env.now() + by;

        while let Some((at, event)) = self.next_due(target) {
            self.env.advance_to(at);

            match &event {
                ServerEvent::AutomatedTick { session_id } => {
                    if let Some(timers) = self.timers.get_mut(session_id) {
                        timers.next_update += timers.update_interval;
                    }
                },
                ServerEvent::AutomatedSessionEnd { session_id } => {
                    self.timers.remove(session_id);
                },
                _ => {},
            }

            let actions = self.driver.process_event(event)?;
            self.execute(actions)?;
        }

        self.env.advance_to(target);
        Ok(())
    }

    fn next_due(&self, target: Duration) -> Option<(Duration, ServerEvent)> {
        self.timers
            .iter()
            .flat_map(|(session_id, timers)| {
                [(timers.next_update, 0u8, session_id), (timers.end_at, 1u8, session_id)]
            })
            .filter(|(at, _, _)| *at <= target)
            .min()
            .map(|(at, kind, session_id)| {
                let session_id = session_id.clone();
                let event = if kind == 0 {
                    ServerEvent::AutomatedTick { session_id }
                } else {
                    ServerEvent::AutomatedSessionEnd { session_id }
                };
                (at, event)
            })
    }

    /// Execute driver actions against the in-memory connections.
    fn execute(&mut self, actions: Vec<ServerAction>) -> Result<(), DriverError> {
        let mut queue: VecDeque<ServerAction> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                ServerAction::SendToConnection { connection_id, message } => {
                    if let Some(inbox) = self.inboxes.get_mut(&connection_id) {
                        inbox.push(message);
                    }
                },

                ServerAction::Broadcast { recipients, message, .. } => {
                    for connection_id in recipients {
                        if let Some(inbox) = self.inboxes.get_mut(&connection_id) {
                            inbox.push(message.clone());
                        }
                    }
                },

                ServerAction::CloseConnection { connection_id, reason } => {
                    self.inboxes.remove(&connection_id);
                    let follow_up = self
                        .driver
                        .process_event(ServerEvent::ConnectionClosed { connection_id, reason })?;
                    queue.extend(follow_up);
                },

                ServerAction::ScheduleAutomatedTimers {
                    session_id,
                    update_interval,
                    session_length,
                } => {
                    let now = self.env.now();
                    self.timers.insert(session_id, SimTimers {
                        next_update: now + update_interval,
                        update_interval,
                        end_at: now + session_length,
                    });
                },

                ServerAction::CancelAutomatedTimers { session_id } => {
                    self.timers.remove(&session_id);
                },

                ServerAction::Log { level, message } => {
                    match level {
                        LogLevel::Debug => tracing::debug!("{}", message),
                        LogLevel::Info => tracing::info!("{}", message),
                        LogLevel::Warn => tracing::warn!("{}", message),
                        LogLevel::Error => tracing::error!("{}", message),
                    }
                    self.logs.push((level, message));
                },
            }
        }

        Ok(())
    }

    /// Messages delivered to a connection so far.
    pub fn messages(&self, connection_id: ConnectionId) -> &[ServerMessage] {
        self.inboxes.get(&connection_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Drain the messages delivered to a connection.
    pub fn take_messages(&mut self, connection_id: ConnectionId) -> Vec<ServerMessage> {
        self.inboxes.get_mut(&connection_id).map(std::mem::take).unwrap_or_default()
    }

    /// Whether a connection is still open.
    pub fn is_open(&self, connection_id: ConnectionId) -> bool {
        self.inboxes.contains_key(&connection_id)
    }

    /// Whether an automated session still has timers pending.
    pub fn has_timers(&self, session_id: &str) -> bool {
        self.timers.contains_key(session_id)
    }

    /// Every logged message, in order.
    pub fn logs(&self) -> &[(LogLevel, String)] {
        &self.logs
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.env.now()
    }

    /// Session registry.
    pub fn state(&self) -> &SessionState<Duration> {
        self.driver.state()
    }

    /// Underlying driver.
    pub fn driver(&self) -> &ServerDriver<SimEnv> {
        &self.driver
    }
}

impl std::fmt::Debug for SimRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRelay")
            .field("now", &self.env.now())
            .field("connections", &self.inboxes.len())
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}
