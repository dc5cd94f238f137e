//! Server driver.
//!
//! Ties together per-connection [`SocketHandler`]s, the [`SessionState`]
//! registry and the automated-driver timer events. The driver is sans-IO:
//! the runtime feeds it [`ServerEvent`]s and executes the [`ServerAction`]s
//! it returns.

use std::{collections::HashMap, time::Duration};

use electron_core::Environment;
use electron_proto::{ClientMessage, ServerMessage};

use crate::{
    handler::{AutomatedLimits, SocketHandler},
    server_error::ServerError,
    state::{ConnectionId, SessionState},
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Caps on running automated sessions
    pub automated: AutomatedLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, automated: AutomatedLimits::default() }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        connection_id: ConnectionId,
    },

    /// A decoded message was received from a connection
    MessageReceived {
        /// Connection that sent the message
        connection_id: ConnectionId,
        /// The received message
        message: ClientMessage,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// The update timer of an automated session fired
    AutomatedTick {
        /// Session whose timer fired
        session_id: String,
    },

    /// The end-of-session timer of an automated session fired
    AutomatedSessionEnd {
        /// Session whose timer fired
        session_id: String,
    },
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction {
    /// Send a message to a specific connection
    SendToConnection {
        /// Target connection
        connection_id: ConnectionId,
        /// Message to send
        message: ServerMessage,
    },

    /// Send a message to every rider of a session
    Broadcast {
        /// Session being broadcast to
        session_id: String,
        /// Rider connections at the time of the broadcast
        recipients: Vec<ConnectionId>,
        /// Message to send
        message: ServerMessage,
    },

    /// Close a connection
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Start the two timers of a new automated session
    ScheduleAutomatedTimers {
        /// Session the timers belong to
        session_id: String,
        /// Period of the recurring update timer
        update_interval: Duration,
        /// Delay of the one-shot end-of-session timer
        session_length: Duration,
    },

    /// Cancel both timers of an automated session
    CancelAutomatedTimers {
        /// Session the timers belong to
        session_id: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

impl ServerAction {
    /// Shorthand for a [`ServerAction::Log`].
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log { level, message: message.into() }
    }
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Routes connection events to handlers and timer events to the automated
/// drivers held by the registry.
pub struct ServerDriver<E: Environment> {
    /// Live connections (`connection_id` → handler)
    connections: HashMap<ConnectionId, SocketHandler>,
    /// Session registry
    state: SessionState<E::Instant>,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self { connections: HashMap::new(), state: SessionState::new(), env, config }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            ServerEvent::MessageReceived { connection_id, message } => {
                self.handle_message_received(connection_id, message)
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                Ok(self.handle_connection_closed(connection_id, &reason))
            },
            ServerEvent::AutomatedTick { session_id } => {
                let now = self.env.now();
                Ok(self.state.automated_tick(&session_id, now, &mut self.env.rng()))
            },
            ServerEvent::AutomatedSessionEnd { session_id } => {
                Ok(self.state.automated_end(&session_id))
            },
        }
    }

    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if self.connections.contains_key(&connection_id) {
            return Err(ServerError::ConnectionAlreadyExists(connection_id));
        }

        if self.connections.len() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                connection_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        let handler = SocketHandler::with_limits(connection_id, self.config.automated);
        self.connections.insert(connection_id, handler);

        Ok(vec![ServerAction::log(LogLevel::Debug, format!("connection {connection_id} accepted"))])
    }

    fn handle_message_received(
        &mut self,
        connection_id: ConnectionId,
        message: ClientMessage,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let handler = self
            .connections
            .get(&connection_id)
            .copied()
            .ok_or(ServerError::ConnectionNotFound(connection_id))?;

        Ok(handler.handle(&mut self.state, &self.env, message))
    }

    fn handle_connection_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Vec<ServerAction> {
        let Some(handler) = self.connections.remove(&connection_id) else {
            return Vec::new();
        };

        handler.disconnect(&mut self.state);

        vec![ServerAction::log(
            LogLevel::Debug,
            format!("connection {connection_id} closed: {reason}"),
        )]
    }

    /// Session registry.
    pub fn state(&self) -> &SessionState<E::Instant> {
        &self.state
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Environment the driver runs in.
    pub fn env(&self) -> &E {
        &self.env
    }
}

impl<E: Environment> std::fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.connections.len())
            .field("automated_sessions", &self.state.automated_count())
            .finish()
    }
}
