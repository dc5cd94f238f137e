//! Electron relay server.
//!
//! Production server relaying stimulation parameters from drivers to riders
//! over WebSocket, with tokio for the async runtime and system time with OS
//! randomness.
//!
//! # Architecture
//!
//! The [`ServerDriver`] is sans-IO: it consumes [`ServerEvent`]s and returns
//! [`ServerAction`]s. [`Server`] owns the I/O: it accepts WebSocket
//! connections, decodes text frames into events, runs the automated-session
//! timers, and executes the actions the driver hands back.
//!
//! # Components
//!
//! - [`ServerDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`SessionState`]: Session registry shared by every connection
//! - [`SocketHandler`]: Per-connection event handling
//! - [`Server`]: Production runtime that executes driver actions
//! - [`WsTransport`]: WebSocket transport over tokio TCP
//! - [`SystemEnv`]: Production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod handler;
mod server_error;
mod state;
mod system_env;
mod transport;

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
use electron_proto::{ClientMessage, ProtocolError, ServerMessage};
pub use error::ServerError;
use futures_util::{SinkExt, StreamExt};
pub use handler::{AutomatedLimits, SocketHandler};
pub use server_error::ServerError as DriverError;
pub use state::{ConnectionId, SessionState};
pub use system_env::SystemEnv;
use tokio::{
    sync::{
        Mutex, RwLock,
        mpsc::{self, error::TrySendError},
    },
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::tungstenite::{
    Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
pub use transport::{PendingConnection, WsConnection, WsTransport};

type SharedDriver = Arc<Mutex<ServerDriver<SystemEnv>>>;

/// Frames a connection's writer may fall behind by before frames are dropped.
const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Frames queued for a connection's writer task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(String),
}

/// Shared state for all connections.
///
/// Holds the per-connection outbound queues and the timer tasks of running
/// automated sessions.
#[derive(Default)]
struct SharedState {
    /// Map of connection ID to its writer queue.
    ///
    /// All frames to a client go through this single queue, preserving
    /// ordering. A full queue drops new frames.
    outbound: RwLock<HashMap<ConnectionId, mpsc::Sender<Outbound>>>,
    /// Map of automated session ID to its timer task
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Next connection ID to hand out
    next_connection_id: AtomicU64,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:5000")
    pub bind_address: String,
    /// Driver configuration (limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:5000".to_string(), driver: DriverConfig::default() }
    }
}

/// Production relay server.
///
/// Wraps `ServerDriver` with the WebSocket transport and system environment.
pub struct Server {
    /// The action-based server driver
    driver: ServerDriver<SystemEnv>,
    /// WebSocket listener
    transport: WsTransport,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.driver.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".to_string()));
        }

        let driver = ServerDriver::new(SystemEnv::new(), config.driver);
        let transport = WsTransport::bind(&config.bind_address).await?;

        Ok(Self { driver, transport })
    }

    /// Run the server, accepting connections and relaying events.
    ///
    /// This method runs until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState::default());

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);

                    tokio::spawn(async move {
                        let peer = pending.remote_addr();
                        if let Err(e) = handle_connection(pending, driver, shared).await {
                            tracing::error!("Connection error from {}: {}", peer, e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single WebSocket connection from handshake to close.
async fn handle_connection(
    pending: PendingConnection,
    driver: SharedDriver,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let ws = pending.upgrade().await?;
    let connection_id = shared.next_connection_id.fetch_add(1, Ordering::Relaxed);

    tracing::debug!("New connection: {}", connection_id);

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let result = match outbound {
                Outbound::Text(text) => sink.send(Message::Text(text)).await,
                Outbound::Close(reason) => {
                    let frame = CloseFrame { code: CloseCode::Policy, reason: reason.into() };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                },
            };
            if let Err(e) = result {
                tracing::debug!("Write error on {}: {}", connection_id, e);
                break;
            }
        }
    });

    shared.outbound.write().await.insert(connection_id, tx);

    dispatch(&driver, &shared, ServerEvent::ConnectionAccepted { connection_id }).await?;

    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => match ClientMessage::decode(&text) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Dropping frame from {}: {}", connection_id, e);
                    continue;
                },
            },
            Ok(Message::Binary(_)) => {
                tracing::warn!(
                    "Dropping frame from {}: {}",
                    connection_id,
                    ProtocolError::UnsupportedFrame("binary")
                );
                continue;
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("Read error on {}: {}", connection_id, e);
                break;
            },
        };

        tracing::trace!(connection_id, event = message.event_name(), "inbound event");

        match dispatch(&driver, &shared, ServerEvent::MessageReceived { connection_id, message })
            .await
        {
            Ok(()) => {},
            Err(ServerError::Driver(DriverError::ConnectionNotFound(_))) => break,
            Err(e) => tracing::warn!("Event processing error on {}: {}", connection_id, e),
        }
    }

    shared.outbound.write().await.remove(&connection_id);
    writer.abort();

    dispatch(&driver, &shared, ServerEvent::ConnectionClosed {
        connection_id,
        reason: "connection closed".to_string(),
    })
    .await
}

/// Feed one event to the driver and execute the resulting actions.
///
/// The driver lock is held until every action has been queued, so actions
/// from one event are never interleaved with another event's.
async fn dispatch(
    driver: &SharedDriver,
    shared: &Arc<SharedState>,
    event: ServerEvent,
) -> Result<(), ServerError> {
    let mut guard = driver.lock().await;
    let actions = guard.process_event(event)?;
    execute_actions(actions, driver, shared).await
}

/// Execute server actions.
async fn execute_actions(
    actions: Vec<ServerAction>,
    driver: &SharedDriver,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    for action in actions {
        match action {
            ServerAction::SendToConnection { connection_id, message } => {
                let text = encode(&message)?;
                let outbound = shared.outbound.read().await;
                match outbound.get(&connection_id) {
                    Some(tx) => enqueue(tx, connection_id, Outbound::Text(text)),
                    None => tracing::warn!("SendToConnection: {} not found", connection_id),
                }
            },

            ServerAction::Broadcast { session_id, recipients, message } => {
                let text = encode(&message)?;
                let outbound = shared.outbound.read().await;
                let count = recipients.len();
                tracing::trace!(session_id = %session_id, recipients = count, "broadcast");
                for connection_id in recipients {
                    if let Some(tx) = outbound.get(&connection_id) {
                        enqueue(tx, connection_id, Outbound::Text(text.clone()));
                    }
                }
            },

            ServerAction::CloseConnection { connection_id, reason } => {
                tracing::info!("Closing connection {}: {}", connection_id, reason);
                if let Some(tx) = shared.outbound.write().await.remove(&connection_id) {
                    enqueue(&tx, connection_id, Outbound::Close(reason));
                }
            },

            ServerAction::ScheduleAutomatedTimers {
                session_id,
                update_interval,
                session_length,
            } => {
                let handle = spawn_timers(
                    session_id.clone(),
                    update_interval,
                    session_length,
                    Arc::clone(driver),
                    Arc::clone(shared),
                );
                if let Some(stale) = shared.timers.lock().await.insert(session_id, handle) {
                    stale.abort();
                }
            },

            ServerAction::CancelAutomatedTimers { session_id } => {
                if let Some(handle) = shared.timers.lock().await.remove(&session_id) {
                    handle.abort();
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }

    Ok(())
}

/// Queue a frame without waiting on the writer.
///
/// Delivery is best-effort: a stalled client loses frames instead of holding
/// up the relay.
fn enqueue(tx: &mpsc::Sender<Outbound>, connection_id: ConnectionId, outbound: Outbound) {
    match tx.try_send(outbound) {
        Ok(()) => {},
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Outbound queue of {} full, dropping frame", connection_id);
        },
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("Writer of {} gone", connection_id);
        },
    }
}

fn encode(message: &ServerMessage) -> Result<String, ServerError> {
    Ok(message.encode()?)
}

/// Spawn the update and end-of-session timers of one automated session.
///
/// Both timers live in one task. When they fall due together the update
/// fires first. The task ends after delivering the end event; a
/// `CancelAutomatedTimers` action aborts it earlier.
fn spawn_timers(
    session_id: String,
    update_interval: Duration,
    session_length: Duration,
    driver: SharedDriver,
    shared: Arc<SharedState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut updates = tokio::time::interval_at(start + update_interval, update_interval);
        updates.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let end = tokio::time::sleep_until(start + session_length);
        tokio::pin!(end);

        loop {
            let (event, last) = tokio::select! {
                biased;
                _ = updates.tick() => {
                    (ServerEvent::AutomatedTick { session_id: session_id.clone() }, false)
                },
                () = &mut end => {
                    (ServerEvent::AutomatedSessionEnd { session_id: session_id.clone() }, true)
                },
            };

            if let Err(e) = dispatch(&driver, &shared, event).await {
                tracing::error!("Automated session {} timer error: {}", session_id, e);
            }
            if last {
                break;
            }
        }
    })
}
