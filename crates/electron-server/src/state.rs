//! Session registry.
//!
//! [`SessionState`] is the single source of truth for every live session:
//! who may drive it, who is riding it, what the channels last looked like,
//! and which sessions are driven by an [`AutomatedDriver`]. It is owned by
//! the [`ServerDriver`](crate::ServerDriver) and mutated only through it, so
//! all registry changes are serialized.
//!
//! # Invariants
//!
//! - A session has at most one controller: a driver token or an automated
//!   driver, never both.
//! - A connection appears at most once in a session's rider list.
//! - Traffic lights exist only for connections that are riders.
//! - An automated session's cache is dropped together with its driver.

use std::{collections::HashMap, ops::Sub, time::Duration};

use electron_core::{AutomatedDriver, Emission};
use electron_proto::{
    AutomatedDriverConfig, Channel, ChannelMessage, RiderCount, ServerMessage, TrafficLight,
};
use rand::Rng;

use crate::driver::{LogLevel, ServerAction};

/// Runtime-assigned identifier of one participant connection.
pub type ConnectionId = u64;

/// Cached state of both channels of a session.
#[derive(Debug, Clone, Default)]
struct LastMessages {
    left: Option<ChannelMessage>,
    right: Option<ChannelMessage>,
}

impl LastMessages {
    fn slot(&mut self, channel: Channel) -> &mut Option<ChannelMessage> {
        match channel {
            Channel::Left => &mut self.left,
            Channel::Right => &mut self.right,
        }
    }

    fn get(&self, channel: Channel) -> Option<&ChannelMessage> {
        match channel {
            Channel::Left => self.left.as_ref(),
            Channel::Right => self.right.as_ref(),
        }
    }
}

/// Registry of all live sessions.
#[derive(Debug)]
pub struct SessionState<I> {
    /// Session ID → driver token
    driver_tokens: HashMap<String, String>,
    /// Session ID → connection of the human driver
    driver_connections: HashMap<String, ConnectionId>,
    /// Session ID → rider connections, in join order
    riders: HashMap<String, Vec<ConnectionId>>,
    /// Session ID → last channel messages
    last_messages: HashMap<String, LastMessages>,
    /// Session ID → automated driver
    automated_drivers: HashMap<String, AutomatedDriver<I>>,
    /// Session ID → connection that started the automated session
    automated_owners: HashMap<String, ConnectionId>,
    /// Connection → reported traffic light
    traffic_lights: HashMap<ConnectionId, TrafficLight>,
}

impl<I> Default for SessionState<I> {
    fn default() -> Self {
        Self {
            driver_tokens: HashMap::new(),
            driver_connections: HashMap::new(),
            riders: HashMap::new(),
            last_messages: HashMap::new(),
            automated_drivers: HashMap::new(),
            automated_owners: HashMap::new(),
            traffic_lights: HashMap::new(),
        }
    }
}

impl<I> SessionState<I> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the driver token of a human session.
    ///
    /// Unconditional; callers check [`Self::session_exists`] first.
    pub fn add_driver_token(&mut self, session_id: &str, token: String) {
        self.driver_tokens.insert(session_id.to_string(), token);
    }

    /// Remember which connection drives a human session.
    pub fn bind_driver_connection(&mut self, session_id: &str, connection_id: ConnectionId) {
        self.driver_connections.insert(session_id.to_string(), connection_id);
    }

    /// Connection currently driving `session_id`, if any.
    pub fn driver_connection(&self, session_id: &str) -> Option<ConnectionId> {
        self.driver_connections.get(session_id).copied()
    }

    /// Whether the session has a controller (token or automated driver).
    pub fn session_exists(&self, session_id: &str) -> bool {
        self.driver_tokens.contains_key(session_id)
            || self.automated_drivers.contains_key(session_id)
    }

    /// Whether `token` is the driver token of `session_id`.
    ///
    /// Automated sessions have no token, so this is always false for them.
    pub fn validate_driver_token(&self, session_id: &str, token: &str) -> bool {
        self.driver_tokens.get(session_id).is_some_and(|t| t == token)
    }

    /// Add a rider to a session.
    ///
    /// Does not check that the session exists. Adding the same connection
    /// twice has no effect.
    pub fn add_rider_connection(&mut self, session_id: &str, connection_id: ConnectionId) {
        let riders = self.riders.entry(session_id.to_string()).or_default();
        if !riders.contains(&connection_id) {
            riders.push(connection_id);
        }
    }

    /// Riders of a session, in join order. Empty for unknown sessions.
    pub fn rider_connections(&self, session_id: &str) -> &[ConnectionId] {
        self.riders.get(session_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Cache the latest message of one channel.
    pub fn store_last_message(&mut self, session_id: &str, channel: Channel, msg: ChannelMessage) {
        *self.last_messages.entry(session_id.to_string()).or_default().slot(channel) = Some(msg);
    }

    /// Latest cached message of one channel.
    pub fn last_message(&self, session_id: &str, channel: Channel) -> Option<&ChannelMessage> {
        self.last_messages.get(session_id).and_then(|m| m.get(channel))
    }

    /// Record a rider's traffic light.
    ///
    /// Ignored unless `connection_id` rides `session_id` and `color` is a
    /// known code. Returns whether the light was recorded.
    pub fn set_rider_traffic_light(
        &mut self,
        session_id: &str,
        connection_id: ConnectionId,
        color: &str,
    ) -> bool {
        let Some(light) = TrafficLight::from_code(color) else {
            return false;
        };
        if !self.rider_connections(session_id).contains(&connection_id) {
            return false;
        }
        self.traffic_lights.insert(connection_id, light);
        true
    }

    /// Traffic light of a connection; `None` if never reported.
    pub fn traffic_light(&self, connection_id: ConnectionId) -> TrafficLight {
        self.traffic_lights.get(&connection_id).copied().unwrap_or_default()
    }

    /// Traffic-light aggregate over the current riders of a session.
    pub fn rider_aggregate(&self, session_id: &str) -> RiderCount {
        let mut count = RiderCount::default();
        for connection_id in self.rider_connections(session_id) {
            count.record(self.traffic_light(*connection_id));
        }
        count
    }

    /// Forget a closed connection.
    ///
    /// Removes it from every rider list, clears its traffic light and unbinds
    /// it as a driver connection. Driver tokens survive, so a human driver
    /// can reconnect with the token it holds.
    pub fn on_disconnect(&mut self, connection_id: ConnectionId) {
        for riders in self.riders.values_mut() {
            riders.retain(|c| *c != connection_id);
        }
        self.riders.retain(|_, riders| !riders.is_empty());
        self.traffic_lights.remove(&connection_id);
        self.driver_connections.retain(|_, c| *c != connection_id);
    }

    /// Broadcast to all riders of a session; nothing if there are none.
    pub fn broadcast(&self, session_id: &str, message: ServerMessage) -> Option<ServerAction> {
        let recipients = self.rider_connections(session_id);
        if recipients.is_empty() {
            return None;
        }
        Some(ServerAction::Broadcast {
            session_id: session_id.to_string(),
            recipients: recipients.to_vec(),
            message,
        })
    }

    /// Automated driver of a session, if any.
    pub fn automated_driver(&self, session_id: &str) -> Option<&AutomatedDriver<I>> {
        self.automated_drivers.get(session_id)
    }

    /// Number of running automated drivers.
    pub fn automated_count(&self) -> usize {
        self.automated_drivers.len()
    }

    /// Record the connection that started an automated session.
    ///
    /// The record outlives the connection and goes away with the driver.
    pub fn set_automated_owner(&mut self, session_id: &str, connection_id: ConnectionId) {
        if self.automated_drivers.contains_key(session_id) {
            self.automated_owners.insert(session_id.to_string(), connection_id);
        }
    }

    /// Number of running automated sessions started by a connection.
    pub fn automated_count_for(&self, connection_id: ConnectionId) -> usize {
        self.automated_owners.values().filter(|c| **c == connection_id).count()
    }
}

impl<I> SessionState<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Register a new automated driver.
    ///
    /// Returns `false`, leaving the registry untouched, if the session
    /// already has any controller.
    pub fn start_automated_driver(
        &mut self,
        session_id: &str,
        config: AutomatedDriverConfig,
        now: I,
    ) -> bool {
        if self.session_exists(session_id) {
            return false;
        }
        self.automated_drivers
            .insert(session_id.to_string(), AutomatedDriver::new(session_id, config, now));
        true
    }

    /// Remove an automated driver and its cached messages.
    ///
    /// Returns whether a driver was registered.
    pub fn unregister_automated_driver(&mut self, session_id: &str) -> bool {
        let removed = self.automated_drivers.remove(session_id);
        self.automated_owners.remove(session_id);
        if let Some(mut driver) = removed {
            driver.stop();
            self.last_messages.remove(session_id);
            true
        } else {
            false
        }
    }

    /// Emit the initial update of a freshly started automated session.
    pub fn automated_kickoff<R: Rng + ?Sized>(
        &mut self,
        session_id: &str,
        rng: &mut R,
    ) -> Vec<ServerAction> {
        let Some(driver) = self.automated_drivers.get_mut(session_id) else {
            return Vec::new();
        };
        let emissions = driver.kickoff(rng);
        self.apply_emissions(session_id, emissions)
    }

    /// Handle an update-timer fire for an automated session.
    ///
    /// A tick for a session without a driver cancels its timers.
    pub fn automated_tick<R: Rng + ?Sized>(
        &mut self,
        session_id: &str,
        now: I,
        rng: &mut R,
    ) -> Vec<ServerAction> {
        let riders_present = !self.rider_connections(session_id).is_empty();
        let Some(driver) = self.automated_drivers.get_mut(session_id) else {
            return vec![ServerAction::CancelAutomatedTimers { session_id: session_id.to_string() }];
        };

        let outcome = driver.tick(now, riders_present, rng);
        let mut actions = self.apply_emissions(session_id, outcome.emissions);

        if outcome.idle_timeout {
            actions.push(ServerAction::log(
                LogLevel::Info,
                format!("automated session {session_id} has no riders, stopping"),
            ));
            actions.extend(self.stop_automated(session_id));
        }

        actions
    }

    /// Handle the end-of-session timer for an automated session.
    pub fn automated_end(&mut self, session_id: &str) -> Vec<ServerAction> {
        let Some(driver) = self.automated_drivers.get_mut(session_id) else {
            return vec![ServerAction::CancelAutomatedTimers { session_id: session_id.to_string() }];
        };

        let emissions = driver.finish();
        let mut actions = self.apply_emissions(session_id, emissions);
        actions.push(ServerAction::log(
            LogLevel::Info,
            format!("automated session {session_id} finished"),
        ));
        actions.extend(self.stop_automated(session_id));
        actions
    }

    /// Turn driver emissions into broadcasts, refreshing the cache.
    ///
    /// Channel updates are cached even with no riders present; pain bursts
    /// never are.
    pub fn apply_emissions(
        &mut self,
        session_id: &str,
        emissions: Vec<Emission>,
    ) -> Vec<ServerAction> {
        let mut actions = Vec::with_capacity(emissions.len());
        for emission in emissions {
            let message = emission.to_server_message();
            if let Emission::Update { channel, message } = emission {
                self.store_last_message(session_id, channel, message);
            }
            actions.extend(self.broadcast(session_id, message));
        }
        actions
    }

    fn stop_automated(&mut self, session_id: &str) -> Vec<ServerAction> {
        self.unregister_automated_driver(session_id);
        vec![ServerAction::CancelAutomatedTimers { session_id: session_id.to_string() }]
    }
}
