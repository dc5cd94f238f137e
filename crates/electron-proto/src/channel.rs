//! Channel payload types.
//!
//! A session carries two independent channels. Each update describes the full
//! oscillator state of one channel; pain bursts are a separate, short-lived
//! side channel that is never cached.

use serde::{Deserialize, Serialize};

/// Waveform name used when amplitude or frequency modulation is off.
pub const NO_MODULATION: &str = "none";

/// One of the two signal paths of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Left channel
    Left,
    /// Right channel
    Right,
}

impl Channel {
    /// Both channels, left first.
    pub const ALL: [Self; 2] = [Self::Left, Self::Right];

    /// Event name used for parameter updates on this channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Event name used for pain bursts on this channel.
    pub fn pain_event(self) -> &'static str {
        match self {
            Self::Left => "pain-left",
            Self::Right => "pain-right",
        }
    }

    /// The opposite channel.
    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Full parameter state of one channel.
///
/// Sent by human drivers (with `sessionId` and `driverToken`) and relayed to
/// riders. Automated sessions emit the same shape without credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelMessage {
    /// Session this update belongs to
    #[serde(alias = "sessId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Driver capability token; stripped before relaying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_token: Option<String>,
    /// Volume, 0 to 100
    pub volume: f64,
    /// Carrier frequency in Hz
    pub freq: f64,
    /// Amplitude modulation waveform, or `"none"`
    pub am_type: String,
    /// Amplitude modulation depth
    pub am_depth: f64,
    /// Amplitude modulation frequency in Hz
    pub am_freq: f64,
    /// Whether the channel is playing
    pub active: bool,
    /// Frequency modulation waveform, or `"none"`
    pub fm_type: String,
    /// Frequency modulation depth
    pub fm_depth: f64,
    /// Frequency modulation frequency in Hz
    pub fm_freq: f64,
    /// Volume the client should ramp towards
    pub ramp_target: f64,
    /// Ramp speed in volume units per second; 0 disables the ramp
    pub ramp_rate: f64,
}

impl Default for ChannelMessage {
    fn default() -> Self {
        Self {
            session_id: None,
            driver_token: None,
            volume: 0.0,
            freq: 0.0,
            am_type: NO_MODULATION.to_string(),
            am_depth: 0.0,
            am_freq: 0.0,
            active: false,
            fm_type: NO_MODULATION.to_string(),
            fm_depth: 0.0,
            fm_freq: 0.0,
            ramp_target: 0.0,
            ramp_rate: 0.0,
        }
    }
}

impl ChannelMessage {
    /// Copy of this message with the driver token removed.
    #[must_use]
    pub fn without_token(mut self) -> Self {
        self.driver_token = None;
        self
    }
}

/// A bounded burst of short, loud shocks on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PainMessage {
    /// Session this burst belongs to
    #[serde(alias = "sessId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Driver capability token; stripped before relaying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_token: Option<String>,
    /// Shock amplitude, 0.0 to 1.0
    pub volume: f64,
    /// Shock frequency in Hz
    pub frequency: f64,
    /// Length of each shock in seconds
    pub shock_duration: f64,
    /// Silence before each shock in seconds
    pub time_between_shocks: f64,
    /// How many shocks the burst contains
    pub number_of_shocks: u32,
}

impl Default for PainMessage {
    fn default() -> Self {
        Self {
            session_id: None,
            driver_token: None,
            volume: 0.0,
            frequency: 0.0,
            shock_duration: 0.0,
            time_between_shocks: 0.0,
            number_of_shocks: 0,
        }
    }
}

impl PainMessage {
    /// Copy of this message with the driver token removed.
    #[must_use]
    pub fn without_token(mut self) -> Self {
        self.driver_token = None;
        self
    }
}

/// Rider-reported comfort status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrafficLight {
    /// Stop
    Red,
    /// Slow down
    Yellow,
    /// All good
    Green,
    /// No status reported
    #[default]
    None,
}

impl TrafficLight {
    /// Parse a wire color code (`R`, `Y`, `G` or `N`).
    ///
    /// Returns `None` for anything else; callers ignore such updates.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R" => Some(Self::Red),
            "Y" => Some(Self::Yellow),
            "G" => Some(Self::Green),
            "N" => Some(Self::None),
            _ => None,
        }
    }

    /// Wire color code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Red => "R",
            Self::Yellow => "Y",
            Self::Green => "G",
            Self::None => "N",
        }
    }
}

/// Traffic-light aggregate over the current riders of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiderCount {
    /// Riders reporting red
    pub red: u32,
    /// Riders reporting yellow
    pub yellow: u32,
    /// Riders reporting green
    pub green: u32,
    /// Riders with no status
    pub none: u32,
    /// All riders
    pub total: u32,
}

impl RiderCount {
    /// Count one rider with the given status.
    pub fn record(&mut self, light: TrafficLight) {
        match light {
            TrafficLight::Red => self.red += 1,
            TrafficLight::Yellow => self.yellow += 1,
            TrafficLight::Green => self.green += 1,
            TrafficLight::None => self.none += 1,
        }
        self.total += 1;
    }
}
