//! Automated-session configuration.
//!
//! [`AutomatedDriverConfig`] arrives over the wire inside
//! `startAutomatedSession` and is checked once by [`AutomatedDriverConfig::validate`]
//! before any driver is started. The engine assumes every config it receives
//! has passed validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance when checking that waveform probabilities sum to one.
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

/// Accepted update periods in milliseconds.
///
/// Every tick takes the relay-wide lock, so the floor keeps one session from
/// crowding out the rest.
pub const UPDATE_INTERVAL_MS: std::ops::RangeInclusive<u64> = 1_000..=60_000;

/// Waveform labels with their selection probabilities.
///
/// The two vectors are parallel: `probabilities[i]` is the weight of
/// `waveforms[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmTypes {
    /// Waveform names (`sine`, `square`, ...)
    pub waveforms: Vec<String>,
    /// Selection weight for each waveform
    pub probabilities: Vec<f64>,
}

impl Default for AmTypes {
    fn default() -> Self {
        Self {
            waveforms: ["sine", "square", "triangle", "sawtooth"]
                .into_iter()
                .map(String::from)
                .collect(),
            probabilities: vec![0.4, 0.2, 0.2, 0.2],
        }
    }
}

/// Parameters of a self-driving session.
///
/// Missing fields take the deployment defaults, so a client can send `{}` to
/// start a stock session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomatedDriverConfig {
    /// Session length in minutes
    pub session_duration: u32,
    /// Largest volume step at the start of the session
    pub start_max_volume_change: f64,
    /// Largest volume step at the end of the session
    pub end_max_volume_change: f64,
    /// Lower bound of amplitude-modulation depth; 0 disables AM entirely
    #[serde(rename = "minAMDepth")]
    pub min_am_depth: f64,
    /// Upper bound of amplitude-modulation depth
    #[serde(rename = "maxAMDepth")]
    pub max_am_depth: f64,
    /// Probability that a tick changes nothing
    pub no_changes_probability: f64,
    /// Lowest carrier frequency in Hz
    pub min_frequency: f64,
    /// Highest carrier frequency in Hz
    pub max_frequency: f64,
    /// Carrier frequency both channels start at
    pub initial_frequency: f64,
    /// Period of the update timer
    pub ms_between_updates: u64,
    /// Volume both channels start at, and the floor they never drop below
    pub start_volume: u8,
    /// Chance of a pain burst per channel update, in percent
    pub pain_probability: f64,
    /// Volume added on top of the channel volume for pain bursts
    pub pain_intensity: f64,
    /// Shortest shock, seconds
    pub pain_min_shock_length: f64,
    /// Longest shock, seconds
    pub pain_max_shock_length: f64,
    /// Shortest gap between shocks, seconds
    pub pain_min_time_between_shocks: f64,
    /// Longest gap between shocks, seconds
    pub pain_max_time_between_shocks: f64,
    /// Fewest shocks per burst
    pub pain_min_shocks: u32,
    /// Most shocks per burst
    pub pain_max_shocks: u32,
    /// Waveform distribution for amplitude modulation
    pub am_types: AmTypes,
}

impl Default for AutomatedDriverConfig {
    fn default() -> Self {
        Self {
            session_duration: 60,
            start_max_volume_change: 2.0,
            end_max_volume_change: 5.0,
            min_am_depth: 3.0,
            max_am_depth: 10.0,
            no_changes_probability: 0.3,
            min_frequency: 1000.0,
            max_frequency: 1500.0,
            initial_frequency: 1200.0,
            ms_between_updates: 15_000,
            start_volume: 50,
            pain_probability: 0.0,
            pain_intensity: 10.0,
            pain_min_shock_length: 0.1,
            pain_max_shock_length: 0.5,
            pain_min_time_between_shocks: 0.1,
            pain_max_time_between_shocks: 1.0,
            pain_min_shocks: 2,
            pain_max_shocks: 6,
            am_types: AmTypes::default(),
        }
    }
}

/// Reasons an automated-session configuration is refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Session duration outside 30..=60 minutes
    #[error("session duration {0} min outside 30..=60")]
    SessionDuration(u32),

    /// A frequency bound outside 100..=3000 Hz
    #[error("{field} {value} Hz outside 100..=3000")]
    FrequencyOutOfRange {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// `min_frequency >= max_frequency`
    #[error("min frequency {min} must be below max frequency {max}")]
    FrequencyBounds {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// Initial frequency not strictly between `min_frequency` and `max_frequency`
    #[error("initial frequency {0} Hz not strictly inside the frequency bounds")]
    InitialFrequency(f64),

    /// Start volume above 100
    #[error("start volume {0} above 100")]
    StartVolume(u8),

    /// A probability outside its allowed range
    #[error("{field} {value} outside {min}..={max}")]
    OutOfRange {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: f64,
        /// Smallest accepted value
        min: f64,
        /// Largest accepted value
        max: f64,
    },

    /// A min/max pair is inverted or negative
    #[error("invalid range for {0}")]
    InvalidRange(&'static str),

    /// Update period outside [`UPDATE_INTERVAL_MS`]
    #[error("update interval {0} ms outside 1000..=60000")]
    UpdateInterval(u64),

    /// Waveform table is empty, ragged or does not sum to one
    #[error("invalid AM waveform table: {0}")]
    AmTypes(&'static str),
}

impl AutomatedDriverConfig {
    /// Check every bound the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(30..=60).contains(&self.session_duration) {
            return Err(ConfigError::SessionDuration(self.session_duration));
        }

        for (field, value) in [
            ("min frequency", self.min_frequency),
            ("max frequency", self.max_frequency),
        ] {
            if !(100.0..=3000.0).contains(&value) {
                return Err(ConfigError::FrequencyOutOfRange { field, value });
            }
        }
        if self.min_frequency >= self.max_frequency {
            return Err(ConfigError::FrequencyBounds {
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        if self.initial_frequency <= self.min_frequency
            || self.initial_frequency >= self.max_frequency
            || self.initial_frequency.is_nan()
        {
            return Err(ConfigError::InitialFrequency(self.initial_frequency));
        }

        if self.start_volume > 100 {
            return Err(ConfigError::StartVolume(self.start_volume));
        }

        check_range("no changes probability", self.no_changes_probability, 0.0, 1.0)?;
        check_range("pain probability", self.pain_probability, 0.0, 30.0)?;
        check_range("pain intensity", self.pain_intensity, 4.0, 15.0)?;

        if !UPDATE_INTERVAL_MS.contains(&self.ms_between_updates) {
            return Err(ConfigError::UpdateInterval(self.ms_between_updates));
        }

        check_pair("max volume change", self.start_max_volume_change, self.end_max_volume_change)?;
        check_ordered("AM depth", self.min_am_depth, self.max_am_depth)?;
        check_ordered("shock length", self.pain_min_shock_length, self.pain_max_shock_length)?;
        check_ordered(
            "time between shocks",
            self.pain_min_time_between_shocks,
            self.pain_max_time_between_shocks,
        )?;
        if self.pain_min_shocks > self.pain_max_shocks {
            return Err(ConfigError::InvalidRange("shock count"));
        }

        self.am_types.validate()
    }

    /// Period of the recurring update timer.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.ms_between_updates)
    }

    /// Time from start until the end-of-session timer fires.
    pub fn session_length(&self) -> Duration {
        Duration::from_secs(u64::from(self.session_duration) * 60)
    }
}

impl AmTypes {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.waveforms.is_empty() {
            return Err(ConfigError::AmTypes("no waveforms"));
        }
        if self.waveforms.len() != self.probabilities.len() {
            return Err(ConfigError::AmTypes("waveforms and probabilities differ in length"));
        }
        if self.probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(ConfigError::AmTypes("negative probability"));
        }
        let sum: f64 = self.probabilities.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(ConfigError::AmTypes("probabilities must sum to 1"));
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min, max })
    }
}

// Both ends must be finite and non-negative; order is not constrained.
fn check_pair(field: &'static str, a: f64, b: f64) -> Result<(), ConfigError> {
    if a.is_finite() && b.is_finite() && a >= 0.0 && b >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRange(field))
    }
}

fn check_ordered(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    check_pair(field, min, max)?;
    if min > max {
        return Err(ConfigError::InvalidRange(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(AutomatedDriverConfig::default().validate(), Ok(()));
    }

    #[test]
    fn empty_object_takes_defaults() {
        let config: AutomatedDriverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AutomatedDriverConfig::default());
    }

    #[test]
    fn am_depth_uses_uppercase_acronym() {
        let config: AutomatedDriverConfig =
            serde_json::from_str(r#"{"minAMDepth":0,"maxAMDepth":4}"#).unwrap();

        assert!(config.min_am_depth.abs() < f64::EPSILON);
        assert!((config.max_am_depth - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_short_session() {
        let config = AutomatedDriverConfig { session_duration: 29, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::SessionDuration(29)));
    }

    #[test]
    fn rejects_inverted_frequencies() {
        let config =
            AutomatedDriverConfig { min_frequency: 1500.0, max_frequency: 1500.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::FrequencyBounds { .. })));
    }

    #[test]
    fn rejects_initial_frequency_outside_bounds() {
        let config = AutomatedDriverConfig { initial_frequency: 999.0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::InitialFrequency(999.0)));
    }

    #[test]
    fn rejects_initial_frequency_on_a_bound() {
        for initial_frequency in [1000.0, 1500.0] {
            let config = AutomatedDriverConfig { initial_frequency, ..Default::default() };
            assert_eq!(config.validate(), Err(ConfigError::InitialFrequency(initial_frequency)));
        }

        let config = AutomatedDriverConfig { initial_frequency: 1000.1, ..Default::default() };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn update_interval_is_bounded() {
        for ms_between_updates in [0, 1, 999, 60_001] {
            let config = AutomatedDriverConfig { ms_between_updates, ..Default::default() };
            assert_eq!(config.validate(), Err(ConfigError::UpdateInterval(ms_between_updates)));
        }

        for ms_between_updates in [1_000, 60_000] {
            let config = AutomatedDriverConfig { ms_between_updates, ..Default::default() };
            assert_eq!(config.validate(), Ok(()));
        }
    }

    #[test]
    fn rejects_loud_start() {
        let config = AutomatedDriverConfig { start_volume: 101, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::StartVolume(101)));
    }

    #[test]
    fn rejects_pain_outside_bounds() {
        let config = AutomatedDriverConfig { pain_probability: 31.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));

        let config = AutomatedDriverConfig { pain_intensity: 3.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn rejects_ragged_waveform_table() {
        let config = AutomatedDriverConfig {
            am_types: AmTypes { waveforms: vec!["sine".to_string()], probabilities: vec![0.5, 0.5] },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::AmTypes(_))));
    }

    #[test]
    fn rejects_probabilities_not_summing_to_one() {
        let config = AutomatedDriverConfig {
            am_types: AmTypes {
                waveforms: vec!["sine".to_string(), "square".to_string()],
                probabilities: vec![0.5, 0.4],
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::AmTypes(_))));
    }

    #[test]
    fn durations() {
        let config = AutomatedDriverConfig { session_duration: 30, ..Default::default() };
        assert_eq!(config.session_length(), Duration::from_secs(1800));
        assert_eq!(config.update_interval(), Duration::from_millis(15_000));
    }
}
