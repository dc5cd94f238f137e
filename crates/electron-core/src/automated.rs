//! Automated driver.
//!
//! A synthetic controller that walks both channels of a session through a
//! plausible trajectory: volume creeps upward inside a rising ceiling, the
//! carrier frequency random-walks between reflective bounds, and amplitude
//! modulation flickers on and off. Optional pain bursts replace a channel's
//! regular update.
//!
//! The driver is sans-IO. It never reads a clock or owns a timer: the runtime
//! calls [`AutomatedDriver::kickoff`] once at start, [`AutomatedDriver::tick`]
//! on every update-timer fire, and [`AutomatedDriver::finish`] when the
//! end-of-session timer fires. Each call returns the [`Emission`]s riders
//! should receive.
//!
//! # Lifecycle
//!
//! ```text
//! Running --tick (idle 5 min, nobody ever joined)--> Stopped
//! Running --finish-----------------------------------> Stopped
//! Running --stop-------------------------------------> Stopped
//! ```
//!
//! Once stopped, every call is a no-op.

use std::{ops::Sub, time::Duration};

use electron_proto::{AutomatedDriverConfig, Channel, ChannelMessage, PainMessage, ServerMessage};
use rand::Rng;

use crate::{
    channel::{AmplitudeModulation, ChannelState},
    weighted,
};

/// Minutes without any rider after which a session stops itself.
pub const IDLE_TIMEOUT_MINUTES: f64 = 5.0;

/// Chance that a selected channel moves its volume upward.
const VOLUME_INCREASE_PROBABILITY: f64 = 0.7;

/// Chance that a channel is selected on a proceeding tick.
const CHANNEL_SELECT_PROBABILITY: f64 = 0.5;

/// Chance that a channel toggles its amplitude modulation.
const AM_TOGGLE_PROBABILITY: f64 = 0.3;

/// Largest frequency step in Hz.
const MAX_FREQUENCY_STEP: f64 = 50.0;

/// Headroom above the start volume at minute zero.
const INITIAL_HEADROOM: f64 = 10.0;

/// One message produced by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// New channel state; relayed and cached
    Update {
        /// Channel that changed
        channel: Channel,
        /// Full state of that channel
        message: ChannelMessage,
    },
    /// Pain burst; relayed, never cached
    Pain {
        /// Channel carrying the burst
        channel: Channel,
        /// Burst parameters
        message: PainMessage,
    },
}

impl Emission {
    /// Channel this emission targets.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Update { channel, .. } | Self::Pain { channel, .. } => *channel,
        }
    }

    /// Outbound event for riders.
    pub fn to_server_message(&self) -> ServerMessage {
        match self {
            Self::Update { channel, message } => {
                ServerMessage::channel_update(*channel, message.clone())
            },
            Self::Pain { channel, message } => ServerMessage::pain(*channel, message.clone()),
        }
    }
}

/// Result of one update-timer fire.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Messages for riders, in emission order
    pub emissions: Vec<Emission>,
    /// The driver stopped itself because nobody joined in time
    pub idle_timeout: bool,
}

/// Self-driving controller for one session.
#[derive(Debug, Clone)]
pub struct AutomatedDriver<I> {
    session_id: String,
    config: AutomatedDriverConfig,
    started_at: I,
    in_use: bool,
    running: bool,
    left: ChannelState,
    right: ChannelState,
}

impl<I> AutomatedDriver<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a running driver. `config` must already be validated.
    pub fn new(session_id: impl Into<String>, config: AutomatedDriverConfig, now: I) -> Self {
        let initial = ChannelState::new(f64::from(config.start_volume), config.initial_frequency);
        Self {
            session_id: session_id.into(),
            started_at: now,
            in_use: false,
            running: true,
            left: initial.clone(),
            right: initial,
            config,
        }
    }

    /// Session this driver controls.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Configuration the driver was started with.
    pub fn config(&self) -> &AutomatedDriverConfig {
        &self.config
    }

    /// Instant the driver was started.
    pub fn started_at(&self) -> I {
        self.started_at
    }

    /// Whether a rider has ever been seen on a tick.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Whether the driver is still producing updates.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current state of a channel.
    pub fn channel(&self, channel: Channel) -> &ChannelState {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }

    /// Initial update, emitted once at start.
    ///
    /// Both channels are updated at elapsed time zero, so riders joining
    /// immediately see a full state. No pain burst can fire here.
    pub fn kickoff<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Emission> {
        if !self.running {
            return Vec::new();
        }
        self.run_channels(0.0, rng)
    }

    /// Handle one update-timer fire.
    ///
    /// `riders_present` is whether the session currently has at least one
    /// rider; it latches `in_use`.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        now: I,
        riders_present: bool,
        rng: &mut R,
    ) -> TickOutcome {
        if !self.running {
            return TickOutcome::default();
        }

        let elapsed = self.elapsed_minutes(now);
        let mut outcome = TickOutcome::default();

        if unit(rng) >= self.config.no_changes_probability {
            outcome.emissions = self.run_channels(elapsed, rng);
        }

        if riders_present {
            self.in_use = true;
        }

        if elapsed >= IDLE_TIMEOUT_MINUTES && !self.in_use {
            self.running = false;
            outcome.idle_timeout = true;
        }

        outcome
    }

    /// Handle the end-of-session timer: ramp both channels down and stop.
    pub fn finish(&mut self) -> Vec<Emission> {
        if !self.running {
            return Vec::new();
        }
        self.running = false;

        Channel::ALL
            .into_iter()
            .map(|channel| Emission::Update {
                channel,
                message: self.channel(channel).to_end_message(),
            })
            .collect()
    }

    /// Stop without emitting anything. Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn elapsed_minutes(&self, now: I) -> f64 {
        (now - self.started_at).as_secs_f64() / 60.0
    }

    fn run_channels<R: Rng + ?Sized>(&mut self, elapsed: f64, rng: &mut R) -> Vec<Emission> {
        let mut emissions = Vec::with_capacity(2);
        for channel in Channel::ALL {
            let selected = rng.gen_bool(CHANNEL_SELECT_PROBABILITY) || elapsed <= 0.0;
            if selected {
                emissions.push(self.process_channel(channel, elapsed, rng));
            }
        }
        emissions
    }

    fn process_channel<R: Rng + ?Sized>(
        &mut self,
        channel: Channel,
        elapsed: f64,
        rng: &mut R,
    ) -> Emission {
        let config = &self.config;
        let (state, other) = match channel {
            Channel::Left => (&mut self.left, &self.right),
            Channel::Right => (&mut self.right, &self.left),
        };

        if elapsed > 0.0 && unit(rng) < config.pain_probability * 0.01 {
            return Emission::Pain { channel, message: pain_burst(config, state, rng) };
        }

        let progress = elapsed / f64::from(config.session_duration);

        state.volume = next_volume(config, state.volume, progress, rng);
        if rng.gen_bool(AM_TOGGLE_PROBABILITY) && config.min_am_depth > 0.0 {
            state.am = toggle_am(config, state, progress, rng);
        }
        state.frequency = next_frequency(config, state.frequency, other.frequency, rng);

        Emission::Update { channel, message: state.to_message() }
    }
}

fn pain_burst<R: Rng + ?Sized>(
    config: &AutomatedDriverConfig,
    state: &ChannelState,
    rng: &mut R,
) -> PainMessage {
    let shock_duration =
        uniform(rng, config.pain_min_shock_length, config.pain_max_shock_length);
    let time_between_shocks =
        uniform(rng, config.pain_min_time_between_shocks, config.pain_max_time_between_shocks);
    let shocks = uniform(rng, f64::from(config.pain_min_shocks), f64::from(config.pain_max_shocks));

    state.to_pain_message(
        config.pain_intensity,
        shock_duration,
        time_between_shocks,
        shocks.round() as u32,
    )
}

/// Upper volume bound at `progress` (fraction of the session elapsed).
///
/// Ramps linearly from `start_volume + 10` to 90, or to 100 when the start
/// volume is already at least 90. Never below `start_volume`.
pub fn volume_ceiling(start_volume: u8, progress: f64) -> f64 {
    let start_volume = f64::from(start_volume);
    let from = (start_volume + INITIAL_HEADROOM).min(100.0);
    let to = if start_volume >= 90.0 { 100.0 } else { 90.0 };
    let progress = progress.max(0.0).min(1.0);
    from + (to - from) * progress
}

fn next_volume<R: Rng + ?Sized>(
    config: &AutomatedDriverConfig,
    volume: f64,
    progress: f64,
    rng: &mut R,
) -> f64 {
    let ramp = config.end_max_volume_change - config.start_max_volume_change;
    let max_change =
        (config.start_max_volume_change + ramp * progress).min(config.end_max_volume_change);
    let delta = uniform(rng, 0.0, max_change);

    let moved =
        if rng.gen_bool(VOLUME_INCREASE_PROBABILITY) { volume + delta } else { volume - delta };

    let floor = f64::from(config.start_volume);
    let ceiling = volume_ceiling(config.start_volume, progress);
    let rounded = moved.max(floor).min(ceiling).round();
    if rounded > ceiling { ceiling.floor() } else { rounded }
}

fn toggle_am<R: Rng + ?Sized>(
    config: &AutomatedDriverConfig,
    state: &ChannelState,
    progress: f64,
    rng: &mut R,
) -> AmplitudeModulation {
    if state.am.is_on() {
        return AmplitudeModulation::off();
    }

    let table = &config.am_types;
    let draw = unit(rng);
    let Some(waveform) =
        weighted::choose(&table.waveforms, &table.probabilities, draw).or(table.waveforms.last())
    else {
        return AmplitudeModulation::off();
    };

    let max_frequency = (2.0 + 8.0 * progress).min(10.0);
    let frequency = round_to(uniform(rng, 0.0, max_frequency), 100.0);
    let depth = uniform(rng, config.min_am_depth, config.max_am_depth) * state.volume / 100.0;

    AmplitudeModulation { waveform: waveform.clone(), depth: round_to(depth, 100.0), frequency }
}

fn next_frequency<R: Rng + ?Sized>(
    config: &AutomatedDriverConfig,
    frequency: f64,
    other: f64,
    rng: &mut R,
) -> f64 {
    let (min, max) = (config.min_frequency, config.max_frequency);
    let step = (unit(rng) * 2.0 - 1.0) * MAX_FREQUENCY_STEP.min(max - min);

    let mut next = frequency + step;
    if next < min {
        next = 2.0 * min - next;
    } else if next > max {
        next = 2.0 * max - next;
    }
    let next = round_to(next, 10.0).max(min).min(max);

    // Equal carriers on both channels interfere; wait for the next tick.
    if (next - other).abs() < f64::EPSILON { frequency } else { next }
}

/// Uniform draw in `[0, 1)`.
fn unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..1.0)
}

/// Uniform draw in `[lo, hi)`, or `lo` when the range is empty.
fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn driver(config: AutomatedDriverConfig) -> AutomatedDriver<Duration> {
        AutomatedDriver::new("AUTO000001", config, Duration::ZERO)
    }

    #[test]
    fn kickoff_updates_both_channels() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut driver = driver(AutomatedDriverConfig::default());

        let emissions = driver.kickoff(&mut rng);

        let channels: Vec<_> = emissions.iter().map(Emission::channel).collect();
        assert_eq!(channels, vec![Channel::Left, Channel::Right]);
        assert!(emissions.iter().all(|e| matches!(e, Emission::Update { .. })));
    }

    #[test]
    fn kickoff_never_sends_pain() {
        let config = AutomatedDriverConfig { pain_probability: 30.0, ..Default::default() };
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut driver = driver(config.clone());
            let emissions = driver.kickoff(&mut rng);
            assert!(emissions.iter().all(|e| matches!(e, Emission::Update { .. })));
        }
    }

    #[test]
    fn volume_ceiling_ramps() {
        assert!((volume_ceiling(50, 0.0) - 60.0).abs() < f64::EPSILON);
        assert!((volume_ceiling(50, 1.0) - 90.0).abs() < f64::EPSILON);
        assert!((volume_ceiling(50, 2.0) - 90.0).abs() < f64::EPSILON);
        assert!((volume_ceiling(95, 0.0) - 100.0).abs() < f64::EPSILON);
        assert!((volume_ceiling(95, 1.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn idle_session_stops_after_five_minutes() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut driver = driver(AutomatedDriverConfig::default());
        driver.kickoff(&mut rng);

        let outcome = driver.tick(minutes(4), false, &mut rng);
        assert!(!outcome.idle_timeout);
        assert!(driver.is_running());

        let outcome = driver.tick(minutes(5), false, &mut rng);
        assert!(outcome.idle_timeout);
        assert!(!driver.is_running());
    }

    #[test]
    fn rider_latches_in_use() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut driver = driver(AutomatedDriverConfig::default());

        driver.tick(minutes(1), true, &mut rng);
        assert!(driver.in_use());

        let outcome = driver.tick(minutes(10), false, &mut rng);
        assert!(!outcome.idle_timeout);
        assert!(driver.is_running());
    }

    #[test]
    fn finish_emits_end_messages_once() {
        let mut driver = driver(AutomatedDriverConfig::default());

        let emissions = driver.finish();
        assert_eq!(emissions.len(), 2);
        for emission in &emissions {
            match emission {
                Emission::Update { message, .. } => {
                    assert!(message.ramp_target.abs() < f64::EPSILON);
                    assert!((message.ramp_rate - 1.0).abs() < f64::EPSILON);
                },
                Emission::Pain { .. } => panic!("end of session never sends pain"),
            }
        }

        assert!(driver.finish().is_empty());
        assert!(!driver.is_running());
    }

    #[test]
    fn stopped_driver_is_inert() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut driver = driver(AutomatedDriverConfig::default());
        driver.stop();
        driver.stop();

        assert!(driver.kickoff(&mut rng).is_empty());
        let outcome = driver.tick(minutes(1), true, &mut rng);
        assert!(outcome.emissions.is_empty());
        assert!(!outcome.idle_timeout);
    }

    #[test]
    fn always_quiet_config_emits_nothing_on_ticks() {
        let config = AutomatedDriverConfig { no_changes_probability: 1.0, ..Default::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut driver = driver(config);

        for m in 1..5 {
            assert!(driver.tick(minutes(m), true, &mut rng).emissions.is_empty());
        }
    }

    #[test]
    fn zero_min_depth_never_enables_am() {
        let config = AutomatedDriverConfig {
            min_am_depth: 0.0,
            no_changes_probability: 0.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut driver = driver(config);
        driver.kickoff(&mut rng);

        for m in 1..=60 {
            driver.tick(minutes(m), true, &mut rng);
            for channel in Channel::ALL {
                assert!(!driver.channel(channel).am.is_on());
            }
        }
    }

    #[test]
    fn frequency_walk_stays_in_bounds() {
        let config = AutomatedDriverConfig {
            min_frequency: 1000.0,
            max_frequency: 1020.0,
            initial_frequency: 1010.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut frequency = config.initial_frequency;

        for _ in 0..1000 {
            frequency = next_frequency(&config, frequency, 0.0, &mut rng);
            assert!((1000.0..=1020.0).contains(&frequency), "{frequency}");
            assert!((frequency * 10.0 - (frequency * 10.0).round()).abs() < 1e-6);
        }
    }

    #[test]
    fn frequency_keeps_old_value_on_collision() {
        let config = AutomatedDriverConfig {
            min_frequency: 1000.0,
            max_frequency: 1000.1,
            initial_frequency: 1000.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        // With a 0.1 Hz span every step lands on 1000.0 or 1000.1.
        for _ in 0..100 {
            let next = next_frequency(&config, 1000.0, 1000.1, &mut rng);
            assert!((next - 1000.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn pain_burst_draws_stay_in_bounds() {
        let config = AutomatedDriverConfig::default();
        let state = ChannelState::new(60.0, 1234.5);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        for _ in 0..200 {
            let pain = pain_burst(&config, &state, &mut rng);
            assert!((0.1..=0.5).contains(&pain.shock_duration));
            assert!((0.1..=1.0).contains(&pain.time_between_shocks));
            assert!((2..=6).contains(&pain.number_of_shocks));
            assert!((pain.volume - 0.7).abs() < 1e-9);
            assert!((pain.frequency - 1234.5).abs() < f64::EPSILON);
        }
    }
}
