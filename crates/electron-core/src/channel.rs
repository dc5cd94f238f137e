//! Channel state owned by an automated driver.

use electron_proto::{ChannelMessage, PainMessage, channel::NO_MODULATION};

/// Frequency-modulation depth the player expects on automated messages.
const AUTOMATED_FM_DEPTH: f64 = 10.0;

/// Amplitude modulation of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeModulation {
    /// Waveform name, or `"none"` when off
    pub waveform: String,
    /// Modulation depth
    pub depth: f64,
    /// Modulation frequency in Hz
    pub frequency: f64,
}

impl AmplitudeModulation {
    /// Modulation switched off.
    pub fn off() -> Self {
        Self { waveform: NO_MODULATION.to_string(), depth: 0.0, frequency: 0.0 }
    }

    /// Whether modulation is on.
    pub fn is_on(&self) -> bool {
        self.waveform != NO_MODULATION
    }
}

/// Oscillator parameters of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Volume, integer-valued in `[start_volume, ceiling]`
    pub volume: f64,
    /// Carrier frequency in Hz, rounded to 0.1
    pub frequency: f64,
    /// Amplitude modulation
    pub am: AmplitudeModulation,
}

impl ChannelState {
    /// Initial state: given volume and frequency, modulation off.
    pub fn new(volume: f64, frequency: f64) -> Self {
        Self { volume, frequency, am: AmplitudeModulation::off() }
    }

    /// Regular update message for riders.
    pub fn to_message(&self) -> ChannelMessage {
        ChannelMessage {
            volume: self.volume,
            freq: self.frequency,
            am_type: self.am.waveform.clone(),
            am_depth: self.am.depth,
            am_freq: self.am.frequency,
            active: true,
            fm_depth: AUTOMATED_FM_DEPTH,
            ramp_target: self.volume,
            ..ChannelMessage::default()
        }
    }

    /// Final message: ramps the volume to zero with modulation off.
    pub fn to_end_message(&self) -> ChannelMessage {
        let am = AmplitudeModulation::off();
        ChannelMessage {
            am_type: am.waveform,
            am_depth: am.depth,
            am_freq: am.frequency,
            ramp_target: 0.0,
            ramp_rate: 1.0,
            ..self.to_message()
        }
    }

    /// Pain burst at this channel's frequency.
    ///
    /// Shock amplitude is the channel volume raised by `intensity`, as a
    /// fraction capped at 1.0.
    pub fn to_pain_message(
        &self,
        intensity: f64,
        shock_duration: f64,
        time_between_shocks: f64,
        number_of_shocks: u32,
    ) -> PainMessage {
        PainMessage {
            volume: ((self.volume + intensity) * 0.01).min(1.0),
            frequency: self.frequency,
            shock_duration,
            time_between_shocks,
            number_of_shocks,
            ..PainMessage::default()
        }
    }
}
