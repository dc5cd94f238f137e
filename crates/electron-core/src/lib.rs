//! Electron relay core.
//!
//! Pure logic shared by the production server and the simulation harness:
//! the [`env::Environment`] abstraction, random identifiers, and the
//! [`automated::AutomatedDriver`] that synthesizes channel trajectories.
//!
//! Nothing here performs I/O or reads a clock directly. Time and entropy are
//! passed in, so every behaviour replays exactly under a seeded environment.
//!
//! # Components
//!
//! - [`env`]: time and randomness abstraction
//! - [`token`]: driver tokens and session IDs
//! - [`weighted`]: cumulative weighted choice
//! - [`channel`]: per-channel oscillator state
//! - [`automated`]: the self-driving session actor

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod automated;
pub mod channel;
pub mod env;
pub mod token;
pub mod weighted;

pub use automated::{AutomatedDriver, Emission, TickOutcome};
pub use channel::{AmplitudeModulation, ChannelState};
pub use env::{EnvRng, Environment};
