//! Deterministic simulation harness for Electron relay testing.
//!
//! Virtual-clock implementations of the runtime pieces so that automated
//! sessions lasting an hour replay in microseconds and identically for a
//! given seed.
//!
//! - [`SimEnv`]: seeded RNG and a clock that only moves when told to
//! - [`SimRelay`]: drives a [`ServerDriver`](electron_server::ServerDriver)
//!   with in-memory connections and virtual timers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_env;
pub mod sim_relay;

pub use sim_env::SimEnv;
pub use sim_relay::SimRelay;
