//! Load and runaway-script experiments for the context pool.
//!
//! Provides the [`Simulation`] driver and the command-line surface of the
//! `starcode-sim` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod sim;

pub use cli::Cli;
pub use error::{SimError, SimResult};
pub use sim::{ShipState, Simulation, Summary, DEFAULT_SHIP_SCRIPT, RUNAWAY_SHIP_SCRIPT};
