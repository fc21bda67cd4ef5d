//! Simulation sessions and playback for an interactive reinforcement
//! learning playground.
//!
//! - [`core`] holds the data model: step records, run configuration, grid
//!   layouts and the saved-config format
//! - [`engine`] runs simulations (locally or from a remote stream) and
//!   replays them

pub use self::{core::*, engine::*};

pub mod core;
pub mod engine;
