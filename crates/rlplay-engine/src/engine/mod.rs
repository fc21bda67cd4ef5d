//! Simulation sessions and playback.
//!
//! This module drives runs and replays them:
//!
//! - [`Playground`] - Owns the active run, the Result Store and the playback
//!   controller; the single entry point for starting runs
//! - [`BanditStepper`] - In-process epsilon-greedy learner, one pull per tick
//! - [`StreamHandle`] - Consumer of a remote session's frame stream
//! - [`ResultStore`] - Append-only buffer of the active run's records
//! - [`PlaybackController`] - Replays the store at a user-controlled rate
//! - [`projection`] - Render model of the record under the playback cursor
//!
//! # Clocks
//!
//! Nothing here reads the system clock. Every timed operation takes `now`
//! as a [`Duration`](std::time::Duration) from an origin chosen by the
//! caller, and [`Playground::next_deadline`] tells the caller when to come
//! back. The local producer and the playback controller each own one
//! re-arming [`Timer`], so production and playback run at independent rates
//! over the same buffer.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use rlplay_engine::{Algorithm, NoBackend, Playground, RunConfig};
//!
//! let mut playground = Playground::new(NoBackend);
//! playground
//!     .start_run(RunConfig::default_for(Algorithm::Bandit), Duration::ZERO)
//!     .unwrap()
//!     .on_complete(|| println!("done"));
//!
//! // the first pull is due immediately
//! let mut now = Duration::ZERO;
//! playground.advance(now);
//! playground.play(now);
//! while let Some(deadline) = playground.next_deadline() {
//!     now = deadline;
//!     playground.advance(now);
//! }
//! assert_eq!(playground.store().len(), 200);
//! assert!(playground.playback_phase().is_finished());
//! ```

pub use self::{
    backend::*, playback::*, playground::*, session::*, stepper::*, store::*, stream::*,
    timer::*,
};

mod backend;
mod playback;
mod playground;
pub mod projection;
mod session;
mod stepper;
mod store;
pub mod stream;
mod timer;
