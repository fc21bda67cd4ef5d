//! Reward statistics for simulation runs.
//!
//! This crate provides the aggregates shown next to a live or replayed run:
//!
//! - **Running statistics**: count, mean, min, max and most recent value,
//!   maintained incrementally as records arrive
//! - **Cumulative rates**: the running fraction of "hits" in a boolean stream
//!   (used for the optimal-action rate of a bandit)
//! - **Descriptive statistics**: a one-shot summary (mean, median, spread) of
//!   a finished run
//!
//! # Modules
//!
//! - [`running`]: Incremental aggregates that never revisit earlier samples
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//!
//! # Examples
//!
//! ## Tracking rewards as they arrive
//!
//! ```
//! use rlplay_stats::running::RunningStats;
//!
//! let mut stats = RunningStats::new();
//! for reward in [1.0, -2.0, 4.0] {
//!     stats.push(reward);
//! }
//! assert_eq!(stats.count(), 3);
//! assert_eq!(stats.mean(), Some(1.0));
//! assert_eq!(stats.max(), Some(4.0));
//! assert_eq!(stats.last(), Some(4.0));
//! ```
//!
//! ## Summarizing a finished run
//!
//! ```
//! use rlplay_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```

pub mod descriptive;
pub mod running;
