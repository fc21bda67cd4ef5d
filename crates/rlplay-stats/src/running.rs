//! Incremental aggregates.
//!
//! Every type here is updated in O(1) per sample and never looks at earlier
//! samples again, so it can sit next to an append-only buffer without
//! re-scanning it.

use serde::Serialize;

/// Running reward aggregates: count, mean, min, max and the most recent value.
///
/// The mean uses incremental averaging (`mean += (x - mean) / n`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            last: 0.0,
        }
    }

    /// Adds one sample.
    #[expect(clippy::cast_precision_loss)]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean = value;
            self.min = value;
            self.max = value;
        } else {
            self.mean += (value - self.mean) / self.count as f64;
            self.min = f64::min(self.min, value);
            self.max = f64::max(self.max, value);
        }
        self.last = value;
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.mean)
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    /// Returns the most recently pushed value.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.last)
    }
}

/// Cumulative hit rate of a boolean stream.
///
/// ```
/// use rlplay_stats::running::CumulativeRate;
///
/// let mut rate = CumulativeRate::new();
/// rate.push(true);
/// rate.push(false);
/// assert_eq!(rate.rate(), 0.5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CumulativeRate {
    hits: usize,
    total: usize,
}

impl CumulativeRate {
    #[must_use]
    pub const fn new() -> Self {
        Self { hits: 0, total: 0 }
    }

    pub fn push(&mut self, hit: bool) {
        self.total += 1;
        if hit {
            self.hits += 1;
        }
    }

    #[must_use]
    pub const fn hits(&self) -> usize {
        self.hits
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Returns the fraction of hits, or 0.0 before the first sample.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}
