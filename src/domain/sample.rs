//! Time-series samples and downsampling queries.

use serde::{Deserialize, Serialize};

/// One point of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Integer timestamp, in whatever unit the series is recorded in.
    pub timestamp: i64,
    /// Measured value.
    pub value: f64,
}

impl Sample {
    /// Creates a sample.
    #[must_use]
    pub const fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A validated `get_downsampled_in_range` request.
///
/// Construction via [`RangeQuery::new`] guarantees `tmin <= tmax` and a
/// non-zero sample budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeQuery {
    tmin: i64,
    tmax: i64,
    desired_samples: usize,
}

impl RangeQuery {
    /// Creates a query, or `None` if the range is inverted or the sample
    /// budget is zero.
    #[must_use]
    pub const fn new(tmin: i64, tmax: i64, desired_samples: usize) -> Option<Self> {
        if tmin > tmax || desired_samples == 0 {
            return None;
        }
        Some(Self {
            tmin,
            tmax,
            desired_samples,
        })
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn tmin(&self) -> i64 {
        self.tmin
    }

    /// Inclusive upper bound.
    #[must_use]
    pub const fn tmax(&self) -> i64 {
        self.tmax
    }

    /// Maximum number of samples in the answer.
    #[must_use]
    pub const fn desired_samples(&self) -> usize {
        self.desired_samples
    }

    /// Whether `timestamp` falls inside the range.
    #[must_use]
    pub const fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.tmin && timestamp <= self.tmax
    }
}
