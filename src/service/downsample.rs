//! Downsampling engine seam.
//!
//! The websocket layer answers `get_downsampled_in_range` through the
//! [`Downsampler`] trait. [`InMemorySeries`] is the bundled engine: it
//! averages in-range samples into at most `desired_samples` buckets and
//! checks the caller's cancellation token between buckets.

use std::fmt;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::domain::{RangeQuery, Sample};

/// Why a downsampling query produced no answer.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The connection's cancellation flag was raised mid-query.
    #[error("query cancelled")]
    Cancelled,

    /// The engine failed.
    #[error("downsampling failed: {0}")]
    Engine(String),
}

/// A time-series store able to reduce a range to a bounded sample count.
///
/// Implementations run on a blocking thread and must poll `cancel` at
/// safe checkpoints, returning [`QueryError::Cancelled`] once it fires.
pub trait Downsampler: Send + Sync + fmt::Debug {
    /// Returns at most `query.desired_samples()` samples covering
    /// `[query.tmin(), query.tmax()]`, ordered by timestamp.
    ///
    /// # Errors
    ///
    /// [`QueryError::Cancelled`] when `cancel` fires; [`QueryError::Engine`]
    /// for engine failures.
    fn downsample(
        &self,
        query: &RangeQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Sample>, QueryError>;
}

/// In-memory time series kept sorted by timestamp.
#[derive(Debug, Default)]
pub struct InMemorySeries {
    samples: RwLock<Vec<Sample>>,
}

impl InMemorySeries {
    /// Creates an empty series.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a series from unordered samples.
    #[must_use]
    pub fn from_samples(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self {
            samples: RwLock::new(samples),
        }
    }

    /// Inserts a sample, keeping timestamp order.
    pub fn push(&self, sample: Sample) {
        let mut samples = self.samples.write();
        let at = samples.partition_point(|s| s.timestamp <= sample.timestamp);
        samples.insert(at, sample);
    }

    /// Number of stored samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    /// Returns `true` if the series holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

impl Downsampler for InMemorySeries {
    fn downsample(
        &self,
        query: &RangeQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Sample>, QueryError> {
        let samples = self.samples.read();
        let start = samples.partition_point(|s| s.timestamp < query.tmin());
        let end = samples.partition_point(|s| s.timestamp <= query.tmax());
        let in_range = samples.get(start..end).unwrap_or_default();

        if in_range.len() <= query.desired_samples() {
            return Ok(in_range.to_vec());
        }

        let bucket_len = in_range.len().div_ceil(query.desired_samples());
        let mut reduced = Vec::with_capacity(query.desired_samples());
        for bucket in in_range.chunks(bucket_len) {
            if cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            reduced.push(mean(bucket));
        }
        Ok(reduced)
    }
}

/// Averages a non-empty bucket into one sample.
fn mean(bucket: &[Sample]) -> Sample {
    let n = bucket.len().max(1);
    let ts_sum: i128 = bucket.iter().map(|s| i128::from(s.timestamp)).sum();
    let value_sum: f64 = bucket.iter().map(|s| s.value).sum();
    // The mean of i64 values always fits back into i64.
    let timestamp = i64::try_from(ts_sum / n as i128).unwrap_or_default();
    Sample::new(timestamp, value_sum / n as f64)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn ramp(n: i64) -> InMemorySeries {
        InMemorySeries::from_samples((0..n).map(|t| Sample::new(t, t as f64)).collect())
    }

    fn query(tmin: i64, tmax: i64, n: usize) -> RangeQuery {
        let Some(q) = RangeQuery::new(tmin, tmax, n) else {
            panic!("invalid test query");
        };
        q
    }

    #[test]
    fn small_range_returned_verbatim() {
        let series = ramp(100);
        let Ok(out) = series.downsample(&query(10, 14, 10), &CancellationToken::new()) else {
            panic!("query failed");
        };
        let ts: Vec<i64> = out.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn large_range_is_bounded() {
        let series = ramp(1_000);
        let Ok(out) = series.downsample(&query(0, 999, 10), &CancellationToken::new()) else {
            panic!("query failed");
        };
        assert_eq!(out.len(), 10);
        let Some(first) = out.first() else {
            panic!("empty result");
        };
        assert_eq!(first.timestamp, 49);
        assert!((first.value - 49.5).abs() < f64::EPSILON);
        assert!(out.windows(2).all(|w| matches!(w, [a, b] if a.timestamp < b.timestamp)));
    }

    #[test]
    fn uneven_buckets_never_exceed_budget() {
        let series = ramp(101);
        let Ok(out) = series.downsample(&query(0, 100, 7), &CancellationToken::new()) else {
            panic!("query failed");
        };
        assert!(out.len() <= 7);
        assert!(!out.is_empty());
    }

    #[test]
    fn empty_range_yields_empty_series() {
        let series = ramp(10);
        let Ok(out) = series.downsample(&query(500, 600, 5), &CancellationToken::new()) else {
            panic!("query failed");
        };
        assert!(out.is_empty());
    }

    #[test]
    fn cancelled_token_stops_query() {
        let series = ramp(1_000);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = series.downsample(&query(0, 999, 10), &cancel);
        assert!(matches!(result, Err(QueryError::Cancelled)));
    }

    #[test]
    fn push_keeps_order() {
        let series = InMemorySeries::new();
        assert!(series.is_empty());
        series.push(Sample::new(5, 1.0));
        series.push(Sample::new(1, 2.0));
        series.push(Sample::new(3, 3.0));
        assert_eq!(series.len(), 3);
        let Ok(out) = series.downsample(&query(0, 10, 10), &CancellationToken::new()) else {
            panic!("query failed");
        };
        let ts: Vec<i64> = out.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![1, 3, 5]);
    }
}
