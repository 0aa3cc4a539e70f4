//! Timestamp latency models
use crate::error::{PreprocessError, Result};
use crate::series::{interp_table, AncillarySeries};
use serde::{Deserialize, Serialize};

/// A constant or time varying delay between an event and its timestamp
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeLatencyModel {
    /// The same latency at all times
    Static(f64),
    /// Latency interpolated from a table, clamped at the ends
    PiecewiseLinear {
        /// Table times, increasing
        times: Vec<f64>,
        /// Latency in seconds at each table time
        values: Vec<f64>,
    },
}

/// The direction in which a latency is applied to a timestamp
///
/// Swath processing has historically removed latency from recorded
/// timestamps, so `Subtract` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyConvention {
    /// `t - latency(t)`
    #[default]
    Subtract,
    /// `t + latency(t)`
    Add,
}

impl Default for TimeLatencyModel {
    fn default() -> Self {
        TimeLatencyModel::Static(0.0)
    }
}

impl TimeLatencyModel {
    /// Build a table model, checking that the table is usable
    pub fn piecewise(times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if times.is_empty() {
            return Err(PreprocessError::Config(
                "time latency table is empty".to_string(),
            ));
        }
        if times.len() != values.len() {
            return Err(PreprocessError::Config(format!(
                "time latency table has {} times but {} values",
                times.len(),
                values.len()
            )));
        }
        if times.windows(2).any(|w| w[1] < w[0]) {
            return Err(PreprocessError::Config(
                "time latency table is not in time order".to_string(),
            ));
        }
        Ok(TimeLatencyModel::PiecewiseLinear { times, values })
    }

    /// Check a model that was deserialized rather than built
    pub fn validate(&self) -> Result<()> {
        match self {
            TimeLatencyModel::Static(_) => Ok(()),
            TimeLatencyModel::PiecewiseLinear { times, values } => {
                TimeLatencyModel::piecewise(times.clone(), values.clone()).map(|_| ())
            }
        }
    }

    /// Return true if the model never changes a timestamp
    pub fn is_zero(&self) -> bool {
        match self {
            TimeLatencyModel::Static(v) => *v == 0.0,
            TimeLatencyModel::PiecewiseLinear { values, .. } => values.iter().all(|v| *v == 0.0),
        }
    }

    /// The latency at time `t`
    ///
    /// `cursor` follows the table across a pass of increasing times.
    pub fn latency(&self, t: f64, cursor: &mut usize) -> f64 {
        match self {
            TimeLatencyModel::Static(v) => *v,
            TimeLatencyModel::PiecewiseLinear { times, values } => {
                interp_table(times, values, t, cursor).unwrap_or(0.0)
            }
        }
    }

    /// Shift `t` forward by its latency
    pub fn apply(&self, t: f64) -> f64 {
        let mut cursor = self.start_cursor(t);
        t + self.latency(t, &mut cursor)
    }

    /// Correct a recorded timestamp under the given convention
    pub fn correct(&self, t: f64, convention: LatencyConvention, cursor: &mut usize) -> f64 {
        let latency = self.latency(t, cursor);
        match convention {
            LatencyConvention::Subtract => t - latency,
            LatencyConvention::Add => t + latency,
        }
    }

    /// Correct every timestamp of a series
    pub fn correct_series<const K: usize>(
        &self,
        series: &mut AncillarySeries<K>,
        convention: LatencyConvention,
    ) {
        if self.is_zero() {
            return;
        }
        let mut cursor = 0;
        for sample in series.samples_mut().iter_mut() {
            sample.time_d = self.correct(sample.time_d, convention, &mut cursor);
        }
    }

    fn start_cursor(&self, t: f64) -> usize {
        match self {
            TimeLatencyModel::Static(_) => 0,
            TimeLatencyModel::PiecewiseLinear { times, .. } => {
                times.partition_point(|x| *x <= t).saturating_sub(1)
            }
        }
    }
}
