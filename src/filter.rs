//! Gaussian smoothing in the time domain
use crate::series::{AncillarySeries, Blend};

/// Samples further than this many filter lengths away carry no weight
const WINDOW: f64 = 4.0;

/// A Gaussian kernel whose width is a time, not a sample count
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianTimeFilter {
    /// The kernel standard deviation in seconds
    pub length: f64,
}

impl GaussianTimeFilter {
    /// Create a filter of the given length in seconds
    pub fn new(length: f64) -> Self {
        GaussianTimeFilter { length }
    }

    /// Return true if the filter leaves data unchanged
    pub fn is_noop(&self) -> bool {
        self.length.is_nan() || self.length <= 0.0
    }

    /// Smooth `values` sampled at increasing `times`
    ///
    /// Each output is the weighted mean of the inputs within four lengths of
    /// it, with weight `exp(-dt^2 / (2 length^2))` normalized over the
    /// inputs used. Missing values, stored as NaN, stay missing and are not
    /// averaged into their neighbours.
    pub fn smooth(&self, times: &[f64], values: &[f64]) -> Vec<f64> {
        if self.is_noop() {
            return values.to_vec();
        }
        let half = WINDOW * self.length;
        let denom = 2.0 * self.length * self.length;
        times
            .iter()
            .zip(values.iter())
            .map(|(&t, &v)| {
                if !v.is_finite() {
                    return v;
                }
                let lo = times.partition_point(|x| *x < t - half);
                let hi = times.partition_point(|x| *x <= t + half);
                let (sum, weight) = times[lo..hi].iter().zip(values[lo..hi].iter()).fold(
                    (0.0, 0.0),
                    |(sum, weight), (&tj, &vj)| {
                        if !vj.is_finite() {
                            return (sum, weight);
                        }
                        let dt = tj - t;
                        let w = (-dt * dt / denom).exp();
                        (sum + w * vj, weight + w)
                    },
                );
                if weight > 0.0 {
                    sum / weight
                } else {
                    v
                }
            })
            .collect()
    }

    /// Smooth every component of a series independently
    ///
    /// Angular components are unwrapped before smoothing and wrapped again
    /// afterwards so that a heading passing through north is not averaged
    /// toward south.
    pub fn apply<const K: usize>(&self, series: &mut AncillarySeries<K>, blends: &[Blend; K]) {
        if self.is_noop() || series.len() < 2 {
            return;
        }
        let times = series.times();
        for (k, blend) in blends.iter().enumerate() {
            let raw = series.component(k);
            let unwrapped = unwrap(&raw, *blend);
            let smoothed: Vec<f64> = self
                .smooth(&times, &unwrapped)
                .into_iter()
                .map(|v| blend.wrap(v))
                .collect();
            series.set_component(k, &smoothed);
        }
    }
}

/// Remove the wraparound jumps from a sequence of angles
fn unwrap(values: &[f64], blend: Blend) -> Vec<f64> {
    if blend == Blend::Linear {
        return values.to_vec();
    }
    let mut out = Vec::with_capacity(values.len());
    let mut last: Option<(f64, f64)> = None;
    for &v in values {
        if !v.is_finite() {
            out.push(v);
            continue;
        }
        let u = match last {
            Some((raw, unwrapped)) => unwrapped + blend.delta(raw, v),
            None => v,
        };
        last = Some((v, u));
        out.push(u);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn vanishing_length_is_identity() {
        let times = [0.0, 0.1, 0.2, 0.35, 0.5];
        let values = [1.0, -2.0, 4.0, 0.5, 3.0];
        for length in [1e-3, 1e-6, 0.0, -1.0] {
            let out = GaussianTimeFilter::new(length).smooth(&times, &values);
            for (a, b) in out.iter().zip(values.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn constant_signal_is_unchanged() {
        let times: Vec<f64> = (0..50).map(|i| f64::from(i) * 0.2).collect();
        let values = vec![7.5; 50];
        let out = GaussianTimeFilter::new(1.0).smooth(&times, &values);
        for v in out {
            assert_abs_diff_eq!(v, 7.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn smoothing_reduces_a_spike() {
        let times: Vec<f64> = (0..21).map(f64::from).collect();
        let mut values = vec![0.0; 21];
        values[10] = 10.0;
        let out = GaussianTimeFilter::new(2.0).smooth(&times, &values);
        assert!(out[10] < 10.0 && out[10] > 0.0);
        assert!(out[9] > 0.0);
        // symmetric kernel
        assert_abs_diff_eq!(out[9], out[11], epsilon = 1e-12);
        // a linear ramp is preserved away from the edges
        let ramp: Vec<f64> = times.iter().map(|t| 2.0 * t).collect();
        let out = GaussianTimeFilter::new(1.0).smooth(&times, &ramp);
        assert_abs_diff_eq!(out[10], 20.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_values_are_skipped() {
        let times = [0.0, 1.0, 2.0];
        let values = [1.0, f64::NAN, 1.0];
        let out = GaussianTimeFilter::new(1.0).smooth(&times, &values);
        assert!(out[1].is_nan());
        assert_abs_diff_eq!(out[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn headings_are_smoothed_through_north() {
        let mut s = AncillarySeries::from_parts(
            &[0.0, 1.0, 2.0, 3.0, 4.0],
            &[[358.0], [359.0], [0.0], [1.0], [2.0]],
        );
        GaussianTimeFilter::new(1.0).apply(&mut s, &[Blend::Heading]);
        let h = s.component(0);
        assert!(Blend::Heading.delta(0.0, h[2]).abs() < 1e-9);
        assert!(h.iter().all(|v| *v >= 0.0 && *v < 360.0));
        assert!(h[0] > 300.0);
    }

    #[test]
    fn components_are_filtered_independently() {
        let mut s = AncillarySeries::from_parts(
            &[0.0, 1.0, 2.0],
            &[[1.0, 5.0, 0.0], [1.0, 5.0, 3.0], [1.0, 5.0, 0.0]],
        );
        GaussianTimeFilter::new(1.0).apply(&mut s, &[Blend::Linear; 3]);
        for (a, b) in s.component(0).iter().zip(s.component(1).iter()) {
            assert_abs_diff_eq!(*a, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(*b, 5.0, epsilon = 1e-12);
        }
        assert!(s.component(2)[1] < 3.0);
    }
}
