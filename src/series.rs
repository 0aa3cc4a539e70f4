//! Time-ordered ancillary sample storage and interpolation
//!
//! An [`AncillarySeries`] holds the samples of one physical quantity. Each
//! sample carries `K` values; scalar channels use `K = 1`, navigation uses
//! longitude, latitude and speed, and attitude uses roll, pitch and heave.
//!
//! Interpolation takes a cursor that the caller keeps between queries. The
//! cursor makes a pass of non-decreasing query times linear in the length of
//! the series.

/// How one component of a sample is blended between two samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blend {
    /// Plain linear interpolation
    Linear,
    /// Shortest arc across the 0/360 degree boundary
    Heading,
    /// Shortest arc across the +/-180 degree date line
    Longitude,
}

impl Blend {
    /// The signed change from `a` to `b` under this blend
    pub fn delta(self, a: f64, b: f64) -> f64 {
        let d = b - a;
        match self {
            Blend::Linear => d,
            Blend::Heading | Blend::Longitude => {
                if d > 180.0 {
                    d - 360.0
                } else if d < -180.0 {
                    d + 360.0
                } else {
                    d
                }
            }
        }
    }

    /// Bring a blended value back into the range of this component
    pub fn wrap(self, v: f64) -> f64 {
        match self {
            Blend::Linear => v,
            Blend::Heading => wrap_heading(v),
            Blend::Longitude => wrap_longitude(v),
        }
    }
}

/// Wrap a heading into `[0, 360)`
pub fn wrap_heading(h: f64) -> f64 {
    let w = h.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if w >= 360.0 {
        0.0
    } else {
        w
    }
}

/// Wrap a longitude into `[-180, 180]`
///
/// Values already inside the range are returned unchanged.
pub fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0 * ((lon + 180.0) / 360.0).floor()
    } else if lon < -180.0 {
        lon + 360.0 * ((180.0 - lon) / 360.0).floor()
    } else {
        lon
    }
}

/// One sample of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample<const K: usize> {
    /// Sample time in seconds since the Unix epoch
    pub time_d: f64,
    /// The sampled values
    pub values: [f64; K],
}

/// Counts of the ordering problems found when a series is finalized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderReport {
    /// Samples that arrived earlier than their predecessor
    pub reversed: usize,
    /// Samples removed because their time repeated an earlier sample
    pub duplicates: usize,
}

impl OrderReport {
    /// Return true if the series was already strictly increasing
    pub fn is_clean(&self) -> bool {
        self.reversed == 0 && self.duplicates == 0
    }
}

/// Where a query time falls relative to the samples of a series
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bracket {
    Empty,
    Before,
    After,
    Between { lo: usize, frac: f64 },
}

/// Locate `t` among `n` sample times, moving `cursor` to the bracketing sample
///
/// A time that is not finite falls nowhere.
fn locate(n: usize, time: impl Fn(usize) -> f64, t: f64, cursor: &mut usize) -> Bracket {
    if n == 0 || !t.is_finite() {
        return Bracket::Empty;
    }
    if t < time(0) {
        *cursor = 0;
        return Bracket::Before;
    }
    if t >= time(n - 1) {
        *cursor = n - 1;
        return Bracket::After;
    }
    let mut i = (*cursor).min(n - 1);
    while i > 0 && time(i) > t {
        i -= 1;
    }
    while i + 1 < n && time(i + 1) <= t {
        i += 1;
    }
    *cursor = i;
    let span = time(i + 1) - time(i);
    let frac = if span > 0.0 { (t - time(i)) / span } else { 0.0 };
    Bracket::Between { lo: i, frac }
}

/// Linear interpolation into a `(time, value)` table
///
/// Queries outside the table clamp to the nearest endpoint. Returns `None`
/// for an empty table.
pub fn interp_table(times: &[f64], values: &[f64], t: f64, cursor: &mut usize) -> Option<f64> {
    match locate(times.len().min(values.len()), |i| times[i], t, cursor) {
        Bracket::Empty => None,
        Bracket::Before => values.first().copied(),
        Bracket::After => values.last().copied(),
        Bracket::Between { lo, frac } => Some(values[lo] + frac * (values[lo + 1] - values[lo])),
    }
}

/// A growable, time-ordered store of samples for one channel
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AncillarySeries<const K: usize> {
    samples: Vec<TimeSample<K>>,
}

impl<const K: usize> AncillarySeries<K> {
    /// Create an empty series
    pub fn new() -> Self {
        AncillarySeries {
            samples: Vec::new(),
        }
    }

    /// Build a series from parallel time and value slices
    pub fn from_parts(times: &[f64], values: &[[f64; K]]) -> Self {
        let samples = times
            .iter()
            .zip(values.iter())
            .map(|(&time_d, &values)| TimeSample { time_d, values })
            .collect();
        AncillarySeries { samples }
    }

    /// Append a sample at the end of the series
    pub fn append(&mut self, time_d: f64, values: [f64; K]) {
        self.samples.push(TimeSample { time_d, values });
    }

    /// The number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Return true if the series holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples in storage order
    pub fn samples(&self) -> &[TimeSample<K>] {
        &self.samples
    }

    /// Mutable access to the backing storage
    pub fn samples_mut(&mut self) -> &mut Vec<TimeSample<K>> {
        &mut self.samples
    }

    /// The sample times in storage order
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time_d).collect()
    }

    /// One component of every sample
    pub fn component(&self, k: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s.values[k]).collect()
    }

    /// Overwrite one component of every sample
    ///
    /// `values` must have one entry per sample; extra entries are ignored.
    pub fn set_component(&mut self, k: usize, values: &[f64]) {
        for (s, v) in self.samples.iter_mut().zip(values.iter()) {
            s.values[k] = *v;
        }
    }

    /// The first and last sample times
    pub fn time_span(&self) -> Option<(f64, f64)> {
        match (self.samples.first(), self.samples.last()) {
            (Some(a), Some(b)) => Some((a.time_d, b.time_d)),
            _ => None,
        }
    }

    /// Samples whose time lies in `[start, end]`
    pub fn window(&self, start: f64, end: f64) -> impl Iterator<Item = &TimeSample<K>> {
        self.samples
            .iter()
            .filter(move |s| s.time_d >= start && s.time_d <= end)
    }

    /// Sort the series by time and drop repeated times
    ///
    /// The first sample of a run of equal times is kept. Afterwards the
    /// series is strictly increasing.
    pub fn finalize(&mut self) -> OrderReport {
        let reversed = self
            .samples
            .windows(2)
            .filter(|w| w[1].time_d < w[0].time_d)
            .count();
        if reversed > 0 {
            self.samples.sort_by(|a, b| a.time_d.total_cmp(&b.time_d));
        }
        let before = self.samples.len();
        self.samples.dedup_by(|later, kept| later.time_d <= kept.time_d);
        OrderReport {
            reversed,
            duplicates: before - self.samples.len(),
        }
    }

    /// Return true if sample times are strictly increasing
    pub fn is_strictly_increasing(&self) -> bool {
        self.samples.windows(2).all(|w| w[0].time_d < w[1].time_d)
    }

    /// Interpolate all components at `t` with the given blend per component
    ///
    /// Queries before the first sample return the first sample and queries
    /// after the last return the last. An empty series or a time that is not
    /// finite returns `None`, which callers treat as "no correction
    /// available".
    pub fn interp(&self, t: f64, cursor: &mut usize, blends: &[Blend; K]) -> Option<[f64; K]> {
        let samples = &self.samples;
        Some(match locate(samples.len(), |i| samples[i].time_d, t, cursor) {
            Bracket::Empty => return None,
            Bracket::Before => self.samples[0].values,
            Bracket::After => self.samples[self.samples.len() - 1].values,
            Bracket::Between { lo, frac } => {
                let a = &self.samples[lo].values;
                let b = &self.samples[lo + 1].values;
                let mut out = [0.0; K];
                for k in 0..K {
                    let blend = blends[k];
                    out[k] = if frac == 0.0 {
                        a[k]
                    } else {
                        blend.wrap(a[k] + frac * blend.delta(a[k], b[k]))
                    };
                }
                out
            }
        })
    }

    /// Linear interpolation of every component at `t`
    pub fn linear_interp(&self, t: f64, cursor: &mut usize) -> Option<[f64; K]> {
        self.interp(t, cursor, &[Blend::Linear; K])
    }

    /// Interpolate component `k` as a heading, other components linearly
    pub fn heading_interp(&self, t: f64, cursor: &mut usize, k: usize) -> Option<[f64; K]> {
        let mut blends = [Blend::Linear; K];
        blends[k] = Blend::Heading;
        self.interp(t, cursor, &blends)
    }

    /// Interpolate component `k` as a longitude, other components linearly
    pub fn longitude_interp(&self, t: f64, cursor: &mut usize, k: usize) -> Option<[f64; K]> {
        let mut blends = [Blend::Linear; K];
        blends[k] = Blend::Longitude;
        self.interp(t, cursor, &blends)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp() -> AncillarySeries<2> {
        AncillarySeries::from_parts(
            &[0.0, 1.0, 2.5, 4.0, 7.0],
            &[
                [0.0, 10.0],
                [1.0, 11.0],
                [-3.0, 12.5],
                [8.0, 14.0],
                [2.0, 17.0],
            ],
        )
    }

    #[test]
    fn interp_at_sample_times_returns_samples() {
        let s = ramp();
        let mut cursor = 0;
        for sample in s.samples() {
            let v = s.linear_interp(sample.time_d, &mut cursor).unwrap();
            assert_abs_diff_eq!(v[0], sample.values[0], epsilon = 1e-9);
            assert_abs_diff_eq!(v[1], sample.values[1], epsilon = 1e-9);
        }
    }

    #[test]
    fn interp_clamps_outside_the_series() {
        let s = ramp();
        let mut cursor = 0;
        assert_eq!(s.linear_interp(-5.0, &mut cursor), Some([0.0, 10.0]));
        assert_eq!(s.linear_interp(100.0, &mut cursor), Some([2.0, 17.0]));
    }

    #[test]
    fn interp_blends_between_samples() {
        let s = ramp();
        let mut cursor = 0;
        let v = s.linear_interp(0.5, &mut cursor).unwrap();
        assert_abs_diff_eq!(v[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 10.5, epsilon = 1e-12);
        let v = s.linear_interp(5.5, &mut cursor).unwrap();
        assert_abs_diff_eq!(v[0], 5.0, epsilon = 1e-12);
        assert_eq!(cursor, 3);
    }

    #[test]
    fn cursor_recovers_from_backward_queries() {
        let s = ramp();
        let mut cursor = 0;
        s.linear_interp(6.0, &mut cursor);
        let v = s.linear_interp(0.5, &mut cursor).unwrap();
        assert_abs_diff_eq!(v[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn empty_series_gives_no_value() {
        let s: AncillarySeries<1> = AncillarySeries::new();
        let mut cursor = 0;
        assert_eq!(s.linear_interp(1.0, &mut cursor), None);
    }

    #[test]
    fn non_finite_times_give_no_value() {
        let one = AncillarySeries::from_parts(&[5.0], &[[1.0]]);
        let mut cursor = 0;
        assert_eq!(one.linear_interp(f64::NAN, &mut cursor), None);
        let s = ramp();
        let mut cursor = 4;
        assert_eq!(s.linear_interp(f64::NAN, &mut cursor), None);
        assert_eq!(s.linear_interp(f64::INFINITY, &mut cursor), None);
        assert_eq!(cursor, 4);
        assert_eq!(interp_table(&[1.0], &[2.0], f64::NAN, &mut cursor), None);
    }

    #[test]
    fn heading_crosses_north() {
        let s = AncillarySeries::from_parts(&[0.0, 2.0], &[[359.0], [1.0]]);
        let mut cursor = 0;
        let h = s.heading_interp(1.0, &mut cursor, 0).unwrap()[0];
        let off_north = h.min(360.0 - h);
        assert!(off_north < 1.0, "heading {} is not near north", h);
        let h = s.heading_interp(0.5, &mut cursor, 0).unwrap()[0];
        assert_abs_diff_eq!(h, 359.5, epsilon = 1e-9);
    }

    #[test]
    fn longitude_crosses_date_line() {
        let s = AncillarySeries::from_parts(&[0.0, 4.0], &[[179.0, 0.0], [-179.0, 4.0]]);
        let mut cursor = 0;
        let v = s.longitude_interp(1.0, &mut cursor, 0).unwrap();
        assert_abs_diff_eq!(v[0], 179.5, epsilon = 1e-9);
        assert_abs_diff_eq!(v[1], 1.0, epsilon = 1e-9);
        let v = s.longitude_interp(3.0, &mut cursor, 0).unwrap();
        assert_abs_diff_eq!(v[0], -179.5, epsilon = 1e-9);
    }

    #[test]
    fn nav_interpolates_between_fixes() {
        let s = AncillarySeries::from_parts(
            &[0.0, 2.0, 4.0],
            &[[10.0000, 0.0, 0.0], [10.0002, 0.0, 0.0], [10.0004, 0.0, 0.0]],
        );
        let mut cursor = 0;
        let lons: Vec<f64> = (0..5)
            .map(|t| s.longitude_interp(f64::from(t), &mut cursor, 0).unwrap()[0])
            .collect();
        assert_abs_diff_eq!(lons[1], 10.0001, epsilon = 1e-9);
        assert_abs_diff_eq!(lons[3], 10.0003, epsilon = 1e-9);
    }

    #[test]
    fn finalize_sorts_and_drops_repeats() {
        let mut s = AncillarySeries::from_parts(
            &[0.0, 1.0, 1.0, 3.0, 2.0],
            &[[0.0], [1.0], [9.0], [3.0], [2.0]],
        );
        let report = s.finalize();
        assert_eq!(report.reversed, 1);
        assert_eq!(report.duplicates, 1);
        assert!(s.is_strictly_increasing());
        assert_eq!(s.times(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(s.component(0), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn table_interp_clamps() {
        let times = [10.0, 20.0];
        let values = [1.0, 3.0];
        let mut cursor = 0;
        assert_eq!(interp_table(&times, &values, 0.0, &mut cursor), Some(1.0));
        assert_eq!(interp_table(&times, &values, 15.0, &mut cursor), Some(2.0));
        assert_eq!(interp_table(&times, &values, 25.0, &mut cursor), Some(3.0));
        assert_eq!(interp_table(&[], &[], 25.0, &mut cursor), None);
    }

    #[test]
    fn wraps_angles() {
        assert_abs_diff_eq!(wrap_heading(-10.0), 350.0);
        assert_abs_diff_eq!(wrap_heading(370.0), 10.0);
        assert_abs_diff_eq!(wrap_longitude(190.0), -170.0);
        assert_abs_diff_eq!(wrap_longitude(-190.0), 170.0);
        assert_abs_diff_eq!(wrap_longitude(180.0), 180.0);
    }
}
