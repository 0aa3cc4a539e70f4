//! Repair of timestamp jumps in nominally uniform series
//!
//! Sensors that log at a fixed rate occasionally record a bad timestamp: a
//! single sample far from its neighbours, or a run of samples after the
//! clock has been reset backwards. [`JumpRepair`] fixes a whole series after
//! it has been read; [`PingClock`] does the same for survey pings as they
//! stream past.
use crate::series::AncillarySeries;
use log::debug;
use serde::{Deserialize, Serialize};

/// What to do with samples whose interval departs from the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// Replace the bad timestamp with the previous one plus the interval
    #[default]
    ForwardPatch,
    /// Drop runs of two or more samples that fell behind the time at which
    /// the run started, once a good interval closes them
    DeleteReversal,
}

/// The outcome of a repair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Samples given a new timestamp
    pub patched: usize,
    /// Samples removed as part of a clock reversal
    pub deleted: usize,
    /// Samples removed because they still did not advance in time
    pub compacted: usize,
}

impl RepairReport {
    /// The total number of samples touched
    pub fn total(&self) -> usize {
        self.patched + self.deleted + self.compacted
    }
}

/// Timestamp jump detector and corrector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpRepair {
    /// Deviation from the expected interval, in seconds, that marks a jump
    pub threshold: f64,
    /// How jumps are repaired
    pub policy: RepairPolicy,
}

/// Estimate the sampling interval of a series
///
/// The span divided by the number of intervals is used unless the first
/// interval lies within `threshold` of it, in which case the first interval
/// is taken as the true cadence.
pub fn expected_interval(times: &[f64], threshold: f64) -> Option<f64> {
    let n = times.len();
    if n < 2 {
        return None;
    }
    let naive = (times[n - 1] - times[0]) / (n - 1) as f64;
    let first = times[1] - times[0];
    if (first - naive).abs() < threshold {
        Some(first)
    } else {
        Some(naive)
    }
}

impl JumpRepair {
    /// Create a repair with the given threshold and policy
    pub fn new(threshold: f64, policy: RepairPolicy) -> Self {
        JumpRepair { threshold, policy }
    }

    /// Repair a series in place
    ///
    /// Afterwards the series is strictly increasing in time.
    pub fn apply<const K: usize>(&self, series: &mut AncillarySeries<K>) -> RepairReport {
        let mut report = RepairReport::default();
        let samples = series.samples_mut();
        let n = samples.len();
        let times: Vec<f64> = samples.iter().map(|s| s.time_d).collect();
        let mut keep = vec![true; n];

        if let Some(expected) = expected_interval(&times, self.threshold) {
            let mut run: Option<Run> = None;
            for i in 2..n {
                let raw = samples[i].time_d;
                let previous = samples[i - 1].time_d;
                if ((raw - previous) - expected).abs() >= self.threshold {
                    let r = run.get_or_insert(Run {
                        start_time: previous,
                        start: i,
                        end: i - 1,
                    });
                    if raw < r.start_time {
                        r.end = i;
                    }
                    samples[i].time_d = previous + expected;
                    report.patched += 1;
                    debug!(
                        "timestamp jump at sample {}: {:.6} -> {:.6}",
                        i,
                        raw,
                        samples[i].time_d
                    );
                } else if let Some(r) = run.take() {
                    report.deleted += self.close_run(r, &mut keep);
                }
            }
            // a run still open at the end of the data stays patched
        }
        report.patched -= report.deleted.min(report.patched);

        // drop deleted samples, then anything that still fails to advance
        let mut i = 0;
        samples.retain(|_| {
            i += 1;
            keep[i - 1]
        });
        let before = samples.len();
        samples.dedup_by(|later, kept| later.time_d <= kept.time_d);
        report.compacted = before - samples.len();
        report
    }

    fn close_run(&self, run: Run, keep: &mut [bool]) -> usize {
        if self.policy != RepairPolicy::DeleteReversal || run.end <= run.start {
            return 0;
        }
        debug!(
            "deleting samples {}..={} after clock reversal",
            run.start, run.end
        );
        for k in &mut keep[run.start..=run.end] {
            *k = false;
        }
        run.end - run.start + 1
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    start_time: f64,
    start: usize,
    end: usize,
}

/// Streaming timestamp repair for survey pings
///
/// The expected interval is the mean of the corrected intervals seen so
/// far. A ping whose corrected interval is off by at least the threshold is
/// placed at `last + expected` if its raw interval is also off, and at
/// `last + raw interval` otherwise; the second case follows a clock that
/// has jumped once and then kept running.
#[derive(Debug, Clone)]
pub struct PingClock {
    threshold: f64,
    first: Option<f64>,
    last: f64,
    last_raw: f64,
    count: usize,
    repaired: usize,
}

impl PingClock {
    /// Create a clock with the given jump threshold in seconds
    pub fn new(threshold: f64) -> Self {
        PingClock {
            threshold,
            first: None,
            last: 0.0,
            last_raw: 0.0,
            count: 0,
            repaired: 0,
        }
    }

    /// Forget all history, as at the start of a new file
    pub fn reset(&mut self) {
        *self = PingClock::new(self.threshold);
    }

    /// The number of pings given a new timestamp so far
    pub fn repaired(&self) -> usize {
        self.repaired
    }

    /// Correct the next ping timestamp
    pub fn correct(&mut self, raw: f64) -> f64 {
        let corrected = match self.first {
            Some(first) if self.count >= 2 => {
                let expected = (self.last - first) / (self.count - 1) as f64;
                let dt = raw - self.last;
                let dt_raw = raw - self.last_raw;
                if (dt - expected).abs() >= self.threshold {
                    self.repaired += 1;
                    let t = if (dt_raw - expected).abs() >= self.threshold {
                        self.last + expected
                    } else {
                        self.last + dt_raw
                    };
                    debug!("survey timestamp jump: {:.6} -> {:.6}", raw, t);
                    t
                } else {
                    raw
                }
            }
            _ => raw,
        };
        if self.first.is_none() {
            self.first = Some(corrected);
        }
        self.last = corrected;
        self.last_raw = raw;
        self.count += 1;
        corrected
    }
}
