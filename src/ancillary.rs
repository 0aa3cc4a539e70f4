//! Loading ancillary data from text files
//!
//! Each line holds a timestamp followed by values, separated by whitespace
//! or commas. Blank lines and lines starting with `#` are ignored. Optional
//! trailing columns that are absent are stored as NaN, which the engine
//! reads as "no value".
use crate::error::{PreprocessError, Result};
use crate::latency::TimeLatencyModel;
use crate::series::AncillarySeries;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::{Date, Month, PrimitiveDateTime, Time};

/// How the timestamp of a line is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    /// `time_d v1 v2 ...` with time in seconds since the Unix epoch
    #[default]
    EpochSeconds,
    /// `yyyy mm dd hh mm ss.sss v1 v2 ...` in UTC
    Calendar,
}

impl TextFormat {
    fn time_columns(self) -> usize {
        match self {
            TextFormat::EpochSeconds => 1,
            TextFormat::Calendar => 6,
        }
    }
}

/// What a loader found in a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Lines holding data
    pub lines: usize,
    /// Data lines that could not be parsed
    pub skipped: usize,
}

/// Convert a UTC calendar time to seconds since the Unix epoch
pub fn calendar_to_epoch(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: f64,
) -> Option<f64> {
    if !(0.0..61.0).contains(&second) {
        return None;
    }
    let month = Month::try_from(month).ok()?;
    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, 0).ok()?;
    let midnight = PrimitiveDateTime::new(date, time).assume_utc();
    Some(midnight.unix_timestamp() as f64 + second)
}

fn parse_time(fields: &[f64], format: TextFormat) -> Option<f64> {
    match format {
        TextFormat::EpochSeconds => fields.first().copied(),
        TextFormat::Calendar => {
            let whole = |v: f64| (v.fract() == 0.0).then_some(v);
            calendar_to_epoch(
                whole(fields[0])? as i32,
                whole(fields[1])? as u8,
                whole(fields[2])? as u8,
                whole(fields[3])? as u8,
                whole(fields[4])? as u8,
                fields[5],
            )
        }
    }
}

fn parse_line<const K: usize>(
    line: &str,
    format: TextFormat,
    required: usize,
) -> Option<(f64, [f64; K])> {
    let fields: Vec<f64> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let ntime = format.time_columns();
    if fields.len() < ntime + required {
        return None;
    }
    let time_d = parse_time(&fields, format)?;
    let mut values = [f64::NAN; K];
    for (v, f) in values.iter_mut().zip(fields[ntime..].iter()) {
        *v = *f;
    }
    Some((time_d, values))
}

/// Read a series with `K` value columns of which the first `required` must
/// be present on every line
pub fn load_series<const K: usize>(
    path: &Path,
    format: TextFormat,
    required: usize,
) -> Result<(AncillarySeries<K>, LoadReport)> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PreprocessError::Config(format!("unable to read {}: {}", path.display(), e))
    })?;
    let mut series = AncillarySeries::new();
    let mut report = LoadReport::default();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        report.lines += 1;
        match parse_line::<K>(line, format, required) {
            Some((t, values)) => series.append(t, values),
            None => {
                report.skipped += 1;
                warn!("{}:{}: unable to parse {:?}", path.display(), n + 1, line);
            }
        }
    }
    debug!(
        "read {} samples from {} ({} lines skipped)",
        series.len(),
        path.display(),
        report.skipped
    );
    Ok((series, report))
}

/// Longitude, latitude and optional speed in km/hr
pub fn load_nav(path: &Path, format: TextFormat) -> Result<(AncillarySeries<3>, LoadReport)> {
    load_series(path, format, 2)
}

/// Heading in degrees
pub fn load_heading(path: &Path, format: TextFormat) -> Result<(AncillarySeries<1>, LoadReport)> {
    load_series(path, format, 1)
}

/// Altitude in meters
pub fn load_altitude(path: &Path, format: TextFormat) -> Result<(AncillarySeries<1>, LoadReport)> {
    load_series(path, format, 1)
}

/// Sensor depth in meters
pub fn load_sensordepth(
    path: &Path,
    format: TextFormat,
) -> Result<(AncillarySeries<1>, LoadReport)> {
    load_series(path, format, 1)
}

/// Roll and pitch in degrees with optional heave in meters
pub fn load_attitude(path: &Path, format: TextFormat) -> Result<(AncillarySeries<3>, LoadReport)> {
    load_series(path, format, 2)
}

/// Sound speed in m/s
pub fn load_soundspeed(
    path: &Path,
    format: TextFormat,
) -> Result<(AncillarySeries<1>, LoadReport)> {
    load_series(path, format, 1)
}

/// A time latency table of `time latency` pairs
pub fn load_latency(path: &Path, format: TextFormat) -> Result<TimeLatencyModel> {
    let (mut series, _) = load_series::<1>(path, format, 1)?;
    series.finalize();
    TimeLatencyModel::piecewise(series.times(), series.component(0))
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn epoch_nav_with_optional_speed() {
        let f = file("# nav\n1000.0 -122.0 36.5 7.5\n\n1001.0,-122.1,36.6\nbad line\n");
        let (s, report) = load_nav(f.path(), TextFormat::EpochSeconds).unwrap();
        assert_eq!(report, LoadReport { lines: 3, skipped: 1 });
        assert_eq!(s.len(), 2);
        assert_eq!(s.samples()[0].values, [-122.0, 36.5, 7.5]);
        assert_eq!(s.samples()[1].values[1], 36.6);
        assert!(s.samples()[1].values[2].is_nan());
    }

    #[test]
    fn calendar_times() {
        let f = file("2020 09 13 12 26 40.5 271.0\n2020 13 01 00 00 00 1.0\n");
        let (s, report) = load_heading(f.path(), TextFormat::Calendar).unwrap();
        assert_eq!(report.skipped, 1);
        assert_abs_diff_eq!(s.samples()[0].time_d, 1_600_000_000.5, epsilon = 1e-6);
        assert_eq!(s.samples()[0].values, [271.0]);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_heading(Path::new("/no/such/file.txt"), TextFormat::EpochSeconds)
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn latency_tables() {
        let f = file("10 0.5\n0 0.1\n20 1.0\n");
        let model = load_latency(f.path(), TextFormat::EpochSeconds).unwrap();
        assert_eq!(
            model,
            TimeLatencyModel::PiecewiseLinear {
                times: vec![0.0, 10.0, 20.0],
                values: vec![0.1, 0.5, 1.0],
            }
        );
        let empty = file("# nothing\n");
        assert!(load_latency(empty.path(), TextFormat::EpochSeconds).is_err());
    }
}
