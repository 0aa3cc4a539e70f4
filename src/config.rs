//! Preprocessing configuration
//!
//! A run is described by a [`PreprocessConfig`], normally read from a JSON
//! file and then adjusted from the command line. Every field has a default,
//! so a configuration file only needs to name what differs:
//!
//! ```json
//! {
//!   "input": ["line1.sdw"],
//!   "platform_file": "ship.json",
//!   "channels": {
//!     "nav": {"source": {"type": "file", "path": "ship.nav"}},
//!     "sensordepth": {"source": {"type": "off"}}
//!   },
//!   "time_latency": {"model": {"constant": 0.05}, "apply": {"nav": true}},
//!   "jumps": {"sensordepth_reversal": 0.5}
//! }
//! ```
use crate::ancillary::{self, TextFormat};
use crate::error::{PreprocessError, Result};
use crate::latency::{LatencyConvention, TimeLatencyModel};
use crate::model::{AncillaryChannel, RecordKind};
use crate::parser::Format;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the samples of one channel come from
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelSource {
    /// Do not merge this channel
    Off,
    /// A text file of samples
    File {
        /// The file
        path: PathBuf,
        /// How its timestamps are written
        #[serde(default)]
        format: TextFormat,
    },
    /// Records of the given kind embedded in the survey stream
    Async {
        /// The record kind
        kind: RecordKind,
    },
}

/// Settings for one ancillary channel
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// The source; `None` uses the input format's embedded records
    pub source: Option<ChannelSource>,
    /// The platform sensor that measured this channel, replacing the one
    /// declared in the platform file
    pub sensor: Option<String>,
}

/// Settings for every ancillary channel
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
#[allow(missing_docs)]
pub struct Channels {
    pub nav: ChannelConfig,
    pub sensordepth: ChannelConfig,
    pub heading: ChannelConfig,
    pub altitude: ChannelConfig,
    pub attitude: ChannelConfig,
    pub soundspeed: ChannelConfig,
}

impl Channels {
    /// The settings for a channel
    pub fn get(&self, channel: AncillaryChannel) -> &ChannelConfig {
        match channel {
            AncillaryChannel::Nav => &self.nav,
            AncillaryChannel::SensorDepth => &self.sensordepth,
            AncillaryChannel::Heading => &self.heading,
            AncillaryChannel::Altitude => &self.altitude,
            AncillaryChannel::Attitude => &self.attitude,
            AncillaryChannel::SoundSpeed => &self.soundspeed,
        }
    }
}

/// A set of channels a correction applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
#[allow(missing_docs)]
pub struct ChannelSet {
    pub nav: bool,
    pub sensordepth: bool,
    pub heading: bool,
    pub altitude: bool,
    pub attitude: bool,
    pub soundspeed: bool,
    /// Survey ping timestamps
    pub survey: bool,
}

impl ChannelSet {
    /// Every ancillary channel but not the survey pings
    pub fn ancillary() -> ChannelSet {
        ChannelSet {
            nav: true,
            sensordepth: true,
            heading: true,
            altitude: true,
            attitude: true,
            soundspeed: true,
            survey: false,
        }
    }

    /// Return true if the set includes a channel
    pub fn contains(&self, channel: AncillaryChannel) -> bool {
        match channel {
            AncillaryChannel::Nav => self.nav,
            AncillaryChannel::SensorDepth => self.sensordepth,
            AncillaryChannel::Heading => self.heading,
            AncillaryChannel::Altitude => self.altitude,
            AncillaryChannel::Attitude => self.attitude,
            AncillaryChannel::SoundSpeed => self.soundspeed,
        }
    }
}

/// How the global time latency is given
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencySetting {
    /// The same latency everywhere, in seconds
    Constant(f64),
    /// A `time latency` table in a text file
    File {
        /// The file
        path: PathBuf,
        /// How its timestamps are written
        #[serde(default)]
        format: TextFormat,
    },
}

/// The global time latency correction
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LatencyConfig {
    /// The model, if any
    pub model: Option<LatencySetting>,
    /// The channels it is applied to
    pub apply: ChannelSet,
    /// Whether latency is removed from or added to timestamps
    pub convention: LatencyConvention,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        LatencyConfig {
            model: None,
            apply: ChannelSet::ancillary(),
            convention: LatencyConvention::default(),
        }
    }
}

impl LatencyConfig {
    /// Build the configured model, reading a table file if needed
    pub fn resolve(&self) -> Result<Option<TimeLatencyModel>> {
        match &self.model {
            None => Ok(None),
            Some(LatencySetting::Constant(v)) if v.is_finite() => {
                Ok(Some(TimeLatencyModel::Static(*v)))
            }
            Some(LatencySetting::Constant(v)) => Err(PreprocessError::Config(format!(
                "time latency {} is not a number",
                v
            ))),
            Some(LatencySetting::File { path, format }) => {
                ancillary::load_latency(path, *format).map(Some)
            }
        }
    }
}

/// Gaussian smoothing of ancillary channels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Kernel length in seconds; zero disables filtering
    pub length: f64,
    /// The channels that are smoothed
    pub apply: ChannelSet,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            length: 0.0,
            apply: ChannelSet::ancillary(),
        }
    }
}

/// Thresholds for timestamp jump repair, in seconds
///
/// A missing threshold disables repair for that data.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct JumpConfig {
    /// Survey ping timestamps, repaired as they stream
    pub survey: Option<f64>,
    /// Ancillary series, repaired by forward patching
    pub ancillary: Option<f64>,
    /// Sensor depth, with clock reversals deleted
    pub sensordepth_reversal: Option<f64>,
}

/// Corrections for instrument quirks, applied to every ping
///
/// Any beam adjustment here forces the beams to be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct KlugeConfig {
    /// Scale the sine of every beam angle, as for a mis-set array sound speed
    pub beam_tweak: Option<f64>,
    /// Scale the sound speed, and with it beam angles and ranges
    pub soundspeed_tweak: Option<f64>,
    /// Leave attitude changes out when recomputing beams
    pub zero_attitude_correction: bool,
    /// Fold every sounding into the acrosstrack plane
    pub zero_alongtrack_angles: bool,
    /// The logged heave is the sensor depth
    pub sensordepth_from_heave: bool,
}

impl KlugeConfig {
    /// Return true if any beam adjustment is asked for
    pub fn changes_beams(&self) -> bool {
        self.beam_tweak.is_some()
            || self.soundspeed_tweak.is_some()
            || self.zero_attitude_correction
            || self.zero_alongtrack_angles
    }
}

/// Everything a preprocessing run needs
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    /// Swath files to process, in order
    pub input: Vec<PathBuf>,
    /// Input format; detected from each file's extension if absent
    pub format: Option<Format>,
    /// Where outputs are written; next to each input if absent
    pub output_directory: Option<PathBuf>,
    /// Leave files whose output is already up to date
    pub skip_existing: bool,
    /// JSON description of the platform
    pub platform_file: Option<PathBuf>,
    /// The sensor pings are moved onto, overriding the platform file
    pub target_sensor: Option<String>,
    /// Ancillary sources
    pub channels: Channels,
    /// Global time latency
    pub time_latency: LatencyConfig,
    /// Smoothing
    pub filter: FilterConfig,
    /// Timestamp repair
    pub jumps: JumpConfig,
    /// Merge navigation but do not recompute beams
    pub no_change_survey: bool,
    /// Write a navigation file for every platform sensor
    pub output_sensor_fnv: bool,
    /// Instrument quirks
    pub kluges: KlugeConfig,
}

impl PreprocessConfig {
    /// Read a configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PreprocessConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PreprocessError::Config(format!("unable to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| PreprocessError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Check the settings that can be checked without touching the data
    pub fn validate(&self) -> Result<()> {
        if self.input.is_empty() {
            return Err(PreprocessError::Config("no input files".to_string()));
        }
        let thresholds = [
            ("survey", self.jumps.survey),
            ("ancillary", self.jumps.ancillary),
            ("sensordepth_reversal", self.jumps.sensordepth_reversal),
        ];
        for (name, threshold) in thresholds {
            if let Some(t) = threshold {
                if !(t.is_finite() && t > 0.0) {
                    return Err(PreprocessError::Config(format!(
                        "jump threshold {} must be positive, not {}",
                        name, t
                    )));
                }
            }
        }
        let factors = [
            ("beam_tweak", self.kluges.beam_tweak),
            ("soundspeed_tweak", self.kluges.soundspeed_tweak),
        ];
        for (name, factor) in factors {
            if let Some(f) = factor {
                if !(f.is_finite() && f > 0.0) {
                    return Err(PreprocessError::Config(format!(
                        "{} factor must be positive, not {}",
                        name, f
                    )));
                }
            }
        }
        if !self.filter.length.is_finite() {
            return Err(PreprocessError::Config(
                "filter length is not a number".to_string(),
            ));
        }
        for channel in AncillaryChannel::ALL {
            if let Some(ChannelSource::File { path, .. }) = &self.channels.get(channel).source {
                if !path.is_file() {
                    return Err(PreprocessError::Config(format!(
                        "{} file {} does not exist",
                        channel,
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// The format of an input file
    pub fn format_of(&self, path: &Path) -> Result<Format> {
        match self.format {
            Some(f) => Ok(f),
            None => Format::from_path(path),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_config_has_defaults() {
        let c: PreprocessConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, PreprocessConfig::default());
        assert!(c.time_latency.apply.nav);
        assert!(!c.time_latency.apply.survey);
        assert_eq!(c.filter.length, 0.0);
        assert_eq!(c.channels.nav.source, None);
    }

    #[test]
    fn parses_a_full_config() {
        let c: PreprocessConfig = serde_json::from_str(
            r#"{
                "input": ["a.sdw", "b.jsf"],
                "format": "sdw",
                "skip_existing": true,
                "target_sensor": "sonar",
                "channels": {
                    "nav": {"source": {"type": "async", "kind": "nav1"}, "sensor": "gps2"},
                    "heading": {"source": {"type": "off"}},
                    "altitude": {"source": {"type": "file", "path": "alt.txt", "format": "calendar"}}
                },
                "time_latency": {
                    "model": {"constant": -0.1},
                    "apply": {"survey": true},
                    "convention": "add"
                },
                "filter": {"length": 2.0, "apply": {"heading": true}},
                "jumps": {"survey": 0.5, "sensordepth_reversal": 0.2}
            }"#,
        )
        .unwrap();
        assert_eq!(c.input.len(), 2);
        assert_eq!(c.format, Some(Format::Sdw));
        assert_eq!(
            c.channels.nav.source,
            Some(ChannelSource::Async {
                kind: RecordKind::Nav1
            })
        );
        assert_eq!(c.channels.nav.sensor.as_deref(), Some("gps2"));
        assert_eq!(c.channels.heading.source, Some(ChannelSource::Off));
        assert_eq!(
            c.channels.altitude.source,
            Some(ChannelSource::File {
                path: PathBuf::from("alt.txt"),
                format: TextFormat::Calendar
            })
        );
        assert!(c.time_latency.apply.survey);
        assert!(!c.time_latency.apply.nav);
        assert_eq!(c.time_latency.convention, LatencyConvention::Add);
        assert_eq!(
            c.time_latency.resolve().unwrap(),
            Some(TimeLatencyModel::Static(-0.1))
        );
        assert!(c.filter.apply.contains(AncillaryChannel::Heading));
        assert!(!c.filter.apply.contains(AncillaryChannel::Nav));
        assert_eq!(c.jumps.ancillary, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let r: std::result::Result<PreprocessConfig, _> =
            serde_json::from_str(r#"{"inptu": ["a.sdw"]}"#);
        assert!(r.is_err());
    }

    #[test]
    fn validation() {
        let mut c = PreprocessConfig::default();
        assert!(c.validate().unwrap_err().is_config());
        c.input.push(PathBuf::from("a.sdw"));
        assert!(c.validate().is_ok());
        c.jumps.survey = Some(-1.0);
        assert!(c.validate().is_err());
        c.jumps.survey = None;
        c.channels.nav.source = Some(ChannelSource::File {
            path: PathBuf::from("/no/such/nav.txt"),
            format: TextFormat::EpochSeconds,
        });
        assert!(c.validate().unwrap_err().is_config());
        c.channels.nav.source = None;
        c.kluges.soundspeed_tweak = Some(0.0);
        assert!(c.validate().unwrap_err().is_config());
    }

    #[test]
    fn kluges_are_read() {
        let c: PreprocessConfig = serde_json::from_str(
            r#"{"kluges": {"beam_tweak": 1.01, "sensordepth_from_heave": true}}"#,
        )
        .unwrap();
        assert_eq!(c.kluges.beam_tweak, Some(1.01));
        assert!(c.kluges.sensordepth_from_heave);
        assert!(c.kluges.changes_beams());
        assert!(!KlugeConfig {
            sensordepth_from_heave: true,
            ..Default::default()
        }
        .changes_beams());
    }

    #[test]
    fn formats_from_paths_unless_forced() {
        let mut c = PreprocessConfig::default();
        assert_eq!(c.format_of(Path::new("x.jsf")).unwrap(), Format::Jsf);
        c.format = Some(Format::Sdw);
        assert_eq!(c.format_of(Path::new("x.jsf")).unwrap(), Format::Sdw);
    }
}
