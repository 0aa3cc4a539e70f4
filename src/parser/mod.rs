//! Reading and writing swath data formats
//!
//! Every format reads into the common [`Record`] model. Readers are plain
//! iterators over `Result<Record>`; a malformed record yields an error item
//! and the reader carries on with the next record it can find.
use crate::config::KlugeConfig;
use crate::error::{PreprocessError, Result};
use crate::model::{AncillaryChannel, Record, RecordKind, SurveyPing};
use crate::platform::PlatformModel;
use binrw::io::{BufReader, Read, Seek, SeekFrom};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

pub mod fbt;
pub mod jsf;
pub mod sdw;

/// A source of swath records
pub trait SwathReader: Iterator<Item = Result<Record>> {}

impl<T: Iterator<Item = Result<Record>>> SwathReader for T {}

/// A sink for swath records
pub trait SwathWriter {
    /// Write one record
    fn put(&mut self, record: &Record) -> Result<()>;
    /// Flush everything written so far
    fn close(&mut self) -> Result<()>;
}

/// The supported swath formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// The native framed format, read and written
    Sdw,
    /// EdgeTech JSF sidescan, read only
    Jsf,
}

impl Format {
    /// Detect the format of a file from its extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Format> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| PreprocessError::UnknownFormat(path.display().to_string()))?;
        ext.parse()
    }

    /// The short name of the format
    pub fn name(&self) -> &'static str {
        match self {
            Format::Sdw => "sdw",
            Format::Jsf => "jsf",
        }
    }

    /// The file extension used for the format
    pub fn extension(&self) -> &'static str {
        self.name()
    }

    /// The format processed output is written in
    pub fn output_format(&self) -> Format {
        Format::Sdw
    }

    /// The embedded record kind that carries a channel when no other
    /// source is configured
    pub fn default_async(&self, channel: AncillaryChannel) -> Option<RecordKind> {
        match self {
            Format::Sdw => Some(match channel {
                AncillaryChannel::Nav => RecordKind::Nav,
                AncillaryChannel::SensorDepth => RecordKind::SensorDepth,
                AncillaryChannel::Heading => RecordKind::Heading,
                AncillaryChannel::Altitude => RecordKind::Altitude,
                AncillaryChannel::Attitude => RecordKind::Attitude,
                AncillaryChannel::SoundSpeed => RecordKind::SoundSpeed,
            }),
            Format::Jsf => match channel {
                AncillaryChannel::Nav => Some(RecordKind::Nav),
                AncillaryChannel::Heading | AncillaryChannel::Attitude => {
                    Some(RecordKind::Attitude)
                }
                _ => None,
            },
        }
    }

    /// The format specific preprocessing step
    pub fn preprocess_hook(&self) -> Box<dyn PreprocessHook> {
        match self {
            Format::Sdw => Box::new(GenericHook),
            Format::Jsf => Box::new(SidescanHook),
        }
    }

    /// Open a file of this format for reading
    pub fn open_reader<P: AsRef<Path>>(&self, path: P) -> Result<Box<dyn SwathReader>> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|source| PreprocessError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(f);
        Ok(match self {
            Format::Sdw => Box::new(sdw::SdwFile::new(reader)),
            Format::Jsf => Box::new(jsf::JsfRecords::new(reader)),
        })
    }

    /// Create a file of this format for writing
    pub fn create_writer<P: AsRef<Path>>(&self, path: P) -> Result<Box<dyn SwathWriter>> {
        match self {
            Format::Sdw => Ok(Box::new(sdw::SdwWriter::create(path)?)),
            Format::Jsf => Err(PreprocessError::UnknownFormat(
                "jsf files can only be read".to_string(),
            )),
        }
    }
}

impl FromStr for Format {
    type Err = PreprocessError;

    fn from_str(s: &str) -> Result<Format> {
        match s.to_ascii_lowercase().as_str() {
            "sdw" => Ok(Format::Sdw),
            "jsf" => Ok(Format::Jsf),
            _ => Err(PreprocessError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned by a hook that cannot handle a ping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fallback;

/// Settings passed to a preprocessing hook
#[derive(Debug, Clone, Default)]
pub struct HookParams {
    /// The sensor pings are moved onto
    pub target_sensor: Option<String>,
    /// Leave beams untouched
    pub no_change_survey: bool,
    /// Instrument quirks to correct
    pub kluges: KlugeConfig,
}

/// A format aware replacement for the generic platform correction
///
/// A hook receives a ping whose ancillary values have already been merged.
/// It either finishes the correction itself or returns [`Fallback`], in
/// which case the engine applies the platform transform and recomputes the
/// beams.
pub trait PreprocessHook {
    /// A short name used in log messages
    fn name(&self) -> &'static str;

    /// Try to correct a merged ping
    fn try_preprocess(
        &self,
        ping: &mut SurveyPing,
        platform: Option<&PlatformModel>,
        params: &HookParams,
    ) -> std::result::Result<(), Fallback>;
}

/// The hook for formats with no special handling
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericHook;

impl PreprocessHook for GenericHook {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn try_preprocess(
        &self,
        _ping: &mut SurveyPing,
        _platform: Option<&PlatformModel>,
        _params: &HookParams,
    ) -> std::result::Result<(), Fallback> {
        Err(Fallback)
    }
}

/// The hook for sidescan formats
///
/// Sidescan pings carry no bathymetry, so moving the ping onto the target
/// sensor is the whole correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidescanHook;

impl PreprocessHook for SidescanHook {
    fn name(&self) -> &'static str {
        "sidescan"
    }

    fn try_preprocess(
        &self,
        ping: &mut SurveyPing,
        platform: Option<&PlatformModel>,
        params: &HookParams,
    ) -> std::result::Result<(), Fallback> {
        if !ping.beams.is_empty() {
            return Err(Fallback);
        }
        if let (Some(platform), Some(target)) = (platform, params.target_sensor.as_deref()) {
            platform
                .transform_ping(target, ping)
                .map_err(|_| Fallback)?;
        }
        ping.draft = ping.sensordepth - ping.heave;
        Ok(())
    }
}

/// Move `reader` to the next occurrence of `magic` after `start`
///
/// Returns false if the end of the stream is reached first.
pub(crate) fn resync<R: Read + Seek>(reader: &mut R, start: u64, magic: &[u8; 2]) -> Result<bool> {
    reader.seek(SeekFrom::Start(start + 1))?;
    let mut prev: Option<u8> = None;
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            return Ok(false);
        }
        if prev == Some(magic[0]) && byte[0] == magic[1] {
            reader.seek(SeekFrom::Current(-2))?;
            return Ok(true);
        }
        prev = Some(byte[0]);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn formats_from_names_and_paths() {
        assert_eq!("SDW".parse::<Format>().unwrap(), Format::Sdw);
        assert_eq!(Format::from_path("a/b/line1.jsf").unwrap(), Format::Jsf);
        assert!(Format::from_path("line1.all").unwrap_err().is_config());
        assert!(Format::from_path("noext").unwrap_err().is_config());
        assert_eq!(Format::Jsf.output_format(), Format::Sdw);
    }

    #[test]
    fn jsf_defaults_use_attitude_records() {
        assert_eq!(
            Format::Jsf.default_async(AncillaryChannel::Heading),
            Some(RecordKind::Attitude)
        );
        assert_eq!(Format::Jsf.default_async(AncillaryChannel::SensorDepth), None);
        assert_eq!(
            Format::Sdw.default_async(AncillaryChannel::SoundSpeed),
            Some(RecordKind::SoundSpeed)
        );
    }

    #[test]
    fn generic_hook_always_falls_back() {
        let mut ping = SurveyPing::default();
        let hook = Format::Sdw.preprocess_hook();
        assert_eq!(hook.name(), "generic");
        assert_eq!(
            hook.try_preprocess(&mut ping, None, &HookParams::default()),
            Err(Fallback)
        );
    }

    #[test]
    fn sidescan_hook_handles_beamless_pings() {
        let hook = Format::Jsf.preprocess_hook();
        assert_eq!(hook.name(), "sidescan");
        let mut ping = SurveyPing {
            sensordepth: 10.0,
            heave: 0.5,
            ..Default::default()
        };
        assert_eq!(hook.try_preprocess(&mut ping, None, &HookParams::default()), Ok(()));
        assert_eq!(ping.draft, 9.5);
        ping.beams.push(crate::model::Beam::default());
        assert_eq!(
            hook.try_preprocess(&mut ping, None, &HookParams::default()),
            Err(Fallback)
        );
    }

    #[test]
    fn resync_finds_the_next_magic() {
        let mut c = Cursor::new(b"SRxxxSRyy".to_vec());
        assert!(resync(&mut c, 0, b"SR").unwrap());
        assert_eq!(c.position(), 5);
        assert!(!resync(&mut c, 5, b"SR").unwrap());
    }
}
