//! The swathprep data model
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a record in a swath data stream
///
/// Survey records carry beams; the navigation and attitude kinds carry
/// asynchronous ancillary samples. The numbered variants distinguish
/// secondary sensors of the same quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A ping of survey data
    Survey,
    /// A free text comment
    Comment,
    /// Primary navigation
    Nav,
    /// Secondary navigation
    Nav1,
    /// Tertiary navigation
    Nav2,
    /// Fourth navigation source
    Nav3,
    /// Primary attitude
    Attitude,
    /// Secondary attitude
    Attitude1,
    /// Tertiary attitude
    Attitude2,
    /// Fourth attitude source
    Attitude3,
    /// Heading
    Heading,
    /// Sensor depth (pressure or height)
    SensorDepth,
    /// Altitude above the seafloor
    Altitude,
    /// Water sound speed at the transducer
    SoundSpeed,
    /// Anything the reader did not recognize
    Unknown,
}

impl RecordKind {
    /// All record kinds in their on-disk code order
    pub const ALL: [RecordKind; 15] = [
        RecordKind::Survey,
        RecordKind::Comment,
        RecordKind::Nav,
        RecordKind::Nav1,
        RecordKind::Nav2,
        RecordKind::Nav3,
        RecordKind::Attitude,
        RecordKind::Attitude1,
        RecordKind::Attitude2,
        RecordKind::Attitude3,
        RecordKind::Heading,
        RecordKind::SensorDepth,
        RecordKind::Altitude,
        RecordKind::SoundSpeed,
        RecordKind::Unknown,
    ];

    /// The code used for this kind in the native swath format
    pub fn code(self) -> u8 {
        // ALL is ordered by code
        RecordKind::ALL
            .iter()
            .position(|k| *k == self)
            .map_or(u8::MAX, |i| i as u8 + 1)
    }

    /// Look up a kind from its native code
    pub fn from_code(code: u8) -> RecordKind {
        match code {
            1..=15 => RecordKind::ALL[usize::from(code) - 1],
            _ => RecordKind::Unknown,
        }
    }

    /// The lowercase name of the kind
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Survey => "survey",
            RecordKind::Comment => "comment",
            RecordKind::Nav => "nav",
            RecordKind::Nav1 => "nav1",
            RecordKind::Nav2 => "nav2",
            RecordKind::Nav3 => "nav3",
            RecordKind::Attitude => "attitude",
            RecordKind::Attitude1 => "attitude1",
            RecordKind::Attitude2 => "attitude2",
            RecordKind::Attitude3 => "attitude3",
            RecordKind::Heading => "heading",
            RecordKind::SensorDepth => "sensordepth",
            RecordKind::Altitude => "altitude",
            RecordKind::SoundSpeed => "soundspeed",
            RecordKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The ancillary quantities merged onto survey pings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AncillaryChannel {
    /// Longitude, latitude and speed
    Nav,
    /// Depth of the sensor below the sea surface
    SensorDepth,
    /// Heading in degrees east of North
    Heading,
    /// Altitude above the seafloor
    Altitude,
    /// Roll, pitch and heave
    Attitude,
    /// Sound speed at the transducer
    SoundSpeed,
}

impl AncillaryChannel {
    /// Every channel, in the order the engine corrects them
    pub const ALL: [AncillaryChannel; 6] = [
        AncillaryChannel::Nav,
        AncillaryChannel::SensorDepth,
        AncillaryChannel::Heading,
        AncillaryChannel::Altitude,
        AncillaryChannel::Attitude,
        AncillaryChannel::SoundSpeed,
    ];
}

impl fmt::Display for AncillaryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AncillaryChannel::Nav => "navigation",
            AncillaryChannel::SensorDepth => "sensordepth",
            AncillaryChannel::Heading => "heading",
            AncillaryChannel::Altitude => "altitude",
            AncillaryChannel::Attitude => "attitude",
            AncillaryChannel::SoundSpeed => "soundspeed",
        };
        f.write_str(s)
    }
}

/// Beam flag values
///
/// A flag of zero marks a good sounding. Any other value marks a beam that
/// was rejected by the sonar, by an editor, or by a filter; such beams are
/// carried through processing untouched.
pub mod flag {
    /// A good sounding
    pub const GOOD: u8 = 0x00;
    /// No sounding was produced
    pub const NULL: u8 = 0x01;
    /// Rejected by manual editing
    pub const MANUAL: u8 = 0x04;
    /// Rejected by an automatic filter
    pub const FILTER: u8 = 0x08;
    /// Rejected by the sonar
    pub const SONAR: u8 = 0x10;

    /// Return true if the flag marks a good sounding
    pub fn is_good(flag: u8) -> bool {
        flag == GOOD
    }
}

/// A single bathymetric beam
///
/// Distances are in meters in the ship frame: alongtrack positive forward,
/// acrosstrack positive to starboard, depth positive down from the sea
/// surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[derive(Deserialize, Serialize)]
pub struct Beam {
    /// The beam flag, see [`flag`]
    pub flag: u8,
    /// Depth of the sounding
    pub depth: f64,
    /// Acrosstrack distance of the sounding
    pub acrosstrack: f64,
    /// Alongtrack distance of the sounding
    pub alongtrack: f64,
    /// Backscatter amplitude
    pub amplitude: f64,
}

impl Beam {
    /// Create a good beam at the given location
    pub fn new(depth: f64, acrosstrack: f64, alongtrack: f64, amplitude: f64) -> Beam {
        Beam {
            flag: flag::GOOD,
            depth,
            acrosstrack,
            alongtrack,
            amplitude,
        }
    }

    /// Return true if the beam holds a good sounding
    pub fn is_good(&self) -> bool {
        flag::is_good(self.flag)
    }
}

/// One ping of survey data
///
/// Angles are in degrees: heading east of North, roll positive starboard
/// down, pitch positive bow up. Speed is in km/hr.
#[derive(Debug, Clone, PartialEq, Default)]
#[derive(Deserialize, Serialize)]
pub struct SurveyPing {
    /// Ping time in seconds since the Unix epoch
    pub time_d: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Speed over ground in km/hr
    pub speed: f64,
    /// Heading in degrees
    pub heading: f64,
    /// Depth of the sonar below the sea surface in meters
    pub sensordepth: f64,
    /// Sensor depth minus heave
    pub draft: f64,
    /// Roll in degrees
    pub roll: f64,
    /// Pitch in degrees
    pub pitch: f64,
    /// Heave in meters
    pub heave: f64,
    /// Altitude above the seafloor in meters
    pub altitude: f64,
    /// Sound speed at the transducer in m/s, zero if unknown
    pub soundspeed: f64,
    /// The bathymetry beams, possibly empty for sidescan-only data
    pub beams: Vec<Beam>,
}

/// A timestamped sample from an asynchronous record
///
/// A record may carry any subset of the quantities.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[derive(Deserialize, Serialize)]
pub struct AncillarySample {
    /// Sample time in seconds since the Unix epoch
    pub time_d: f64,
    /// Longitude in degrees
    pub longitude: Option<f64>,
    /// Latitude in degrees
    pub latitude: Option<f64>,
    /// Speed in km/hr
    pub speed: Option<f64>,
    /// Heading in degrees
    pub heading: Option<f64>,
    /// Sensor depth in meters
    pub sensordepth: Option<f64>,
    /// Altitude in meters
    pub altitude: Option<f64>,
    /// Roll in degrees
    pub roll: Option<f64>,
    /// Pitch in degrees
    pub pitch: Option<f64>,
    /// Heave in meters
    pub heave: Option<f64>,
    /// Sound speed in m/s
    pub soundspeed: Option<f64>,
}

impl AncillarySample {
    /// Create a sample with only a timestamp set
    pub fn at(time_d: f64) -> AncillarySample {
        AncillarySample {
            time_d,
            ..Default::default()
        }
    }
}

/// A record read from or written to a swath data stream
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A survey ping
    Survey(SurveyPing),
    /// A comment
    Comment(String),
    /// One or more asynchronous ancillary samples
    Ancillary {
        /// The kind of record that carried the samples
        kind: RecordKind,
        /// The samples
        samples: Vec<AncillarySample>,
    },
    /// A record the reader does not interpret
    Unknown {
        /// The format-specific type code
        code: u32,
    },
}

impl Record {
    /// The kind of this record
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Survey(_) => RecordKind::Survey,
            Record::Comment(_) => RecordKind::Comment,
            Record::Ancillary { kind, .. } => *kind,
            Record::Unknown { .. } => RecordKind::Unknown,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_code(kind.code()), kind);
        }
        assert_eq!(RecordKind::from_code(0), RecordKind::Unknown);
        assert_eq!(RecordKind::from_code(200), RecordKind::Unknown);
    }

    #[test]
    fn kind_names_match_serde() {
        let json = serde_json::to_string(&RecordKind::SensorDepth).unwrap();
        assert_eq!(json, "\"sensor_depth\"");
        assert_eq!(RecordKind::SensorDepth.name(), "sensordepth");
    }

    #[test]
    fn flagged_beams_are_not_good() {
        let mut beam = Beam::new(50.0, 100.0, 0.0, 0.0);
        assert!(beam.is_good());
        beam.flag = flag::MANUAL;
        assert!(!beam.is_good());
    }
}
