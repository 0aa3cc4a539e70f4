//! Parsing Edgetech JSF files
//!
//! Only the messages that carry a ping or ancillary data are decoded:
//! sonar data (80), pitch/roll data (2020) and NMEA strings (2002). Every
//! other message is skipped and reported as an unknown record.
use super::resync;
use crate::error::{PreprocessError, Result};
use crate::model::{AncillarySample, Record, RecordKind, SurveyPing};
use binrw::io;
use binrw::{binread, BinRead, Error as BinError};

const MAGIC: &[u8; 2] = b"\x01\x16";

/// Tenths of a knot to km/hr
const DECIKNOTS_TO_KMH: f64 = 0.1852;

/// A struct representing a message in a JSF file
#[binread]
#[br(little, magic = b"\x01\x16")]
#[derive(Debug, PartialEq)]
pub struct Message {
    protocol: u8,
    session_identifier: u8,
    message_type: u16,
    command_type: u8,
    subsystem_number: u8,
    channel_number: u8,
    #[br(pad_after = 2)]
    sequence_number: u8,
    message_size: i32,
    #[br(args {message_size, message_type})]
    data: MessageType,
}

impl Message {
    /// The JSF message type number
    pub fn message_type(&self) -> u16 {
        self.message_type
    }
}

/// The body of a message this reader does not decode
#[binread]
#[br(little, import {message_size: i32})]
#[derive(Debug, PartialEq)]
pub struct UnknownMessage {
    #[br(count = message_size)]
    data: Vec<u8>,
}

/// The fields of a sonar data header that describe the platform
#[binread]
#[br(little, import {message_size: i32})]
#[derive(Debug, PartialEq)]
pub struct SonarData {
    time: i32,
    #[br(pad_before = 44)]
    heave: f32,
    #[br(pad_before = 28)]
    x_position: i32,
    y_position: i32,
    #[br(pad_after = 46)]
    coordinate_units: i16,
    depth: i32,
    #[br(pad_before = 4)]
    altitude: i32,
    sound_speed: f32,
    #[br(pad_before = 20)]
    heading: u16,
    pitch: i16,
    roll: i16,
    #[br(pad_before = 16)]
    speed: i16,
    #[br(pad_before = 4, pad_after = message_size - 204)]
    milliseconds_today: u32,
}

impl SonarData {
    /// Seconds since the epoch, with milliseconds
    pub fn time_d(&self) -> f64 {
        f64::from(self.time) + f64::from(self.milliseconds_today % 1000) / 1000.0
    }

    /// Longitude and latitude, if the position is geographic
    pub fn lonlat(&self) -> Option<(f64, f64)> {
        // minutes of arc times 10000
        if self.coordinate_units == 2 {
            Some((
                f64::from(self.x_position) / 600000.0,
                f64::from(self.y_position) / 600000.0,
            ))
        } else {
            None
        }
    }

    fn to_ping(&self) -> SurveyPing {
        let (longitude, latitude) = self.lonlat().unwrap_or((0.0, 0.0));
        let sensordepth = f64::from(self.depth) / 1000.0;
        let heave = f64::from(self.heave);
        SurveyPing {
            time_d: self.time_d(),
            longitude,
            latitude,
            speed: f64::from(self.speed) * DECIKNOTS_TO_KMH,
            heading: f64::from(self.heading) * 0.01,
            sensordepth,
            draft: sensordepth - heave,
            roll: f64::from(self.roll) * 180.0 / 32768.0,
            pitch: f64::from(self.pitch) * 180.0 / 32768.0,
            heave,
            altitude: f64::from(self.altitude) / 1000.0,
            soundspeed: f64::from(self.sound_speed),
            beams: Vec::new(),
        }
    }
}

/// A serial NMEA sentence logged by the topside
#[binread]
#[br(little, import {message_size: i32})]
#[derive(Debug, PartialEq)]
pub struct NMEAString {
    time: i32,
    milliseconds: i32,
    #[br(pad_after = 3)]
    source: u8,
    #[br(count = message_size - 12)]
    data: Vec<u8>,
}

impl NMEAString {
    /// Seconds since the epoch, with milliseconds
    pub fn time_d(&self) -> f64 {
        f64::from(self.time) + f64::from(self.milliseconds % 1000) / 1000.0
    }

    /// The sentence as text
    pub fn sentence(&self) -> String {
        String::from_utf8_lossy(&self.data)
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string()
    }
}

/// Attitude from the motion sensor in the towfish
#[binread]
#[br(little)]
#[derive(Debug, PartialEq)]
pub struct PitchRollData {
    time: i32,
    #[br(pad_after = 16)]
    milliseconds: i32,
    pitch: i16,
    #[br(pad_after = 4)]
    roll: i16,
    heave: i16,
    heading: u16,
    #[br(pad_after = 4)]
    validity_flag: i32,
}

impl PitchRollData {
    /// Seconds since the epoch, with milliseconds
    pub fn time_d(&self) -> f64 {
        f64::from(self.time) + f64::from(self.milliseconds % 1000) / 1000.0
    }

    fn is_valid(&self, bit: u32) -> bool {
        (self.validity_flag >> bit) & 1 == 1
    }

    /// Pitch in degrees, bow up positive
    pub fn pitch(&self) -> Option<f64> {
        self.is_valid(6).then(|| f64::from(self.pitch) * 180.0 / 32768.0)
    }

    /// Roll in degrees, starboard down positive
    pub fn roll(&self) -> Option<f64> {
        self.is_valid(7).then(|| f64::from(self.roll) * 180.0 / 32768.0)
    }

    /// Heave in meters
    pub fn heave(&self) -> Option<f64> {
        self.is_valid(8).then(|| f64::from(self.heave) / 1000.0)
    }

    /// Heading in degrees
    pub fn heading(&self) -> Option<f64> {
        self.is_valid(9).then(|| f64::from(self.heading) * 0.01)
    }

    fn to_sample(&self) -> AncillarySample {
        AncillarySample {
            roll: self.roll(),
            pitch: self.pitch(),
            heave: self.heave(),
            heading: self.heading(),
            ..AncillarySample::at(self.time_d())
        }
    }
}

/// The decoded body of a message
#[binread]
#[br(import {message_type: u16, message_size: i32})]
#[derive(Debug, PartialEq)]
pub enum MessageType {
    /// Sonar data
    #[br(pre_assert(message_type == 80))]
    M80 {
        /// The header of the trace
        #[br(args {message_size})]
        msg: SonarData,
    },
    /// Pitch and roll
    #[br(pre_assert(message_type == 2020))]
    M2020 {
        /// The attitude
        msg: PitchRollData,
    },
    /// NMEA string
    #[br(pre_assert(message_type == 2002))]
    M2002 {
        /// The sentence
        #[br(args {message_size})]
        msg: NMEAString,
    },
    /// Anything else
    M0 {
        /// The raw bytes
        #[br(args {message_size})]
        msg: UnknownMessage,
    },
}

/// Parse a `ddmm.mmmm` style NMEA coordinate with its hemisphere letter
fn nmea_degrees(value: &str, hemisphere: &str) -> Option<f64> {
    let v: f64 = value.parse().ok()?;
    let degrees = (v / 100.0).trunc();
    let d = degrees + (v - 100.0 * degrees) / 60.0;
    match hemisphere {
        "N" | "E" => Some(d),
        "S" | "W" => Some(-d),
        _ => None,
    }
}

/// Decode the navigation and heading sentences this reader understands
fn nmea_sample(time_d: f64, sentence: &str) -> Option<(RecordKind, AncillarySample)> {
    let body = sentence.split('*').next()?;
    let fields: Vec<&str> = body.split(',').collect();
    let tag = fields.first()?;
    if tag.len() < 6 || !tag.starts_with('$') {
        return None;
    }
    match tag.get(3..)? {
        "GGA" if fields.len() > 5 => {
            let latitude = nmea_degrees(fields[2], fields[3])?;
            let longitude = nmea_degrees(fields[4], fields[5])?;
            Some((
                RecordKind::Nav,
                AncillarySample {
                    longitude: Some(longitude),
                    latitude: Some(latitude),
                    ..AncillarySample::at(time_d)
                },
            ))
        }
        "HDT" if fields.len() > 1 => {
            let heading: f64 = fields[1].parse().ok()?;
            Some((
                RecordKind::Heading,
                AncillarySample {
                    heading: Some(heading),
                    ..AncillarySample::at(time_d)
                },
            ))
        }
        _ => None,
    }
}

// Record interface
impl From<Message> for Record {
    fn from(msg: Message) -> Self {
        match &msg.data {
            // the starboard channel repeats the port channel navigation
            MessageType::M80 { msg: sd } if msg.channel_number == 0 => {
                Record::Survey(sd.to_ping())
            }
            MessageType::M2020 { msg: pr } => Record::Ancillary {
                kind: RecordKind::Attitude,
                samples: vec![pr.to_sample()],
            },
            MessageType::M2002 { msg: nmea } => {
                match nmea_sample(nmea.time_d(), &nmea.sentence()) {
                    Some((kind, sample)) => Record::Ancillary {
                        kind,
                        samples: vec![sample],
                    },
                    None => Record::Unknown { code: 2002 },
                }
            }
            _ => Record::Unknown {
                code: u32::from(msg.message_type),
            },
        }
    }
}

/// A JSF file read as swath records
///
/// Messages that fail to parse are reported as malformed and the reader
/// moves on to the next message header.
pub struct JsfRecords<T: io::Read + io::Seek> {
    reader: T,
    done: bool,
}

impl<T: io::Read + io::Seek> JsfRecords<T> {
    /// Wrap a reader positioned at the start of a message
    pub fn new(reader: T) -> Self {
        JsfRecords {
            reader,
            done: false,
        }
    }

    /// Skip past a message that failed at `start`
    fn recover(&mut self, start: u64, e: BinError) -> Result<Record> {
        match resync(&mut self.reader, start, MAGIC) {
            Ok(true) => {}
            Ok(false) => self.done = true,
            Err(err) => {
                self.done = true;
                return Err(err);
            }
        }
        Err(PreprocessError::Malformed(format!(
            "bad jsf message at byte {}: {}",
            start, e
        )))
    }
}

impl<T: io::Read + io::Seek> Iterator for JsfRecords<T> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let start = match self.reader.stream_position() {
            Ok(p) => p,
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        };
        match Message::read(&mut self.reader) {
            Ok(msg) => Some(Ok(Record::from(msg))),
            Err(e) if e.is_eof() => {
                self.done = true;
                None
            }
            Err(e) => Some(self.recover(start, e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use binrw::io::Cursor;

    fn header(message_type: u16, channel: u8, size: i32) -> Vec<u8> {
        let mut b = vec![0x01, 0x16, 0x0b, 0x00];
        b.extend_from_slice(&message_type.to_le_bytes());
        b.extend_from_slice(&[0, 0, channel, 0, 0, 0]);
        b.extend_from_slice(&size.to_le_bytes());
        b
    }

    fn put<const N: usize>(body: &mut [u8], offset: usize, bytes: [u8; N]) {
        body[offset..offset + N].copy_from_slice(&bytes);
    }

    fn sonar_message(channel: u8) -> Vec<u8> {
        let mut body = vec![0u8; 240 + 8];
        put(&mut body, 0, 1_600_000_000i32.to_le_bytes());
        put(&mut body, 48, 0.25f32.to_le_bytes());
        put(&mut body, 80, (-73_200_000i32).to_le_bytes());
        put(&mut body, 84, 21_900_000i32.to_le_bytes());
        put(&mut body, 88, 2i16.to_le_bytes());
        put(&mut body, 136, 12_500i32.to_le_bytes());
        put(&mut body, 144, 30_000i32.to_le_bytes());
        put(&mut body, 148, 1500.0f32.to_le_bytes());
        put(&mut body, 172, 9000u16.to_le_bytes());
        put(&mut body, 174, 16384i16.to_le_bytes());
        put(&mut body, 176, (-8192i16).to_le_bytes());
        put(&mut body, 194, 50i16.to_le_bytes());
        put(&mut body, 200, 86_400_250u32.to_le_bytes());
        let mut m = header(80, channel, body.len() as i32);
        m.extend(body);
        m
    }

    fn attitude_message() -> Vec<u8> {
        let mut body = vec![0u8; 44];
        put(&mut body, 0, 1_600_000_001i32.to_le_bytes());
        put(&mut body, 4, 500i32.to_le_bytes());
        put(&mut body, 24, 1820i16.to_le_bytes());
        put(&mut body, 26, (-910i16).to_le_bytes());
        put(&mut body, 32, 150i16.to_le_bytes());
        put(&mut body, 34, 27000u16.to_le_bytes());
        put(&mut body, 36, 0x00c0i32.to_le_bytes());
        let mut m = header(2020, 0, 44);
        m.extend(body);
        m
    }

    fn nmea_message(sentence: &str) -> Vec<u8> {
        let mut body = vec![0u8; 12];
        put(&mut body, 0, 1_600_000_002i32.to_le_bytes());
        body.extend_from_slice(sentence.as_bytes());
        let mut m = header(2002, 0, body.len() as i32);
        m.extend(body);
        m
    }

    fn read(bytes: Vec<u8>) -> Vec<Result<Record>> {
        JsfRecords::new(Cursor::new(bytes)).collect()
    }

    #[test]
    fn sonar_data_becomes_a_ping() {
        let recs = read(sonar_message(0));
        let ping = match &recs[0] {
            Ok(Record::Survey(p)) => p,
            other => panic!("unexpected record {:?}", other),
        };
        assert_abs_diff_eq!(ping.time_d, 1_600_000_000.25, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.longitude, -122.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.latitude, 36.5, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.sensordepth, 12.5, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.draft, 12.25, epsilon = 1e-6);
        assert_abs_diff_eq!(ping.altitude, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.soundspeed, 1500.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.heading, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.pitch, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.roll, -45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ping.speed, 9.26, epsilon = 1e-9);
        assert!(ping.beams.is_empty());
    }

    #[test]
    fn starboard_channel_is_not_a_second_ping() {
        let recs = read(sonar_message(1));
        assert!(matches!(recs[0], Ok(Record::Unknown { code: 80 })));
    }

    #[test]
    fn pitch_roll_respects_validity() {
        let recs = read(attitude_message());
        match &recs[0] {
            Ok(Record::Ancillary { kind, samples }) => {
                assert_eq!(*kind, RecordKind::Attitude);
                let s = samples[0];
                assert_abs_diff_eq!(s.time_d, 1_600_000_001.5, epsilon = 1e-9);
                assert_abs_diff_eq!(s.pitch.unwrap(), 1820.0 * 180.0 / 32768.0);
                assert_abs_diff_eq!(s.roll.unwrap(), -910.0 * 180.0 / 32768.0);
                assert_eq!(s.heave, None);
                assert_eq!(s.heading, None);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn nmea_gga_and_hdt() {
        let mut bytes = nmea_message("$GPGGA,120000.00,3630.0000,N,12200.0000,W,1,08,0.9,10.0,M,,,,*47\r\n");
        bytes.extend(nmea_message("$HEHDT,274.5,T*2A"));
        bytes.extend(nmea_message("$GPZDA,120000.00,01,01,2020,00,00*60"));
        let recs: Vec<Record> = read(bytes).into_iter().map(|r| r.unwrap()).collect();
        match &recs[0] {
            Record::Ancillary { kind, samples } => {
                assert_eq!(*kind, RecordKind::Nav);
                assert_abs_diff_eq!(samples[0].latitude.unwrap(), 36.5, epsilon = 1e-12);
                assert_abs_diff_eq!(samples[0].longitude.unwrap(), -122.0, epsilon = 1e-12);
            }
            other => panic!("unexpected record {:?}", other),
        }
        match &recs[1] {
            Record::Ancillary { kind, samples } => {
                assert_eq!(*kind, RecordKind::Heading);
                assert_eq!(samples[0].heading, Some(274.5));
            }
            other => panic!("unexpected record {:?}", other),
        }
        assert_eq!(recs[2], Record::Unknown { code: 2002 });
    }

    #[test]
    fn reader_recovers_after_garbage() {
        let mut bytes = attitude_message();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        bytes.extend(sonar_message(0));
        let recs = read(bytes);
        assert_eq!(recs.len(), 3);
        assert!(recs[1].is_err());
        assert!(matches!(recs[2], Ok(Record::Survey(_))));
    }
}
