//! The native framed swath format
//!
//! A file is a sequence of frames. Each frame is the magic bytes `SR`, a
//! one byte record kind, a big-endian `u32` body length and the body. The
//! length lets a reader step over a body it cannot decode.
use super::{resync, SwathWriter};
use crate::error::{PreprocessError, Result};
use crate::model::{AncillarySample, Beam, Record, RecordKind, SurveyPing};
use binrw::io::{self, Cursor};
use std::io::BufWriter;
use binrw::{binrw, BinRead, BinWrite};
use std::fs::File;
use std::path::Path;

const MAGIC: &[u8; 2] = b"SR";

/// More beams than any multibeam produces
const MAX_BEAMS: u32 = 1 << 16;

/// One frame of the file
#[binrw]
#[brw(big, magic = b"SR")]
#[derive(Debug, PartialEq)]
struct Frame {
    kind: u8,
    #[br(temp)]
    #[bw(calc = body.len() as u32)]
    length: u32,
    #[br(count = length)]
    body: Vec<u8>,
}

#[binrw]
#[brw(big)]
#[derive(Debug, PartialEq)]
struct BeamBody {
    flag: u8,
    depth: f64,
    acrosstrack: f64,
    alongtrack: f64,
    amplitude: f64,
}

#[binrw]
#[brw(big)]
#[derive(Debug, PartialEq)]
struct PingBody {
    time_d: f64,
    longitude: f64,
    latitude: f64,
    speed: f64,
    heading: f64,
    sensordepth: f64,
    draft: f64,
    roll: f64,
    pitch: f64,
    heave: f64,
    altitude: f64,
    soundspeed: f64,
    #[br(temp, assert(nbeams <= MAX_BEAMS))]
    #[bw(calc = beams.len() as u32)]
    nbeams: u32,
    #[br(count = nbeams)]
    beams: Vec<BeamBody>,
}

/// A sample with a presence mask over its ten optional values
#[binrw]
#[brw(big)]
#[derive(Debug, PartialEq)]
struct SampleBody {
    time_d: f64,
    mask: u16,
    values: [f64; 10],
}

#[binrw]
#[brw(big)]
#[derive(Debug, PartialEq)]
struct AncillaryBody {
    #[br(temp, assert(count <= MAX_BEAMS))]
    #[bw(calc = samples.len() as u32)]
    count: u32,
    #[br(count = count)]
    samples: Vec<SampleBody>,
}

#[binrw]
#[brw(big)]
#[derive(Debug, PartialEq)]
struct UnknownBody {
    code: u32,
}

impl From<&SurveyPing> for PingBody {
    fn from(p: &SurveyPing) -> Self {
        PingBody {
            time_d: p.time_d,
            longitude: p.longitude,
            latitude: p.latitude,
            speed: p.speed,
            heading: p.heading,
            sensordepth: p.sensordepth,
            draft: p.draft,
            roll: p.roll,
            pitch: p.pitch,
            heave: p.heave,
            altitude: p.altitude,
            soundspeed: p.soundspeed,
            beams: p
                .beams
                .iter()
                .map(|b| BeamBody {
                    flag: b.flag,
                    depth: b.depth,
                    acrosstrack: b.acrosstrack,
                    alongtrack: b.alongtrack,
                    amplitude: b.amplitude,
                })
                .collect(),
        }
    }
}

impl From<PingBody> for SurveyPing {
    fn from(p: PingBody) -> Self {
        SurveyPing {
            time_d: p.time_d,
            longitude: p.longitude,
            latitude: p.latitude,
            speed: p.speed,
            heading: p.heading,
            sensordepth: p.sensordepth,
            draft: p.draft,
            roll: p.roll,
            pitch: p.pitch,
            heave: p.heave,
            altitude: p.altitude,
            soundspeed: p.soundspeed,
            beams: p
                .beams
                .into_iter()
                .map(|b| Beam {
                    flag: b.flag,
                    depth: b.depth,
                    acrosstrack: b.acrosstrack,
                    alongtrack: b.alongtrack,
                    amplitude: b.amplitude,
                })
                .collect(),
        }
    }
}

impl From<&AncillarySample> for SampleBody {
    fn from(s: &AncillarySample) -> Self {
        let fields = [
            s.longitude,
            s.latitude,
            s.speed,
            s.heading,
            s.sensordepth,
            s.altitude,
            s.roll,
            s.pitch,
            s.heave,
            s.soundspeed,
        ];
        let mut mask = 0u16;
        let mut values = [0.0; 10];
        for (i, field) in fields.iter().enumerate() {
            if let Some(v) = field {
                mask |= 1 << i;
                values[i] = *v;
            }
        }
        SampleBody {
            time_d: s.time_d,
            mask,
            values,
        }
    }
}

impl From<SampleBody> for AncillarySample {
    fn from(b: SampleBody) -> Self {
        let get = |i: usize| {
            if b.mask & (1 << i) != 0 {
                Some(b.values[i])
            } else {
                None
            }
        };
        AncillarySample {
            time_d: b.time_d,
            longitude: get(0),
            latitude: get(1),
            speed: get(2),
            heading: get(3),
            sensordepth: get(4),
            altitude: get(5),
            roll: get(6),
            pitch: get(7),
            heave: get(8),
            soundspeed: get(9),
        }
    }
}

fn decode(frame: Frame) -> Result<Record> {
    let kind = RecordKind::from_code(frame.kind);
    let mut body = Cursor::new(frame.body);
    let malformed = |e: binrw::Error| PreprocessError::Malformed(format!("{} record: {}", kind, e));
    Ok(match kind {
        RecordKind::Survey => Record::Survey(PingBody::read(&mut body).map_err(malformed)?.into()),
        RecordKind::Comment => Record::Comment(String::from_utf8_lossy(body.get_ref()).into_owned()),
        RecordKind::Unknown => Record::Unknown {
            code: UnknownBody::read(&mut body).map_err(malformed)?.code,
        },
        kind => Record::Ancillary {
            kind,
            samples: AncillaryBody::read(&mut body)
                .map_err(malformed)?
                .samples
                .into_iter()
                .map(AncillarySample::from)
                .collect(),
        },
    })
}

fn encode(record: &Record) -> Result<Frame> {
    let mut body = Cursor::new(Vec::new());
    match record {
        Record::Survey(ping) => PingBody::from(ping).write(&mut body)?,
        Record::Comment(text) => body.get_mut().extend_from_slice(text.as_bytes()),
        Record::Ancillary { samples, .. } => AncillaryBody {
            samples: samples.iter().map(SampleBody::from).collect(),
        }
        .write(&mut body)?,
        Record::Unknown { code } => UnknownBody { code: *code }.write(&mut body)?,
    }
    Ok(Frame {
        kind: record.kind().code(),
        body: body.into_inner(),
    })
}

/// A reader over the frames of a native swath file
pub struct SdwFile<T: io::Read + io::Seek> {
    reader: T,
    done: bool,
}

impl<T: io::Read + io::Seek> SdwFile<T> {
    /// Wrap a reader positioned at the start of a frame
    pub fn new(reader: T) -> Self {
        SdwFile {
            reader,
            done: false,
        }
    }
}

impl<T: io::Read + io::Seek> Iterator for SdwFile<T> {
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
        match Frame::read(&mut self.reader) {
            Ok(frame) => Some(decode(frame)),
            Err(e) if e.is_eof() => None,
            Err(e) => {
                match resync(&mut self.reader, start, MAGIC) {
                    Ok(true) => {}
                    Ok(false) => self.done = true,
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
                Some(Err(PreprocessError::Malformed(format!(
                    "bad frame at byte {}: {}",
                    start, e
                ))))
            }
        }
    }
}

/// A writer of native swath files
pub struct SdwWriter<W: io::Write + io::Seek> {
    writer: W,
}

impl<W: io::Write + io::Seek> SdwWriter<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        SdwWriter { writer }
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl SdwWriter<BufWriter<File>> {
    /// Create a file for writing
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::create(path).map_err(|source| PreprocessError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(SdwWriter::new(BufWriter::new(f)))
    }
}

impl<W: io::Write + io::Seek> SwathWriter for SdwWriter<W> {
    fn put(&mut self, record: &Record) -> Result<()> {
        encode(record)?.write(&mut self.writer)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::flag;

    fn records() -> Vec<Record> {
        vec![
            Record::Comment("line 12 start".to_string()),
            Record::Ancillary {
                kind: RecordKind::Nav,
                samples: vec![AncillarySample {
                    longitude: Some(-122.0),
                    latitude: Some(36.5),
                    ..AncillarySample::at(1000.0)
                }],
            },
            Record::Survey(SurveyPing {
                time_d: 1000.5,
                longitude: -122.0,
                latitude: 36.5,
                heading: 45.0,
                sensordepth: 3.0,
                beams: vec![
                    Beam::new(100.0, -50.0, 0.0, 20.0),
                    Beam {
                        flag: flag::SONAR,
                        ..Beam::default()
                    },
                ],
                ..Default::default()
            }),
            Record::Unknown { code: 99 },
        ]
    }

    fn write_all(records: &[Record]) -> Vec<u8> {
        let mut w = SdwWriter::new(Cursor::new(Vec::new()));
        for r in records {
            w.put(r).unwrap();
        }
        w.close().unwrap();
        w.into_inner().into_inner()
    }

    #[test]
    fn written_records_read_back() {
        let recs = records();
        let bytes = write_all(&recs);
        let read: Vec<Record> = SdwFile::new(Cursor::new(bytes))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(read, recs);
    }

    #[test]
    fn absent_sample_values_stay_absent() {
        let bytes = write_all(&records()[1..2]);
        let read: Vec<Record> = SdwFile::new(Cursor::new(bytes))
            .collect::<Result<_>>()
            .unwrap();
        match &read[0] {
            Record::Ancillary { samples, .. } => {
                assert_eq!(samples[0].heading, None);
                assert_eq!(samples[0].latitude, Some(36.5));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn reader_skips_garbage_between_frames() {
        let recs = records();
        let mut bytes = write_all(&recs[..1]);
        bytes.extend_from_slice(b"\x00garbage\xff");
        bytes.extend(write_all(&recs[2..3]));
        let items: Vec<Result<Record>> = SdwFile::new(Cursor::new(bytes)).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(PreprocessError::Malformed(_))));
        assert_eq!(items[2].as_ref().unwrap(), &recs[2]);
    }

    #[test]
    fn undecodable_body_is_malformed_but_not_fatal() {
        let recs = records();
        let mut bytes = Vec::new();
        let mut w = Cursor::new(&mut bytes);
        Frame {
            kind: RecordKind::Survey.code(),
            body: vec![1, 2, 3],
        }
        .write(&mut w)
        .unwrap();
        bytes.extend(write_all(&recs[..1]));
        let items: Vec<Result<Record>> = SdwFile::new(Cursor::new(bytes)).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert_eq!(items[1].as_ref().unwrap(), &recs[0]);
    }
}
