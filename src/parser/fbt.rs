//! Fast bathymetry side files
//!
//! A reduced copy of the survey pings: navigation, attitude and the
//! flag, depth and position of each beam, in single precision where the
//! full record uses double.
use crate::error::{PreprocessError, Result};
use crate::model::SurveyPing;
use binrw::io;
use std::io::BufWriter;
use binrw::{binrw, BinRead, BinResult, BinWrite};
use std::fs::File;
use std::path::Path;

/// One beam of a fast bathymetry record
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FbtBeam {
    /// The beam flag
    pub flag: u8,
    /// Depth in meters
    pub depth: f32,
    /// Acrosstrack distance in meters
    pub acrosstrack: f32,
    /// Alongtrack distance in meters
    pub alongtrack: f32,
}

/// One ping of a fast bathymetry file
#[binrw]
#[brw(big, magic = b"FB")]
#[derive(Debug, Clone, PartialEq)]
pub struct FbtRecord {
    /// Ping time in seconds since the Unix epoch
    pub time_d: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Heading in degrees
    pub heading: f32,
    /// Speed in km/hr
    pub speed: f32,
    /// Sensor depth in meters
    pub sensordepth: f32,
    /// Roll in degrees
    pub roll: f32,
    /// Pitch in degrees
    pub pitch: f32,
    /// Heave in meters
    pub heave: f32,
    /// Altitude in meters
    pub altitude: f32,
    #[br(temp)]
    #[bw(calc = beams.len() as u32)]
    nbeams: u32,
    /// The beams
    #[br(count = nbeams)]
    pub beams: Vec<FbtBeam>,
}

impl From<&SurveyPing> for FbtRecord {
    fn from(p: &SurveyPing) -> Self {
        FbtRecord {
            time_d: p.time_d,
            longitude: p.longitude,
            latitude: p.latitude,
            heading: p.heading as f32,
            speed: p.speed as f32,
            sensordepth: p.sensordepth as f32,
            roll: p.roll as f32,
            pitch: p.pitch as f32,
            heave: p.heave as f32,
            altitude: p.altitude as f32,
            beams: p
                .beams
                .iter()
                .map(|b| FbtBeam {
                    flag: b.flag,
                    depth: b.depth as f32,
                    acrosstrack: b.acrosstrack as f32,
                    alongtrack: b.alongtrack as f32,
                })
                .collect(),
        }
    }
}

/// Writes survey pings as fast bathymetry records
pub struct FbtWriter<W: io::Write + io::Seek> {
    writer: W,
    count: usize,
}

impl<W: io::Write + io::Seek> FbtWriter<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        FbtWriter { writer, count: 0 }
    }

    /// Write one ping
    pub fn put(&mut self, ping: &SurveyPing) -> Result<()> {
        FbtRecord::from(ping).write(&mut self.writer)?;
        self.count += 1;
        Ok(())
    }

    /// The number of pings written
    pub fn count(&self) -> usize {
        self.count
    }

    /// Flush and give back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl FbtWriter<BufWriter<File>> {
    /// Create a file for writing
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::create(path).map_err(|source| PreprocessError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(FbtWriter::new(BufWriter::new(f)))
    }
}

/// Iterates over the records of a fast bathymetry file
pub struct FbtFile<T: io::Read + io::Seek> {
    /// The underlying reader
    pub reader: T,
}

impl<T: io::Read + io::Seek> Iterator for FbtFile<T> {
    type Item = BinResult<FbtRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match FbtRecord::read(&mut self.reader) {
            Ok(rec) => Some(Ok(rec)),
            Err(e) if e.is_eof() => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{flag, Beam};
    use binrw::io::Cursor;

    #[test]
    fn records_are_reduced_copies() {
        let ping = SurveyPing {
            time_d: 1.5e9,
            longitude: -122.123456789,
            latitude: 36.5,
            heading: 90.25,
            beams: vec![
                Beam::new(1000.5, -20.0, 1.0, 55.0),
                Beam {
                    flag: flag::FILTER,
                    ..Beam::new(999.0, 20.0, 1.0, 55.0)
                },
            ],
            ..Default::default()
        };
        let mut w = FbtWriter::new(Cursor::new(Vec::new()));
        w.put(&ping).unwrap();
        w.put(&ping).unwrap();
        assert_eq!(w.count(), 2);
        let bytes = w.finish().unwrap().into_inner();
        // magic, 3 doubles, 7 floats, count, 13 bytes per beam
        assert_eq!(bytes.len(), 2 * (2 + 24 + 28 + 4 + 2 * 13));

        let recs: Vec<FbtRecord> = FbtFile {
            reader: Cursor::new(bytes),
        }
        .collect::<BinResult<_>>()
        .unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].longitude, -122.123456789);
        assert_eq!(recs[0].heading, 90.25);
        assert_eq!(recs[0].beams[1].flag, flag::FILTER);
        assert_eq!(recs[0].beams[0].depth, 1000.5);
    }
}
