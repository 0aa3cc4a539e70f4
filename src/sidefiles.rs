//! Side files written next to each processed swath file
//!
//! The binary side files are plain sequences of big-endian entries with no
//! header. The navigation files are whitespace separated text, one line per
//! ping.
use crate::error::{PreprocessError, Result};
use crate::model::SurveyPing;
use crate::platform::{coor_scale, Pose};
use crate::series::AncillarySeries;
use binrw::io;
use std::io::BufWriter;
use binrw::{binrw, BinWrite};
use log::{debug, warn};
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Synchronous attitude, one entry per ping
pub const SYNC_ATTITUDE: &str = "bsa";
/// Asynchronous heading
pub const ASYNC_HEADING: &str = "bah";
/// Asynchronous sensor depth
pub const ASYNC_SENSORDEPTH: &str = "bas";
/// Asynchronous attitude
pub const ASYNC_ATTITUDE: &str = "baa";
/// Fast bathymetry
pub const FAST_BATHYMETRY: &str = "fbt";
/// Fast navigation
pub const FAST_NAVIGATION: &str = "fnv";

/// Side files that are stale once a swath file is reprocessed
const STALE: [&str; 8] = ["ata", "ath", "ats", "sta", "baa", "bah", "bas", "bsa"];

/// Asynchronous samples this far outside a file's pings are still written
pub const ASYNC_MARGIN: f64 = 10.0;

/// The path of a side file of `output`
pub fn side_path(output: &Path, extension: &str) -> PathBuf {
    let mut s = OsString::from(output.as_os_str());
    s.push(".");
    s.push(extension);
    PathBuf::from(s)
}

/// The navigation file for one platform sensor
pub fn sensor_fnv_path(output: &Path, sensor: &str) -> PathBuf {
    let mut s = OsString::from(output.as_os_str());
    s.push("_");
    s.push(sensor);
    s.push(".");
    s.push(FAST_NAVIGATION);
    PathBuf::from(s)
}

/// Delete the side files of `output` left by an earlier run
///
/// Returns the number of files removed.
pub fn remove_stale(output: &Path) -> usize {
    let mut removed = 0;
    for ext in STALE {
        let path = side_path(output, ext);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed stale {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("unable to remove {}: {}", path.display(), e),
        }
    }
    removed
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = File::create(path).map_err(|source| PreprocessError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(f))
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScalarEntry {
    time_d: f64,
    value: f32,
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct AttitudeEntry {
    time_d: f64,
    roll: f32,
    pitch: f32,
}

/// A binary side file of timestamped entries
pub struct SideFileWriter<W: io::Write + io::Seek> {
    writer: W,
    count: usize,
}

impl<W: io::Write + io::Seek> SideFileWriter<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        SideFileWriter { writer, count: 0 }
    }

    /// Append a `time value` entry
    pub fn put_scalar(&mut self, time_d: f64, value: f64) -> Result<()> {
        ScalarEntry {
            time_d,
            value: value as f32,
        }
        .write(&mut self.writer)?;
        self.count += 1;
        Ok(())
    }

    /// Append a `time roll pitch` entry
    pub fn put_attitude(&mut self, time_d: f64, roll: f64, pitch: f64) -> Result<()> {
        AttitudeEntry {
            time_d,
            roll: roll as f32,
            pitch: pitch as f32,
        }
        .write(&mut self.writer)?;
        self.count += 1;
        Ok(())
    }

    /// The number of entries written
    pub fn count(&self) -> usize {
        self.count
    }

    /// Flush and give back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl SideFileWriter<BufWriter<File>> {
    /// Create a side file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(SideFileWriter::new(create(path.as_ref())?))
    }
}

/// Write the samples of a scalar series between `start` and `end`
///
/// Samples with no value are left out. Returns the number written.
pub fn write_scalar_file(
    path: &Path,
    series: &AncillarySeries<1>,
    start: f64,
    end: f64,
) -> Result<usize> {
    let mut w = SideFileWriter::create(path)?;
    for s in series.window(start, end).filter(|s| s.values[0].is_finite()) {
        w.put_scalar(s.time_d, s.values[0])?;
    }
    let n = w.count();
    w.finish()?;
    Ok(n)
}

/// Write the roll and pitch of an attitude series between `start` and `end`
pub fn write_attitude_file(
    path: &Path,
    series: &AncillarySeries<3>,
    start: f64,
    end: f64,
) -> Result<usize> {
    let mut w = SideFileWriter::create(path)?;
    for s in series.window(start, end) {
        w.put_attitude(s.time_d, s.values[0], s.values[1])?;
    }
    let n = w.count();
    w.finish()?;
    Ok(n)
}

/// One line of a fast navigation file
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FnvLine {
    /// Seconds since the Unix epoch
    pub time_d: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Heading in degrees
    pub heading: f64,
    /// Speed in km/hr
    pub speed: f64,
    /// Draft in meters
    pub draft: f64,
    /// Roll in degrees
    pub roll: f64,
    /// Pitch in degrees
    pub pitch: f64,
    /// Heave in meters
    pub heave: f64,
    /// Longitude and latitude of the outermost port sounding
    pub port: (f64, f64),
    /// Longitude and latitude of the outermost starboard sounding
    pub starboard: (f64, f64),
}

/// The longitude and latitude of a ship frame offset from a ping's fix
pub fn sounding_position(ping: &SurveyPing, acrosstrack: f64, alongtrack: f64) -> (f64, f64) {
    let (mtodeglon, mtodeglat) = coor_scale(ping.latitude);
    let (sh, ch) = ping.heading.to_radians().sin_cos();
    (
        ping.longitude + ch * mtodeglon * acrosstrack + sh * mtodeglon * alongtrack,
        ping.latitude - sh * mtodeglat * acrosstrack + ch * mtodeglat * alongtrack,
    )
}

impl FnvLine {
    /// The navigation of a processed ping
    ///
    /// The swath edges are the good beams furthest to port and starboard,
    /// or the ping position when there are none.
    pub fn from_ping(ping: &SurveyPing) -> FnvLine {
        let good = || ping.beams.iter().filter(|b| b.is_good());
        let port = good().min_by(|a, b| a.acrosstrack.total_cmp(&b.acrosstrack));
        let starboard = good().max_by(|a, b| a.acrosstrack.total_cmp(&b.acrosstrack));
        let edge = |beam: Option<&crate::model::Beam>| match beam {
            Some(b) => sounding_position(ping, b.acrosstrack, b.alongtrack),
            None => (ping.longitude, ping.latitude),
        };
        FnvLine {
            time_d: ping.time_d,
            longitude: ping.longitude,
            latitude: ping.latitude,
            heading: ping.heading,
            speed: ping.speed,
            draft: ping.draft,
            roll: ping.roll,
            pitch: ping.pitch,
            heave: ping.heave,
            port: edge(port),
            starboard: edge(starboard),
        }
    }

    /// The navigation of one sensor at the time of a ping
    pub fn from_pose(ping: &SurveyPing, pose: &Pose) -> FnvLine {
        let at = (pose.position.longitude, pose.position.latitude);
        FnvLine {
            time_d: ping.time_d,
            longitude: at.0,
            latitude: at.1,
            heading: pose.orientation.heading,
            speed: ping.speed,
            draft: pose.position.depth - ping.heave,
            roll: pose.orientation.roll,
            pitch: pose.orientation.pitch,
            heave: ping.heave,
            port: at,
            starboard: at,
        }
    }
}

const FNV_HEADER: &str = "## <yyyy mm dd hh mm ss.ssssss> <epoch seconds> <longitude (deg)> \
<latitude (deg)> <heading (deg)> <speed (km/hr)> <draft (m)> <roll (deg)> <pitch (deg)> \
<heave (m)> <portlon (deg)> <portlat (deg)> <stbdlon (deg)> <stbdlat (deg)>";

/// Writes fast navigation text files
pub struct FnvWriter<W: Write> {
    writer: W,
    count: usize,
    skipped: usize,
}

impl<W: Write> FnvWriter<W> {
    /// Wrap a writer and write the column header
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{}", FNV_HEADER)?;
        Ok(FnvWriter {
            writer,
            count: 0,
            skipped: 0,
        })
    }

    /// Write one line
    ///
    /// A line whose time has no calendar date is left out and counted.
    pub fn put(&mut self, line: &FnvLine) -> Result<()> {
        let micros = (line.time_d * 1e6).round() as i128;
        let t = match OffsetDateTime::from_unix_timestamp_nanos(micros * 1000) {
            Ok(t) if line.time_d.is_finite() => t,
            _ => {
                debug!("no calendar date for time {}, line left out", line.time_d);
                self.skipped += 1;
                return Ok(());
            }
        };
        let seconds = f64::from(t.second()) + f64::from(t.microsecond()) / 1e6;
        writeln!(
            self.writer,
            "{:04} {:02} {:02} {:02} {:02} {:09.6}\t{:.6}\t{:15.10}\t{:15.10}\t{:7.3}\t{:6.3}\t{:.4}\t{:6.3}\t{:6.3}\t{:7.4}\t{:15.10}\t{:15.10}\t{:15.10}\t{:15.10}",
            t.year(),
            u8::from(t.month()),
            t.day(),
            t.hour(),
            t.minute(),
            seconds,
            line.time_d,
            line.longitude,
            line.latitude,
            line.heading,
            line.speed,
            line.draft,
            line.roll,
            line.pitch,
            line.heave,
            line.port.0,
            line.port.1,
            line.starboard.0,
            line.starboard.1,
        )?;
        self.count += 1;
        Ok(())
    }

    /// The number of lines written
    pub fn count(&self) -> usize {
        self.count
    }

    /// The number of lines left out for want of a calendar date
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Flush and give back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl FnvWriter<BufWriter<File>> {
    /// Create a navigation file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        FnvWriter::new(create(path.as_ref())?)
    }
}
