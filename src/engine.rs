//! The two pass merge of ancillary data onto survey pings
//!
//! Pass one reads every input, gathers ancillary samples from text files and
//! from asynchronous records in the swath stream, and corrects each channel:
//! jump repair, then time latency, then smoothing. Pass two reads the inputs
//! again, interpolates the corrected channels onto each ping, moves the ping
//! onto the target sensor and writes the processed swath file along with its
//! side files.
use crate::ancillary;
use crate::config::{ChannelSource, KlugeConfig, PreprocessConfig};
use crate::error::{PreprocessError, Result};
use crate::filter::GaussianTimeFilter;
use crate::jumps::{JumpRepair, PingClock, RepairPolicy};
use crate::latency::{LatencyConvention, TimeLatencyModel};
use crate::model::{AncillaryChannel, AncillarySample, Record, RecordKind, SurveyPing};
use crate::parser::fbt::FbtWriter;
use crate::parser::{Fallback, Format, HookParams, PreprocessHook, SwathWriter};
use crate::platform::{fold_alongtrack, recompute_bathymetry, snell_rescale, PlatformModel};
use crate::series::{AncillarySeries, Blend};
use crate::sidefiles::{self, FnvLine, FnvWriter, SideFileWriter};
use std::io::BufWriter;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};

const NAV_BLENDS: [Blend; 3] = [Blend::Longitude, Blend::Linear, Blend::Linear];
const HEADING_BLENDS: [Blend; 1] = [Blend::Heading];
const SCALAR_BLENDS: [Blend; 1] = [Blend::Linear];
const ATTITUDE_BLENDS: [Blend; 3] = [Blend::Linear; 3];

/// Where the engine is in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Configured but not started
    Init,
    /// Gathering ancillary samples
    Pass1Scan,
    /// Correcting the gathered series
    Pass1Correct,
    /// Merging and writing
    Pass2Scan,
    /// Finished
    Terminal,
}

/// Record counts for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Records read, by kind
    pub read: BTreeMap<RecordKind, usize>,
    /// Records written, by kind
    pub written: BTreeMap<RecordKind, usize>,
    /// Records that could not be decoded
    pub malformed: usize,
}

impl PipelineStats {
    fn count_read(&mut self, kind: RecordKind) {
        *self.read.entry(kind).or_insert(0) += 1;
    }

    fn count_written(&mut self, kind: RecordKind) {
        *self.written.entry(kind).or_insert(0) += 1;
    }

    /// Records of a kind read
    pub fn read_of(&self, kind: RecordKind) -> usize {
        self.read.get(&kind).copied().unwrap_or(0)
    }

    /// Records of a kind written
    pub fn written_of(&self, kind: RecordKind) -> usize {
        self.written.get(&kind).copied().unwrap_or(0)
    }

    /// Add another set of counts to this one
    pub fn absorb(&mut self, other: &PipelineStats) {
        for (k, n) in &other.read {
            *self.read.entry(*k).or_insert(0) += n;
        }
        for (k, n) in &other.written {
            *self.written.entry(*k).or_insert(0) += n;
        }
        self.malformed += other.malformed;
    }

    fn log(&self, label: &str) {
        for (kind, n) in &self.read {
            info!("{}: {} {} records read", label, n, kind);
        }
        for (kind, n) in &self.written {
            info!("{}: {} {} records written", label, n, kind);
        }
        if self.malformed > 0 {
            info!("{}: {} malformed records", label, self.malformed);
        }
    }
}

/// Problems found in the data that did not stop the run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataAnomalies {
    /// Configured sources that produced no samples
    pub empty_sources: Vec<AncillaryChannel>,
    /// Ancillary samples out of order or repeated
    pub unordered_samples: usize,
    /// Ancillary samples patched or deleted by jump repair
    pub repaired_samples: usize,
    /// Survey timestamps patched by jump repair
    pub repaired_pings: usize,
    /// Lines of ancillary files that could not be parsed
    pub skipped_lines: usize,
    /// Input files that could not be read
    pub unreadable_inputs: usize,
}

impl DataAnomalies {
    /// The number of anomalies of every sort
    pub fn total(&self) -> usize {
        self.empty_sources.len()
            + self.unordered_samples
            + self.repaired_samples
            + self.repaired_pings
            + self.skipped_lines
            + self.unreadable_inputs
    }
}

/// The area covered by good navigation and good soundings, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwathBounds {
    /// Smallest longitude
    pub west: f64,
    /// Largest longitude
    pub east: f64,
    /// Smallest latitude
    pub south: f64,
    /// Largest latitude
    pub north: f64,
}

impl SwathBounds {
    fn point(lon: f64, lat: f64) -> SwathBounds {
        SwathBounds {
            west: lon,
            east: lon,
            south: lat,
            north: lat,
        }
    }

    fn include(&mut self, lon: f64, lat: f64) {
        self.west = self.west.min(lon);
        self.east = self.east.max(lon);
        self.south = self.south.min(lat);
        self.north = self.north.max(lat);
    }

    /// The area covered by one ping
    ///
    /// A ping within 0.005 degrees of the origin has no navigation and
    /// covers nothing.
    pub fn of_ping(ping: &SurveyPing) -> Option<SwathBounds> {
        let (lon, lat) = (ping.longitude, ping.latitude);
        if !(lon.is_finite() && lat.is_finite()) || (lon.abs() < 0.005 && lat.abs() < 0.005) {
            return None;
        }
        let mut bounds = SwathBounds::point(lon, lat);
        for beam in ping.beams.iter().filter(|b| b.is_good()) {
            let (lon, lat) = sidefiles::sounding_position(ping, beam.acrosstrack, beam.alongtrack);
            bounds.include(lon, lat);
        }
        Some(bounds)
    }

    /// Grow to cover another area
    pub fn merge(&mut self, other: &SwathBounds) {
        self.include(other.west, other.south);
        self.include(other.east, other.north);
    }
}

/// The outcome of processing one input file
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    /// The input file
    pub input: PathBuf,
    /// The processed file
    pub output: PathBuf,
    /// True if the output was already up to date or the input unreadable
    pub skipped: bool,
    /// Pass two counts for this file
    pub stats: PipelineStats,
    /// The area the processed pings cover
    pub bounds: Option<SwathBounds>,
}

/// The outcome of a run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSummary {
    /// Pass one counts over all inputs
    pub pass1: PipelineStats,
    /// Pass two counts over all inputs
    pub pass2: PipelineStats,
    /// Per file results, in input order
    pub files: Vec<FileSummary>,
    /// Corrected samples available per channel
    pub samples: BTreeMap<AncillaryChannel, usize>,
    /// Everything unusual about the data
    pub anomalies: DataAnomalies,
}

/// Interpolation cursors, one per channel
#[derive(Debug, Clone, Copy, Default)]
pub struct Cursors {
    nav: usize,
    sensordepth: usize,
    heading: usize,
    altitude: usize,
    attitude: usize,
    soundspeed: usize,
}

fn apply_beam_kluges(ping: &mut SurveyPing, kluges: &KlugeConfig) {
    if let Some(f) = kluges.beam_tweak {
        snell_rescale(ping, f, 1.0);
    }
    if let Some(f) = kluges.soundspeed_tweak {
        snell_rescale(ping, f, f);
        ping.soundspeed *= f;
    }
    if kluges.zero_alongtrack_angles {
        fold_alongtrack(ping);
    }
}

/// The ancillary series of a run
///
/// Missing optional values (speed, heave) are stored as NaN and never
/// copied onto a ping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncillaryStore {
    /// Longitude, latitude and speed
    pub nav: AncillarySeries<3>,
    /// Sensor depth
    pub sensordepth: AncillarySeries<1>,
    /// Heading
    pub heading: AncillarySeries<1>,
    /// Altitude
    pub altitude: AncillarySeries<1>,
    /// Roll, pitch and heave
    pub attitude: AncillarySeries<3>,
    /// Sound speed
    pub soundspeed: AncillarySeries<1>,
}

fn push_scalar(series: &mut AncillarySeries<1>, t: f64, value: Option<f64>) -> bool {
    match value {
        Some(v) => {
            series.append(t, [v]);
            true
        }
        None => false,
    }
}

fn finite(values: Option<[f64; 1]>) -> Option<f64> {
    values.map(|[v]| v).filter(|v| v.is_finite())
}

impl AncillaryStore {
    /// The number of samples held for a channel
    pub fn len(&self, channel: AncillaryChannel) -> usize {
        match channel {
            AncillaryChannel::Nav => self.nav.len(),
            AncillaryChannel::SensorDepth => self.sensordepth.len(),
            AncillaryChannel::Heading => self.heading.len(),
            AncillaryChannel::Altitude => self.altitude.len(),
            AncillaryChannel::Attitude => self.attitude.len(),
            AncillaryChannel::SoundSpeed => self.soundspeed.len(),
        }
    }

    /// Add the part of an asynchronous sample that belongs to `channel`
    ///
    /// Navigation fixes at zero time or at zero longitude or latitude are
    /// placeholders written by loggers without a fix and are dropped.
    /// Returns true if a sample was added.
    pub fn push(&mut self, channel: AncillaryChannel, s: &AncillarySample) -> bool {
        let t = s.time_d;
        match channel {
            AncillaryChannel::Nav => match (s.longitude, s.latitude) {
                (Some(lon), Some(lat)) if t > 0.0 && lon != 0.0 && lat != 0.0 => {
                    self.nav
                        .append(t, [lon, lat, s.speed.unwrap_or(f64::NAN)]);
                    true
                }
                _ => false,
            },
            AncillaryChannel::SensorDepth => push_scalar(&mut self.sensordepth, t, s.sensordepth),
            AncillaryChannel::Heading => push_scalar(&mut self.heading, t, s.heading),
            AncillaryChannel::Altitude => push_scalar(&mut self.altitude, t, s.altitude),
            AncillaryChannel::SoundSpeed => push_scalar(&mut self.soundspeed, t, s.soundspeed),
            AncillaryChannel::Attitude => match (s.roll, s.pitch) {
                (Some(roll), Some(pitch)) => {
                    self.attitude
                        .append(t, [roll, pitch, s.heave.unwrap_or(f64::NAN)]);
                    true
                }
                _ => false,
            },
        }
    }

    /// Overwrite the ping's values with those interpolated at its time
    ///
    /// Channels without samples leave the ping untouched. Returns the number
    /// of channels that contributed.
    pub fn merge(&self, ping: &mut SurveyPing, cursors: &mut Cursors) -> usize {
        let t = ping.time_d;
        let mut merged = 0;
        if let Some([lon, lat, speed]) = self.nav.interp(t, &mut cursors.nav, &NAV_BLENDS) {
            if lon.is_finite() && lat.is_finite() {
                ping.longitude = lon;
                ping.latitude = lat;
                merged += 1;
            }
            if speed.is_finite() {
                ping.speed = speed;
            }
        }
        if let Some(v) = finite(self.sensordepth.linear_interp(t, &mut cursors.sensordepth)) {
            ping.sensordepth = v;
            merged += 1;
        }
        if let Some(v) = finite(self.heading.interp(t, &mut cursors.heading, &HEADING_BLENDS)) {
            ping.heading = v;
            merged += 1;
        }
        if let Some(v) = finite(self.altitude.linear_interp(t, &mut cursors.altitude)) {
            ping.altitude = v;
            merged += 1;
        }
        if let Some([roll, pitch, heave]) = self.attitude.linear_interp(t, &mut cursors.attitude) {
            if roll.is_finite() && pitch.is_finite() {
                ping.roll = roll;
                ping.pitch = pitch;
                merged += 1;
            }
            if heave.is_finite() {
                ping.heave = heave;
            }
        }
        if let Some(v) = finite(self.soundspeed.linear_interp(t, &mut cursors.soundspeed)) {
            ping.soundspeed = v;
            merged += 1;
        }
        merged
    }
}

/// The corrections applied to one channel in pass one
struct Corrections<'a> {
    repair: Option<JumpRepair>,
    sensor_latency: Option<&'a TimeLatencyModel>,
    global_latency: Option<&'a TimeLatencyModel>,
    convention: LatencyConvention,
    filter: Option<GaussianTimeFilter>,
}

impl Corrections<'_> {
    fn apply<const K: usize>(
        &self,
        channel: AncillaryChannel,
        series: &mut AncillarySeries<K>,
        blends: &[Blend; K],
        anomalies: &mut DataAnomalies,
    ) {
        if series.is_empty() {
            return;
        }
        if let Some(repair) = &self.repair {
            let report = repair.apply(series);
            if report.total() > 0 {
                info!(
                    "{}: {} samples patched, {} deleted, {} compacted",
                    channel, report.patched, report.deleted, report.compacted
                );
            }
            anomalies.repaired_samples += report.total();
        }
        // sensor latency first, then the global model
        for model in self.sensor_latency.iter().chain(self.global_latency.iter()) {
            model.correct_series(series, self.convention);
        }
        let order = series.finalize();
        if !order.is_clean() {
            warn!(
                "{}: {} samples out of order, {} repeated times removed",
                channel, order.reversed, order.duplicates
            );
            anomalies.unordered_samples += order.reversed + order.duplicates;
        }
        if let Some(filter) = &self.filter {
            filter.apply(series, blends);
        }
    }
}

/// Name of the processed file for `input`
///
/// The output keeps the input's stem with the extension of the output
/// format. When that would overwrite the input an `r` is appended to the
/// stem.
pub fn output_path(input: &Path, output_directory: Option<&Path>, format: Format) -> PathBuf {
    let stem = input.file_stem().unwrap_or_else(|| OsStr::new("output"));
    let dir = match output_directory {
        Some(d) => d.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let ext = format.output_format().extension();
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(ext);
    let out = dir.join(&name);
    if out != input {
        return out;
    }
    let mut name = stem.to_os_string();
    name.push("r.");
    name.push(ext);
    dir.join(name)
}

/// Return true if `output` is non-empty and no older than `input`
fn is_up_to_date(input: &Path, output: &Path) -> bool {
    let (Ok(i), Ok(o)) = (std::fs::metadata(input), std::fs::metadata(output)) else {
        return false;
    };
    match (i.modified(), o.modified()) {
        (Ok(ti), Ok(to)) => o.len() > 0 && to >= ti,
        _ => false,
    }
}

type FileWriter = BufWriter<File>;

/// The outputs of one file in pass two
struct Outputs {
    swath: Box<dyn SwathWriter>,
    fbt: FbtWriter<FileWriter>,
    bsa: SideFileWriter<FileWriter>,
    fnv: FnvWriter<FileWriter>,
    sensors: Vec<(String, FnvWriter<FileWriter>)>,
}

impl Outputs {
    fn create(output: &Path, format: Format, sensors: &[String]) -> Result<Outputs> {
        Ok(Outputs {
            swath: format.output_format().create_writer(output)?,
            fbt: FbtWriter::create(sidefiles::side_path(output, sidefiles::FAST_BATHYMETRY))?,
            bsa: SideFileWriter::create(sidefiles::side_path(output, sidefiles::SYNC_ATTITUDE))?,
            fnv: FnvWriter::create(sidefiles::side_path(output, sidefiles::FAST_NAVIGATION))?,
            sensors: sensors
                .iter()
                .map(|id| -> Result<_> {
                    let w = FnvWriter::create(sidefiles::sensor_fnv_path(output, id))?;
                    Ok((id.clone(), w))
                })
                .collect::<Result<_>>()?,
        })
    }

    fn finish(mut self) -> Result<()> {
        if self.fnv.skipped() > 0 {
            warn!("{} navigation lines had no calendar date", self.fnv.skipped());
        }
        self.swath.close()?;
        self.fbt.finish()?;
        self.bsa.finish()?;
        self.fnv.finish()?;
        for (_, w) in self.sensors {
            w.finish()?;
        }
        Ok(())
    }
}

/// The preprocessing state machine
pub struct MergeEngine {
    config: PreprocessConfig,
    formats: Vec<Format>,
    platform: Option<PlatformModel>,
    target: Option<String>,
    latency: Option<TimeLatencyModel>,
    store: AncillaryStore,
    state: EngineState,
    anomalies: DataAnomalies,
}

impl MergeEngine {
    /// Check a configuration and prepare a run
    ///
    /// Every configuration problem is reported here, before any data are
    /// read.
    pub fn new(config: PreprocessConfig) -> Result<MergeEngine> {
        config.validate()?;
        for input in &config.input {
            if !input.is_file() {
                return Err(PreprocessError::Config(format!(
                    "input {} does not exist",
                    input.display()
                )));
            }
        }
        let formats = config
            .input
            .iter()
            .map(|p| config.format_of(p))
            .collect::<Result<Vec<_>>>()?;

        let mut platform = match &config.platform_file {
            Some(path) => Some(PlatformModel::load(path).map_err(|e| match e {
                PreprocessError::Open { path, source } => PreprocessError::Config(format!(
                    "unable to read platform file {}: {}",
                    path.display(),
                    source
                )),
                other => other,
            })?),
            None => None,
        };
        for channel in AncillaryChannel::ALL {
            if let Some(id) = &config.channels.get(channel).sensor {
                match platform.as_mut() {
                    Some(p) => p.sources.set(channel, id.clone()),
                    None => {
                        return Err(PreprocessError::Config(format!(
                            "a {} sensor is named but there is no platform file",
                            channel
                        )))
                    }
                }
            }
        }
        if let Some(id) = &config.target_sensor {
            match platform.as_mut() {
                Some(p) => p.target = Some(id.clone()),
                None => {
                    return Err(PreprocessError::Config(
                        "a target sensor is named but there is no platform file".to_string(),
                    ))
                }
            }
        }
        if let Some(p) = &platform {
            p.validate()?;
        }
        let target = platform.as_ref().and_then(|p| p.target.clone());
        let latency = config.time_latency.resolve()?.filter(|m| !m.is_zero());

        Ok(MergeEngine {
            config,
            formats,
            platform,
            target,
            latency,
            store: AncillaryStore::default(),
            state: EngineState::Init,
            anomalies: DataAnomalies::default(),
        })
    }

    /// The current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The ancillary series gathered so far
    pub fn store(&self) -> &AncillaryStore {
        &self.store
    }

    /// The platform after sensor overrides
    pub fn platform(&self) -> Option<&PlatformModel> {
        self.platform.as_ref()
    }

    /// Run both passes over every input
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.state != EngineState::Init {
            return Err(PreprocessError::Config(
                "an engine can only be run once".to_string(),
            ));
        }
        self.state = EngineState::Pass1Scan;
        let pass1 = self.pass1_scan()?;
        pass1.log("pass 1");

        self.state = EngineState::Pass1Correct;
        self.pass1_correct();
        let samples: BTreeMap<AncillaryChannel, usize> = AncillaryChannel::ALL
            .iter()
            .map(|c| (*c, self.store.len(*c)))
            .collect();
        for (channel, n) in &samples {
            info!("{} samples available: {}", channel, n);
        }

        self.state = EngineState::Pass2Scan;
        let files = self.pass2_scan()?;
        let mut pass2 = PipelineStats::default();
        for f in &files {
            pass2.absorb(&f.stats);
        }
        pass2.log("pass 2");

        self.state = EngineState::Terminal;
        if self.anomalies.total() > 0 {
            info!("{} data anomalies: {:?}", self.anomalies.total(), self.anomalies);
        }
        Ok(RunSummary {
            pass1,
            pass2,
            files,
            samples,
            anomalies: self.anomalies.clone(),
        })
    }

    /// The embedded record kind feeding a channel in files of `format`
    fn async_kind(&self, channel: AncillaryChannel, format: Format) -> Option<RecordKind> {
        match &self.config.channels.get(channel).source {
            Some(ChannelSource::Async { kind }) => Some(*kind),
            Some(ChannelSource::Off) | Some(ChannelSource::File { .. }) => None,
            None => format.default_async(channel),
        }
    }

    fn load_files(&mut self) -> Result<()> {
        for channel in AncillaryChannel::ALL {
            let Some(ChannelSource::File { path, format }) =
                self.config.channels.get(channel).source.clone()
            else {
                continue;
            };
            let report = match channel {
                AncillaryChannel::Nav => {
                    let (s, r) = ancillary::load_nav(&path, format)?;
                    self.store.nav = s;
                    r
                }
                AncillaryChannel::SensorDepth => {
                    let (s, r) = ancillary::load_sensordepth(&path, format)?;
                    self.store.sensordepth = s;
                    r
                }
                AncillaryChannel::Heading => {
                    let (s, r) = ancillary::load_heading(&path, format)?;
                    self.store.heading = s;
                    r
                }
                AncillaryChannel::Altitude => {
                    let (s, r) = ancillary::load_altitude(&path, format)?;
                    self.store.altitude = s;
                    r
                }
                AncillaryChannel::Attitude => {
                    let (s, r) = ancillary::load_attitude(&path, format)?;
                    self.store.attitude = s;
                    r
                }
                AncillaryChannel::SoundSpeed => {
                    let (s, r) = ancillary::load_soundspeed(&path, format)?;
                    self.store.soundspeed = s;
                    r
                }
            };
            info!(
                "read {} {} samples from {}",
                self.store.len(channel),
                channel,
                path.display()
            );
            self.anomalies.skipped_lines += report.skipped;
        }
        Ok(())
    }

    /// Gather ancillary samples and tally the records of every input
    fn pass1_scan(&mut self) -> Result<PipelineStats> {
        self.load_files()?;
        let mut stats = PipelineStats::default();
        for i in 0..self.config.input.len() {
            let path = self.config.input[i].clone();
            let format = self.formats[i];
            let reader = match format.open_reader(&path) {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping {}: {}", path.display(), e);
                    self.anomalies.unreadable_inputs += 1;
                    continue;
                }
            };
            let routes: Vec<(AncillaryChannel, RecordKind)> = AncillaryChannel::ALL
                .iter()
                .filter_map(|c| self.async_kind(*c, format).map(|k| (*c, k)))
                .collect();
            debug!("pass 1 reading {} as {}", path.display(), format);
            for record in reader {
                let record = match record {
                    Ok(r) => r,
                    Err(e) => {
                        debug!("{}: {}", path.display(), e);
                        stats.malformed += 1;
                        continue;
                    }
                };
                stats.count_read(record.kind());
                if let Record::Ancillary { kind, samples } = &record {
                    for (channel, _) in routes.iter().filter(|(_, k)| k == kind) {
                        for s in samples {
                            self.store.push(*channel, s);
                        }
                    }
                }
            }
        }
        for channel in AncillaryChannel::ALL {
            let configured = self.config.channels.get(channel).source.is_some();
            let off = matches!(
                self.config.channels.get(channel).source,
                Some(ChannelSource::Off)
            );
            if configured && !off && self.store.len(channel) == 0 {
                warn!("no {} samples found", channel);
                self.anomalies.empty_sources.push(channel);
            }
        }
        Ok(stats)
    }

    fn corrections(&self, channel: AncillaryChannel) -> Corrections<'_> {
        let jumps = &self.config.jumps;
        let repair = match (channel, jumps.sensordepth_reversal, jumps.ancillary) {
            (AncillaryChannel::SensorDepth, Some(t), _) => {
                Some(JumpRepair::new(t, RepairPolicy::DeleteReversal))
            }
            (_, _, Some(t)) => Some(JumpRepair::new(t, RepairPolicy::ForwardPatch)),
            _ => None,
        };
        let sensor_latency = self.platform.as_ref().and_then(|p| {
            let id = p.sources.get(channel)?;
            p.sensor(id).ok()?.time_latency.as_ref()
        });
        let global_latency = self
            .latency
            .as_ref()
            .filter(|_| self.config.time_latency.apply.contains(channel));
        let filter = Some(GaussianTimeFilter::new(self.config.filter.length))
            .filter(|f| !f.is_noop() && self.config.filter.apply.contains(channel));
        Corrections {
            repair,
            sensor_latency,
            global_latency,
            convention: self.config.time_latency.convention,
            filter,
        }
    }

    /// Repair, shift and smooth every channel
    fn pass1_correct(&mut self) {
        let mut store = std::mem::take(&mut self.store);
        let mut anomalies = std::mem::take(&mut self.anomalies);
        for channel in AncillaryChannel::ALL {
            let c = self.corrections(channel);
            let a = &mut anomalies;
            match channel {
                AncillaryChannel::Nav => c.apply(channel, &mut store.nav, &NAV_BLENDS, a),
                AncillaryChannel::SensorDepth => {
                    c.apply(channel, &mut store.sensordepth, &SCALAR_BLENDS, a)
                }
                AncillaryChannel::Heading => {
                    c.apply(channel, &mut store.heading, &HEADING_BLENDS, a)
                }
                AncillaryChannel::Altitude => {
                    c.apply(channel, &mut store.altitude, &SCALAR_BLENDS, a)
                }
                AncillaryChannel::Attitude => {
                    c.apply(channel, &mut store.attitude, &ATTITUDE_BLENDS, a)
                }
                AncillaryChannel::SoundSpeed => {
                    c.apply(channel, &mut store.soundspeed, &SCALAR_BLENDS, a)
                }
            }
        }
        self.store = store;
        self.anomalies = anomalies;
    }

    /// Merge and write every input
    fn pass2_scan(&mut self) -> Result<Vec<FileSummary>> {
        let mut files = Vec::with_capacity(self.config.input.len());
        for i in 0..self.config.input.len() {
            let summary = self.process_file(i)?;
            files.push(summary);
        }
        Ok(files)
    }

    fn process_file(&mut self, index: usize) -> Result<FileSummary> {
        let input = self.config.input[index].clone();
        let format = self.formats[index];
        let output = output_path(&input, self.config.output_directory.as_deref(), format);
        let mut summary = FileSummary {
            input: input.clone(),
            output: output.clone(),
            skipped: true,
            stats: PipelineStats::default(),
            bounds: None,
        };
        if self.config.skip_existing && is_up_to_date(&input, &output) {
            info!("{} is up to date, skipping", output.display());
            return Ok(summary);
        }
        let reader = match format.open_reader(&input) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping {}: {}", input.display(), e);
                return Ok(summary);
            }
        };
        info!("processing {} into {}", input.display(), output.display());
        sidefiles::remove_stale(&output);

        let sensors: Vec<String> = match (&self.platform, self.config.output_sensor_fnv) {
            (Some(p), true) => p.sensors.iter().map(|s| s.id.clone()).collect(),
            _ => Vec::new(),
        };
        let mut out = Outputs::create(&output, format, &sensors)?;
        let hook = format.preprocess_hook();
        debug!("{}: using the {} hook", input.display(), hook.name());
        let params = HookParams {
            target_sensor: self.target.clone(),
            no_change_survey: self.config.no_change_survey,
            kluges: self.config.kluges,
        };
        let mut clock = self.config.jumps.survey.map(PingClock::new);
        let mut cursors = Cursors::default();
        let mut target_cursor = 0;
        let mut global_cursor = 0;
        let mut span: Option<(f64, f64)> = None;

        for record in reader {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    debug!("{}: {}", input.display(), e);
                    summary.stats.malformed += 1;
                    continue;
                }
            };
            if let Record::Survey(ping) = &record {
                if !ping.time_d.is_finite() {
                    debug!("{}: survey ping at time {}", input.display(), ping.time_d);
                    summary.stats.malformed += 1;
                    continue;
                }
            }
            let kind = record.kind();
            summary.stats.count_read(kind);
            let record = match record {
                Record::Survey(mut ping) => {
                    if let Some(clock) = clock.as_mut() {
                        ping.time_d = clock.correct(ping.time_d);
                    }
                    self.correct_ping_time(&mut ping, &mut target_cursor, &mut global_cursor);
                    self.process_ping(&mut ping, &mut cursors, hook.as_ref(), &params, &mut out)?;
                    if let Some(b) = SwathBounds::of_ping(&ping) {
                        summary.bounds = Some(match summary.bounds {
                            Some(mut bounds) => {
                                bounds.merge(&b);
                                bounds
                            }
                            None => b,
                        });
                    }
                    span = Some(match span {
                        Some((a, b)) => (a.min(ping.time_d), b.max(ping.time_d)),
                        None => (ping.time_d, ping.time_d),
                    });
                    Record::Survey(ping)
                }
                other => other,
            };
            out.swath.put(&record)?;
            summary.stats.count_written(kind);
        }
        out.finish()?;
        if let Some(clock) = &clock {
            self.anomalies.repaired_pings += clock.repaired();
        }
        if let Some((start, end)) = span {
            self.write_async_files(&output, start, end)?;
        }
        summary.skipped = false;
        summary.stats.log(&input.display().to_string());
        if let Some(b) = &summary.bounds {
            info!(
                "{}: bounds {:.9}/{:.9}/{:.9}/{:.9}",
                output.display(),
                b.west,
                b.east,
                b.south,
                b.north
            );
        }
        Ok(summary)
    }

    /// Apply the target sensor latency and then the global latency
    fn correct_ping_time(&self, ping: &mut SurveyPing, target: &mut usize, global: &mut usize) {
        let conv = self.config.time_latency.convention;
        let target_model = match (&self.platform, &self.target) {
            (Some(p), Some(id)) => p.sensor(id).ok().and_then(|s| s.time_latency.as_ref()),
            _ => None,
        };
        if let Some(model) = target_model {
            ping.time_d = model.correct(ping.time_d, conv, target);
        }
        if let Some(model) = &self.latency {
            if self.config.time_latency.apply.survey {
                ping.time_d = model.correct(ping.time_d, conv, global);
            }
        }
    }

    fn process_ping(
        &self,
        ping: &mut SurveyPing,
        cursors: &mut Cursors,
        hook: &dyn PreprocessHook,
        params: &HookParams,
        out: &mut Outputs,
    ) -> Result<()> {
        let (roll0, pitch0, sensordepth0) = (ping.roll, ping.pitch, ping.sensordepth);
        if params.kluges.sensordepth_from_heave {
            ping.sensordepth = ping.heave;
            ping.heave = 0.0;
        }
        self.store.merge(ping, cursors);
        ping.draft = ping.sensordepth - ping.heave;

        let reference = match (&self.platform, out.sensors.is_empty()) {
            (Some(p), false) => Some(p.reference_pose(ping)?),
            _ => None,
        };

        if let Err(Fallback) = hook.try_preprocess(ping, self.platform.as_ref(), params) {
            if let (Some(p), Some(target)) = (&self.platform, &self.target) {
                p.transform_ping(target, ping)?;
            }
            if !self.config.no_change_survey {
                let (droll, dpitch) = if params.kluges.zero_attitude_correction {
                    (0.0, 0.0)
                } else {
                    (ping.roll - roll0, ping.pitch - pitch0)
                };
                if droll != 0.0 || dpitch != 0.0 || ping.sensordepth != sensordepth0 {
                    recompute_bathymetry(ping, sensordepth0, droll, dpitch);
                }
                apply_beam_kluges(ping, &params.kluges);
            }
            ping.draft = ping.sensordepth - ping.heave;
        }

        out.fbt.put(ping)?;
        out.bsa.put_attitude(ping.time_d, ping.roll, ping.pitch)?;
        out.fnv.put(&FnvLine::from_ping(ping))?;
        if let (Some(p), Some(reference)) = (&self.platform, &reference) {
            for (id, w) in out.sensors.iter_mut() {
                let pose = p.sensor_pose(id, reference)?;
                w.put(&FnvLine::from_pose(ping, &pose))?;
            }
        }
        Ok(())
    }

    /// Write the asynchronous side files covering one file's pings
    fn write_async_files(&self, output: &Path, start: f64, end: f64) -> Result<()> {
        let (start, end) = (start - sidefiles::ASYNC_MARGIN, end + sidefiles::ASYNC_MARGIN);
        if !self.store.heading.is_empty() {
            let path = sidefiles::side_path(output, sidefiles::ASYNC_HEADING);
            let n = sidefiles::write_scalar_file(&path, &self.store.heading, start, end)?;
            debug!("wrote {} heading samples to {}", n, path.display());
        }
        if !self.store.sensordepth.is_empty() {
            let path = sidefiles::side_path(output, sidefiles::ASYNC_SENSORDEPTH);
            let n = sidefiles::write_scalar_file(&path, &self.store.sensordepth, start, end)?;
            debug!("wrote {} sensordepth samples to {}", n, path.display());
        }
        if !self.store.attitude.is_empty() {
            let path = sidefiles::side_path(output, sidefiles::ASYNC_ATTITUDE);
            let n = sidefiles::write_attitude_file(&path, &self.store.attitude, start, end)?;
            debug!("wrote {} attitude samples to {}", n, path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Beam;
    use approx::assert_abs_diff_eq;

    #[test]
    fn nav_placeholders_are_dropped() {
        let mut store = AncillaryStore::default();
        let fix = AncillarySample {
            longitude: Some(-122.0),
            latitude: Some(36.0),
            ..AncillarySample::at(100.0)
        };
        assert!(store.push(AncillaryChannel::Nav, &fix));
        let zero_time = AncillarySample { time_d: 0.0, ..fix };
        assert!(!store.push(AncillaryChannel::Nav, &zero_time));
        let zero_lon = AncillarySample {
            longitude: Some(0.0),
            ..fix
        };
        assert!(!store.push(AncillaryChannel::Nav, &zero_lon));
        // a nav sample carries nothing for the other channels
        assert!(!store.push(AncillaryChannel::Heading, &fix));
        assert_eq!(store.len(AncillaryChannel::Nav), 1);
        assert!(store.nav.samples()[0].values[2].is_nan());
    }

    #[test]
    fn merge_interpolates_onto_pings() {
        let mut store = AncillaryStore::default();
        store.nav = AncillarySeries::from_parts(
            &[0.0, 2.0, 4.0],
            &[
                [10.0000, 45.0, f64::NAN],
                [10.0002, 45.0, f64::NAN],
                [10.0004, 45.0, f64::NAN],
            ],
        );
        store.heading = AncillarySeries::from_parts(&[0.0, 4.0], &[[358.0], [2.0]]);
        let mut cursors = Cursors::default();
        let expect = [10.0000, 10.0001, 10.0002, 10.0003, 10.0004];
        for (t, lon) in expect.iter().enumerate() {
            let mut ping = SurveyPing {
                time_d: t as f64,
                speed: 5.0,
                altitude: 12.0,
                ..Default::default()
            };
            let merged = store.merge(&mut ping, &mut cursors);
            assert_eq!(merged, 2);
            assert_abs_diff_eq!(ping.longitude, *lon, epsilon = 1e-9);
            // no speed in the series, no altitude samples
            assert_eq!(ping.speed, 5.0);
            assert_eq!(ping.altitude, 12.0);
            if t == 2 {
                assert_abs_diff_eq!(ping.heading, 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn empty_store_leaves_pings_alone() {
        let store = AncillaryStore::default();
        let mut ping = SurveyPing {
            time_d: 5.0,
            longitude: 1.0,
            roll: 2.0,
            beams: vec![Beam::new(10.0, 1.0, 0.0, 0.0)],
            ..Default::default()
        };
        let before = ping.clone();
        assert_eq!(store.merge(&mut ping, &mut Cursors::default()), 0);
        assert_eq!(ping, before);
    }

    #[test]
    fn bounds_cover_good_soundings() {
        let mut ping = SurveyPing {
            longitude: 10.0,
            latitude: 0.0,
            beams: vec![
                Beam::new(50.0, -100.0, 20.0, 0.0),
                Beam {
                    flag: crate::model::flag::MANUAL,
                    ..Beam::new(50.0, 900.0, 0.0, 0.0)
                },
            ],
            ..Default::default()
        };
        let b = SwathBounds::of_ping(&ping).unwrap();
        let (mtodeglon, mtodeglat) = crate::platform::coor_scale(0.0);
        assert_abs_diff_eq!(b.west, 10.0 - 100.0 * mtodeglon, epsilon = 1e-12);
        assert_eq!(b.east, 10.0);
        assert_eq!(b.south, 0.0);
        assert_abs_diff_eq!(b.north, 20.0 * mtodeglat, epsilon = 1e-12);

        let mut total = b;
        total.merge(&SwathBounds::of_ping(&SurveyPing {
            longitude: 11.0,
            latitude: -1.0,
            ..Default::default()
        })
        .unwrap());
        assert_eq!((total.east, total.south), (11.0, -1.0));

        ping.longitude = 0.001;
        ping.latitude = -0.001;
        assert_eq!(SwathBounds::of_ping(&ping), None);
    }

    #[test]
    fn output_names() {
        assert_eq!(
            output_path(Path::new("/d/line1.jsf"), None, Format::Jsf),
            PathBuf::from("/d/line1.sdw")
        );
        assert_eq!(
            output_path(Path::new("/d/line1.sdw"), None, Format::Sdw),
            PathBuf::from("/d/line1r.sdw")
        );
        assert_eq!(
            output_path(Path::new("/d/line1.sdw"), Some(Path::new("/out")), Format::Sdw),
            PathBuf::from("/out/line1.sdw")
        );
        assert_eq!(
            output_path(Path::new("line1.sdw"), None, Format::Sdw),
            PathBuf::from("line1r.sdw")
        );
    }

    #[test]
    fn corrections_run_in_order() {
        // the glitch is patched before the latency shift is applied
        let times = [0.0, 0.1, 0.2, 5.2, 0.4, 0.5];
        let values: Vec<[f64; 1]> = times.iter().map(|_| [1.0]).collect();
        let mut series = AncillarySeries::from_parts(&times, &values);
        let latency = TimeLatencyModel::Static(1.0);
        let c = Corrections {
            repair: Some(JumpRepair::new(0.05, RepairPolicy::ForwardPatch)),
            sensor_latency: None,
            global_latency: Some(&latency),
            convention: LatencyConvention::Subtract,
            filter: None,
        };
        let mut anomalies = DataAnomalies::default();
        c.apply(AncillaryChannel::SensorDepth, &mut series, &SCALAR_BLENDS, &mut anomalies);
        let got = series.times();
        let want = [-1.0, -0.9, -0.8, -0.7, -0.6, -0.5];
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want.iter()) {
            assert_abs_diff_eq!(*g, *w, epsilon = 1e-9);
        }
        assert_eq!(anomalies.repaired_samples, 1);
        assert_eq!(anomalies.unordered_samples, 0);
    }

    #[test]
    fn stats_accumulate() {
        let mut a = PipelineStats::default();
        a.count_read(RecordKind::Survey);
        a.count_read(RecordKind::Survey);
        a.count_written(RecordKind::Nav);
        let mut total = PipelineStats::default();
        total.absorb(&a);
        total.absorb(&a);
        assert_eq!(total.read_of(RecordKind::Survey), 4);
        assert_eq!(total.written_of(RecordKind::Nav), 2);
        assert_eq!(total.read_of(RecordKind::Heading), 0);
    }
}
