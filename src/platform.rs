//! Rigid platform geometry
//!
//! A platform is a set of sensors bolted to one rigid body. Offsets are in
//! meters in the body frame, x forward, y to starboard and z down, measured
//! from an arbitrary origin. One sensor may be named as the reference point
//! of the platform and one as the target, usually the sonar whose pings are
//! being processed.
//!
//! Angles are in degrees. Heading is clockwise from north, roll is positive
//! with starboard down and pitch is positive with the bow up.
use crate::error::{PreprocessError, Result};
use crate::latency::TimeLatencyModel;
use crate::model::{AncillaryChannel, SurveyPing};
use crate::series::{wrap_heading, wrap_longitude};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Local meters to degrees conversion factors at a latitude
///
/// Returns `(mtodeglon, mtodeglat)`, the degrees of longitude and latitude
/// spanned by one meter east and one meter north.
pub fn coor_scale(latitude: f64) -> (f64, f64) {
    let r = latitude.to_radians();
    let mtodeglon =
        1.0 / (111412.84 * r.cos() - 93.5 * (3.0 * r).cos() + 0.118 * (5.0 * r).cos()).abs();
    let mtodeglat = 1.0
        / (111132.92 - 559.82 * (2.0 * r).cos() + 1.175 * (4.0 * r).cos()
            + 0.0023 * (6.0 * r).cos())
        .abs();
    (mtodeglon, mtodeglat)
}

/// A translation in the body frame, in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LeverArm {
    /// Forward
    pub x: f64,
    /// Starboard
    pub y: f64,
    /// Down
    pub z: f64,
}

impl std::ops::Sub for LeverArm {
    type Output = LeverArm;

    fn sub(self, rhs: LeverArm) -> LeverArm {
        LeverArm {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl std::ops::Neg for LeverArm {
    type Output = LeverArm;

    fn neg(self) -> LeverArm {
        LeverArm {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

/// A geographic position with a depth below the sea surface
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Position {
    /// Longitude in degrees
    pub longitude: f64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Depth in meters, positive down
    pub depth: f64,
}

/// Heading, roll and pitch in degrees
///
/// Used both for the attitude of a platform and for the fixed angular
/// mounting offsets of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Orientation {
    /// Heading
    pub heading: f64,
    /// Roll
    pub roll: f64,
    /// Pitch
    pub pitch: f64,
}

impl Orientation {
    fn plus(self, offset: Orientation) -> Orientation {
        Orientation {
            heading: wrap_heading(self.heading + offset.heading),
            roll: self.roll + offset.roll,
            pitch: self.pitch + offset.pitch,
        }
    }

    fn minus(self, offset: Orientation) -> Orientation {
        Orientation {
            heading: wrap_heading(self.heading - offset.heading),
            roll: self.roll - offset.roll,
            pitch: self.pitch - offset.pitch,
        }
    }
}

/// Position and orientation together
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Where the point is
    pub position: Position,
    /// How the platform is oriented there
    pub orientation: Orientation,
}

/// One sensor mounted on the platform
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sensor {
    /// Unique name of the sensor
    pub id: String,
    /// Mounting position
    #[serde(default)]
    pub offset: LeverArm,
    /// Mounting angles
    #[serde(default)]
    pub attitude: Orientation,
    /// Delay between a measurement and its timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_latency: Option<TimeLatencyModel>,
}

/// The sensors that supply each ancillary quantity
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorSources {
    /// Navigation
    pub position: Option<String>,
    /// Sensor depth
    pub depth: Option<String>,
    /// Heading
    pub heading: Option<String>,
    /// Roll, pitch and heave
    pub attitude: Option<String>,
    /// Altitude
    pub altitude: Option<String>,
    /// Sound speed
    pub soundspeed: Option<String>,
}

impl SensorSources {
    /// The source sensor for a channel
    pub fn get(&self, channel: AncillaryChannel) -> Option<&str> {
        match channel {
            AncillaryChannel::Nav => self.position.as_deref(),
            AncillaryChannel::SensorDepth => self.depth.as_deref(),
            AncillaryChannel::Heading => self.heading.as_deref(),
            AncillaryChannel::Attitude => self.attitude.as_deref(),
            AncillaryChannel::Altitude => self.altitude.as_deref(),
            AncillaryChannel::SoundSpeed => self.soundspeed.as_deref(),
        }
    }

    /// Replace the source sensor for a channel
    pub fn set(&mut self, channel: AncillaryChannel, id: String) {
        let slot = match channel {
            AncillaryChannel::Nav => &mut self.position,
            AncillaryChannel::SensorDepth => &mut self.depth,
            AncillaryChannel::Heading => &mut self.heading,
            AncillaryChannel::Attitude => &mut self.attitude,
            AncillaryChannel::Altitude => &mut self.altitude,
            AncillaryChannel::SoundSpeed => &mut self.soundspeed,
        };
        *slot = Some(id);
    }

    fn ids(&self) -> impl Iterator<Item = &String> {
        [
            &self.position,
            &self.depth,
            &self.heading,
            &self.attitude,
            &self.altitude,
            &self.soundspeed,
        ]
        .into_iter()
        .flatten()
    }
}

/// The sensors of a platform and their roles
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PlatformModel {
    /// Every sensor on the platform
    pub sensors: Vec<Sensor>,
    /// The sensor whose position stands for the platform
    #[serde(default)]
    pub reference: Option<String>,
    /// The sensor that pings are moved to
    #[serde(default)]
    pub target: Option<String>,
    /// Which sensor supplies each ancillary quantity
    #[serde(default)]
    pub sources: SensorSources,
}

/// Rotate a body frame offset into north, east and down
///
/// The rotation applies roll, then pitch, then heading.
pub fn rotate_offset(lever: LeverArm, orientation: Orientation) -> (f64, f64, f64) {
    let (sh, ch) = orientation.heading.to_radians().sin_cos();
    let (sr, cr) = orientation.roll.to_radians().sin_cos();
    let (sp, cp) = orientation.pitch.to_radians().sin_cos();
    let LeverArm { x, y, z } = lever;
    let north = ch * cp * x + (ch * sp * sr - sh * cr) * y + (ch * sp * cr + sh * sr) * z;
    let east = sh * cp * x + (sh * sp * sr + ch * cr) * y + (sh * sp * cr - ch * sr) * z;
    let down = -sp * x + cp * sr * y + cp * cr * z;
    (north, east, down)
}

/// Move a position by a body frame offset
fn displace(at: Position, lever: LeverArm, orientation: Orientation) -> Position {
    let (north, east, down) = rotate_offset(lever, orientation);
    let (mtodeglon, mtodeglat) = coor_scale(at.latitude);
    Position {
        longitude: wrap_longitude(at.longitude + east * mtodeglon),
        latitude: at.latitude + north * mtodeglat,
        depth: at.depth + down,
    }
}

impl PlatformModel {
    /// Read a platform description from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PlatformModel> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PreprocessError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let platform: PlatformModel =
            serde_json::from_str(&text).map_err(|source| PreprocessError::PlatformFile {
                path: path.to_path_buf(),
                source,
            })?;
        platform.validate()?;
        debug!(
            "read platform {} with {} sensors",
            path.display(),
            platform.sensors.len()
        );
        Ok(platform)
    }

    /// Check that every sensor named by a role exists
    pub fn validate(&self) -> Result<()> {
        for (i, s) in self.sensors.iter().enumerate() {
            if self.sensors[..i].iter().any(|other| other.id == s.id) {
                return Err(PreprocessError::Config(format!(
                    "sensor {} is declared twice",
                    s.id
                )));
            }
            if let Some(model) = &s.time_latency {
                model.validate()?;
            }
        }
        let named = self
            .reference
            .iter()
            .chain(self.target.iter())
            .chain(self.sources.ids());
        for id in named {
            self.sensor(id)?;
        }
        Ok(())
    }

    /// Look up a sensor by id
    pub fn sensor(&self, id: &str) -> Result<&Sensor> {
        self.sensors
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| PreprocessError::UnknownSensor(id.to_string()))
    }

    /// The offsets of the reference point, zero if none is declared
    fn reference_offsets(&self) -> Result<(LeverArm, Orientation)> {
        match &self.reference {
            Some(id) => {
                let s = self.sensor(id)?;
                Ok((s.offset, s.attitude))
            }
            None => Ok((LeverArm::default(), Orientation::default())),
        }
    }

    /// The offsets of a sensor relative to the reference point
    ///
    /// `None` stands for the reference point itself.
    fn relative(&self, sensor: Option<&str>) -> Result<(LeverArm, Orientation)> {
        let (ref_offset, ref_attitude) = self.reference_offsets()?;
        match sensor {
            Some(id) => {
                let s = self.sensor(id)?;
                Ok((
                    s.offset - ref_offset,
                    Orientation {
                        heading: s.attitude.heading - ref_attitude.heading,
                        roll: s.attitude.roll - ref_attitude.roll,
                        pitch: s.attitude.pitch - ref_attitude.pitch,
                    },
                ))
            }
            None => Ok((LeverArm::default(), Orientation::default())),
        }
    }

    /// The position of `target` given the position and orientation of the
    /// reference point
    pub fn position(
        &self,
        target: &str,
        reference: Position,
        orientation: Orientation,
    ) -> Result<Position> {
        let (lever, _) = self.relative(Some(target))?;
        Ok(displace(reference, lever, orientation))
    }

    /// The position of the reference point given the position of `source`
    /// and the platform orientation
    pub fn reference_position(
        &self,
        source: &str,
        at: Position,
        orientation: Orientation,
    ) -> Result<Position> {
        let (lever, _) = self.relative(Some(source))?;
        Ok(displace(at, -lever, orientation))
    }

    /// The orientation of `target` given the orientation of the reference
    /// point
    pub fn orientation(&self, target: &str, reference: Orientation) -> Result<Orientation> {
        let (_, offset) = self.relative(Some(target))?;
        Ok(reference.plus(offset))
    }

    /// The orientation of the reference point given the orientation
    /// measured by `source`
    pub fn reference_orientation(&self, source: &str, at: Orientation) -> Result<Orientation> {
        let (_, offset) = self.relative(Some(source))?;
        Ok(at.minus(offset))
    }

    /// The pose of the reference point implied by a merged ping
    ///
    /// The ping's navigation, depth, heading and attitude are taken to be as
    /// measured by the declared source sensors.
    pub fn reference_pose(&self, ping: &SurveyPing) -> Result<Pose> {
        let (_, heading_offset) = self.relative(self.sources.heading.as_deref())?;
        let (_, attitude_offset) = self.relative(self.sources.attitude.as_deref())?;
        let orientation = Orientation {
            heading: wrap_heading(ping.heading - heading_offset.heading),
            roll: ping.roll - attitude_offset.roll,
            pitch: ping.pitch - attitude_offset.pitch,
        };
        let measured = Position {
            longitude: ping.longitude,
            latitude: ping.latitude,
            depth: ping.sensordepth,
        };
        let (nav_lever, _) = self.relative(self.sources.position.as_deref())?;
        let (depth_lever, _) = self.relative(self.sources.depth.as_deref())?;
        let horizontal = displace(measured, -nav_lever, orientation);
        let vertical = displace(measured, -depth_lever, orientation);
        Ok(Pose {
            position: Position {
                longitude: horizontal.longitude,
                latitude: horizontal.latitude,
                depth: vertical.depth,
            },
            orientation,
        })
    }

    /// The pose of a sensor given the pose of the reference point
    pub fn sensor_pose(&self, sensor: &str, reference: &Pose) -> Result<Pose> {
        Ok(Pose {
            position: self.position(sensor, reference.position, reference.orientation)?,
            orientation: self.orientation(sensor, reference.orientation)?,
        })
    }

    /// Move a merged ping from its source sensors onto `target`
    ///
    /// Only navigation, depth and orientation are changed; beams are left
    /// for [`recompute_bathymetry`].
    pub fn transform_ping(&self, target: &str, ping: &mut SurveyPing) -> Result<Pose> {
        let reference = self.reference_pose(ping)?;
        let pose = self.sensor_pose(target, &reference)?;
        ping.longitude = pose.position.longitude;
        ping.latitude = pose.position.latitude;
        ping.sensordepth = pose.position.depth;
        ping.heading = pose.orientation.heading;
        ping.roll = pose.orientation.roll;
        ping.pitch = pose.orientation.pitch;
        Ok(reference)
    }
}

/// Recompute the good beams of a ping after an attitude or depth change
///
/// Each good beam is taken relative to the sensor at `sensordepth_before`,
/// rotated by `droll` about the alongtrack axis and then by `dpitch` about
/// the acrosstrack axis, and placed below the ping's current sensor depth.
/// Flagged beams are not touched. Returns the number of beams recomputed.
pub fn recompute_bathymetry(
    ping: &mut SurveyPing,
    sensordepth_before: f64,
    droll: f64,
    dpitch: f64,
) -> usize {
    let (sr, cr) = droll.to_radians().sin_cos();
    let (sp, cp) = dpitch.to_radians().sin_cos();
    let sensordepth_after = ping.sensordepth;
    let mut count = 0;
    for beam in ping.beams.iter_mut().filter(|b| b.is_good()) {
        let x = beam.alongtrack;
        let y = beam.acrosstrack;
        let z = beam.depth - sensordepth_before;
        let y1 = y * cr - z * sr;
        let z1 = y * sr + z * cr;
        let x2 = x * cp + z1 * sp;
        let z2 = -x * sp + z1 * cp;
        beam.alongtrack = x2;
        beam.acrosstrack = y1;
        beam.depth = z2 + sensordepth_after;
        count += 1;
    }
    count
}

/// Rescale the good beams of a ping for a changed array sound speed
///
/// The sine of each beam's angle from vertical is multiplied by
/// `angle_factor` and its slant range from the sensor by `range_factor`.
/// A beam pushed past horizontal is left as it was. Returns the number of
/// beams changed.
pub fn snell_rescale(ping: &mut SurveyPing, angle_factor: f64, range_factor: f64) -> usize {
    let sensordepth = ping.sensordepth;
    let mut count = 0;
    for beam in ping.beams.iter_mut().filter(|b| b.is_good()) {
        let z = beam.depth - sensordepth;
        let horizontal = beam.acrosstrack.hypot(beam.alongtrack);
        let range = horizontal.hypot(z);
        if range == 0.0 {
            continue;
        }
        let sin = horizontal / range * angle_factor;
        if sin > 1.0 {
            continue;
        }
        let range = range * range_factor;
        let scale = if horizontal > 0.0 {
            range * sin / horizontal
        } else {
            0.0
        };
        beam.acrosstrack *= scale;
        beam.alongtrack *= scale;
        beam.depth = sensordepth + (range * (1.0 - sin * sin).sqrt()).copysign(z);
        count += 1;
    }
    count
}

/// Move every good sounding into the acrosstrack plane
///
/// The horizontal distance from the sensor is kept.
pub fn fold_alongtrack(ping: &mut SurveyPing) -> usize {
    let mut count = 0;
    for beam in ping.beams.iter_mut().filter(|b| b.is_good()) {
        beam.acrosstrack = beam.acrosstrack.hypot(beam.alongtrack).copysign(beam.acrosstrack);
        beam.alongtrack = 0.0;
        count += 1;
    }
    count
}
