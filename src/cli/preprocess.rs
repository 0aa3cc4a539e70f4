//! Run the merge engine from the command line
use crate::config::{KlugeConfig, PreprocessConfig};
use crate::engine::MergeEngine;
use crate::error::Result;
use crate::model::RecordKind;
use crate::parser::Format;
use std::io::{stdout, Write};
use std::path::PathBuf;

/// Settings given on the command line, which win over the configuration file
#[derive(Debug, Default)]
pub struct Overrides {
    pub input: Vec<PathBuf>,
    pub format: Option<Format>,
    pub platform_file: Option<PathBuf>,
    pub target_sensor: Option<String>,
    pub output_directory: Option<PathBuf>,
    pub skip_existing: bool,
    pub kluges: KlugeConfig,
}

impl Overrides {
    /// Apply the overrides to a configuration
    pub fn apply(self, config: &mut PreprocessConfig) {
        if !self.input.is_empty() {
            config.input = self.input;
        }
        if self.format.is_some() {
            config.format = self.format;
        }
        if self.platform_file.is_some() {
            config.platform_file = self.platform_file;
        }
        if self.target_sensor.is_some() {
            config.target_sensor = self.target_sensor;
        }
        if self.output_directory.is_some() {
            config.output_directory = self.output_directory;
        }
        config.skip_existing |= self.skip_existing;
        let k = &mut config.kluges;
        k.beam_tweak = self.kluges.beam_tweak.or(k.beam_tweak);
        k.soundspeed_tweak = self.kluges.soundspeed_tweak.or(k.soundspeed_tweak);
        k.zero_attitude_correction |= self.kluges.zero_attitude_correction;
        k.zero_alongtrack_angles |= self.kluges.zero_alongtrack_angles;
        k.sensordepth_from_heave |= self.kluges.sensordepth_from_heave;
    }
}

pub fn preprocess(config: Option<PathBuf>, overrides: Overrides) -> Result<()> {
    let mut config = match config {
        Some(path) => PreprocessConfig::load(path)?,
        None => PreprocessConfig::default(),
    };
    overrides.apply(&mut config);
    let summary = MergeEngine::new(config)?.run()?;

    let mut writer = stdout().lock();
    for file in &summary.files {
        if file.skipped {
            writeln!(writer, "{}\tskipped", file.output.display())?;
        } else {
            writeln!(
                writer,
                "{}\t{}",
                file.output.display(),
                file.stats.written_of(RecordKind::Survey)
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn overrides_replace_configured_values() {
        let mut config = PreprocessConfig {
            input: vec![PathBuf::from("a.sdw")],
            target_sensor: Some("sonar".to_string()),
            ..Default::default()
        };
        Overrides {
            input: vec![PathBuf::from("b.jsf")],
            output_directory: Some(PathBuf::from("/out")),
            kluges: KlugeConfig {
                beam_tweak: Some(1.02),
                zero_alongtrack_angles: true,
                ..Default::default()
            },
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.kluges.beam_tweak, Some(1.02));
        assert!(config.kluges.zero_alongtrack_angles);
        assert!(!config.kluges.sensordepth_from_heave);
        assert_eq!(config.input, vec![PathBuf::from("b.jsf")]);
        assert_eq!(config.target_sensor.as_deref(), Some("sonar"));
        assert_eq!(config.output_directory, Some(PathBuf::from("/out")));
        assert!(!config.skip_existing);
    }
}
