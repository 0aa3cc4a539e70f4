//! The swathprep command line
use crate::config::KlugeConfig;
use crate::error::Result;
use crate::parser::Format;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Merge ancillary sensor data onto swath sonar pings")]
pub struct Args {
    /// More log output, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub cmd: Action,
}

#[derive(clap::Subcommand, Debug)]
pub enum Action {
    /// Merge navigation and attitude onto survey pings
    Preprocess {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Input swath files, replacing those in the configuration
        #[arg(short, long, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Input format, detected from the extension if absent
        #[arg(short, long, value_parser = parse_format)]
        format: Option<Format>,
        /// JSON platform description
        #[arg(short, long)]
        platform_file: Option<PathBuf>,
        /// The sensor pings are moved onto
        #[arg(short, long)]
        target_sensor: Option<String>,
        /// Directory for processed files
        #[arg(short, long)]
        output_directory: Option<PathBuf>,
        /// Leave files whose output is up to date
        #[arg(short, long)]
        skip_existing: bool,
        /// Scale the sine of every beam angle by this factor
        #[arg(long)]
        kluge_beam_tweak: Option<f64>,
        /// Scale the sound speed, beam angles and ranges by this factor
        #[arg(long)]
        kluge_soundspeed_tweak: Option<f64>,
        /// Leave attitude changes out when recomputing beams
        #[arg(long)]
        kluge_zero_attitude_correction: bool,
        /// Fold every sounding into the acrosstrack plane
        #[arg(long)]
        kluge_zero_alongtrack_angles: bool,
        /// Take the sensor depth from the logged heave
        #[arg(long)]
        kluge_sensordepth_from_heave: bool,
    },
    /// Count the records of each kind in a swath file
    Count {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_parser = parse_format)]
        format: Option<Format>,
    },
}

fn parse_format(s: &str) -> std::result::Result<Format, String> {
    s.parse().map_err(|e: crate::error::PreprocessError| e.to_string())
}

pub fn run(args: Args) -> Result<()> {
    match args.cmd {
        Action::Preprocess {
            config,
            input,
            format,
            platform_file,
            target_sensor,
            output_directory,
            skip_existing,
            kluge_beam_tweak,
            kluge_soundspeed_tweak,
            kluge_zero_attitude_correction,
            kluge_zero_alongtrack_angles,
            kluge_sensordepth_from_heave,
        } => {
            let overrides = preprocess::Overrides {
                input,
                format,
                platform_file,
                target_sensor,
                output_directory,
                skip_existing,
                kluges: KlugeConfig {
                    beam_tweak: kluge_beam_tweak,
                    soundspeed_tweak: kluge_soundspeed_tweak,
                    zero_attitude_correction: kluge_zero_attitude_correction,
                    zero_alongtrack_angles: kluge_zero_alongtrack_angles,
                    sensordepth_from_heave: kluge_sensordepth_from_heave,
                },
            };
            preprocess::preprocess(config, overrides)?;
        }
        Action::Count {
            path,
            output,
            format,
        } => {
            count::count(path, output, format)?;
        }
    };
    Ok(())
}

pub mod count;
pub mod preprocess;
