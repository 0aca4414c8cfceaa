//! Command line parsing

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub const USAGE: &str = "\
Usage: reverb-render --brir <file> --input <wav> --output <wav> [options]

Options:
  --brir <file>        BRIR container (.3dti-brir / .sofa)
  --input <wav>        Source audio
  --output <wav>       Destination (stereo, 32-bit float)
  --level <dB>         Reverb level, -30 to 6
  --distance <dB>      Distance attenuation, -6 to 0
  --mode <mode>        stereo (default) or ambisonic
  --config <yaml>      Reverb configuration file
  -h, --help           Show this help";

/// Which audio path renders the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Mono mix fed into W, direct stereo decode
    #[default]
    Stereo,
    /// 4-channel B-format input decoded channel by channel
    Ambisonic,
}

impl RenderMode {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "stereo" => Ok(RenderMode::Stereo),
            "ambisonic" => Ok(RenderMode::Ambisonic),
            other => bail!("Unknown mode '{}' (expected stereo or ambisonic)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderArgs {
    pub brir: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub level_db: Option<f32>,
    pub distance_db: Option<f32>,
    pub mode: RenderMode,
    pub config: Option<PathBuf>,
}

impl RenderArgs {
    /// Parse arguments (without the program name)
    ///
    /// Returns `None` when help was requested.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>> {
        let mut brir = None;
        let mut input = None;
        let mut output = None;
        let mut level_db = None;
        let mut distance_db = None;
        let mut mode = RenderMode::default();
        let mut config = None;

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            if flag == "-h" || flag == "--help" {
                return Ok(None);
            }
            let value = args
                .next()
                .with_context(|| format!("Missing value for {}", flag))?;
            match flag.as_str() {
                "--brir" => brir = Some(PathBuf::from(value)),
                "--input" => input = Some(PathBuf::from(value)),
                "--output" => output = Some(PathBuf::from(value)),
                "--level" => level_db = Some(parse_db(&flag, &value)?),
                "--distance" => distance_db = Some(parse_db(&flag, &value)?),
                "--mode" => mode = RenderMode::parse(&value)?,
                "--config" => config = Some(PathBuf::from(value)),
                _ => bail!("Unknown argument '{}'", flag),
            }
        }

        Ok(Some(Self {
            brir: brir.context("--brir is required")?,
            input: input.context("--input is required")?,
            output: output.context("--output is required")?,
            level_db,
            distance_db,
            mode,
            config,
        }))
    }
}

fn parse_db(flag: &str, value: &str) -> Result<f32> {
    value
        .parse()
        .with_context(|| format!("{} expects a number in dB, got '{}'", flag, value))
}
