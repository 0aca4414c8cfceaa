//! SOFA BRIR decoder
//!
//! A SOFA BRIR stores one binaural response per virtual loudspeaker:
//!
//! - `Data.IR` is `[M measurements, R = 2 receivers, N samples]`
//! - `SourcePosition` is `[M or 1, 3]`, spherical (azimuth and elevation in
//!   degrees) unless its `Type` attribute says `cartesian`
//! - `Data.SamplingRate` is `[1]` or `[M]`, in Hz
//!
//! The loudspeaker responses are encoded to first-order B-format:
//! W = sum / sqrt(2), X = cos(az) cos(el), Y = sin(az) cos(el), Z = sin(el).
//! Z is only installed when some loudspeaker sits off the horizontal plane.

use std::f64::consts::FRAC_1_SQRT_2;
use std::path::Path;

use netcdf::AttributeValue;

use crate::error::{LoadError, LoadResult};
use crate::spatial::ReverbEnvironment;
use crate::types::{BFormatChannel, Sample, NUM_BFORMAT_CHANNELS};

use super::BrirDecoder;

const SAMPLING_RATE: &str = "Data.SamplingRate";
const IMPULSE_RESPONSES: &str = "Data.IR";
const SOURCE_POSITION: &str = "SourcePosition";

/// Elevations with a smaller sine count as horizontal
const HORIZONTAL_EPSILON: f64 = 1e-6;

fn failure(path: &Path, message: impl std::fmt::Display) -> LoadError {
    LoadError::DecodeFailure(format!("{:?}: {}", path, message))
}

fn open(path: &Path) -> LoadResult<netcdf::File> {
    netcdf::open(path).map_err(|e| failure(path, e))
}

/// Values and dimension lengths of a numeric variable
fn read_variable(file: &netcdf::File, path: &Path, name: &str) -> LoadResult<(Vec<f64>, Vec<usize>)> {
    let variable = file
        .variable(name)
        .ok_or_else(|| failure(path, format!("missing {} variable", name)))?;
    let dims = variable.dimensions().iter().map(|d| d.len()).collect();
    let values = variable
        .get_values::<f64, _>(..)
        .map_err(|e| failure(path, format!("reading {}: {}", name, e)))?;
    Ok((values, dims))
}

fn read_sample_rate(file: &netcdf::File, path: &Path) -> LoadResult<u32> {
    let (values, _) = read_variable(file, path, SAMPLING_RATE)?;
    match values.first() {
        Some(&rate) if (1.0..=u32::MAX as f64).contains(&rate) => {
            Ok(rate.round() as u32)
        }
        Some(rate) => Err(failure(path, format!("invalid sampling rate {}", rate))),
        None => Err(failure(path, "empty sampling rate")),
    }
}

fn check_conventions(file: &netcdf::File, path: &Path) -> LoadResult<()> {
    let conventions = file
        .attribute("Conventions")
        .map(|attribute| attribute.value())
        .transpose()
        .map_err(|e| failure(path, e))?;
    match conventions {
        Some(AttributeValue::Str(value)) if value == "SOFA" => Ok(()),
        _ => Err(failure(path, "not a SOFA file (Conventions is not \"SOFA\")")),
    }
}

/// Azimuth and elevation in radians of every measurement
fn read_directions(file: &netcdf::File, path: &Path, measurements: usize) -> LoadResult<Vec<(f64, f64)>> {
    let (values, dims) = read_variable(file, path, SOURCE_POSITION)?;
    let rows = match dims.as_slice() {
        [rows, 3] if *rows == measurements || *rows == 1 => *rows,
        _ => {
            return Err(failure(
                path,
                format!("SourcePosition has shape {:?}, expected [{}, 3]", dims, measurements),
            ))
        }
    };

    let cartesian = match file
        .variable(SOURCE_POSITION)
        .and_then(|variable| variable.attribute_value("Type"))
        .transpose()
        .map_err(|e| failure(path, e))?
    {
        Some(AttributeValue::Str(kind)) => kind.eq_ignore_ascii_case("cartesian"),
        _ => false,
    };

    let directions: Vec<(f64, f64)> = values
        .chunks_exact(3)
        .take(rows)
        .map(|position| {
            if cartesian {
                let (x, y, z) = (position[0], position[1], position[2]);
                (y.atan2(x), z.atan2(x.hypot(y)))
            } else {
                (position[0].to_radians(), position[1].to_radians())
            }
        })
        .collect();

    // A single row applies to every measurement
    if directions.len() == 1 && measurements > 1 {
        return Ok(vec![directions[0]; measurements]);
    }
    Ok(directions)
}

/// First-order encoding weights for a loudspeaker direction, in W X Y Z order
fn encoding_gains(azimuth: f64, elevation: f64) -> [f64; NUM_BFORMAT_CHANNELS] {
    [
        FRAC_1_SQRT_2,
        azimuth.cos() * elevation.cos(),
        azimuth.sin() * elevation.cos(),
        elevation.sin(),
    ]
}

/// Built-in decoder for SOFA BRIR files
#[derive(Debug, Clone, Copy, Default)]
pub struct SofaBrirDecoder;

impl<E: ReverbEnvironment> BrirDecoder<E> for SofaBrirDecoder {
    fn name(&self) -> &'static str {
        "SOFA"
    }

    fn declared_sample_rate(&self, path: &Path) -> LoadResult<u32> {
        let file = open(path)?;
        read_sample_rate(&file, path)
    }

    fn decode_into(&self, path: &Path, environment: &mut E) -> LoadResult<()> {
        let file = open(path)?;
        check_conventions(&file, path)?;

        let (data, dims) = read_variable(&file, path, IMPULSE_RESPONSES)?;
        let (measurements, len) = match dims.as_slice() {
            [m, 2, n] if *m > 0 && *n > 0 => (*m, *n),
            _ => {
                return Err(failure(
                    path,
                    format!("Data.IR has shape {:?}, expected [M, 2, N]", dims),
                ))
            }
        };
        let directions = read_directions(&file, path, measurements)?;

        let mut encoded: [[Vec<f64>; 2]; NUM_BFORMAT_CHANNELS] =
            std::array::from_fn(|_| [vec![0.0; len], vec![0.0; len]]);
        for (measurement, &(azimuth, elevation)) in directions.iter().enumerate() {
            let gains = encoding_gains(azimuth, elevation);
            for (ear, response) in data[measurement * 2 * len..(measurement + 1) * 2 * len]
                .chunks_exact(len)
                .enumerate()
            {
                for (channel, gain) in gains.iter().enumerate() {
                    for (acc, &sample) in encoded[channel][ear].iter_mut().zip(response) {
                        *acc += gain * sample;
                    }
                }
            }
        }

        let elevated = directions
            .iter()
            .any(|&(_, elevation)| elevation.sin().abs() > HORIZONTAL_EPSILON);
        let channels = if elevated {
            NUM_BFORMAT_CHANNELS
        } else {
            NUM_BFORMAT_CHANNELS - 1
        };

        for (channel, [left, right]) in BFormatChannel::ALL.iter().zip(encoded).take(channels) {
            let left: Vec<Sample> = left.into_iter().map(|s| s as Sample).collect();
            let right: Vec<Sample> = right.into_iter().map(|s| s as Sample).collect();
            environment.install_channel_response(*channel, left, right)?;
        }
        environment.end_setup()?;

        log::debug!(
            "Decoded SOFA BRIR {:?}: {} loudspeakers x {} samples, {} B-format channels",
            path,
            measurements,
            len,
            channels
        );
        Ok(())
    }
}

/// One virtual loudspeaker of a SOFA BRIR
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerResponse {
    /// Degrees, counter-clockwise from the front
    pub azimuth: f64,
    /// Degrees above the horizontal plane
    pub elevation: f64,
    pub left: Vec<Sample>,
    pub right: Vec<Sample>,
}

/// Write a SOFA BRIR with one measurement per loudspeaker
///
/// Every response is zero-padded to the longest one.
pub fn write_sofa_brir(path: &Path, sample_rate: u32, speakers: &[SpeakerResponse]) -> netcdf::Result<()> {
    let len = speakers
        .iter()
        .map(|speaker| speaker.left.len().max(speaker.right.len()))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut file = netcdf::create(path)?;
    file.add_attribute("Conventions", "SOFA")?;
    file.add_attribute("SOFAConventions", "MultiSpeakerBRIR")?;
    file.add_attribute("DataType", "FIR")?;
    file.add_dimension("I", 1)?;
    file.add_dimension("C", 3)?;
    file.add_dimension("M", speakers.len())?;
    file.add_dimension("R", 2)?;
    file.add_dimension("N", len)?;

    {
        let mut rate = file.add_variable::<f64>(SAMPLING_RATE, &["I"])?;
        rate.put_attribute("Units", "hertz")?;
        rate.put_values(&[f64::from(sample_rate)], ..)?;
    }
    {
        let positions: Vec<f64> = speakers
            .iter()
            .flat_map(|speaker| [speaker.azimuth, speaker.elevation, 1.0])
            .collect();
        let mut position = file.add_variable::<f64>(SOURCE_POSITION, &["M", "C"])?;
        position.put_attribute("Type", "spherical")?;
        position.put_attribute("Units", "degree, degree, metre")?;
        position.put_values(&positions, ..)?;
    }
    {
        let mut samples = Vec::with_capacity(speakers.len() * 2 * len);
        for speaker in speakers {
            for response in [&speaker.left, &speaker.right] {
                samples.extend((0..len).map(|i| f64::from(response.get(i).copied().unwrap_or(0.0))));
            }
        }
        let mut data = file.add_variable::<f64>(IMPULSE_RESPONSES, &["M", "R", "N"])?;
        data.put_values(&samples, ..)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::BrirFormat;
    use crate::spatial::{ConvolutionCore, ConvolutionEnvironment, SpatialCore};

    fn speaker(azimuth: f64, elevation: f64, left: Vec<Sample>, right: Vec<Sample>) -> SpeakerResponse {
        SpeakerResponse {
            azimuth,
            elevation,
            left,
            right,
        }
    }

    fn decode(path: &Path) -> LoadResult<ConvolutionEnvironment> {
        let mut env = ConvolutionCore::new(48000).create_environment();
        BrirDecoder::<ConvolutionEnvironment>::decode_into(&SofaBrirDecoder, path, &mut env)?;
        Ok(env)
    }

    #[test]
    fn test_declared_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hall.sofa");
        write_sofa_brir(&path, 44100, &[speaker(0.0, 0.0, vec![1.0], vec![1.0])]).unwrap();

        let decoder: &dyn BrirDecoder<ConvolutionEnvironment> = &SofaBrirDecoder;
        assert_eq!(decoder.declared_sample_rate(&path).unwrap(), 44100);
        assert_eq!(BrirFormat::sniff(&path).unwrap(), BrirFormat::Interchange);
    }

    #[test]
    fn test_horizontal_layout_encodes_three_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hall.sofa");
        write_sofa_brir(
            &path,
            48000,
            &[
                speaker(0.0, 0.0, vec![1.0, 0.5], vec![0.5]),
                speaker(90.0, 0.0, vec![0.25], vec![0.25]),
                speaker(180.0, 0.0, vec![0.0], vec![0.0]),
                speaker(270.0, 0.0, vec![0.0], vec![0.0]),
            ],
        )
        .unwrap();

        let mut env = decode(&path).unwrap();
        assert!(env.has_brir());
        assert_eq!(env.response_len(BFormatChannel::W), Some(2));
        assert_eq!(env.response_len(BFormatChannel::Y), Some(2));
        assert_eq!(env.response_len(BFormatChannel::Z), None);

        // X picks up the front loudspeaker only
        let mut l = [0.0; 2];
        let mut r = [0.0; 2];
        env.process_encoded_channel_reverb(BFormatChannel::X, &[1.0, 0.0], &mut l, &mut r);
        assert!((l[0] - 1.0).abs() < 1e-5 && (l[1] - 0.5).abs() < 1e-5);
        assert!((r[0] - 0.5).abs() < 1e-5 && r[1].abs() < 1e-5);
    }

    #[test]
    fn test_elevated_layout_installs_z() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dome.sofa");
        write_sofa_brir(
            &path,
            48000,
            &[
                speaker(0.0, 0.0, vec![1.0], vec![1.0]),
                speaker(0.0, 90.0, vec![0.5], vec![0.5]),
            ],
        )
        .unwrap();

        let env = decode(&path).unwrap();
        assert_eq!(env.response_len(BFormatChannel::Z), Some(1));
    }

    #[test]
    fn test_plain_hdf5_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.sofa");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_attribute("Conventions", "CF-1.8").unwrap();
        }
        assert!(matches!(decode(&path), Err(LoadError::DecodeFailure(_))));

        let garbage = dir.path().join("garbage.sofa");
        std::fs::write(&garbage, b"not a netcdf file").unwrap();
        assert!(matches!(decode(&garbage), Err(LoadError::DecodeFailure(_))));
    }
}
