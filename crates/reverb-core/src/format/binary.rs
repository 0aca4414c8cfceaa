//! Compact binary BRIR container
//!
//! Layout (all little-endian):
//!
//! ```text
//! offset  size  field
//! 0       4     magic "BRIR"
//! 4       2     version (1)
//! 6       4     sample rate in Hz
//! 10      2     channel count (1-4, in W X Y Z order)
//! 12      4     impulse response length in samples
//! 16      ...   f32 samples: for each channel, left response then right response
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::spatial::ReverbEnvironment;
use crate::types::{BFormatChannel, Sample, NUM_BFORMAT_CHANNELS};

use super::{io_error, BrirDecoder};

/// Magic bytes at the start of every binary container
pub const BINARY_MAGIC: [u8; 4] = *b"BRIR";

/// Only container version this decoder understands
const VERSION: u16 = 1;

/// Header size in bytes
const HEADER_LEN: usize = 16;

/// Upper bound on the response length (about 87s at 48kHz), guards against corrupt headers
const MAX_RESPONSE_LEN: u32 = 1 << 22;

/// Parsed container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BinaryHeader {
    sample_rate: u32,
    channel_count: u16,
    response_len: u32,
}

impl BinaryHeader {
    fn read(reader: &mut impl Read) -> io::Result<Result<Self, String>> {
        let mut raw = [0u8; HEADER_LEN];
        reader.read_exact(&mut raw)?;

        if raw[0..4] != BINARY_MAGIC {
            return Ok(Err("missing BRIR magic".to_string()));
        }
        let version = u16::from_le_bytes([raw[4], raw[5]]);
        if version != VERSION {
            return Ok(Err(format!("unsupported container version {}", version)));
        }

        let header = Self {
            sample_rate: u32::from_le_bytes([raw[6], raw[7], raw[8], raw[9]]),
            channel_count: u16::from_le_bytes([raw[10], raw[11]]),
            response_len: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        };

        if header.channel_count == 0 || header.channel_count as usize > NUM_BFORMAT_CHANNELS {
            return Ok(Err(format!("invalid channel count {}", header.channel_count)));
        }
        if header.response_len == 0 || header.response_len > MAX_RESPONSE_LEN {
            return Ok(Err(format!("invalid response length {}", header.response_len)));
        }
        Ok(Ok(header))
    }
}

/// Open a container and parse its header, mapping every failure to a load error
fn open_header(path: &Path) -> LoadResult<(BufReader<File>, BinaryHeader)> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut reader = BufReader::new(file);
    let header = BinaryHeader::read(&mut reader)
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                LoadError::DecodeFailure(format!("{:?}: truncated header", path))
            }
            _ => io_error(path, e),
        })?
        .map_err(|msg| LoadError::DecodeFailure(format!("{:?}: {}", path, msg)))?;
    Ok((reader, header))
}

/// Read `len` little-endian f32 samples
fn read_samples(reader: &mut impl Read, len: usize) -> io::Result<Vec<Sample>> {
    let mut samples = vec![0.0f32; len];
    reader.read_exact(bytemuck::cast_slice_mut::<f32, u8>(samples.as_mut_slice()))?;
    for sample in &mut samples {
        *sample = f32::from_bits(u32::from_le(sample.to_bits()));
    }
    Ok(samples)
}

/// Read one channel's left and right responses
fn read_pair(reader: &mut impl Read, len: usize) -> io::Result<(Vec<Sample>, Vec<Sample>)> {
    let left = read_samples(reader, len)?;
    let right = read_samples(reader, len)?;
    Ok((left, right))
}

/// Built-in decoder for the compact binary container
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryBrirDecoder;

impl<E: ReverbEnvironment> BrirDecoder<E> for BinaryBrirDecoder {
    fn name(&self) -> &'static str {
        "3DTI binary"
    }

    fn declared_sample_rate(&self, path: &Path) -> LoadResult<u32> {
        open_header(path).map(|(_, header)| header.sample_rate)
    }

    fn decode_into(&self, path: &Path, environment: &mut E) -> LoadResult<()> {
        let (mut reader, header) = open_header(path)?;
        let len = header.response_len as usize;

        for channel in BFormatChannel::ALL.iter().take(header.channel_count as usize) {
            let (left, right) = read_pair(&mut reader, len).map_err(|e| {
                LoadError::DecodeFailure(format!(
                    "{:?}: truncated response for channel {}: {}",
                    path,
                    channel.name(),
                    e
                ))
            })?;
            environment.install_channel_response(*channel, left, right)?;
        }

        environment.end_setup()?;

        log::debug!(
            "Decoded binary BRIR {:?}: {} channels x {} samples @ {}Hz",
            path,
            header.channel_count,
            len,
            header.sample_rate
        );
        Ok(())
    }
}

/// Write a binary container
///
/// `responses` holds `(left, right)` pairs in W, X, Y, Z order. Every
/// response is zero-padded to the longest one.
pub fn write_binary_brir(
    path: &Path,
    sample_rate: u32,
    responses: &[(Vec<Sample>, Vec<Sample>)],
) -> io::Result<()> {
    if responses.is_empty() || responses.len() > NUM_BFORMAT_CHANNELS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("expected 1-{} channel responses", NUM_BFORMAT_CHANNELS),
        ));
    }
    let len = responses
        .iter()
        .map(|(l, r)| l.len().max(r.len()))
        .max()
        .unwrap_or(0);

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&BINARY_MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&sample_rate.to_le_bytes())?;
    writer.write_all(&(responses.len() as u16).to_le_bytes())?;
    writer.write_all(&(len as u32).to_le_bytes())?;

    for (left, right) in responses {
        for response in [left, right] {
            for i in 0..len {
                let sample = response.get(i).copied().unwrap_or(0.0);
                writer.write_all(&sample.to_le_bytes())?;
            }
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{ConvolutionCore, SpatialCore};

    fn decode(path: &Path) -> LoadResult<crate::spatial::ConvolutionEnvironment> {
        let core = ConvolutionCore::new(48000);
        let mut env = core.create_environment();
        BinaryBrirDecoder.decode_into(path, &mut env)?;
        Ok(env)
    }

    #[test]
    fn test_decode_installs_responses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("room.3dti-brir");
        write_binary_brir(
            &path,
            48000,
            &[(vec![1.0, 0.5, 0.25], vec![0.5]), (vec![0.1], vec![0.2])],
        )
        .unwrap();

        let decoder: &dyn BrirDecoder<crate::spatial::ConvolutionEnvironment> = &BinaryBrirDecoder;
        assert_eq!(decoder.declared_sample_rate(&path).unwrap(), 48000);

        let env = decode(&path).unwrap();
        assert!(env.has_brir());
        assert_eq!(env.response_len(BFormatChannel::W), Some(3));
        assert_eq!(env.response_len(BFormatChannel::X), Some(3));
        assert_eq!(env.response_len(BFormatChannel::Y), None);
    }

    #[test]
    fn test_truncated_payload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("room.3dti-brir");
        write_binary_brir(&path, 48000, &[(vec![1.0; 64], vec![1.0; 64])]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        assert!(matches!(decode(&path), Err(LoadError::DecodeFailure(_))));
    }

    #[test]
    fn test_bad_header_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("room.3dti-brir");

        std::fs::write(&path, b"BRIR").unwrap();
        assert!(matches!(decode(&path), Err(LoadError::DecodeFailure(_))));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&BINARY_MAGIC);
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend_from_slice(&[0; 10]);
        std::fs::write(&path, bytes).unwrap();
        let err = decode(&path).err().unwrap();
        assert!(err.to_string().contains("version 7"));
    }

    #[test]
    fn test_writer_rejects_bad_channel_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("room.3dti-brir");
        assert!(write_binary_brir(&path, 48000, &[]).is_err());
        let five = vec![(vec![1.0], vec![1.0]); 5];
        assert!(write_binary_brir(&path, 48000, &five).is_err());
    }
}
