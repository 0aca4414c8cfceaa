//! BRIR container formats and decoder registry
//!
//! Two containers are recognised:
//!
//! - the compact binary container (`.3dti-brir` / `.3dti`, magic `BRIR`),
//!   decoded by the built-in [`BinaryBrirDecoder`]
//! - the interchange format (`.sofa`, HDF5 signature), decoded by the
//!   built-in [`SofaBrirDecoder`] when the `sofa` feature is enabled, or by a
//!   decoder the host registers
//!
//! Content sniffing wins over the file extension.

mod binary;
#[cfg(feature = "sofa")]
mod sofa;

pub use binary::{write_binary_brir, BinaryBrirDecoder, BINARY_MAGIC};
#[cfg(feature = "sofa")]
pub use sofa::{write_sofa_brir, SofaBrirDecoder, SpeakerResponse};

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::spatial::ReverbEnvironment;

/// First bytes of every HDF5 file (and therefore every SOFA file)
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// Container format of a BRIR file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrirFormat {
    /// Compact binary container
    Binary,
    /// Spatial-audio interchange format (SOFA)
    Interchange,
}

impl BrirFormat {
    /// Infer the format from the file extension alone
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "sofa" => Some(BrirFormat::Interchange),
            "3dti" | "3dti-brir" => Some(BrirFormat::Binary),
            _ => None,
        }
    }

    /// Infer the format from the file header, falling back to the extension
    pub fn sniff(path: &Path) -> LoadResult<Self> {
        let mut header = [0u8; HDF5_SIGNATURE.len()];
        let read = File::open(path)
            .and_then(|mut file| read_prefix(&mut file, &mut header))
            .map_err(|e| io_error(path, e))?;
        let header = &header[..read];

        if header.starts_with(&HDF5_SIGNATURE) {
            return Ok(BrirFormat::Interchange);
        }
        if header.starts_with(&BINARY_MAGIC) {
            return Ok(BrirFormat::Binary);
        }

        Self::from_extension(path).ok_or_else(|| {
            LoadError::UnsupportedFormat(format!("unrecognised BRIR container: {:?}", path))
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BrirFormat::Binary => "3DTI",
            BrirFormat::Interchange => "SOFA",
        }
    }
}

/// Read as many bytes as are available, up to `buf.len()`
fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Map an I/O error on a BRIR file to a load error
pub(crate) fn io_error(path: &Path, e: io::Error) -> LoadError {
    match e.kind() {
        io::ErrorKind::NotFound => LoadError::FileNotFound(path.to_path_buf()),
        _ => LoadError::DecodeFailure(format!("{:?}: {}", path, e)),
    }
}

/// Format decoder collaborator
///
/// Decoders run on the loader thread and may block and allocate. On success
/// the environment is fully populated; on failure it must be discarded.
pub trait BrirDecoder<E: ReverbEnvironment>: Send + Sync {
    /// Human-readable decoder name for logs
    fn name(&self) -> &'static str;

    /// Sample rate the file was authored at
    fn declared_sample_rate(&self, path: &Path) -> LoadResult<u32>;

    /// Install the file's impulse responses into a fresh environment
    fn decode_into(&self, path: &Path, environment: &mut E) -> LoadResult<()>;
}

#[cfg(feature = "sofa")]
fn builtin_interchange<E: ReverbEnvironment>() -> Option<Box<dyn BrirDecoder<E>>> {
    Some(Box::new(SofaBrirDecoder))
}

#[cfg(not(feature = "sofa"))]
fn builtin_interchange<E: ReverbEnvironment>() -> Option<Box<dyn BrirDecoder<E>>> {
    None
}

/// One optional decoder per supported container
pub struct FormatDecoders<E: ReverbEnvironment> {
    binary: Option<Box<dyn BrirDecoder<E>>>,
    interchange: Option<Box<dyn BrirDecoder<E>>>,
}

impl<E: ReverbEnvironment> FormatDecoders<E> {
    /// Registry without any decoder
    pub fn empty() -> Self {
        Self {
            binary: None,
            interchange: None,
        }
    }

    /// Registry with every decoder built into this crate
    ///
    /// Always the binary container; SOFA too with the `sofa` feature.
    pub fn with_builtin() -> Self {
        Self {
            binary: Some(Box::new(BinaryBrirDecoder)),
            interchange: builtin_interchange(),
        }
    }

    /// Register the decoder used for the binary container
    pub fn with_binary(mut self, decoder: impl BrirDecoder<E> + 'static) -> Self {
        self.binary = Some(Box::new(decoder));
        self
    }

    /// Register the decoder used for the interchange format
    pub fn with_interchange(mut self, decoder: impl BrirDecoder<E> + 'static) -> Self {
        self.interchange = Some(Box::new(decoder));
        self
    }

    /// Decoder for `format`, or `UnsupportedFormat` if none is registered
    pub fn decoder_for(&self, format: BrirFormat) -> LoadResult<&dyn BrirDecoder<E>> {
        let slot = match format {
            BrirFormat::Binary => &self.binary,
            BrirFormat::Interchange => &self.interchange,
        };
        slot.as_deref().ok_or_else(|| {
            let hint = match format {
                BrirFormat::Interchange if cfg!(not(feature = "sofa")) => {
                    " (build with the `sofa` feature or register one)"
                }
                _ => "",
            };
            LoadError::UnsupportedFormat(format!(
                "no decoder registered for {} files{}",
                format.name(),
                hint
            ))
        })
    }

    /// Sample rate `path` was authored at, read by the decoder for `format`
    pub fn declared_sample_rate(&self, format: BrirFormat, path: &Path) -> LoadResult<u32> {
        self.decoder_for(format)?.declared_sample_rate(path)
    }
}

impl<E: ReverbEnvironment> Default for FormatDecoders<E> {
    fn default() -> Self {
        Self::with_builtin()
    }
}
