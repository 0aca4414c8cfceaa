//! BRIR loading error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can end a BRIR load attempt
///
/// These never reach the audio thread: the loader records them, marks the
/// attempt as failed and leaves the current environment in place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The requested file does not exist
    #[error("BRIR file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file was authored at a different rate than the host runs at
    #[error("Sample rate mismatch: host={expected}Hz, file={found}Hz")]
    SampleRateMismatch { expected: u32, found: u32 },

    /// The format decoder could not build an environment from the file
    #[error("Failed to decode BRIR: {0}")]
    DecodeFailure(String),

    /// Unknown container, or no decoder registered for it
    #[error("Unsupported BRIR format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for BRIR loading operations
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LoadError::SampleRateMismatch {
            expected: 48000,
            found: 44100,
        };
        assert_eq!(err.to_string(), "Sample rate mismatch: host=48000Hz, file=44100Hz");

        let err = LoadError::FileNotFound(PathBuf::from("/tmp/missing.sofa"));
        assert!(err.to_string().contains("missing.sofa"));
    }
}
