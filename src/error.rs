//! Errors raised while preprocessing swath data
use std::path::PathBuf;
use thiserror::Error;

/// The error type for every fallible operation in the crate
///
/// Configuration problems (bad paths, unknown formats or sensors, malformed
/// platform files) abort a run before any data are read. Problems with the
/// survey data itself are counted by the engine instead of being raised.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// A setting that cannot be used as given
    #[error("configuration error: {0}")]
    Config(String),

    /// A format name or file extension that no reader understands
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// A sensor id that does not exist in the platform model
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),

    /// An input file that could not be opened
    #[error("unable to open {}: {source}", path.display())]
    Open {
        /// The file that was requested
        path: PathBuf,
        /// The underlying failure
        source: std::io::Error,
    },

    /// An output file that could not be created
    #[error("unable to create {}: {source}", path.display())]
    Create {
        /// The file that was requested
        path: PathBuf,
        /// The underlying failure
        source: std::io::Error,
    },

    /// A platform description that could not be parsed
    #[error("malformed platform file {}: {source}", path.display())]
    PlatformFile {
        /// The platform file
        path: PathBuf,
        /// The parse failure
        source: serde_json::Error,
    },

    /// A record whose contents could not be decoded
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Any other I/O failure
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// A failure in a binary layout
    #[error("{0}")]
    Binary(#[from] binrw::Error),
}

impl PreprocessError {
    /// Return true for the errors that must abort a run before processing
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PreprocessError::Config(_)
                | PreprocessError::UnknownFormat(_)
                | PreprocessError::UnknownSensor(_)
                | PreprocessError::PlatformFile { .. }
        )
    }
}

/// A Result specialized to [`PreprocessError`]
pub type Result<T> = std::result::Result<T, PreprocessError>;
