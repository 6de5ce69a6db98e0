use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `tarpipe` crate.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O error occurred on a source or destination stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure surfaced by the tar codec while opening the archive,
    /// parsing an entry header or reading entry data.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// The given path does not exist in the filesystem.
    #[error("path does not exist: '{0}'")]
    NotFound(PathBuf),

    /// The filesystem object has a type outside the closed set an archive
    /// entry can represent (e.g. a socket or device file found on disk).
    #[error("file type not supported: '{0}'")]
    UnsupportedFileType(PathBuf),

    /// A compression filter could not be applied to the archive.
    #[error("filter rejected: {0}")]
    FilterRejected(String),
}

impl ArchiveError {
    /// A codec failure carrying the codec's diagnostic text.
    pub fn codec(message: impl Into<String>) -> Self {
        ArchiveError::Codec { message: message.into() }
    }

    /// A codec failure with a human context string appended to the
    /// codec's diagnostic text.
    pub fn codec_context(error: impl std::fmt::Display, context: &str) -> Self {
        ArchiveError::Codec { message: format!("{error} ({context})") }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
