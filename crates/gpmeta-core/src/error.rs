//! Error types for sidecar processing

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while processing one sidecar or one media file.
///
/// Everything except [`Error::Scan`] is local to a single sidecar/media pair
/// and is logged and counted rather than returned from [`crate::process`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot parse sidecar {path}: {source}")]
    SidecarParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("sidecar {path} has no title")]
    MissingDeclaredName { path: PathBuf },

    #[error("no valid media file found for sidecar {path}")]
    NoMatchingMediaFile { path: PathBuf },

    #[error("no usable timestamp in sidecar {sidecar} for {media}")]
    NoTimestamp { sidecar: PathBuf, media: PathBuf },

    #[error("unsupported media type: {path}")]
    UnsupportedMedia { path: PathBuf },

    #[error("failed to update metadata for {path}: {source}")]
    MetadataWrite {
        path: PathBuf,
        #[source]
        source: WriteError,
    },

    #[error("directory traversal error: {0}")]
    Scan(#[from] walkdir::Error),
}

/// Cause of a failed image rewrite or timestamp update.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),

    #[error("cannot parse image container: {0}")]
    Container(#[from] img_parts::Error),

    #[error("image container has no embeddable EXIF block")]
    UnsupportedContainer,

    #[error("cannot replace original file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl Error {
    pub(crate) fn write(path: impl Into<PathBuf>, source: impl Into<WriteError>) -> Self {
        Error::MetadataWrite {
            path: path.into(),
            source: source.into(),
        }
    }
}
