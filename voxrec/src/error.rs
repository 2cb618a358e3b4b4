//! Error types for voxrec organized by pipeline stage.

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unresolved or unreadable input path
    #[error(transparent)]
    Path(#[from] PathError),

    /// Transcript manifest parsing error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Vocabulary build or load error
    #[error(transparent)]
    Vocab(#[from] VocabBuildError),

    /// Audio loading or validation error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Shard creation error
    #[error(transparent)]
    Shard(#[from] ShardWriteError),

    /// Missing length metadata
    #[error(transparent)]
    Metadata(#[from] MetadataMissingError),

    /// Shard set loading error
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be parsed
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Shard count must be at least one
    #[error("invalid shard count: {0} (minimum 1)")]
    InvalidShardCount(usize),
}

/// Unresolved or unreadable input paths. Fatal, no retry.
#[derive(Debug, Error)]
pub enum PathError {
    /// Path does not exist or is not a regular file
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Path exists but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Transcript manifest format errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Row does not have the PATH / DURATION / TRANSCRIPT columns
    #[error("malformed row in {} at line {line}", file.display())]
    MalformedRow { file: PathBuf, line: usize },
}

/// Vocabulary build and persistence errors. Fatal.
#[derive(Debug, Error)]
pub enum VocabBuildError {
    /// Subword training requested but no corpus file was reachable
    #[error("no reachable corpus files and no persisted vocabulary")]
    NoCorpus,

    /// Corpus was reachable but contained no usable transcripts
    #[error("corpus produced no tokens")]
    EmptyCorpus,

    /// Persisted vocabulary could not be read back
    #[error("failed to load vocabulary from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// Vocabulary could not be persisted
    #[error("failed to save vocabulary to {}: {source}", path.display())]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Audio loading and validation errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Sample rate validation failed
    #[error("invalid sample rate: expected {expected}Hz, got {got}Hz")]
    InvalidSampleRate { expected: u32, got: u32 },

    /// Channel count validation failed
    #[error("invalid channel count: expected mono or stereo, got {0} channels")]
    InvalidChannels(u16),

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Mid-write shard failures. Fatal to the run; the partial shard set is
/// discarded so a retry starts clean.
#[derive(Debug, Error)]
pub enum ShardWriteError {
    /// Records directory could not be created
    #[error("failed to create records directory {}: {source}", dir.display())]
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },

    /// IO failure on one shard file
    #[error("failed to write shard {}: {source}", shard.display())]
    Io {
        shard: PathBuf,
        source: std::io::Error,
    },

    /// Shard-set manifest (commit marker) could not be written
    #[error("failed to commit shard set {}: {source}", path.display())]
    Commit {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Length metadata absent. Recoverable: callers may fall back to a full scan.
#[derive(Debug, Error)]
#[error("metadata not found at {}", .0.display())]
pub struct MetadataMissingError(pub PathBuf);

/// Shard set loading errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// No committed shard set for the stage
    #[error("shard set for stage '{stage}' is missing or incomplete in {}", dir.display())]
    IncompleteShardSet { stage: String, dir: PathBuf },

    /// Shard file failed structural validation
    #[error("corrupt shard {}: {reason}", shard.display())]
    CorruptShard { shard: PathBuf, reason: String },

    /// IO error while reading shards or metadata
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for voxrec operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}
