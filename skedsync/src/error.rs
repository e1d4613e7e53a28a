use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse YAML config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("{what} not found: {path}")]
    MissingPath { what: &'static str, path: PathBuf },
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot back up {0}: source file does not exist")]
    SourceMissing(PathBuf),

    #[error("backup of {source_path} was not found at {backup_path} after copying")]
    CopyMissing {
        source_path: PathBuf,
        backup_path: PathBuf,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("unsupported server scheme in {0}")]
    UnsupportedScheme(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("invalid URL {url}: {reason}")]
    BadUrl { url: String, reason: String },

    #[error("too many redirects, last one to {0}")]
    TooManyRedirects(String),

    #[error("cannot read login data from {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Backup(#[from] BackupError),
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("drudg exited with {status} for station {station}")]
    ExitStatus { station: String, status: String },

    #[error("drudg did not produce {0}")]
    MissingArtifact(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("No Master file(s) found in {0}")]
    NoMasterFile(PathBuf),

    #[error("failed to read master file {path}: {source}")]
    ReadMaster {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
