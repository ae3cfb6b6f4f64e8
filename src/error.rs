use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::decode::DecodeError;
use crate::flatten::FlattenError;
use crate::name::InvalidName;

/// Which identifier failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameField {
    Organization,
    Application,
}

impl fmt::Display for NameField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameField::Organization => write!(f, "organization"),
            NameField::Application => write!(f, "application"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClapwireError {
    #[error("Invalid {field} name: {source}")]
    InvalidName {
        field: NameField,
        source: InvalidName,
    },

    #[error("Unable to determine the home directory")]
    HomeDirUnavailable,

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to bind flag '{flag}': {reason}")]
    FlagBinding { flag: String, reason: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to serialize defaults: {0}")]
    Defaults(#[from] FlattenError),

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[cfg(feature = "clap")]
    #[error(transparent)]
    Cli(#[from] clap::Error),

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}
