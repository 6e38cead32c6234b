//! Error taxonomy for outbox access.
//!
//! Verification failures are not errors here: they degrade to
//! [`crate::VerificationStatus::Unknown`] and never reach callers as errors.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid artifact name: {name:?}")]
    InvalidName { name: String },

    #[error("Artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FeedError {
    pub fn invalid_name(name: &str) -> Self {
        Self::InvalidName {
            name: name.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidName { .. } => ErrorCode::InvalidName,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Io(_) => ErrorCode::Io,
        }
    }
}

/// Stable machine-readable error classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidName,
    NotFound,
    Io,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidName => "invalid_name",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Io => "io",
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
