//! Outbox scanning and preview extraction.

use crate::name::is_artifact_name;
use crate::status::VerificationStatus;
use crate::verify::SignatureVerifier;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Listing size when the caller does not pick one
pub const DEFAULT_FEED_LIMIT: usize = 50;

/// Listing size of the HTML feed page
pub const PAGE_FEED_LIMIT: usize = 100;

/// Bytes read from an artifact to build its preview
pub const PREVIEW_READ_BYTES: u64 = 4000;

/// Maximum preview length in characters
pub const PREVIEW_CHARS: usize = 280;

/// Display format for artifact timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One artifact as observed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl Artifact {
    /// Stat `path`; fails if it vanished or is not a regular file
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            path: path.to_path_buf(),
            modified: meta.modified()?,
            size: meta.len(),
        })
    }

    /// Local-time modification timestamp, second precision
    pub fn when(&self) -> String {
        format_timestamp(self.modified)
    }
}

/// Read model for one listed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub name: String,
    pub when: String,
    pub modified: DateTime<Local>,
    pub size: u64,
    pub preview: String,
    pub status: VerificationStatus,
}

impl FeedEntry {
    pub fn new(artifact: &Artifact, preview: String, status: VerificationStatus) -> Self {
        Self {
            name: artifact.name.clone(),
            when: artifact.when(),
            modified: DateTime::<Local>::from(artifact.modified),
            size: artifact.size,
            preview,
            status,
        }
    }
}

/// Enumerates artifacts in one outbox directory
#[derive(Debug, Clone)]
pub struct FeedScanner {
    outbox: PathBuf,
}

impl FeedScanner {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    /// All artifacts, newest first, at most `limit`.
    ///
    /// Ties on modification time fall back to name, descending. Entries
    /// that disappear or cannot be stat'ed mid-scan are skipped. Only a
    /// failure to read the directory itself is an error.
    pub fn list(&self, limit: usize) -> io::Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();

        for entry in fs::read_dir(&self.outbox)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable outbox entry: {}", e);
                    continue;
                }
            };

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !is_artifact_name(name) {
                continue;
            }

            match Artifact::from_path(&entry.path()) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => tracing::debug!("Skipping {}: {}", name, e),
            }
        }

        artifacts.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.name.cmp(&a.name))
        });
        artifacts.truncate(limit);
        Ok(artifacts)
    }

    /// Name of the most recent artifact, if any
    pub fn newest_name(&self) -> io::Result<Option<String>> {
        Ok(self.list(1)?.into_iter().next().map(|a| a.name))
    }

    /// List artifacts with previews, without verification.
    ///
    /// Files whose preview cannot be read are dropped from the result.
    pub fn previews(&self, limit: usize) -> io::Result<Vec<(Artifact, String)>> {
        let artifacts = self.list(limit)?;
        Ok(artifacts
            .into_iter()
            .filter_map(|artifact| match read_preview(&artifact.path) {
                Ok(preview) => Some((artifact, preview)),
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", artifact.name, e);
                    None
                }
            })
            .collect())
    }

    /// Full feed listing, each entry annotated by `verifier`.
    pub fn entries(
        &self,
        limit: usize,
        verifier: &dyn SignatureVerifier,
    ) -> io::Result<Vec<FeedEntry>> {
        Ok(self
            .previews(limit)?
            .into_iter()
            .map(|(artifact, preview)| {
                let status = verifier.verify(&artifact.path);
                FeedEntry::new(&artifact, preview, status)
            })
            .collect())
    }
}

/// Bounded preview of an artifact.
///
/// Reads at most [`PREVIEW_READ_BYTES`], decodes lossily, trims
/// whitespace and keeps the first [`PREVIEW_CHARS`] characters.
pub fn read_preview(path: &Path) -> io::Result<String> {
    let mut buf = Vec::with_capacity(PREVIEW_READ_BYTES as usize);
    File::open(path)?
        .take(PREVIEW_READ_BYTES)
        .read_to_end(&mut buf)?;
    Ok(make_preview(&buf))
}

fn make_preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim()
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}

pub fn format_timestamp(ts: SystemTime) -> String {
    DateTime::<Local>::from(ts).format(TIMESTAMP_FORMAT).to_string()
}

// ============================================================================
// Tests
// ============================================================================
