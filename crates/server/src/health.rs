//! `/health` endpoint contract.
//!
//! Liveness plus a summary of the two filesystem inputs the feed depends
//! on. A missing outbox or trust store is reported, never fatal.

use aletheia_core::TrustStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::FeedConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub build: BuildInfo,
    pub outbox: OutboxHealth,
    pub trust_store: TrustStoreHealth,
    pub signer_id: String,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxHealth {
    pub path: String,
    pub readable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustStoreHealth {
    pub path: String,
    pub present: bool,
    /// Parsed signer lines; absent when the file cannot be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signers: Option<usize>,
}

pub fn check_health(config: &FeedConfig) -> HealthResponse {
    HealthResponse {
        ok: true,
        build: BuildInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: option_env!("GIT_SHA").map(String::from),
        },
        outbox: check_outbox(&config.outbox),
        trust_store: check_trust_store(&config.allowed_signers),
        signer_id: config.signer_id.clone(),
        checked_at: Utc::now(),
    }
}

fn check_outbox(outbox: &Path) -> OutboxHealth {
    OutboxHealth {
        path: outbox.display().to_string(),
        readable: fs::read_dir(outbox).is_ok(),
    }
}

fn check_trust_store(path: &Path) -> TrustStoreHealth {
    let signers = TrustStore::read(path).ok().map(|store| store.entries().len());
    TrustStoreHealth {
        path: path.display().to_string(),
        present: path.is_file(),
        signers,
    }
}
