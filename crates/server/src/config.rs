//! Runtime configuration.
//!
//! Every option can come from a flag or an `AOS_*` environment variable and
//! has a default, so the server starts with no arguments at all.

use aletheia_core::{DEFAULT_NAMESPACE, DEFAULT_PRINCIPAL};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_OUTBOX: &str = "~/AletheiaOS/core/black_room/outbox";
pub const DEFAULT_ALLOWED_SIGNERS: &str = "~/.config/aletheia/allowed_signers";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_VERIFY_WORKERS: usize = 4;

/// Aletheia answer feed server
#[derive(Parser, Debug, Clone)]
#[command(name = "aletheia-server")]
#[command(about = "Serve the Aletheia outbox as a live, signature-annotated feed")]
pub struct ServerArgs {
    /// Directory holding `<id>.answer.txt` artifacts
    #[arg(long, env = "AOS_OUTBOX", default_value = DEFAULT_OUTBOX)]
    pub outbox: String,

    /// OpenSSH allowed_signers trust store
    #[arg(long, env = "AOS_ALLOWED_SIGNERS", default_value = DEFAULT_ALLOWED_SIGNERS)]
    pub allowed_signers: String,

    /// Principal signatures must verify against
    #[arg(long, env = "AOS_SIGNER_ID", default_value = DEFAULT_PRINCIPAL)]
    pub signer_id: String,

    /// Signature namespace passed to `ssh-keygen -Y verify -n`
    #[arg(long, env = "AOS_SIG_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// ssh-keygen executable
    #[arg(long, env = "AOS_SSH_KEYGEN", default_value = "ssh-keygen")]
    pub ssh_keygen: PathBuf,

    /// Seconds before a verification is abandoned as unknown
    #[arg(long, env = "AOS_VERIFY_TIMEOUT_SECS", default_value_t = 5)]
    pub verify_timeout_secs: u64,

    /// Maximum concurrent verifications
    #[arg(long, env = "AOS_VERIFY_WORKERS", default_value_t = DEFAULT_VERIFY_WORKERS)]
    pub verify_workers: usize,

    /// Outbox poll interval for the live event stream
    #[arg(long, env = "AOS_POLL_INTERVAL_MS", default_value_t = 2000)]
    pub poll_interval_ms: u64,

    /// Disable filesystem notifications and rely on polling only
    #[arg(long, env = "AOS_NO_WATCH")]
    pub no_watch: bool,

    /// Re-run verification on every request
    #[arg(long, env = "AOS_NO_VERIFY_CACHE")]
    pub no_verify_cache: bool,

    /// Address to bind
    #[arg(long, env = "AOS_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "AOS_PORT", default_value_t = 8000)]
    pub port: u16,
}

/// Resolved feed configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub outbox: PathBuf,
    pub allowed_signers: PathBuf,
    pub signer_id: String,
    pub namespace: String,
    pub ssh_keygen: PathBuf,
    pub verify_timeout: Duration,
    pub verify_workers: usize,
    pub poll_interval: Duration,
    pub watch: bool,
    pub verify_cache: bool,
}

impl FeedConfig {
    /// Defaults for everything except the two paths
    pub fn new(outbox: impl Into<PathBuf>, allowed_signers: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            allowed_signers: allowed_signers.into(),
            signer_id: DEFAULT_PRINCIPAL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            ssh_keygen: PathBuf::from("ssh-keygen"),
            verify_timeout: aletheia_core::DEFAULT_VERIFY_TIMEOUT,
            verify_workers: DEFAULT_VERIFY_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch: true,
            verify_cache: true,
        }
    }

    pub fn from_args(args: &ServerArgs) -> Self {
        Self {
            outbox: expand_home(&args.outbox),
            allowed_signers: expand_home(&args.allowed_signers),
            signer_id: args.signer_id.clone(),
            namespace: args.namespace.clone(),
            ssh_keygen: args.ssh_keygen.clone(),
            verify_timeout: Duration::from_secs(args.verify_timeout_secs.max(1)),
            verify_workers: args.verify_workers.max(1),
            poll_interval: Duration::from_millis(args.poll_interval_ms.max(50)),
            watch: !args.no_watch,
            verify_cache: !args.no_verify_cache,
        }
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(raw: &str) -> PathBuf {
    let home = || dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if raw == "~" {
        return home();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home().join(rest),
        None => Path::new(raw).to_path_buf(),
    }
}
