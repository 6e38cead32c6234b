//! Detached-signature verification.
//!
//! [`SignatureVerifier`] is the capability callers depend on. The shipped
//! backend, [`SshKeygenVerifier`], delegates to `ssh-keygen -Y verify`
//! against an `allowed_signers` file. Every failure that is not a clean
//! "signature rejected" answer from the backend degrades to
//! [`VerificationStatus::Unknown`].
//!
//! Implementations block. Async callers must run them off the reactor.

use crate::name::signature_path;
use crate::status::VerificationStatus;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

/// Namespace signatures are bound to (`ssh-keygen -n`)
pub const DEFAULT_NAMESPACE: &str = "aletheia";

/// Principal checked when none is configured
pub const DEFAULT_PRINCIPAL: &str = "aletheia";

/// Upper bound on one external verification
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Capability: classify the trust status of one artifact.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, artifact: &Path) -> VerificationStatus;
}

impl<V: SignatureVerifier + ?Sized> SignatureVerifier for std::sync::Arc<V> {
    fn verify(&self, artifact: &Path) -> VerificationStatus {
        (**self).verify(artifact)
    }
}

/// Reasons verification could not produce a verdict
#[derive(Debug, Error)]
pub enum VerificationUnavailable {
    #[error("Cannot open artifact: {0}")]
    Artifact(#[source] io::Error),

    #[error("Cannot start verifier {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Verifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Verifier terminated without exit code")]
    Terminated,

    #[error("Error waiting for verifier: {0}")]
    Wait(#[source] io::Error),
}

// ============================================================================
// OpenSSH backend
// ============================================================================

/// Verifies `<artifact>.sig` with `ssh-keygen -Y verify`.
///
/// The artifact bytes are streamed to the tool's stdin.
#[derive(Debug, Clone)]
pub struct SshKeygenVerifier {
    program: PathBuf,
    allowed_signers: PathBuf,
    principal: String,
    namespace: String,
    timeout: Duration,
}

impl SshKeygenVerifier {
    pub fn new(allowed_signers: impl Into<PathBuf>, principal: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("ssh-keygen"),
            allowed_signers: allowed_signers.into(),
            principal: principal.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the tool and return its exit status
    fn run(&self, artifact: &Path, signature: &Path) -> Result<ExitStatus, VerificationUnavailable> {
        let payload = File::open(artifact).map_err(VerificationUnavailable::Artifact)?;

        let child = Command::new(&self.program)
            .arg("-Y")
            .arg("verify")
            .arg("-f")
            .arg(&self.allowed_signers)
            .arg("-I")
            .arg(&self.principal)
            .arg("-n")
            .arg(&self.namespace)
            .arg("-s")
            .arg(signature)
            .stdin(Stdio::from(payload))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| VerificationUnavailable::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        wait_with_deadline(child, self.timeout)
    }
}

impl SignatureVerifier for SshKeygenVerifier {
    fn verify(&self, artifact: &Path) -> VerificationStatus {
        let signature = signature_path(artifact);
        if !signature.exists() || !self.allowed_signers.exists() {
            return VerificationStatus::Unknown;
        }

        match self.run(artifact, &signature) {
            Ok(status) if status.success() => VerificationStatus::Verified,
            Ok(status) if status.code().is_some() => {
                tracing::debug!(
                    "Signature rejected for {} (exit {:?})",
                    artifact.display(),
                    status.code()
                );
                VerificationStatus::Invalid
            }
            Ok(_) => {
                tracing::warn!(
                    "Verification of {} unavailable: {}",
                    artifact.display(),
                    VerificationUnavailable::Terminated
                );
                VerificationStatus::Unknown
            }
            Err(e) => {
                tracing::warn!("Verification of {} unavailable: {}", artifact.display(), e);
                VerificationStatus::Unknown
            }
        }
    }
}

/// Wait for `child` until `timeout`, killing and reaping it on expiry.
fn wait_with_deadline(
    mut child: Child,
    timeout: Duration,
) -> Result<ExitStatus, VerificationUnavailable> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if start.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VerificationUnavailable::Timeout(timeout));
            }
            Ok(None) => std::thread::sleep(WAIT_POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VerificationUnavailable::Wait(e));
            }
        }
    }
}

// ============================================================================
// Memoization
// ============================================================================

const MEMO_CAPACITY: usize = 4096;

/// (modified, len) of a file, or `None` when it does not exist
type FileStamp = Option<(SystemTime, u64)>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    artifact: PathBuf,
    artifact_stamp: FileStamp,
    signature_stamp: FileStamp,
    trust_store_stamp: FileStamp,
}

/// Caches verdicts of an inner verifier, keyed by the path and the
/// modification stamps of the artifact, its signature and the trust store.
///
/// Any change to one of those files yields a fresh key, so results are
/// indistinguishable from calling the inner verifier every time.
pub struct MemoizingVerifier<V> {
    inner: V,
    trust_store: PathBuf,
    memo: Mutex<HashMap<MemoKey, VerificationStatus>>,
}

impl<V: SignatureVerifier> MemoizingVerifier<V> {
    pub fn new(inner: V, trust_store: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            trust_store: trust_store.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.memo.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn key_for(&self, artifact: &Path) -> Option<MemoKey> {
        // Without a readable artifact there is nothing stable to key on.
        let artifact_stamp = Some(file_stamp(artifact)?);
        Some(MemoKey {
            artifact: artifact.to_path_buf(),
            artifact_stamp,
            signature_stamp: file_stamp(&signature_path(artifact)),
            trust_store_stamp: file_stamp(&self.trust_store),
        })
    }
}

impl<V: SignatureVerifier> SignatureVerifier for MemoizingVerifier<V> {
    fn verify(&self, artifact: &Path) -> VerificationStatus {
        let Some(key) = self.key_for(artifact) else {
            return self.inner.verify(artifact);
        };

        if let Ok(memo) = self.memo.lock() {
            if let Some(status) = memo.get(&key) {
                return *status;
            }
        }

        let status = self.inner.verify(artifact);

        // Unknown may stem from a transient tool failure; do not pin it.
        if status != VerificationStatus::Unknown {
            if let Ok(mut memo) = self.memo.lock() {
                if memo.len() >= MEMO_CAPACITY {
                    memo.clear();
                }
                memo.insert(key, status);
            }
        }
        status
    }
}

fn file_stamp(path: &Path) -> FileStamp {
    let meta = fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

// ============================================================================
// Tests
// ============================================================================
