//! Aletheia outbox core
//!
//! Name resolution, trust-store parsing, signature verification and outbox
//! scanning for the answer feed. Everything here is synchronous; the server
//! crate decides what runs on which executor.

pub mod error;
pub mod name;
pub mod scan;
pub mod status;
pub mod trust_store;
pub mod verify;

pub use error::{ErrorCode, FeedError, FeedResult};
pub use name::{
    is_artifact_name, signature_path, validate_name, ArtifactPaths, NameResolver,
    ARTIFACT_SUFFIX, SIGNATURE_SUFFIX,
};
pub use scan::{
    format_timestamp, read_preview, Artifact, FeedEntry, FeedScanner, DEFAULT_FEED_LIMIT,
    PAGE_FEED_LIMIT, PREVIEW_CHARS, PREVIEW_READ_BYTES,
};
pub use status::VerificationStatus;
pub use trust_store::{
    signer_fingerprint, KeyFingerprint, SignerEntry, TrustStore, UNKNOWN_FINGERPRINT,
};
pub use verify::{
    MemoizingVerifier, SignatureVerifier, SshKeygenVerifier, VerificationUnavailable,
    DEFAULT_NAMESPACE, DEFAULT_PRINCIPAL, DEFAULT_VERIFY_TIMEOUT,
};
