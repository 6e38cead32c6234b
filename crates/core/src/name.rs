//! Artifact name resolution.
//!
//! Turns an untrusted, client-supplied artifact name into a pair of paths
//! inside the outbox root. Anything that is not a bare `<id>.answer.txt`
//! file name is rejected outright; nothing is ever "cleaned up".

use crate::error::{FeedError, FeedResult};
use std::path::{Component, Path, PathBuf};

/// Required suffix for every artifact file name
pub const ARTIFACT_SUFFIX: &str = ".answer.txt";

/// Suffix appended to an artifact path to locate its detached signature
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Resolved on-disk locations for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub name: String,
    pub artifact: PathBuf,
    pub signature: PathBuf,
}

/// Validates artifact names against a single outbox root
#[derive(Debug, Clone)]
pub struct NameResolver {
    root: PathBuf,
}

impl NameResolver {
    /// Create a resolver for `root`. Relative roots are anchored at the
    /// current working directory so resolved paths are always absolute.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` to its artifact and signature paths.
    pub fn resolve(&self, candidate: &str) -> FeedResult<ArtifactPaths> {
        let name = validate_name(candidate)?;

        let artifact = self.root.join(name);
        // Lexical containment check; `validate_name` already guarantees a
        // single normal component, this guards against future regressions.
        if artifact.parent() != Some(self.root.as_path()) {
            return Err(FeedError::invalid_name(candidate));
        }

        let signature = signature_path(&artifact);
        Ok(ArtifactPaths {
            name: name.to_string(),
            artifact,
            signature,
        })
    }
}

/// Sidecar signature location for an artifact path
pub fn signature_path(artifact: &Path) -> PathBuf {
    let mut raw = artifact.as_os_str().to_owned();
    raw.push(SIGNATURE_SUFFIX);
    PathBuf::from(raw)
}

/// Check that `candidate` is a bare artifact file name.
///
/// Rejects separators of either platform, `..` anywhere, control
/// characters (NUL, CR and LF included), names with no id before the
/// suffix, and names that do not end in [`ARTIFACT_SUFFIX`].
pub fn validate_name(candidate: &str) -> FeedResult<&str> {
    if candidate.is_empty()
        || candidate.contains('/')
        || candidate.contains('\\')
        || candidate.contains("..")
        || candidate.chars().any(char::is_control)
    {
        return Err(FeedError::invalid_name(candidate));
    }

    let id = candidate
        .strip_suffix(ARTIFACT_SUFFIX)
        .ok_or_else(|| FeedError::invalid_name(candidate))?;
    if id.is_empty() {
        return Err(FeedError::invalid_name(candidate));
    }

    // Must be exactly one normal component, i.e. the base name of itself.
    let mut components = Path::new(candidate).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == candidate => Ok(candidate),
        _ => Err(FeedError::invalid_name(candidate)),
    }
}

/// True when `file_name` follows the artifact naming convention
pub fn is_artifact_name(file_name: &str) -> bool {
    validate_name(file_name).is_ok()
}
