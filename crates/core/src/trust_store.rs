//! Allowed-signers trust store reader.
//!
//! Parses the OpenSSH `allowed_signers` format:
//!
//! ```text
//! principal [options] key-type base64-key [comment]
//! ```
//!
//! Blank lines and `#` comments are ignored. Malformed lines are skipped,
//! never fatal. Fingerprints are derived locally from the key blob in the
//! same shape `ssh-keygen -l` prints them.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Displayed when no fingerprint can be derived
pub const UNKNOWN_FINGERPRINT: &str = "unknown";

/// One parsed `allowed_signers` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEntry {
    /// Comma-separated principal patterns, as written
    pub principals: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
    pub key_type: String,
    pub key_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SignerEntry {
    /// Parse a single data line. Returns `None` for blanks, comments and
    /// lines without enough fields.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let fields = split_fields(line);
        let (principals, rest) = fields.split_first()?;

        let (options, rest) = match rest.first() {
            Some(token) if is_key_type(token) => (None, rest),
            Some(token) => (Some(token.to_string()), &rest[1..]),
            None => return None,
        };

        let [key_type, key_base64, comment @ ..] = rest else {
            return None;
        };
        if !is_key_type(key_type) {
            return None;
        }

        Some(Self {
            principals: principals.to_string(),
            options,
            key_type: key_type.to_string(),
            key_base64: key_base64.to_string(),
            comment: (!comment.is_empty()).then(|| comment.join(" ")),
        })
    }

    /// Decoded public key blob, if the base64 is valid
    pub fn key_blob(&self) -> Option<Vec<u8>> {
        STANDARD.decode(self.key_base64.as_bytes()).ok()
    }

    /// Derive the display fingerprint for this key.
    ///
    /// Returns `None` when the blob does not decode or its embedded key
    /// type disagrees with the declared one.
    pub fn fingerprint(&self) -> Option<KeyFingerprint> {
        let blob = self.key_blob()?;
        let mut reader = WireReader::new(&blob);
        let embedded_type = reader.string()?;
        if embedded_type != self.key_type.as_bytes() {
            return None;
        }

        let bits = key_bits(&self.key_type, &mut reader);
        let digest = STANDARD_NO_PAD.encode(Sha256::digest(&blob));

        Some(KeyFingerprint {
            bits,
            digest,
            comment: self.comment.clone(),
            label: key_label(&self.key_type).to_string(),
        })
    }
}

/// Human-readable key fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFingerprint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
    /// Unpadded base64 SHA-256 of the key blob
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Short algorithm label, e.g. `ED25519`
    pub label: String,
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(bits) = self.bits {
            write!(f, "{} ", bits)?;
        }
        write!(
            f,
            "SHA256:{} {} ({})",
            self.digest,
            self.comment.as_deref().unwrap_or("no comment"),
            self.label
        )
    }
}

/// Parsed trust store, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStore {
    entries: Vec<SignerEntry>,
}

impl TrustStore {
    pub fn parse(contents: &str) -> Self {
        let entries = contents.lines().filter_map(SignerEntry::parse_line).collect();
        Self { entries }
    }

    /// Read and parse the trust store at `path`. Invalid UTF-8 is replaced.
    pub fn read(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    pub fn entries(&self) -> &[SignerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fingerprint of the first entry whose key actually decodes
    pub fn first_fingerprint(&self) -> Option<KeyFingerprint> {
        self.entries.iter().find_map(SignerEntry::fingerprint)
    }
}

/// Fingerprint string for the signer key configured at `path`, or
/// [`UNKNOWN_FINGERPRINT`] when the file is absent, unreadable or holds no
/// usable entry.
pub fn signer_fingerprint(path: &Path) -> String {
    match TrustStore::read(path) {
        Ok(store) => store
            .first_fingerprint()
            .map(|fp| fp.to_string())
            .unwrap_or_else(|| UNKNOWN_FINGERPRINT.to_string()),
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!("Cannot read trust store {}: {}", path.display(), e);
            }
            UNKNOWN_FINGERPRINT.to_string()
        }
    }
}

// ============================================================================
// Line and blob helpers
// ============================================================================

/// Whitespace split that keeps double-quoted runs (option values) intact
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_quotes = false;

    for (i, c) in line.char_indices() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                start.get_or_insert(i);
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(s) = start.take() {
                    fields.push(&line[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(s) = start {
        fields.push(&line[s..]);
    }
    fields
}

fn is_key_type(token: &str) -> bool {
    token.starts_with("ssh-") || token.starts_with("ecdsa-sha2-") || token.starts_with("sk-")
}

fn key_label(key_type: &str) -> &'static str {
    match key_type {
        "ssh-ed25519" => "ED25519",
        "sk-ssh-ed25519@openssh.com" => "ED25519-SK",
        "ssh-rsa" => "RSA",
        "ssh-dss" => "DSA",
        t if t.starts_with("sk-ecdsa-sha2-") => "ECDSA-SK",
        t if t.starts_with("ecdsa-sha2-") => "ECDSA",
        _ => "UNKNOWN",
    }
}

/// Key size in bits, read from the remainder of the blob after the type
fn key_bits(key_type: &str, reader: &mut WireReader<'_>) -> Option<u32> {
    match key_type {
        "ssh-ed25519" | "sk-ssh-ed25519@openssh.com" => Some(256),
        "ssh-rsa" => {
            let _exponent = reader.string()?;
            mpint_bits(reader.string()?)
        }
        "ssh-dss" => mpint_bits(reader.string()?),
        t if t.starts_with("ecdsa-sha2-") || t.starts_with("sk-ecdsa-sha2-") => {
            match reader.string()? {
                b"nistp256" => Some(256),
                b"nistp384" => Some(384),
                b"nistp521" => Some(521),
                _ => None,
            }
        }
        _ => None,
    }
}

fn mpint_bits(bytes: &[u8]) -> Option<u32> {
    let first = bytes.iter().position(|b| *b != 0)?;
    let significant = &bytes[first..];
    let lead = 8 - significant[0].leading_zeros();
    Some((significant.len() as u32 - 1) * 8 + lead)
}

/// Reader for SSH wire-format length-prefixed strings
struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn string(&mut self) -> Option<&'a [u8]> {
        let (len, rest) = self.buf.split_first_chunk::<4>()?;
        let len = u32::from_be_bytes(*len) as usize;
        if rest.len() < len {
            return None;
        }
        let (value, rest) = rest.split_at(len);
        self.buf = rest;
        Some(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
