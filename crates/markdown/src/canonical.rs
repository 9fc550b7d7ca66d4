use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const HASH_PREFIX: &str = "sha256:";
const ABSENT: &str = "absent";

/// Canonical text form used for hashing and for everything the grammar and editor write:
/// LF line endings, no trailing spaces or tabs, exactly one final newline.
#[must_use]
pub fn canonicalize_text(input: &str) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len() + 1);
    for (idx, line) in unified.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(line.trim_end_matches(&[' ', '\t'][..]));
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Content hash of a document, `sha256:<hex>` over its canonical form.
///
/// The special value `absent` stands for "no document existed".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    #[must_use]
    pub fn of(text: &str) -> Self {
        let canonical = canonicalize_text(text);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{HASH_PREFIX}{}", hex_encode_lower(&hasher.finalize())))
    }

    #[must_use]
    pub fn absent() -> Self {
        Self(ABSENT.to_string())
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.0 == ABSENT
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts `absent` or `sha256:` followed by 64 lowercase hex digits.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == ABSENT {
            return Some(Self::absent());
        }
        let hex = raw.strip_prefix(HASH_PREFIX)?;
        if hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }
}

/// Shorthand for [`ContentHash::of`].
#[must_use]
pub fn content_hash(text: &str) -> ContentHash {
    ContentHash::of(text)
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
