//! Content fingerprints used as cache keys.
//!
//! [`fingerprint`] maps record content to a [`Fingerprint`]:
//! - absent content maps to the single [`Fingerprint::Empty`] bucket
//! - text and bytes map to the SHA-256 hex digest of their bytes, so identical
//!   bytes share a key regardless of filename
//! - structured values get a fresh [`Fingerprint::Unique`] key on every call and
//!   therefore always miss

use crate::record::Content;
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Sentinel for absent content.
    Empty,
    /// Hex SHA-256 of the content bytes.
    Digest(String),
    /// Never equal to any other fingerprint produced by [`fingerprint`].
    Unique(u64),
}

impl Fingerprint {
    /// Whether a cache entry under this key could ever be hit again.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Fingerprint::Unique(_))
    }

    /// String form, usable as a [`ContentStore`](crate::store::ContentStore) key.
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Fingerprint::Empty => write!(f, "empty"),
            Fingerprint::Digest(hex) => write!(f, "sha256:{hex}"),
            Fingerprint::Unique(n) => write!(f, "unique:{n}"),
        }
    }
}

/// Fingerprint a record's content.
pub fn fingerprint(content: Option<&Content>) -> Fingerprint {
    match content {
        None => Fingerprint::Empty,
        Some(c) => match c.as_bytes() {
            Some(bytes) => Fingerprint::Digest(hex_digest(bytes)),
            None => Fingerprint::Unique(NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed)),
        },
    }
}

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
