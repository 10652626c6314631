//! Token cache entry serializer.
//!
//! Entries are stored as JSON inside a versioned envelope:
//!
//! ```text
//! {"version":1,"tokens":[{"key":{..},"token":{..}}, ..]}
//! ```
//!
//! Decoding is all-or-nothing: malformed JSON, an unknown version, more than
//! [`MAX_TOKENS`] tokens or a repeated token key yield
//! `CacheError::CorruptData` and no partial entry.

use serde::{Deserialize, Serialize};
use tailspin_core::{CacheError, CachedToken, TokenCacheEntry, TokenKey};

const FORMAT_VERSION: u32 = 1;

/// Upper bound on tokens per entry accepted by the decoder.
pub const MAX_TOKENS: usize = 4096;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    tokens: Vec<StoredTokenRef<'a>>,
}

#[derive(Serialize)]
struct StoredTokenRef<'a> {
    key: &'a TokenKey,
    token: &'a CachedToken,
}

/// Read first so an unknown version is reported as such.
#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    #[allow(dead_code)]
    version: u32,
    tokens: Vec<StoredToken>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredToken {
    key: TokenKey,
    token: CachedToken,
}

/// Encode an entry.
pub fn serialize(entry: &TokenCacheEntry) -> Result<Vec<u8>, CacheError> {
    let envelope = EnvelopeRef {
        version: FORMAT_VERSION,
        tokens: entry
            .iter()
            .map(|(key, token)| StoredTokenRef { key, token })
            .collect(),
    };
    serde_json::to_vec(&envelope).map_err(|e| corrupt(format!("encoding failed: {}", e)))
}

/// Decode an entry previously produced by [`serialize`].
pub fn deserialize(bytes: &[u8]) -> Result<TokenCacheEntry, CacheError> {
    let probe: VersionProbe = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    if probe.version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {}",
            probe.version
        )));
    }

    let envelope: Envelope = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    if envelope.tokens.len() > MAX_TOKENS {
        return Err(corrupt(format!(
            "token count {} exceeds limit",
            envelope.tokens.len()
        )));
    }

    let mut entry = TokenCacheEntry::new();
    for stored in envelope.tokens {
        if entry.insert(stored.key, stored.token).is_some() {
            return Err(corrupt("duplicate token key"));
        }
    }
    Ok(entry)
}

fn corrupt(reason: impl Into<String>) -> CacheError {
    CacheError::CorruptData {
        reason: reason.into(),
    }
}
