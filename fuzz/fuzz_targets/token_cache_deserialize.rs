//! Fuzz test for the token cache deserializer
//!
//! Cache blobs come from a shared backend and may be truncated, stale or
//! written by another version. Decoding must never panic, and anything that
//! does decode must re-encode to an equal entry.
//!
//! Run with: cargo +nightly fuzz run token_cache_deserialize -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tailspin_auth::serializer::{deserialize, serialize};
use tailspin_core::CacheError;

fuzz_target!(|data: &[u8]| {
    match deserialize(data) {
        Ok(entry) => {
            let reencoded = match serialize(&entry) {
                Ok(bytes) => bytes,
                Err(err) => panic!("decoded entry failed to re-encode: {:?}", err),
            };
            assert_eq!(
                deserialize(&reencoded).ok(),
                Some(entry),
                "decoded entry must survive a re-encode"
            );
        }
        Err(err) => {
            assert!(
                matches!(err, CacheError::CorruptData { .. }),
                "malformed input must be reported as corrupt data, got {:?}",
                err
            );
        }
    }
});
