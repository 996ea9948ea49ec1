//! Canonical JSON serialization and SHA-256 digests.
//!
//! Object keys are written in sorted order and array order is preserved, so two
//! values that differ only in object key insertion order serialize to the same
//! bytes. Serialization goes through a thread-local buffer to avoid a fresh
//! allocation per request.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{cell::RefCell, fmt::Write};
use thiserror::Error;

/// Nesting depth beyond which a value is refused instead of canonicalized.
pub const MAX_CANONICAL_DEPTH: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("value nested deeper than {0} levels")]
    TooDeep(usize),
}

thread_local! {
    static CANONICAL_BUFFER: RefCell<String> = RefCell::new(String::with_capacity(1024));
}

/// Serializes `value` with sorted object keys.
///
/// # Errors
///
/// Returns [`CanonicalError::TooDeep`] when the value nests deeper than
/// [`MAX_CANONICAL_DEPTH`].
pub fn canonical_string(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    write_canonical(value, &mut out, 0)?;
    Ok(out)
}

/// Canonicalizes `value` and returns the lowercase hex SHA-256 of the result.
///
/// # Errors
///
/// Returns [`CanonicalError::TooDeep`] when the value nests too deeply.
pub fn canonical_sha256_hex(value: &Value) -> Result<String, CanonicalError> {
    CANONICAL_BUFFER.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        buffer.clear();
        write_canonical(value, &mut buffer, 0)?;
        Ok(sha256_hex(buffer.as_bytes()))
    })
}

#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

fn write_canonical(value: &Value, out: &mut String, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_CANONICAL_DEPTH {
        return Err(CanonicalError::TooDeep(MAX_CANONICAL_DEPTH));
    }

    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                if let Some(child) = map.get(key) {
                    write_canonical(child, out, depth + 1)?;
                }
            }
            out.push('}');
        }
        leaf => {
            let _ = write!(out, "{leaf}");
        }
    }

    Ok(())
}
