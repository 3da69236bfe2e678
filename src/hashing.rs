//! Hashing System - SHA-256 Render Keys
//!
//! A render key identifies one (template, scene, inputs, assets) combination.
//! Keys are persisted and compared outside this process, so the payload shape
//! and the canonical encoding are a wire contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::canonical::{canonical_json, CanonicalError};

pub use crate::canonical::canonicalize;

/// Lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

/// The closed set of fields hashed into a render key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderKeyInput {
    pub template_id: String,
    pub template_version: String,
    pub scene_id: String,
    pub resolved_inputs: Map<String, Value>,
    pub asset_content_hashes: BTreeMap<String, String>,
}

/// Compute the render key: lowercase hex SHA-256 of the canonical payload.
pub fn compute_render_key(input: &RenderKeyInput) -> Result<String, CanonicalError> {
    let canonical = canonical_json(input)?;
    Ok(sha256_hex(canonical.as_bytes()))
}
