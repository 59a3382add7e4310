//! Binary encoding of compiled [`Artifact`](crate::Artifact) values.
//!
//! An artifact is a 32-byte fixed header followed by a bincode-encoded
//! payload holding the parameter declarations, the condition and result
//! tables, and the flat node array of the decision diagram.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"EBDD"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! ## Versioning
//!
//! The format version must match exactly, otherwise decoding fails with
//! [`DeserializeError::IncompatibleVersion`]. The engine version is
//! informational only.
//!
//! Decoded diagrams are checked against every structural invariant before
//! they are handed out, so a corrupted or hand-edited artifact never
//! reaches the evaluator.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bdd::{Bdd, BddNode, NodeRef};
use crate::types::{Artifact, Condition, Outcome, Parameter};

const MAGIC: &[u8; 4] = b"EBDD";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

/// Errors that can occur when writing an [`Artifact`](crate::Artifact).
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode artifact: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("I/O error during serialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when reading an [`Artifact`](crate::Artifact).
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not an endpoint-bdd artifact: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: artifact is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error during deserialization: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedArtifact {
    metadata: ArtifactMetadata,
    parameters: Vec<Parameter>,
    conditions: Vec<Condition>,
    results: Vec<Outcome>,
    nodes: Vec<BddNode>,
    root: NodeRef,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactMetadata {
    parameter_count: usize,
    condition_count: usize,
    result_count: usize,
    node_count: usize,
}

fn artifact_to_serialized(artifact: &Artifact) -> SerializedArtifact {
    let bdd = artifact.bdd();
    SerializedArtifact {
        metadata: ArtifactMetadata {
            parameter_count: artifact.parameters().len(),
            condition_count: bdd.conditions().len(),
            result_count: bdd.results().len(),
            node_count: bdd.node_count(),
        },
        parameters: artifact.parameters().to_vec(),
        conditions: bdd.conditions().to_vec(),
        results: bdd.results().to_vec(),
        nodes: bdd.nodes().to_vec(),
        root: bdd.root(),
    }
}

fn serialized_to_artifact(ser: SerializedArtifact) -> Result<Artifact, DeserializeError> {
    validate(&ser)?;
    let bdd = Bdd::from_parts(ser.conditions, ser.results, ser.nodes, ser.root);
    bdd.validate()
        .map_err(|e| DeserializeError::Validation(e.to_string()))?;
    Ok(Artifact::new(ser.parameters, bdd))
}

fn validate(ser: &SerializedArtifact) -> Result<(), DeserializeError> {
    let counts = [
        ("parameters", ser.metadata.parameter_count, ser.parameters.len()),
        ("conditions", ser.metadata.condition_count, ser.conditions.len()),
        ("results", ser.metadata.result_count, ser.results.len()),
        ("nodes", ser.metadata.node_count, ser.nodes.len()),
    ];
    for (what, declared, actual) in counts {
        if declared != actual {
            return Err(DeserializeError::Validation(format!(
                "metadata says {declared} {what} but payload has {actual}"
            )));
        }
    }

    if ser.results.first() != Some(&Outcome::NoMatch) {
        return Err(DeserializeError::Validation(
            "result 0 must be the no-match outcome".to_owned(),
        ));
    }

    let mut names = HashSet::with_capacity(ser.parameters.len());
    for parameter in &ser.parameters {
        if !names.insert(parameter.name()) {
            return Err(DeserializeError::Validation(format!(
                "duplicate parameter '{}'",
                parameter.name()
            )));
        }
    }
    Ok(())
}

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) {
    let hash = blake3::hash(payload);

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    #[allow(clippy::cast_possible_truncation)] // payload will never exceed 4 GiB
    let payload_len = payload.len() as u32;
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash.as_bytes()[..16]);
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }
    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);
    Ok((format_version, payload_len, hash))
}

pub(crate) fn encode(artifact: &Artifact) -> Result<Vec<u8>, SerializeError> {
    let serialized = artifact_to_serialized(artifact);
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Artifact, DeserializeError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;
    if format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_end = HEADER_SIZE + payload_len as usize;
    if bytes.len() != payload_end {
        return Err(DeserializeError::LengthMismatch {
            expected: payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[HEADER_SIZE..payload_end];
    if blake3::hash(payload).as_bytes()[..16] != stored_hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedArtifact, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    serialized_to_artifact(serialized)
}
