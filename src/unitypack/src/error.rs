//! Error types
//!
//! Two tiers: [`ContainerError`] is fatal for one input source, [`ObjectError`]
//! is recoverable and scoped to a single object. [`UsageError`] covers bad
//! extraction requests and is raised before anything is parsed.

use crate::kind::ResourceKind;
use crate::reader::ReadError;

/// A container (bundle or serialized file) could not be parsed
#[derive(thiserror::Error, Debug)]
pub enum ContainerError {
    #[error("Invalid bundle signature: {0:?}")]
    InvalidSignature(String),

    #[error("Unsupported {container} format version {version}")]
    UnsupportedVersion {
        container: &'static str,
        version: u32,
    },

    #[error("Truncated container: {0}")]
    Truncated(#[from] ReadError),

    #[error("{what} out of range: {offset:#x} + {size:#x} exceeds {limit:#x}")]
    OutOfRange {
        what: &'static str,
        offset: u64,
        size: u64,
        limit: u64,
    },

    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: i64 },

    #[error("Unknown compression type {0}")]
    UnknownCompression(u32),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Duplicate path_id {0} in object table")]
    DuplicatePathId(i64),
}

/// A single object could not be resolved or decoded
///
/// Cloneable so a failed decode can sit in the object's cache slot.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ObjectError {
    #[error("No object with path_id {0}")]
    ObjectNotFound(i64),

    #[error("No decoder for object type {0}")]
    UnsupportedType(String),

    #[error("Truncated payload: {0}")]
    TruncatedPayload(ReadError),

    #[error("Dangling reference: file_id {file_id}, path_id {path_id}")]
    DanglingReference { file_id: i32, path_id: i64 },

    #[error("Asset carries no type tree for class {0}")]
    MissingTypeTree(i32),

    #[error("Type mismatch: requested {expected}, object is {actual}")]
    TypeMismatch {
        expected: ResourceKind,
        actual: String,
    },

    #[error("Missing field {0:?}")]
    MissingField(String),

    #[error("Field {field:?} is not {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    #[error("Unsupported pixel format {0}")]
    UnsupportedPixelFormat(String),

    #[error("Empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Unsupported mesh feature: {0}")]
    UnsupportedMeshFeature(String),

    #[error("Streamed resource {0:?} not found")]
    MissingResource(String),

    #[error("No {0} available")]
    MissingCollaborator(&'static str),

    #[error("Asset has no manifest object")]
    MissingManifest,

    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl From<ReadError> for ObjectError {
    fn from(err: ReadError) -> Self {
        ObjectError::TruncatedPayload(err)
    }
}

/// An extraction request that cannot be served
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Unknown resource kind {0:?}")]
    UnknownKind(String),

    #[error("No resource kinds selected")]
    NoKindsSelected,
}

pub type Result<T, E = ContainerError> = std::result::Result<T, E>;
