//! Export and import error types.
//!
//! Any fatal error aborts the whole operation. Errors that originate in a
//! single node are wrapped in [`ExportError::Node`] so the caller sees which
//! node failed; import errors carry the byte offset of the failing record.

use std::io;

use ovo_common::FormatError;

use crate::scene::{LightType, NodeKind};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid hierarchy at '{node}': {reason}")]
    InvalidHierarchy { node: String, reason: String },

    #[error("{kind:?} node '{node}' has no {kind:?} payload")]
    MissingPayload { node: String, kind: NodeKind },

    #[error("light type {light_type:?} cannot be written")]
    UnsupportedLightType { light_type: LightType },

    #[error("material '{material}': {detail}")]
    UnsupportedMaterialFeature { material: String, detail: String },

    #[error("invalid LOD chain: {reason}")]
    InvalidLodChain { reason: String },

    #[error("invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure while encoding one node.
    #[error("node {index} '{name}': {source}")]
    Node {
        index: u32,
        name: String,
        #[source]
        source: Box<ExportError>,
    },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExportError {
    /// Attach the identity of the node being encoded.
    pub fn at_node(self, index: u32, name: &str) -> Self {
        match self {
            already @ ExportError::Node { .. } => already,
            other => ExportError::Node {
                index,
                name: name.to_owned(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping node wrappers.
    pub fn root_cause(&self) -> &ExportError {
        match self {
            ExportError::Node { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("malformed stream at byte {offset}: {reason}")]
    MalformedStream { offset: u64, reason: String },

    #[error("unsupported OVO version {found} (supported: {supported})")]
    UnknownVersion { found: u32, supported: u32 },

    #[error(
        "node {index} '{name}' at byte {offset} references parent {parent}, which has not been read"
    )]
    DanglingParentReference {
        index: u32,
        name: String,
        parent: u32,
        offset: u64,
    },

    #[error("light '{node}' at byte {offset} has unsupported type code {code}")]
    UnsupportedLightType { node: String, code: u8, offset: u64 },

    #[error("material '{material}' at byte {offset}: {detail}")]
    UnsupportedMaterialFeature {
        material: String,
        detail: String,
        offset: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ImportError {
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        ImportError::MalformedStream {
            offset,
            reason: reason.into(),
        }
    }

    /// Byte offset of the failing record, when known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            ImportError::MalformedStream { offset, .. }
            | ImportError::DanglingParentReference { offset, .. }
            | ImportError::UnsupportedLightType { offset, .. }
            | ImportError::UnsupportedMaterialFeature { offset, .. } => Some(*offset),
            ImportError::UnknownVersion { .. } => Some(0),
            ImportError::Io(_) => None,
        }
    }
}

impl From<FormatError> for ImportError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::Malformed { offset, reason } => {
                ImportError::MalformedStream { offset, reason }
            }
            FormatError::BadMagic { found } => ImportError::MalformedStream {
                offset: 0,
                reason: format!("not an OVO file (magic {found:02x?})"),
            },
            FormatError::UnknownVersion { found, supported } => {
                ImportError::UnknownVersion { found, supported }
            }
            FormatError::Io(e) => ImportError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_wrapper_is_applied_once() {
        let err = ExportError::InvalidLodChain {
            reason: "grows".into(),
        }
        .at_node(3, "rock")
        .at_node(0, "root");

        match &err {
            ExportError::Node { index, name, .. } => {
                assert_eq!(*index, 3);
                assert_eq!(name, "rock");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(err.root_cause(), ExportError::InvalidLodChain { .. }));
        assert!(err.to_string().contains("rock"));
    }

    #[test]
    fn test_format_error_conversion() {
        let err: ImportError = FormatError::malformed(42, "bad").into();
        assert_eq!(err.offset(), Some(42));

        let err: ImportError = FormatError::UnknownVersion {
            found: 3,
            supported: 9,
        }
        .into();
        assert!(matches!(err, ImportError::UnknownVersion { found: 3, .. }));

        let err: ImportError = FormatError::BadMagic { found: *b"PNG\0" }.into();
        assert!(matches!(err, ImportError::MalformedStream { offset: 0, .. }));
    }
}
