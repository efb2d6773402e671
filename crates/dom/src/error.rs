use thiserror::Error;

use crate::NodeId;

/// Document mutation and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
	/// The node id does not belong to this document.
	#[error("unknown node {0}")]
	UnknownNode(NodeId),
	/// `define` was called twice for one tag.
	#[error("custom element <{0}> is already defined")]
	AlreadyDefined(String),
	/// The selector uses syntax outside the supported subset.
	#[error("invalid selector {selector:?}: {reason}")]
	InvalidSelector { selector: String, reason: String },
	/// Appending would make a node its own ancestor.
	#[error("cannot insert node {child} under its descendant {parent}")]
	HierarchyRequest { parent: NodeId, child: NodeId },
}

/// Result type for document operations.
pub type Result<T, E = DomError> = std::result::Result<T, E>;
