use thiserror::Error;

use crate::EditorType;

/// Failures reported by engine instances and loaders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EngineError {
	/// The operation does not exist for this editor type (e.g. `add_root` on a classic editor).
	#[error("{operation} is not supported by the {editor_type} editor")]
	UnsupportedOperation { editor_type: EditorType, operation: &'static str },
	#[error("root \"{0}\" already exists")]
	RootExists(String),
	#[error("root \"{0}\" does not exist")]
	UnknownRoot(String),
	#[error("context item \"{0}\" does not exist")]
	UnknownItem(String),
	/// The instance (or context) was already destroyed.
	#[error("instance is destroyed")]
	Destroyed,
	#[error("instance crashed: {0}")]
	Crashed(String),
	/// A constructor, package or translation failed to load.
	#[error("failed to load {what}: {message}")]
	Load { what: String, message: String },
	/// Destroying an attached item failed.
	#[error("teardown failed: {0}")]
	Teardown(String),
	/// A plugin failed while initializing against an editor.
	#[error("plugin {plugin} failed: {message}")]
	Plugin { plugin: String, message: String },
}

/// Result type for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
