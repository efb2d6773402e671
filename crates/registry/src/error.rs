use std::sync::Arc;
use std::time::Duration;

/// Error recorded for a registry key; shared so every consumer observes the same value.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Registry failures.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
	/// `register` on a key that already holds an item.
	#[error("item with id {id} is already registered")]
	AlreadyRegistered { id: String },
	/// `unregister` on a key that holds nothing.
	#[error("item with id {id} is not registered")]
	NotRegistered { id: String },
	/// `wait_for` deadline elapsed before the item or an error arrived.
	#[error("timed out after {after:?} waiting for item with id {id}")]
	Timeout { id: String, after: Duration },
	/// The producer recorded a failure for the key.
	#[error("{0}")]
	Initialization(SharedError),
	/// The queued request was dropped by `unregister`, `reset` or `destroy_all`.
	#[error("request for item with id {id} was abandoned")]
	Abandoned { id: String },
}

/// Result type for registry operations.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Renders a key for messages: `"e1"` or `<default>`.
pub fn describe_key(key: Option<&str>) -> String {
	match key {
		Some(id) => format!("\"{id}\""),
		None => "<default>".to_string(),
	}
}
