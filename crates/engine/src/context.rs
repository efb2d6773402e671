use std::sync::Arc;

use async_trait::async_trait;
use cke5_registry::Destroyable;
use tokio::sync::broadcast;

use crate::{ContextConfig, ContextEvent, ContextState, Editor, EditorConfig, EditorConstructor, EditorSource, Result};

/// An editor to create inside a [`Context`].
pub struct ContextItem {
	/// Identifier unique within the context.
	pub id: String,
	pub constructor: Arc<dyn EditorConstructor>,
	pub source: EditorSource,
	pub config: EditorConfig,
}

/// Shared container for several editors with one crash boundary.
///
/// Destroying a context destroys every editor still attached to it.
#[async_trait]
pub trait Context: Destroyable {
	fn state(&self) -> ContextState;

	fn config(&self) -> &ContextConfig;

	/// Creates the item's editor inside the context.
	async fn add_editor(&self, item: ContextItem) -> Result<Arc<dyn Editor>>;

	/// Destroys one attached editor, leaving the context running.
	async fn remove_editor(&self, item_id: &str) -> Result<()>;

	/// Attached editors in insertion order.
	fn editors(&self) -> Vec<Arc<dyn Editor>>;

	fn editor(&self, item_id: &str) -> Option<Arc<dyn Editor>>;

	fn subscribe(&self) -> broadcast::Receiver<ContextEvent>;
}

#[async_trait]
pub trait ContextFactory: Send + Sync {
	async fn create(&self, config: ContextConfig) -> Result<Arc<dyn Context>>;
}
