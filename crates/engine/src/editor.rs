use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use cke5_dom::NodeId;
use cke5_registry::Destroyable;
use tokio::sync::broadcast;

use crate::{EditorConfig, EditorEvent, EditorSource, EditorState, EditorType, Result, TranslationPack, UiRegion};

/// Capability surface of a live editor instance.
///
/// Destruction goes through [`Destroyable::destroy`] and must be idempotent.
pub trait Editor: Destroyable {
	fn editor_type(&self) -> EditorType;

	fn state(&self) -> EditorState;

	/// Serialized data of `root`.
	fn get_data(&self, root: &str) -> Result<String>;

	fn set_data(&self, root: &str, data: &str) -> Result<()>;

	/// Every model root, the internal [`crate::GRAVEYARD_ROOT`] included.
	fn root_names(&self) -> Vec<String>;

	fn has_root(&self, name: &str) -> bool {
		self.root_names().iter().any(|root| root == name)
	}

	/// Adds a root at runtime. Only multi-root editors support this.
	fn add_root(&self, name: &str, data: Option<&str>, undoable: bool) -> Result<()>;

	fn detach_root(&self, name: &str) -> Result<()>;

	/// Binds the view of `root` to `element` and renders into it.
	fn attach_editable(&self, root: &str, element: NodeId) -> Result<()>;

	/// Unbinds the view of `root`; the element stays in the document.
	fn detach_editable(&self, root: &str) -> Result<()>;

	fn editable_element(&self, root: &str) -> Option<NodeId>;

	/// Detached element holding a UI region, owned by the editor.
	fn ui_element(&self, region: UiRegion) -> Option<NodeId>;

	fn subscribe(&self) -> broadcast::Receiver<EditorEvent>;

	fn as_any(&self) -> &dyn Any;
}

/// Creates editors of one [`EditorType`].
#[async_trait]
pub trait EditorConstructor: Send + Sync {
	fn editor_type(&self) -> EditorType;

	async fn create(&self, source: EditorSource, config: EditorConfig) -> Result<Arc<dyn Editor>>;
}

/// Feature installed into an editor right after creation.
pub trait Plugin: Send + Sync {
	fn name(&self) -> &str;

	fn init(&self, editor: &Arc<dyn Editor>) -> Result<()>;

	/// Runs before the editor tears down, while its data is still readable.
	fn destroy(&self, _editor: &dyn Editor) {}
}

/// A loadable bundle of plugins and their translations.
#[async_trait]
pub trait PluginPackage: Send + Sync {
	fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>>;

	/// Translation pack for `language`; `None` when the package ships none.
	async fn translation(&self, language: &str) -> Result<Option<TranslationPack>>;
}

/// Entry point of an engine implementation.
///
/// Every accessor is async because real engines load their pieces lazily.
#[async_trait]
pub trait EngineLibrary: Send + Sync {
	async fn editor_constructor(&self, editor_type: EditorType) -> Result<Arc<dyn EditorConstructor>>;

	async fn base_package(&self) -> Result<Arc<dyn PluginPackage>>;

	/// Commercial plugin package; only loaded when a requested plugin is missing from the base one.
	async fn premium_package(&self) -> Result<Arc<dyn PluginPackage>>;

	async fn context_factory(&self) -> Result<Arc<dyn crate::ContextFactory>>;
}
