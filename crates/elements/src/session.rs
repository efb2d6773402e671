use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cke5_dom::{Document, ElementFactory};
use cke5_engine::{Context, Editor, EngineLibrary, Plugin, PluginPackage};
use cke5_registry::{AsyncRegistry, CustomPluginsRegistry};
use cke5_worker::TaskClass;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::descriptor::ATTR_EDITOR_ID;
use crate::hosts::{ContextHost, EditableHost, EditorHost, UiPartHost, factory};
use crate::pipeline::{AttachmentState, ContextAttachment};
use crate::{CONTEXT_TAG, EDITABLE_TAG, EDITOR_TAG, HostConfig, Result, UI_PART_TAG};

/// Editors by editor id.
pub type EditorsRegistry = AsyncRegistry<dyn Editor>;

/// Shared contexts by context id.
pub type ContextsRegistry = AsyncRegistry<dyn Context>;

/// User-supplied plugins, consulted before any engine package.
pub type CustomEditorPluginsRegistry = CustomPluginsRegistry<Arc<dyn Plugin>>;

/// Identity of an instance, independent of the trait object it is viewed through.
fn instance_key<T: ?Sized>(instance: &Arc<T>) -> usize {
	Arc::as_ptr(instance).cast::<()>() as usize
}

/// One page's worth of hosts: the document, the engine and every registry they share.
///
/// Hosts hold the session weakly; dropping the last strong handle turns their callbacks into
/// no-ops.
pub struct Session {
	document: Document,
	library: Arc<dyn EngineLibrary>,
	config: HostConfig,
	editors: EditorsRegistry,
	contexts: ContextsRegistry,
	plugins: CustomEditorPluginsRegistry,
	premium: OnceCell<Arc<dyn PluginPackage>>,
	attachments: Mutex<HashMap<usize, ContextAttachment>>,
	defined: AtomicBool,
	tasks: TaskTracker,
}

impl Session {
	pub fn new(document: Document, library: Arc<dyn EngineLibrary>) -> Arc<Self> {
		Self::with_config(document, library, HostConfig::default())
	}

	pub fn with_config(document: Document, library: Arc<dyn EngineLibrary>, config: HostConfig) -> Arc<Self> {
		Arc::new(Self {
			document,
			library,
			config,
			editors: EditorsRegistry::new(),
			contexts: ContextsRegistry::new(),
			plugins: CustomEditorPluginsRegistry::new(),
			premium: OnceCell::new(),
			attachments: Mutex::new(HashMap::new()),
			defined: AtomicBool::new(false),
			tasks: TaskTracker::new(),
		})
	}

	pub fn document(&self) -> &Document {
		&self.document
	}

	pub fn library(&self) -> &dyn EngineLibrary {
		self.library.as_ref()
	}

	pub fn config(&self) -> &HostConfig {
		&self.config
	}

	pub fn editors(&self) -> &EditorsRegistry {
		&self.editors
	}

	pub fn contexts(&self) -> &ContextsRegistry {
		&self.contexts
	}

	pub fn plugins(&self) -> &CustomEditorPluginsRegistry {
		&self.plugins
	}

	/// Defines the four host elements on the session's document.
	///
	/// Only the first call has an effect; elements already in the document connect right away.
	pub fn define_elements(self: &Arc<Self>) -> Result<()> {
		if self.defined.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		let definitions: [(&str, Arc<dyn ElementFactory>); 4] = [
			(EDITOR_TAG, factory::<EditorHost>(self)),
			(EDITABLE_TAG, factory::<EditableHost>(self)),
			(CONTEXT_TAG, factory::<ContextHost>(self)),
			(UI_PART_TAG, factory::<UiPartHost>(self)),
		];
		for (tag, definition) in definitions {
			self.document.define(tag, definition)?;
		}
		tracing::debug!("session.define_elements");
		Ok(())
	}

	/// Editor ids of the editor hosts in the document, in document order.
	pub fn query_all_editor_ids(&self) -> Vec<String> {
		let selector = format!("{EDITOR_TAG}[{ATTR_EDITOR_ID}]");
		self.document
			.query_selector_all(&selector)
			.unwrap_or_default()
			.into_iter()
			.filter_map(|node| self.document.attribute(node, ATTR_EDITOR_ID))
			.collect()
	}

	/// The premium package, loaded on first use and shared afterwards.
	pub(crate) async fn premium_package(&self) -> cke5_engine::Result<Arc<dyn PluginPackage>> {
		self.premium
			.get_or_try_init(|| self.library.premium_package())
			.await
			.map(Arc::clone)
	}

	pub(crate) fn record_attachment(&self, editor: &Arc<dyn Editor>, attachment: ContextAttachment) {
		self.attachments.lock().insert(instance_key(editor), attachment);
	}

	/// The context an editor was created in, if any.
	pub fn attachment(&self, editor: &Arc<dyn Editor>) -> Option<ContextAttachment> {
		self.attachments.lock().get(&instance_key(editor)).cloned()
	}

	pub(crate) fn take_attachment(&self, editor: &Arc<dyn Editor>) -> Option<ContextAttachment> {
		self.attachments.lock().remove(&instance_key(editor))
	}

	/// Marks every editor attached to `context` unavailable and returns those editors.
	pub(crate) fn release_context(&self, context: &Arc<dyn Context>) -> Vec<Arc<dyn Editor>> {
		let mut attachments = self.attachments.lock();
		let mut released = Vec::new();
		for attachment in attachments.values_mut() {
			if Arc::ptr_eq(&attachment.context, context) && attachment.state == AttachmentState::Available {
				attachment.state = AttachmentState::Unavailable;
				if let Some(editor) = attachment.context.editor(&attachment.editor_context_id) {
					released.push(editor);
				}
			}
		}
		released
	}

	/// Unregisters every id under which `editor` is registered.
	pub(crate) fn unregister_editor(&self, editor: &Arc<dyn Editor>) {
		for (key, item) in self.editors.items() {
			if key.is_some()
				&& Arc::ptr_eq(&item, editor)
				&& let Err(err) = self.editors.unregister(key.as_deref())
			{
				tracing::debug!(error = %err, "session.unregister_editor");
			}
		}
	}

	/// Spawns connect/teardown work that [`Self::settle`] waits for.
	pub(crate) fn spawn_tracked<F>(&self, class: TaskClass, fut: F) -> JoinHandle<()>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		cke5_worker::spawn(class, self.tasks.track_future(fut))
	}

	/// Waits until every connect and disconnect sequence started so far has finished.
	///
	/// A connect still waiting for an editor or context that never registers keeps this pending.
	pub async fn settle(&self) {
		self.tasks.close();
		self.tasks.wait().await;
		self.tasks.reopen();
	}

	/// Forgets all registry state and attachments without destroying anything.
	pub fn reset(&self) {
		self.editors.reset();
		self.contexts.reset();
		self.plugins.unregister_all();
		self.attachments.lock().clear();
	}

	/// Destroys every registered editor, then every context.
	pub async fn destroy_all(&self) -> std::result::Result<(), cke5_registry::SharedError> {
		let editors = self.editors.destroy_all().await;
		let contexts = self.contexts.destroy_all().await;
		self.attachments.lock().clear();
		editors.and(contexts)
	}
}
