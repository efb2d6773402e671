use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cke5_dom::{Document, NodeId};
use cke5_registry::{Destroyable, SharedError};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{
	Editor, EditorConfig, EditorEvent, EditorSource, EditorState, EditorType, EngineError, GRAVEYARD_ROOT, MAIN_ROOT, Plugin, Result, UiRegion,
};

#[derive(Debug, Default)]
struct Root {
	data: String,
	editable: Option<NodeId>,
	undoable: bool,
}

struct EditorModel {
	state: EditorState,
	roots: BTreeMap<String, Root>,
}

/// Editor keeping its model as one string per root and rendering it as editable text.
pub struct MemoryEditor {
	editor_type: EditorType,
	document: Document,
	config: EditorConfig,
	model: RwLock<EditorModel>,
	toolbar: NodeId,
	menubar: NodeId,
	events: broadcast::Sender<EditorEvent>,
}

impl MemoryEditor {
	/// Builds the editor, renders its roots and initializes `config.plugins` in order.
	pub(crate) fn create(editor_type: EditorType, document: Document, source: EditorSource, config: EditorConfig) -> Result<Arc<Self>> {
		let mut roots = BTreeMap::new();
		match &source {
			EditorSource::Element(element) => {
				let data = config.initial_data.root(MAIN_ROOT).unwrap_or_default().to_string();
				roots.insert(MAIN_ROOT.to_string(), Root {
					data,
					editable: Some(*element),
					undoable: true,
				});
			}
			EditorSource::Roots(elements) => {
				if editor_type.is_single_root() && elements.len() != 1 {
					return Err(EngineError::UnsupportedOperation {
						editor_type,
						operation: "multiple roots",
					});
				}
				for (name, element) in elements {
					let data = config.initial_data.root(name).unwrap_or_default().to_string();
					roots.insert(name.clone(), Root {
						data,
						editable: Some(*element),
						undoable: true,
					});
				}
			}
		}

		let toolbar = document.create_element_with("div", &[("class", "ck ck-toolbar")]);
		let menubar = document.create_element_with("div", &[("class", "ck ck-menu-bar")]);
		let (events, _) = broadcast::channel(64);
		let editor = Arc::new(Self {
			editor_type,
			document,
			config,
			model: RwLock::new(EditorModel {
				state: EditorState::Initializing,
				roots,
			}),
			toolbar,
			menubar,
			events,
		});

		for (name, root) in &editor.model.read().roots {
			editor.render(name, root);
		}

		let handle: Arc<dyn Editor> = editor.clone();
		for plugin in &editor.config.plugins {
			plugin.init(&handle).map_err(|err| EngineError::Plugin {
				plugin: plugin.name().to_string(),
				message: err.to_string(),
			})?;
		}
		editor.model.write().state = EditorState::Ready;
		tracing::debug!(editor_type = %editor_type, plugins = editor.config.plugins.len(), "memory.editor.ready");
		Ok(editor)
	}

	fn render(&self, name: &str, root: &Root) {
		if let Some(element) = root.editable
			&& let Err(err) = self.document.set_text(element, root.data.clone())
		{
			tracing::warn!(root = name, error = %err, "memory.editor.render");
		}
	}

	fn writable(&self, model: &EditorModel) -> Result<()> {
		match model.state {
			EditorState::Destroyed => Err(EngineError::Destroyed),
			EditorState::Crashed => Err(EngineError::Crashed("editor is crashed".to_string())),
			EditorState::Initializing | EditorState::Ready => Ok(()),
		}
	}

	fn require_multiroot(&self, operation: &'static str) -> Result<()> {
		if self.editor_type == EditorType::Multiroot {
			Ok(())
		} else {
			Err(EngineError::UnsupportedOperation {
				editor_type: self.editor_type,
				operation,
			})
		}
	}

	pub fn config(&self) -> &EditorConfig {
		&self.config
	}

	/// Names of the installed plugins, in initialization order.
	pub fn plugin_names(&self) -> Vec<String> {
		self.config.plugins.iter().map(|p| p.name().to_string()).collect()
	}

	/// Whether `root` was added with undo support.
	pub fn is_undoable(&self, root: &str) -> Option<bool> {
		self.model.read().roots.get(root).map(|r| r.undoable)
	}

	/// Puts the editor into the crashed state, as an internal failure would.
	pub fn simulate_crash(&self, reason: &str) {
		{
			let mut model = self.model.write();
			if model.state != EditorState::Ready {
				return;
			}
			model.state = EditorState::Crashed;
		}
		tracing::warn!(editor_type = %self.editor_type, reason, "memory.editor.crash");
		let _ = self.events.send(EditorEvent::Crashed(reason.to_string()));
	}
}

#[async_trait]
impl Destroyable for MemoryEditor {
	async fn destroy(&self) -> std::result::Result<(), SharedError> {
		if self.model.read().state == EditorState::Destroyed {
			return Ok(());
		}
		for plugin in &self.config.plugins {
			plugin.destroy(self);
		}

		let editables: Vec<NodeId> = {
			let mut model = self.model.write();
			if model.state == EditorState::Destroyed {
				return Ok(());
			}
			model.state = EditorState::Destroyed;
			model.roots.values_mut().filter_map(|root| root.editable.take()).collect()
		};
		for element in editables {
			let _ = self.document.set_text(element, String::new());
		}
		tracing::debug!(editor_type = %self.editor_type, "memory.editor.destroyed");
		let _ = self.events.send(EditorEvent::Destroyed);
		Ok(())
	}
}

impl Editor for MemoryEditor {
	fn editor_type(&self) -> EditorType {
		self.editor_type
	}

	fn state(&self) -> EditorState {
		self.model.read().state
	}

	fn get_data(&self, root: &str) -> Result<String> {
		let model = self.model.read();
		if model.state == EditorState::Destroyed {
			return Err(EngineError::Destroyed);
		}
		model
			.roots
			.get(root)
			.map(|r| r.data.clone())
			.ok_or_else(|| EngineError::UnknownRoot(root.to_string()))
	}

	fn set_data(&self, root: &str, data: &str) -> Result<()> {
		{
			let mut model = self.model.write();
			self.writable(&model)?;
			let entry = model.roots.get_mut(root).ok_or_else(|| EngineError::UnknownRoot(root.to_string()))?;
			entry.data = data.to_string();
			self.render(root, entry);
		}
		let _ = self.events.send(EditorEvent::ChangeData);
		Ok(())
	}

	fn root_names(&self) -> Vec<String> {
		let model = self.model.read();
		model
			.roots
			.keys()
			.cloned()
			.chain(std::iter::once(GRAVEYARD_ROOT.to_string()))
			.collect()
	}

	fn has_root(&self, name: &str) -> bool {
		name == GRAVEYARD_ROOT || self.model.read().roots.contains_key(name)
	}

	fn add_root(&self, name: &str, data: Option<&str>, undoable: bool) -> Result<()> {
		self.require_multiroot("add_root")?;
		{
			let mut model = self.model.write();
			self.writable(&model)?;
			if name == GRAVEYARD_ROOT || model.roots.contains_key(name) {
				return Err(EngineError::RootExists(name.to_string()));
			}
			model.roots.insert(name.to_string(), Root {
				data: data.unwrap_or_default().to_string(),
				editable: None,
				undoable,
			});
		}
		let _ = self.events.send(EditorEvent::ChangeData);
		Ok(())
	}

	fn detach_root(&self, name: &str) -> Result<()> {
		self.require_multiroot("detach_root")?;
		let mut model = self.model.write();
		self.writable(&model)?;
		model
			.roots
			.remove(name)
			.map(|_| ())
			.ok_or_else(|| EngineError::UnknownRoot(name.to_string()))
	}

	fn attach_editable(&self, root: &str, element: NodeId) -> Result<()> {
		let mut model = self.model.write();
		self.writable(&model)?;
		let entry = model.roots.get_mut(root).ok_or_else(|| EngineError::UnknownRoot(root.to_string()))?;
		entry.editable = Some(element);
		self.render(root, entry);
		Ok(())
	}

	fn detach_editable(&self, root: &str) -> Result<()> {
		let mut model = self.model.write();
		if model.state == EditorState::Destroyed {
			return Err(EngineError::Destroyed);
		}
		let entry = model.roots.get_mut(root).ok_or_else(|| EngineError::UnknownRoot(root.to_string()))?;
		entry.editable = None;
		Ok(())
	}

	fn editable_element(&self, root: &str) -> Option<NodeId> {
		self.model.read().roots.get(root).and_then(|r| r.editable)
	}

	fn ui_element(&self, region: UiRegion) -> Option<NodeId> {
		if self.state() == EditorState::Destroyed {
			return None;
		}
		Some(match region {
			UiRegion::Toolbar => self.toolbar,
			UiRegion::Menubar => self.menubar,
		})
	}

	fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
		self.events.subscribe()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// Plugin that only has a name; stands in for engine features the memory engine does not model.
#[derive(Debug, Clone)]
pub struct NamedPlugin {
	name: String,
}

impl NamedPlugin {
	pub fn new(name: impl Into<String>) -> Arc<dyn Plugin> {
		Arc::new(Self { name: name.into() })
	}
}

impl Plugin for NamedPlugin {
	fn name(&self) -> &str {
		&self.name
	}

	fn init(&self, _editor: &Arc<dyn Editor>) -> Result<()> {
		Ok(())
	}
}
