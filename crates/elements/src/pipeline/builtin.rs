//! Plugins every editor host installs on its editor.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cke5_dom::{Document, NodeId};
use cke5_engine::{Editor, EditorEvent, EditorState, GRAVEYARD_ROOT, MAIN_ROOT, Plugin};
use cke5_worker::{Debounced, TaskClass, debounce};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Bubbling event carrying `editorId` and a snapshot of all roots.
pub const CHANGE_DATA_EVENT: &str = "ckeditor5:change:data";

/// Data of every user root, the graveyard excluded.
pub fn snapshot_roots(editor: &dyn Editor) -> BTreeMap<String, String> {
	editor
		.root_names()
		.into_iter()
		.filter(|root| root != GRAVEYARD_ROOT)
		.filter_map(|root| {
			let data = editor.get_data(&root).ok()?;
			Some((root, data))
		})
		.collect()
}

/// Runs `action` once change bursts on an editor settle.
///
/// Dropping the listener stops it and discards a pending run.
pub struct ChangeListener {
	task: JoinHandle<()>,
	debounced: Debounced<()>,
}

impl ChangeListener {
	pub fn spawn<F>(editor: &Arc<dyn Editor>, delay: Duration, action: F) -> Self
	where
		F: Fn(&dyn Editor) + Send + Sync + 'static,
	{
		let weak = Arc::downgrade(editor);
		let debounced = debounce(delay, move |()| {
			if let Some(editor) = weak.upgrade()
				&& editor.state() != EditorState::Destroyed
			{
				action(&*editor);
			}
		});

		let mut events = editor.subscribe();
		let trigger = debounced.clone();
		let task = cke5_worker::spawn(TaskClass::Listener, async move {
			loop {
				match events.recv().await {
					Ok(EditorEvent::ChangeData) => trigger.call(()),
					Ok(EditorEvent::Destroyed) | Err(broadcast::error::RecvError::Closed) => return,
					Ok(EditorEvent::Crashed(_)) => {}
					Err(broadcast::error::RecvError::Lagged(_)) => trigger.call(()),
				}
			}
		});
		Self { task, debounced }
	}

	/// Runs a pending action now.
	pub fn flush(&self) -> bool {
		self.debounced.flush()
	}
}

impl Drop for ChangeListener {
	fn drop(&mut self) {
		self.task.abort();
		self.debounced.cancel();
	}
}

/// Dispatches [`CHANGE_DATA_EVENT`] on the editor host after data changes.
pub struct ChangeDataDispatcher {
	document: Document,
	host: NodeId,
	editor_id: String,
	delay: Duration,
	listener: Mutex<Option<ChangeListener>>,
}

impl ChangeDataDispatcher {
	pub fn new(document: Document, host: NodeId, editor_id: impl Into<String>, delay: Duration) -> Arc<dyn Plugin> {
		Arc::new(Self {
			document,
			host,
			editor_id: editor_id.into(),
			delay,
			listener: Mutex::new(None),
		})
	}
}

impl Plugin for ChangeDataDispatcher {
	fn name(&self) -> &str {
		"ChangeDataDispatcher"
	}

	fn init(&self, editor: &Arc<dyn Editor>) -> cke5_engine::Result<()> {
		let document = self.document.clone();
		let host = self.host;
		let editor_id = self.editor_id.clone();
		let listener = ChangeListener::spawn(editor, self.delay, move |editor| {
			let detail = json!({ "editorId": editor_id, "roots": snapshot_roots(editor) });
			if let Err(err) = document.dispatch_event(host, CHANGE_DATA_EVENT, detail, true) {
				tracing::warn!(editor_id = %editor_id, error = %err, "plugin.change_data.dispatch");
			}
		});
		*self.listener.lock() = Some(listener);
		Ok(())
	}

	fn destroy(&self, _editor: &dyn Editor) {
		self.listener.lock().take();
	}
}

/// Mirrors the main root into the `value` attribute of an `<input>` inside the editor host.
pub struct InputSync {
	document: Document,
	input: NodeId,
	delay: Duration,
	listener: Mutex<Option<ChangeListener>>,
}

impl InputSync {
	pub fn new(document: Document, input: NodeId, delay: Duration) -> Arc<dyn Plugin> {
		Arc::new(Self {
			document,
			input,
			delay,
			listener: Mutex::new(None),
		})
	}
}

fn mirror_main_root(document: &Document, input: NodeId, editor: &dyn Editor) {
	let Ok(data) = editor.get_data(MAIN_ROOT) else {
		return;
	};
	if let Err(err) = document.set_attribute(input, "value", data) {
		tracing::warn!(error = %err, "plugin.input_sync.write");
	}
}

impl Plugin for InputSync {
	fn name(&self) -> &str {
		"InputSync"
	}

	fn init(&self, editor: &Arc<dyn Editor>) -> cke5_engine::Result<()> {
		if !editor.has_root(MAIN_ROOT) {
			tracing::debug!("plugin.input_sync.no_main_root");
			return Ok(());
		}
		mirror_main_root(&self.document, self.input, editor.as_ref());
		let document = self.document.clone();
		let input = self.input;
		let listener = ChangeListener::spawn(editor, self.delay, move |editor| mirror_main_root(&document, input, editor));
		*self.listener.lock() = Some(listener);
		Ok(())
	}

	fn destroy(&self, _editor: &dyn Editor) {
		let listener = self.listener.lock().take();
		if let Some(listener) = listener {
			listener.flush();
		}
	}
}
