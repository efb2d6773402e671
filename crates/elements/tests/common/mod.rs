//! Shared fixtures for host integration tests.

use std::sync::Arc;
use std::time::Duration;

use cke5_dom::{Document, DomEvent, NodeId};
use cke5_elements::{ATTR_CONTEXT_ID, ATTR_EDITOR_ID, ATTR_PRESET, EDITABLE_TAG, EDITOR_TAG, Session};
use cke5_engine::Editor;
use cke5_engine::memory::{MemoryLibrary, MemoryPackage, base_package};
use serde_json::Value;
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Page {
	pub document: Document,
	pub library: Arc<MemoryLibrary>,
	pub session: Arc<Session>,
}

impl Page {
	pub fn new() -> Self {
		Self::with_premium(MemoryPackage::default())
	}

	pub fn with_premium(premium: MemoryPackage) -> Self {
		let _ = tracing_subscriber::fmt::try_init();
		let document = Document::new();
		document.set_ready();
		let library = Arc::new(MemoryLibrary::with_packages(document.clone(), base_package(), premium));
		let session = Session::new(document.clone(), library.clone());
		session.define_elements().unwrap();
		Self { document, library, session }
	}

	pub fn editor_host(&self, editor_id: &str, preset: Value) -> NodeId {
		self.document
			.create_element_with(EDITOR_TAG, &[(ATTR_EDITOR_ID, editor_id), (ATTR_PRESET, &preset.to_string())])
	}

	pub fn context_editor_host(&self, editor_id: &str, context_id: &str, preset: Value) -> NodeId {
		let host = self.editor_host(editor_id, preset);
		self.document.set_attribute(host, ATTR_CONTEXT_ID, context_id).unwrap();
		host
	}

	pub fn editable_host(&self, attributes: &[(&str, &str)]) -> NodeId {
		self.document.create_element_with(EDITABLE_TAG, attributes)
	}

	/// Inserts `node` into the body, which connects its host.
	pub fn mount(&self, node: NodeId) {
		self.document.append_child(self.document.body(), node).unwrap();
	}

	pub fn unmount(&self, node: NodeId) {
		self.document.remove(node).unwrap();
	}

	pub async fn editor(&self, editor_id: &str) -> Arc<dyn Editor> {
		self.session.editors().wait_for(Some(editor_id), Some(WAIT)).await.unwrap()
	}
}

/// Polls `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
	let deadline = tokio::time::Instant::now() + WAIT;
	while tokio::time::Instant::now() < deadline {
		if condition() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	condition()
}

/// Next event named `name`, skipping others.
pub async fn next_event(events: &mut broadcast::Receiver<DomEvent>, name: &str) -> DomEvent {
	tokio::time::timeout(WAIT, async {
		loop {
			let event = events.recv().await.unwrap();
			if event.name == name {
				return event;
			}
		}
	})
	.await
	.unwrap()
}
