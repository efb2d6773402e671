use std::sync::Arc;

use async_trait::async_trait;
use cke5_registry::{Destroyable, SharedError};
use cke5_worker::TaskClass;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{Context, ContextConfig, ContextEvent, ContextItem, ContextState, Editor, EditorEvent, EngineError, Result};

struct Item {
	id: String,
	editor: Arc<dyn Editor>,
	forwarder: JoinHandle<()>,
}

/// Context that tracks its editors and forwards their crashes as item errors.
pub struct MemoryContext {
	config: ContextConfig,
	state: RwLock<ContextState>,
	items: Mutex<Vec<Item>>,
	events: broadcast::Sender<ContextEvent>,
}

impl MemoryContext {
	pub(crate) fn new(config: ContextConfig) -> Arc<Self> {
		let (events, _) = broadcast::channel(64);
		Arc::new(Self {
			config,
			state: RwLock::new(ContextState::Ready),
			items: Mutex::new(Vec::new()),
			events,
		})
	}

	/// Ids of the attached items, in insertion order.
	pub fn item_ids(&self) -> Vec<String> {
		self.items.lock().iter().map(|item| item.id.clone()).collect()
	}

	/// Puts the context into the crashed state.
	pub fn simulate_crash(&self, reason: &str) {
		{
			let mut state = self.state.write();
			if *state != ContextState::Ready {
				return;
			}
			*state = ContextState::Crashed;
		}
		tracing::warn!(reason, "memory.context.crash");
		let _ = self.events.send(ContextEvent::Crashed(reason.to_string()));
	}

	fn forward_crashes(&self, item_id: String, editor: &Arc<dyn Editor>) -> JoinHandle<()> {
		let mut editor_events = editor.subscribe();
		let events = self.events.clone();
		cke5_worker::spawn(TaskClass::Listener, async move {
			loop {
				match editor_events.recv().await {
					Ok(EditorEvent::Crashed(message)) => {
						let _ = events.send(ContextEvent::ItemError {
							item_id: item_id.clone(),
							message,
						});
					}
					Ok(EditorEvent::Destroyed) | Err(broadcast::error::RecvError::Closed) => return,
					Ok(EditorEvent::ChangeData) | Err(broadcast::error::RecvError::Lagged(_)) => {}
				}
			}
		})
	}
}

#[async_trait]
impl Destroyable for MemoryContext {
	async fn destroy(&self) -> std::result::Result<(), SharedError> {
		{
			let mut state = self.state.write();
			if matches!(*state, ContextState::Destroying | ContextState::Destroyed) {
				return Ok(());
			}
			*state = ContextState::Destroying;
		}

		let items = std::mem::take(&mut *self.items.lock());
		tracing::debug!(items = items.len(), "memory.context.destroy");
		let results = futures::future::join_all(items.iter().map(|item| item.editor.destroy())).await;
		for item in &items {
			item.forwarder.abort();
		}

		*self.state.write() = ContextState::Destroyed;
		let _ = self.events.send(ContextEvent::Destroyed);
		results.into_iter().find_map(std::result::Result::err).map_or(Ok(()), Err)
	}
}

#[async_trait]
impl Context for MemoryContext {
	fn state(&self) -> ContextState {
		*self.state.read()
	}

	fn config(&self) -> &ContextConfig {
		&self.config
	}

	async fn add_editor(&self, item: ContextItem) -> Result<Arc<dyn Editor>> {
		if self.state() != ContextState::Ready {
			return Err(EngineError::Destroyed);
		}
		let ContextItem {
			id,
			constructor,
			source,
			config,
		} = item;
		let editor = constructor.create(source, config).await?;

		if self.state() != ContextState::Ready {
			if let Err(err) = editor.destroy().await {
				tracing::warn!(item_id = %id, error = %err, "memory.context.add_editor.rollback");
			}
			return Err(EngineError::Destroyed);
		}
		let forwarder = self.forward_crashes(id.clone(), &editor);
		tracing::debug!(item_id = %id, "memory.context.add_editor");
		self.items.lock().push(Item {
			id,
			editor: Arc::clone(&editor),
			forwarder,
		});
		Ok(editor)
	}

	async fn remove_editor(&self, item_id: &str) -> Result<()> {
		let item = {
			let mut items = self.items.lock();
			let index = items
				.iter()
				.position(|item| item.id == item_id)
				.ok_or_else(|| EngineError::UnknownItem(item_id.to_string()))?;
			items.remove(index)
		};
		item.forwarder.abort();
		tracing::debug!(item_id, "memory.context.remove_editor");
		item.editor.destroy().await.map_err(|err| EngineError::Teardown(err.to_string()))
	}

	fn editors(&self) -> Vec<Arc<dyn Editor>> {
		self.items.lock().iter().map(|item| Arc::clone(&item.editor)).collect()
	}

	fn editor(&self, item_id: &str) -> Option<Arc<dyn Editor>> {
		self.items.lock().iter().find(|item| item.id == item_id).map(|item| Arc::clone(&item.editor))
	}

	fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
		self.events.subscribe()
	}
}
