use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cke5_dom::NodeId;
use cke5_engine::{ContextState, Editor, EditorConfig, EngineError, Watchdog, WatchdogEvent};
use cke5_registry::{RegistryError, SharedError};
use cke5_worker::TaskClass;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{HostBehavior, MountContext, until_disconnected};
use crate::descriptor::{
	ATTR_CONTENT, ATTR_CONTEXT_ID, ATTR_EDITABLE_HEIGHT, ATTR_EDITOR_ID, ATTR_LANGUAGE, ATTR_PRESET, ATTR_SAVE_DEBOUNCE, ATTR_WATCHDOG,
	EditorPreset, LanguageDescriptor, WatchdogConfig, read_json, read_millis, require_attribute,
};
use crate::pipeline::{
	AttachmentState, ChangeDataDispatcher, InputSync, SourceQuery, create_editor_in_context, declared_content, initial_data, load_all_translations,
	load_editor_constructor, load_editor_plugins, locate_sources, merge_translations, normalize_custom_translations, resolve_config_references,
};
use crate::{EDITOR_TAG, HostError, Result, Session};

/// `<cke5-editor>`: builds an editor from its preset and registers it under its editor id.
#[derive(Debug, Default)]
pub struct EditorHost;

/// What a connected editor host owns.
pub struct MountedEditor {
	editor_id: String,
	/// Live instance; swapped when the watchdog restarts the editor.
	current: Arc<Mutex<Arc<dyn Editor>>>,
	watchdog: Option<Watchdog<dyn Editor>>,
	restarts: Option<JoinHandle<()>>,
	in_context: bool,
}

impl MountedEditor {
	pub fn editor(&self) -> Arc<dyn Editor> {
		Arc::clone(&self.current.lock())
	}
}

#[async_trait]
impl HostBehavior for EditorHost {
	const TAG: &'static str = EDITOR_TAG;

	type Mounted = MountedEditor;

	async fn mount(cx: &MountContext<MountedEditor>) -> Result<()> {
		cx.document().wait_ready().await;
		cx.check()?;
		let editor_id = require_attribute(cx.document(), cx.node, EDITOR_TAG, ATTR_EDITOR_ID)?;

		match create(cx, &editor_id).await {
			Ok(()) => Ok(()),
			Err(HostError::Disconnected) => Err(HostError::Disconnected),
			// A late failure belongs to an element that already left the document.
			Err(err) if cx.token.is_cancelled() => {
				tracing::debug!(%editor_id, error = %err, "editor.create.abandoned");
				Err(HostError::Disconnected)
			}
			Err(err) => {
				let shared: SharedError = Arc::new(err);
				cx.session.editors().error(Some(&editor_id), Arc::clone(&shared));
				Err(RegistryError::Initialization(shared).into())
			}
		}
	}

	async fn unmount(session: &Arc<Session>, _node: NodeId, mounted: MountedEditor) {
		if let Some(restarts) = &mounted.restarts {
			restarts.abort();
		}
		let editor = mounted.editor();
		let editor_id = mounted.editor_id.as_str();

		if mounted.in_context {
			match session.take_attachment(&editor) {
				Some(attachment) if attachment.state == AttachmentState::Available && attachment.context.state() == ContextState::Ready => {
					if let Err(err) = attachment.context.remove_editor(&attachment.editor_context_id).await {
						tracing::warn!(editor_id, context_id = %attachment.context_id, error = %err, "editor.context.remove");
					}
				}
				_ => tracing::debug!(editor_id, "editor.context.released"),
			}
		} else if let Some(watchdog) = &mounted.watchdog {
			if let Err(err) = watchdog.destroy().await {
				tracing::warn!(editor_id, error = %err, "editor.destroy");
			}
		} else if let Err(err) = editor.destroy().await {
			tracing::warn!(editor_id, error = %err, "editor.destroy");
		}

		let editors = session.editors();
		if editors.get(Some(editor_id)).is_some_and(|item| Arc::ptr_eq(&item, &editor))
			&& let Err(err) = editors.unregister(Some(editor_id))
		{
			tracing::debug!(editor_id, error = %err, "editor.unregister");
		}
		tracing::debug!(editor_id, "editor.unmounted");
	}
}

/// `data-cke-watchdog` is a presence flag; a JSON value tunes the restart policy.
fn watchdog_config(cx: &MountContext<MountedEditor>) -> Result<Option<WatchdogConfig>> {
	match cx.document().attribute(cx.node, ATTR_WATCHDOG) {
		None => Ok(None),
		Some(raw) if raw.trim().is_empty() || raw == "true" => Ok(Some(WatchdogConfig::default())),
		Some(_) => read_json(cx.document(), cx.node, ATTR_WATCHDOG),
	}
}

async fn create(cx: &MountContext<MountedEditor>, editor_id: &str) -> Result<()> {
	let session = &cx.session;
	let document = cx.document();
	let node = cx.node;
	session.editors().reset_errors(Some(editor_id));

	let preset: EditorPreset = read_json(document, node, ATTR_PRESET)?.ok_or(HostError::MissingAttribute {
		tag: EDITOR_TAG,
		attribute: ATTR_PRESET,
	})?;
	let language = read_json::<LanguageDescriptor>(document, node, ATTR_LANGUAGE)?
		.or_else(|| preset.language.clone())
		.unwrap_or_default()
		.resolve();
	let host_content = read_json::<BTreeMap<String, String>>(document, node, ATTR_CONTENT)?;
	let save_debounce = read_millis(document, node, ATTR_SAVE_DEBOUNCE)?.unwrap_or(session.config().default_save_debounce());
	let editable_height = read_json::<u32>(document, node, ATTR_EDITABLE_HEIGHT)?;
	let context_id = document.attribute(node, ATTR_CONTEXT_ID);
	let watchdog = match context_id {
		Some(_) => None,
		None => watchdog_config(cx)?,
	};

	let constructor = load_editor_constructor(session.library(), &preset.editor_type).await?;
	let editor_type = constructor.editor_type();
	cx.check()?;

	let context = match &context_id {
		Some(id) => {
			let waiting = session.contexts().wait_for(Some(id.as_str()), Some(session.config().context_timeout()));
			Some(until_disconnected(&cx.token, waiting).await??)
		}
		None => None,
	};
	cx.check()?;

	let loaded = load_editor_plugins(session, &preset.plugins).await?;
	cx.check()?;
	let package_packs = load_all_translations(&loaded.packages, &language).await?;
	let translations = merge_translations(package_packs, normalize_custom_translations(&preset.custom_translations));

	let declared = declared_content(&preset.content, host_content);
	let is_default = session.query_all_editor_ids().first().map(String::as_str) == Some(editor_id);
	let query = SourceQuery {
		host: node,
		editor_type,
		editor_id,
		is_default,
		required: declared.keys().cloned().collect(),
	};
	let (source, editables) = until_disconnected(&cx.token, locate_sources(document, query, session.config().root_wait())).await??;
	cx.check()?;

	let mut plugins = loaded.plugins;
	plugins.push(ChangeDataDispatcher::new(document.clone(), node, editor_id, save_debounce));
	if let Some(input) = document.query_selector_in(node, "input")? {
		plugins.push(InputSync::new(document.clone(), input, save_debounce));
	}
	let config = EditorConfig {
		plugins,
		settings: resolve_config_references(document, &preset.config, &translations),
		translations,
		language,
		license_key: preset.license_key.clone(),
		initial_data: initial_data(editor_type, &declared, &editables),
	};
	tracing::debug!(editor_id, %editor_type, plugins = config.plugins.len(), "editor.create");

	let mounted = match (context_id, context) {
		(Some(context_id), Some(context)) => {
			let editor = create_editor_in_context(session, &context_id, context, constructor, source, config).await?;
			MountedEditor {
				editor_id: editor_id.to_string(),
				current: Arc::new(Mutex::new(editor)),
				watchdog: None,
				restarts: None,
				in_context: true,
			}
		}
		_ => match watchdog {
			Some(watchdog_config) => {
				let watchdog = Watchdog::new(watchdog_config.policy(), move || {
					let constructor = Arc::clone(&constructor);
					let source = source.clone();
					let config = config.clone();
					async move { constructor.create(source, config).await }.boxed()
				});
				let events = watchdog.subscribe();
				let editor = watchdog.create().await?;
				let current = Arc::new(Mutex::new(editor));
				let restarts = follow_restarts(session, editor_id, events, Arc::clone(&current));
				MountedEditor {
					editor_id: editor_id.to_string(),
					current,
					watchdog: Some(watchdog),
					restarts: Some(restarts),
					in_context: false,
				}
			}
			None => MountedEditor {
				editor_id: editor_id.to_string(),
				current: Arc::new(Mutex::new(constructor.create(source, config).await?)),
				watchdog: None,
				restarts: None,
				in_context: false,
			},
		},
	};

	let editor = mounted.editor();
	if editor_type.is_single_root()
		&& let Some(height) = editable_height
	{
		apply_height(session, &editor, height);
	}
	// Stored first so a disconnect from here on tears the editor down.
	cx.store(mounted);
	cx.check()?;

	session.editors().register(Some(editor_id), editor)?;
	tracing::info!(editor_id, %editor_type, "editor.ready");
	Ok(())
}

fn apply_height(session: &Session, editor: &Arc<dyn Editor>, height: u32) {
	let Some(element) = editor.editable_element(cke5_engine::MAIN_ROOT) else {
		return;
	};
	if let Err(err) = session.document().set_attribute(element, "style", format!("height: {height}px")) {
		tracing::debug!(error = %err, "editor.height");
	}
}

/// Re-registers each replacement the watchdog produces under the same editor id.
fn follow_restarts(
	session: &Arc<Session>,
	editor_id: &str,
	mut events: broadcast::Receiver<WatchdogEvent<dyn Editor>>,
	current: Arc<Mutex<Arc<dyn Editor>>>,
) -> JoinHandle<()> {
	let session: Weak<Session> = Arc::downgrade(session);
	let editor_id = editor_id.to_string();
	cke5_worker::spawn(TaskClass::Listener, async move {
		loop {
			let event = match events.recv().await {
				Ok(event) => event,
				Err(broadcast::error::RecvError::Lagged(_)) => continue,
				Err(broadcast::error::RecvError::Closed) => return,
			};
			let Some(session) = session.upgrade() else {
				return;
			};
			let editors = session.editors();
			match event {
				WatchdogEvent::Restarted { instance, generation } => {
					let previous = std::mem::replace(&mut *current.lock(), Arc::clone(&instance));
					if editors.get(Some(&editor_id)).is_some_and(|item| Arc::ptr_eq(&item, &previous))
						&& let Err(err) = editors.unregister(Some(&editor_id))
					{
						tracing::debug!(editor_id, error = %err, "editor.restart.unregister");
					}
					match editors.register(Some(&editor_id), instance) {
						Ok(()) => tracing::info!(editor_id, generation, "editor.restarted"),
						Err(err) => tracing::warn!(editor_id, error = %err, "editor.restart.register"),
					}
				}
				WatchdogEvent::Failed { message } => {
					tracing::error!(editor_id, %message, "editor.crashed");
					editors.error(Some(&editor_id), Arc::new(EngineError::Crashed(message)));
					return;
				}
			}
		}
	})
}
