use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cke5_dom::NodeId;
use cke5_engine::{Context, ContextConfig, ContextEvent, EngineError, Watchdog, WatchdogEvent};
use cke5_registry::{RegistryError, SharedError};
use cke5_worker::TaskClass;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::{HostBehavior, MountContext};
use crate::descriptor::{ATTR_CONTEXT, ATTR_CONTEXT_ID, ATTR_LANGUAGE, ContextDescriptor, LanguageDescriptor, read_json, require_attribute};
use crate::pipeline::{load_all_translations, load_editor_plugins, merge_translations, normalize_custom_translations, resolve_config_references};
use crate::{CONTEXT_TAG, HostError, Result, Session};

/// `<cke5-context>`: a supervised shared context registered under its context id.
#[derive(Debug, Default)]
pub struct ContextHost;

pub struct MountedContext {
	context_id: String,
	watchdog: Watchdog<dyn Context>,
	events: JoinHandle<()>,
}

#[async_trait]
impl HostBehavior for ContextHost {
	const TAG: &'static str = CONTEXT_TAG;

	type Mounted = MountedContext;

	async fn mount(cx: &MountContext<MountedContext>) -> Result<()> {
		cx.document().wait_ready().await;
		cx.check()?;
		let context_id = require_attribute(cx.document(), cx.node, CONTEXT_TAG, ATTR_CONTEXT_ID)?;

		match create(cx, &context_id).await {
			Ok(()) => Ok(()),
			Err(HostError::Disconnected) => Err(HostError::Disconnected),
			Err(err) if cx.token.is_cancelled() => {
				tracing::debug!(%context_id, error = %err, "context.create.abandoned");
				Err(HostError::Disconnected)
			}
			Err(err) => {
				let shared: SharedError = Arc::new(err);
				cx.session.contexts().error(Some(&context_id), Arc::clone(&shared));
				Err(RegistryError::Initialization(shared).into())
			}
		}
	}

	async fn unmount(session: &Arc<Session>, _node: NodeId, mounted: MountedContext) {
		let MountedContext {
			context_id,
			watchdog,
			events,
		} = mounted;
		events.abort();

		let context = watchdog.instance();
		let released = context.as_ref().map(|context| session.release_context(context)).unwrap_or_default();
		if let Err(err) = watchdog.destroy().await {
			tracing::warn!(%context_id, error = %err, "context.destroy");
		}
		for editor in &released {
			session.unregister_editor(editor);
		}

		let contexts = session.contexts();
		if let Some(context) = context
			&& contexts.get(Some(&context_id)).is_some_and(|item| Arc::ptr_eq(&item, &context))
			&& let Err(err) = contexts.unregister(Some(&context_id))
		{
			tracing::debug!(%context_id, error = %err, "context.unregister");
		}
		tracing::debug!(%context_id, editors = released.len(), "context.unmounted");
	}
}

async fn create(cx: &MountContext<MountedContext>, context_id: &str) -> Result<()> {
	let session = &cx.session;
	let document = cx.document();
	session.contexts().reset_errors(Some(context_id));

	let descriptor: ContextDescriptor = read_json(document, cx.node, ATTR_CONTEXT)?.unwrap_or_default();
	let language = read_json::<LanguageDescriptor>(document, cx.node, ATTR_LANGUAGE)?.unwrap_or_default().resolve();

	let loaded = load_editor_plugins(session, &descriptor.config.plugins).await?;
	cx.check()?;
	let package_packs = load_all_translations(&loaded.packages, &language).await?;
	let translations = merge_translations(package_packs, normalize_custom_translations(&descriptor.custom_translations));
	let settings = resolve_config_references(document, &Value::Object(descriptor.config.rest.clone()), &translations);
	let config = ContextConfig {
		plugins: loaded.plugins,
		translations,
		language,
		license_key: descriptor.config.license_key.clone(),
		settings,
	};

	let factory = session.library().context_factory().await?;
	cx.check()?;
	let watchdog = Watchdog::new(descriptor.watchdog_config.policy(), move || {
		let factory = Arc::clone(&factory);
		let config = config.clone();
		async move { factory.create(config).await }.boxed()
	});
	let supervision = watchdog.subscribe();
	let context = watchdog.create().await?;
	let events = follow_context(session, context_id, &context, supervision);
	cx.store(MountedContext {
		context_id: context_id.to_string(),
		watchdog,
		events,
	});
	cx.check()?;

	session.contexts().register(Some(context_id), context)?;
	tracing::info!(context_id, "context.ready");
	Ok(())
}

/// Logs item failures of the live context and re-registers replacements under the same id.
fn follow_context(
	session: &Arc<Session>,
	context_id: &str,
	context: &Arc<dyn Context>,
	mut supervision: broadcast::Receiver<WatchdogEvent<dyn Context>>,
) -> JoinHandle<()> {
	let session: Weak<Session> = Arc::downgrade(session);
	let context_id = context_id.to_string();
	let mut current = Arc::clone(context);
	let mut items = context.subscribe();
	cke5_worker::spawn(TaskClass::Listener, async move {
		loop {
			tokio::select! {
				event = items.recv() => match event {
					Ok(ContextEvent::ItemError { item_id, message }) => {
						tracing::error!(%context_id, %item_id, %message, "context.item.failed");
					}
					Ok(_) | Err(RecvError::Lagged(_)) => {}
					Err(RecvError::Closed) => return,
				},
				event = supervision.recv() => {
					let event = match event {
						Ok(event) => event,
						Err(RecvError::Lagged(_)) => continue,
						Err(RecvError::Closed) => return,
					};
					let Some(session) = session.upgrade() else {
						return;
					};
					let contexts = session.contexts();
					match event {
						WatchdogEvent::Restarted { instance, generation } => {
							if contexts.get(Some(&context_id)).is_some_and(|item| Arc::ptr_eq(&item, &current))
								&& let Err(err) = contexts.unregister(Some(&context_id))
							{
								tracing::debug!(%context_id, error = %err, "context.restart.unregister");
							}
							items = instance.subscribe();
							current = Arc::clone(&instance);
							match contexts.register(Some(&context_id), instance) {
								Ok(()) => tracing::info!(%context_id, generation, "context.restarted"),
								Err(err) => tracing::warn!(%context_id, error = %err, "context.restart.register"),
							}
						}
						WatchdogEvent::Failed { message } => {
							tracing::error!(%context_id, %message, "context.crashed");
							contexts.error(Some(&context_id), Arc::new(EngineError::Crashed(message)));
							return;
						}
					}
				}
			}
		}
	})
}
