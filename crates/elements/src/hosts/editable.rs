use std::sync::Arc;

use async_trait::async_trait;
use cke5_dom::{Document, NodeId};
use cke5_engine::{Editor, EditorState, EditorType};
use serde_json::json;

use super::{HostBehavior, MountContext, until_disconnected};
use crate::descriptor::EditableSnapshot;
use crate::pipeline::{ChangeListener, content_element};
use crate::{EDITABLE_TAG, HostError, Result, Session};

/// `<cke5-editable>`: contributes one root to an editor, now or once the editor registers.
#[derive(Debug, Default)]
pub struct EditableHost;

pub struct MountedEditable {
	editor: Arc<dyn Editor>,
	root: String,
	/// Element the root's view was bound to by this host.
	element: NodeId,
	listener: Option<ChangeListener>,
}

#[async_trait]
impl HostBehavior for EditableHost {
	const TAG: &'static str = EDITABLE_TAG;

	type Mounted = MountedEditable;

	async fn mount(cx: &MountContext<MountedEditable>) -> Result<()> {
		let document = cx.document().clone();
		document.wait_ready().await;
		cx.check()?;

		let snapshot = EditableSnapshot::read(&document, cx.node)?;
		let editor_id = snapshot.editor_id.clone().or_else(|| cx.session.query_all_editor_ids().into_iter().next());
		let element = content_element(&document, cx.node);

		let token = cx.token.clone();
		let slot = cx.slot();
		let root = snapshot.root_name.clone();
		let content = snapshot.content.clone();
		// Runs inside the registry; stores its own result so a disconnect racing the
		// callback still finds the root to release.
		let execution = cx.session.editors().execute(editor_id.as_deref(), move |editor: Arc<dyn Editor>| -> Result<bool> {
			if token.is_cancelled() {
				return Ok(false);
			}
			mount_root(&*editor, &root, content.as_deref(), element)?;
			slot.store(MountedEditable {
				editor,
				root,
				element,
				listener: None,
			});
			Ok(true)
		});
		let attached = until_disconnected(&cx.token, execution).await??;
		if !attached? {
			return Err(HostError::Disconnected);
		}

		let delay = snapshot.save_debounce.unwrap_or(cx.session.config().default_save_debounce());
		let input = document.query_selector_in(cx.node, "input")?;
		let host = cx.node;
		cx.update(|mounted| {
			let root = mounted.root.clone();
			let document = document.clone();
			mounted.listener = Some(ChangeListener::spawn(&mounted.editor, delay, move |editor| {
				mirror_root(&document, host, input, editor, &root);
			}));
		});
		tracing::debug!(editor_id = editor_id.as_deref().unwrap_or("<default>"), root = %snapshot.root_name, "editable.mounted");
		cx.check()
	}

	async fn unmount(_session: &Arc<Session>, _node: NodeId, mounted: MountedEditable) {
		let MountedEditable {
			editor,
			root,
			element,
			listener,
		} = mounted;
		drop(listener);
		if editor.state() == EditorState::Destroyed || editor.editable_element(&root) != Some(element) {
			return;
		}
		if let Err(err) = editor.detach_editable(&root) {
			tracing::warn!(%root, error = %err, "editable.detach");
		}
		if editor.editor_type() == EditorType::Multiroot
			&& let Err(err) = editor.detach_root(&root)
		{
			tracing::warn!(%root, error = %err, "editable.detach_root");
		}
	}
}

/// Adds `root` to the editor, or refreshes its data when it already exists.
fn mount_root(editor: &dyn Editor, root: &str, content: Option<&str>, element: NodeId) -> Result<()> {
	if editor.has_root(root) {
		if let Some(content) = content
			&& editor.get_data(root)? != content
		{
			editor.set_data(root, content)?;
		}
		return Ok(());
	}
	editor.add_root(root, content, false)?;
	editor.attach_editable(root, element)?;
	Ok(())
}

/// Copies the root's data into the host's `input` and announces it with a `change` event.
fn mirror_root(document: &Document, host: NodeId, input: Option<NodeId>, editor: &dyn Editor, root: &str) {
	let data = match editor.get_data(root) {
		Ok(data) => data,
		Err(err) => {
			tracing::debug!(%root, error = %err, "editable.sync");
			return;
		}
	};
	if let Some(input) = input
		&& let Err(err) = document.set_attribute(input, "value", data.clone())
	{
		tracing::debug!(%root, error = %err, "editable.sync.input");
	}
	if let Err(err) = document.dispatch_event(host, "change", json!({ "value": data }), false) {
		tracing::debug!(%root, error = %err, "editable.sync.event");
	}
}
