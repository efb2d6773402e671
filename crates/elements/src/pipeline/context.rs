use std::sync::Arc;

use cke5_engine::{Context, ContextItem, Editor, EditorConfig, EditorConstructor, EditorSource};

use crate::{Result, Session};

/// Whether the owning context can still remove the editor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
	Available,
	/// The context was destroyed (or is being destroyed) and took the editor with it.
	Unavailable,
}

/// Links an editor created inside a context back to that context.
#[derive(Clone)]
pub struct ContextAttachment {
	pub state: AttachmentState,
	pub context_id: String,
	/// Item id of the editor inside the context.
	pub editor_context_id: String,
	pub context: Arc<dyn Context>,
}

impl std::fmt::Debug for ContextAttachment {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ContextAttachment")
			.field("state", &self.state)
			.field("context_id", &self.context_id)
			.field("editor_context_id", &self.editor_context_id)
			.finish_non_exhaustive()
	}
}

/// Creates an editor as a new item of `context` and records the attachment in the session.
pub async fn create_editor_in_context(
	session: &Session,
	context_id: &str,
	context: Arc<dyn Context>,
	constructor: Arc<dyn EditorConstructor>,
	source: EditorSource,
	config: EditorConfig,
) -> Result<Arc<dyn Editor>> {
	let editor_context_id = uuid::Uuid::new_v4().to_string();
	let editor = context
		.add_editor(ContextItem {
			id: editor_context_id.clone(),
			constructor,
			source,
			config,
		})
		.await?;

	tracing::debug!(context_id, %editor_context_id, "pipeline.context.attach");
	session.record_attachment(&editor, ContextAttachment {
		state: AttachmentState::Available,
		context_id: context_id.to_string(),
		editor_context_id,
		context,
	});
	Ok(editor)
}
