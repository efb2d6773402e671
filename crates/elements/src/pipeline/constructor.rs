use std::sync::Arc;

use cke5_engine::{EditorConstructor, EditorType, EngineLibrary};

use crate::{HostError, Result};

/// Resolves the constructor for a preset's editor type name.
///
/// # Errors
///
/// [`HostError::UnsupportedEditorType`] for names outside inline, classic, balloon, decoupled
/// and multiroot.
pub async fn load_editor_constructor(library: &dyn EngineLibrary, editor_type: &str) -> Result<Arc<dyn EditorConstructor>> {
	let editor_type: EditorType = editor_type
		.parse()
		.map_err(|_| HostError::UnsupportedEditorType(editor_type.to_string()))?;
	Ok(library.editor_constructor(editor_type).await?)
}
