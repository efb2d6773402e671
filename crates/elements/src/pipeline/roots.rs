use std::collections::BTreeMap;

use cke5_dom::{Document, NodeId};
use cke5_engine::{EditorSource, EditorType, InitialData, MAIN_ROOT};
use cke5_worker::{WaitOptions, wait_for};

use crate::descriptor::{ATTR_CONTENT, ATTR_EDITABLE_CONTENT, ATTR_EDITOR_ID, ATTR_ROOT_NAME};
use crate::{EDITABLE_TAG, HostError, Result};

/// An editable host present in the document for some editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableMount {
	pub host: NodeId,
	pub root: String,
	pub content: Option<String>,
	/// Where the root's view renders.
	pub element: NodeId,
}

/// Editable hosts addressing `editor_id`; hosts without an editor id count for the default editor.
pub fn editable_hosts(document: &Document, editor_id: &str, is_default: bool) -> Vec<EditableMount> {
	let hosts = match document.query_selector_all(EDITABLE_TAG) {
		Ok(hosts) => hosts,
		Err(err) => {
			tracing::warn!(error = %err, "pipeline.editables.query");
			return Vec::new();
		}
	};
	let mut mounts: Vec<EditableMount> = Vec::new();
	for host in hosts {
		let owner = document.attribute(host, ATTR_EDITOR_ID);
		let addressed = match &owner {
			Some(owner) => owner == editor_id,
			None => is_default,
		};
		if !addressed {
			continue;
		}
		let root = document.attribute(host, ATTR_ROOT_NAME).unwrap_or_else(|| MAIN_ROOT.to_string());
		if mounts.iter().any(|mount| mount.root == root) {
			continue;
		}
		mounts.push(EditableMount {
			host,
			content: document.attribute(host, ATTR_CONTENT),
			element: content_element(document, host),
			root,
		});
	}
	mounts
}

/// The `[data-cke-editable-content]` child of `host`, or `host` itself.
pub fn content_element(document: &Document, host: NodeId) -> NodeId {
	document
		.query_selector_in(host, &format!("[{ATTR_EDITABLE_CONTENT}]"))
		.ok()
		.flatten()
		.unwrap_or(host)
}

/// Static content per root: the preset's, overridden by the editor host's own attribute.
pub fn declared_content(preset: &BTreeMap<String, String>, host: Option<BTreeMap<String, String>>) -> BTreeMap<String, String> {
	let mut roots = preset.clone();
	roots.extend(host.unwrap_or_default());
	roots
}

/// Final initial data: editables in the document override declared content.
pub fn initial_data(editor_type: EditorType, declared: &BTreeMap<String, String>, editables: &[EditableMount]) -> InitialData {
	let mut roots = declared.clone();
	for mount in editables {
		if let Some(content) = &mount.content {
			roots.insert(mount.root.clone(), content.clone());
		}
	}
	if editor_type.is_single_root() {
		InitialData::Single(roots.remove(MAIN_ROOT).unwrap_or_default())
	} else {
		InitialData::Roots(roots)
	}
}

/// Everything needed to pick the editor's source elements.
pub struct SourceQuery<'a> {
	pub host: NodeId,
	pub editor_type: EditorType,
	pub editor_id: &'a str,
	pub is_default: bool,
	/// Roots that must have an editable before a multi-root editor may start.
	pub required: Vec<String>,
}

/// Finds the source element(s) of an editor.
///
/// Classic, inline and balloon editors render into the host. Decoupled and multi-root editors
/// poll until every required root has an editable host, since those may connect later.
///
/// # Errors
///
/// [`HostError::MissingRoots`] once `options.time_out_after` elapses.
pub async fn locate_sources(document: &Document, query: SourceQuery<'_>, options: WaitOptions) -> Result<(EditorSource, Vec<EditableMount>)> {
	if query.editor_type.is_single_editing_like() {
		return Ok((EditorSource::Element(content_element(document, query.host)), Vec::new()));
	}

	let required = match query.editor_type {
		EditorType::Decoupled => vec![MAIN_ROOT.to_string()],
		_ => query.required,
	};
	let mounts = wait_for(
		|| {
			let mounts = editable_hosts(document, query.editor_id, query.is_default);
			let missing: Vec<String> = required
				.iter()
				.filter(|root| !mounts.iter().any(|mount| &mount.root == *root))
				.cloned()
				.collect();
			async move { if missing.is_empty() { Ok(mounts) } else { Err(missing) } }
		},
		options,
	)
	.await
	.map_err(|timeout| HostError::MissingRoots { roots: timeout.last })?;

	let source = match query.editor_type {
		EditorType::Decoupled => {
			let main = mounts.iter().find(|mount| mount.root == MAIN_ROOT).map_or(query.host, |mount| mount.element);
			EditorSource::Element(main)
		}
		_ => EditorSource::Roots(mounts.iter().map(|mount| (mount.root.clone(), mount.element)).collect()),
	};
	Ok((source, mounts))
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pretty_assertions::assert_eq;

	use super::*;

	fn editable(document: &Document, editor: Option<&str>, root: &str, content: Option<&str>) -> NodeId {
		let host = document.create_element_with(EDITABLE_TAG, &[(ATTR_ROOT_NAME, root)]);
		if let Some(editor) = editor {
			document.set_attribute(host, ATTR_EDITOR_ID, editor).unwrap();
		}
		if let Some(content) = content {
			document.set_attribute(host, ATTR_CONTENT, content).unwrap();
		}
		let inner = document.create_element_with("div", &[(ATTR_EDITABLE_CONTENT, "")]);
		document.append_child(host, inner).unwrap();
		document.append_child(document.body(), host).unwrap();
		host
	}

	#[test]
	fn editables_override_declared_content() {
		let document = Document::new();
		editable(&document, Some("e1"), "foo", Some("<p>Foo</p>"));
		editable(&document, Some("e2"), "bar", Some("<p>Bar</p>"));
		editable(&document, None, "baz", None);

		let mounts = editable_hosts(&document, "e1", true);
		assert_eq!(mounts.iter().map(|m| m.root.as_str()).collect::<Vec<_>>(), vec!["foo", "baz"]);

		let declared = declared_content(
			&BTreeMap::from([("foo".to_string(), "preset".to_string()), ("main".to_string(), "m".to_string())]),
			None,
		);
		let InitialData::Roots(roots) = initial_data(EditorType::Multiroot, &declared, &mounts) else {
			panic!("multiroot keeps roots");
		};
		assert_eq!(roots["foo"], "<p>Foo</p>");
		assert_eq!(roots["main"], "m");
		assert_eq!(initial_data(EditorType::Classic, &declared, &mounts), InitialData::Single("m".to_string()));
	}

	#[tokio::test(start_paused = true)]
	async fn missing_roots_time_out_with_names() {
		let document = Document::new();
		let host = document.create_element("cke5-editor");
		let err = locate_sources(
			&document,
			SourceQuery {
				host,
				editor_type: EditorType::Multiroot,
				editor_id: "e1",
				is_default: false,
				required: vec!["header".to_string()],
			},
			WaitOptions {
				time_out_after: Duration::from_millis(50),
				retry_after: Duration::from_millis(10),
			},
		)
		.await
		.unwrap_err();
		let HostError::MissingRoots { roots } = &err else {
			panic!("unexpected error: {err}");
		};
		assert_eq!(roots, &vec!["header".to_string()]);
		assert!(err.to_string().contains("declare no initial content"));
	}

	#[tokio::test]
	async fn classic_renders_into_content_child() {
		let document = Document::new();
		let host = document.create_element("cke5-editor");
		let inner = document.create_element_with("div", &[(ATTR_EDITABLE_CONTENT, "")]);
		document.append_child(host, inner).unwrap();
		let (source, mounts) = locate_sources(
			&document,
			SourceQuery {
				host,
				editor_type: EditorType::Classic,
				editor_id: "e1",
				is_default: true,
				required: Vec::new(),
			},
			WaitOptions::default(),
		)
		.await
		.unwrap();
		assert_eq!(source, EditorSource::Element(inner));
		assert!(mounts.is_empty());
	}
}
