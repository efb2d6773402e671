//! JSON descriptors carried by element attributes.

use std::collections::BTreeMap;
use std::time::Duration;

use cke5_dom::{Document, NodeId};
use cke5_engine::{Language, MAIN_ROOT, RestartPolicy};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{HostError, Result};

pub const ATTR_EDITOR_ID: &str = "data-cke-editor-id";
pub const ATTR_PRESET: &str = "data-cke-preset";
pub const ATTR_CONTEXT_ID: &str = "data-cke-context-id";
pub const ATTR_CONTEXT: &str = "data-cke-context";
pub const ATTR_LANGUAGE: &str = "data-cke-language";
pub const ATTR_CONTENT: &str = "data-cke-content";
pub const ATTR_SAVE_DEBOUNCE: &str = "data-cke-save-debounce-ms";
pub const ATTR_EDITABLE_HEIGHT: &str = "data-cke-editable-height";
pub const ATTR_WATCHDOG: &str = "data-cke-watchdog";
pub const ATTR_ROOT_NAME: &str = "data-cke-root-name";
pub const ATTR_NAME: &str = "data-cke-name";
/// Marks the child an editor or editable mounts its view into.
pub const ATTR_EDITABLE_CONTENT: &str = "data-cke-editable-content";

/// Custom translations keyed by language, then message key.
pub type CustomTranslations = BTreeMap<String, BTreeMap<String, TranslationValue>>;

/// A custom message: one string, or singular and plural forms.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TranslationValue {
	Single(String),
	Forms(Vec<String>),
}

/// What an editor host builds, decoded from `data-cke-preset`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorPreset {
	pub editor_type: String,
	#[serde(default)]
	pub plugins: Vec<String>,
	#[serde(default)]
	pub license_key: Option<String>,
	/// Engine settings; may contain `$element` and `$translation` references.
	#[serde(default)]
	pub config: Value,
	/// Static initial content per root.
	#[serde(default)]
	pub content: BTreeMap<String, String>,
	#[serde(default)]
	pub custom_translations: CustomTranslations,
	#[serde(default)]
	pub language: Option<LanguageDescriptor>,
}

/// `data-cke-language`: `content` falls back to `ui`, `ui` to English.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LanguageDescriptor {
	#[serde(default)]
	pub ui: Option<String>,
	#[serde(default)]
	pub content: Option<String>,
}

impl LanguageDescriptor {
	pub fn resolve(&self) -> Language {
		let ui = self.ui.clone().unwrap_or_else(|| Language::default().ui);
		let content = self.content.clone().unwrap_or_else(|| ui.clone());
		Language { ui, content }
	}
}

/// Crash handling of a watchdog, in the engine's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogConfig {
	#[serde(default = "default_crash_limit")]
	pub crash_number_limit: usize,
	#[serde(default)]
	pub restart_delay_ms: u64,
}

fn default_crash_limit() -> usize {
	3
}

impl Default for WatchdogConfig {
	fn default() -> Self {
		Self {
			crash_number_limit: default_crash_limit(),
			restart_delay_ms: 0,
		}
	}
}

impl WatchdogConfig {
	pub fn policy(&self) -> RestartPolicy {
		RestartPolicy::OnCrash {
			max_restarts: self.crash_number_limit,
			backoff: Duration::from_millis(self.restart_delay_ms),
		}
	}
}

/// Shared context settings, decoded from `data-cke-context`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDescriptor {
	#[serde(default)]
	pub config: ContextSettings,
	#[serde(default)]
	pub watchdog_config: WatchdogConfig,
	#[serde(default)]
	pub custom_translations: CustomTranslations,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSettings {
	#[serde(default)]
	pub plugins: Vec<String>,
	#[serde(default)]
	pub license_key: Option<String>,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, Value>,
}

/// What an editable host declares about its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableSnapshot {
	pub editor_id: Option<String>,
	pub root_name: String,
	/// Raw HTML; `None` leaves existing root data untouched.
	pub content: Option<String>,
	pub save_debounce: Option<Duration>,
}

impl EditableSnapshot {
	pub fn read(document: &Document, node: NodeId) -> Result<Self> {
		Ok(Self {
			editor_id: document.attribute(node, ATTR_EDITOR_ID),
			root_name: document.attribute(node, ATTR_ROOT_NAME).unwrap_or_else(|| MAIN_ROOT.to_string()),
			content: document.attribute(node, ATTR_CONTENT),
			save_debounce: read_millis(document, node, ATTR_SAVE_DEBOUNCE)?,
		})
	}
}

/// Decodes a JSON attribute; absent attributes are `None`.
pub fn read_json<T: DeserializeOwned>(document: &Document, node: NodeId, attribute: &'static str) -> Result<Option<T>> {
	let Some(raw) = document.attribute(node, attribute) else {
		return Ok(None);
	};
	serde_json::from_str(&raw)
		.map(Some)
		.map_err(|source| HostError::InvalidAttribute { attribute, source })
}

pub fn read_millis(document: &Document, node: NodeId, attribute: &'static str) -> Result<Option<Duration>> {
	Ok(read_json::<u64>(document, node, attribute)?.map(Duration::from_millis))
}

pub fn require_attribute(document: &Document, node: NodeId, tag: &'static str, attribute: &'static str) -> Result<String> {
	document.attribute(node, attribute).ok_or(HostError::MissingAttribute { tag, attribute })
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn decodes_preset() {
		let preset: EditorPreset = serde_json::from_value(json!({
			"editorType": "multiroot",
			"plugins": ["Essentials", "Bold"],
			"licenseKey": "GPL",
			"config": { "toolbar": ["bold"] },
			"content": { "header": "<h1>T</h1>" },
			"customTranslations": { "pl": { "Bold": "Pogrubienie", "Items": ["Element", "Elementy"] } }
		}))
		.unwrap();
		assert_eq!(preset.editor_type, "multiroot");
		assert_eq!(preset.plugins, vec!["Essentials".to_string(), "Bold".to_string()]);
		assert_eq!(preset.content["header"], "<h1>T</h1>");
		assert_eq!(
			preset.custom_translations["pl"]["Items"],
			TranslationValue::Forms(vec!["Element".to_string(), "Elementy".to_string()])
		);
	}

	#[test]
	fn language_falls_back() {
		let only_ui = LanguageDescriptor {
			ui: Some("pl".to_string()),
			content: None,
		};
		assert_eq!(only_ui.resolve(), Language {
			ui: "pl".to_string(),
			content: "pl".to_string(),
		});
		assert_eq!(LanguageDescriptor::default().resolve(), Language::default());
	}

	#[test]
	fn context_descriptor_keeps_extra_settings() {
		let descriptor: ContextDescriptor = serde_json::from_value(json!({
			"config": { "plugins": ["Essentials"], "cloudServices": { "tokenUrl": "x" } },
			"watchdogConfig": { "crashNumberLimit": 5 }
		}))
		.unwrap();
		assert_eq!(descriptor.config.plugins, vec!["Essentials".to_string()]);
		assert!(descriptor.config.rest.contains_key("cloudServices"));
		assert_eq!(descriptor.watchdog_config.crash_number_limit, 5);
	}

	#[test]
	fn invalid_json_names_the_attribute() {
		let document = Document::new();
		let node = document.create_element_with("cke5-editor", &[(ATTR_SAVE_DEBOUNCE, "soon")]);
		let err = read_millis(&document, node, ATTR_SAVE_DEBOUNCE).unwrap_err();
		assert!(matches!(err, HostError::InvalidAttribute { attribute: ATTR_SAVE_DEBOUNCE, .. }));
	}
}
