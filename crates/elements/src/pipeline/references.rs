use cke5_dom::Document;
use cke5_engine::TranslationPack;
use serde_json::{Map, Value};

use super::translations::translate;

const ELEMENT_REFERENCE: &str = "$element";
const TRANSLATION_REFERENCE: &str = "$translation";
/// Key of the object an element reference resolves to.
pub const NODE_REFERENCE: &str = "$node";

/// Replaces `{"$element": selector}` and `{"$translation": key}` anywhere inside `value`.
///
/// Element references become `{"$node": id}`. References that resolve to nothing are logged and
/// replaced by `null` so one bad reference does not abort the editor.
pub fn resolve_config_references(document: &Document, value: &Value, translations: &[TranslationPack]) -> Value {
	match value {
		Value::Array(items) => Value::Array(items.iter().map(|item| resolve_config_references(document, item, translations)).collect()),
		Value::Object(map) => {
			if let Some(resolved) = resolve_reference(document, map, translations) {
				return resolved;
			}
			Value::Object(
				map.iter()
					.map(|(key, item)| (key.clone(), resolve_config_references(document, item, translations)))
					.collect::<Map<_, _>>(),
			)
		}
		other => other.clone(),
	}
}

fn resolve_reference(document: &Document, map: &Map<String, Value>, translations: &[TranslationPack]) -> Option<Value> {
	if map.len() != 1 {
		return None;
	}
	if let Some(Value::String(selector)) = map.get(ELEMENT_REFERENCE) {
		return Some(match document.query_selector(selector) {
			Ok(Some(node)) => Value::Object(Map::from_iter([(NODE_REFERENCE.to_string(), Value::from(node.as_u64()))])),
			Ok(None) => {
				tracing::warn!(%selector, "config.element_reference.unresolved");
				Value::Null
			}
			Err(err) => {
				tracing::warn!(%selector, error = %err, "config.element_reference.invalid");
				Value::Null
			}
		});
	}
	if let Some(Value::String(key)) = map.get(TRANSLATION_REFERENCE) {
		return Some(match translate(translations, key) {
			Some(text) => Value::String(text.to_string()),
			None => {
				tracing::warn!(%key, "config.translation_reference.unresolved");
				Value::Null
			}
		});
	}
	None
}
