use std::collections::BTreeMap;
use std::sync::Arc;

use cke5_engine::{Language, PluginPackage, TranslationPack};

use crate::Result;
use crate::descriptor::{CustomTranslations, TranslationValue};

/// English ships with every package and never needs loading.
const BUILT_IN_LANGUAGE: &str = "en";

/// Loads the UI and content language packs of every package, in package order.
pub async fn load_all_translations(packages: &[Arc<dyn PluginPackage>], language: &Language) -> Result<Vec<TranslationPack>> {
	let mut languages = vec![language.ui.as_str()];
	if language.content != language.ui {
		languages.push(language.content.as_str());
	}
	languages.retain(|lang| *lang != BUILT_IN_LANGUAGE);

	let mut packs = Vec::new();
	for package in packages {
		for lang in &languages {
			if let Some(pack) = package.translation(lang).await? {
				packs.push(pack);
			}
		}
	}
	Ok(packs)
}

/// Turns attribute-supplied translations into packs; plural forms keep the singular.
pub fn normalize_custom_translations(custom: &CustomTranslations) -> Vec<TranslationPack> {
	custom
		.iter()
		.map(|(language, entries)| TranslationPack {
			language: language.clone(),
			dictionary: entries
				.iter()
				.filter_map(|(key, value)| {
					let text = match value {
						TranslationValue::Single(text) => text.clone(),
						TranslationValue::Forms(forms) => forms.first()?.clone(),
					};
					Some((key.clone(), text))
				})
				.collect::<BTreeMap<_, _>>(),
		})
		.collect()
}

/// Orders packs so the first one defining a key wins, custom translations first.
pub fn merge_translations(packages: Vec<TranslationPack>, custom: Vec<TranslationPack>) -> Vec<TranslationPack> {
	let mut merged: Vec<TranslationPack> = packages.into_iter().chain(custom).filter(|pack| !pack.is_empty()).collect();
	merged.reverse();
	merged
}

/// Looks `key` up in precedence order.
pub fn translate<'a>(packs: &'a [TranslationPack], key: &str) -> Option<&'a str> {
	packs.iter().find_map(|pack| pack.dictionary.get(key).map(String::as_str))
}

#[cfg(test)]
mod tests {
	use cke5_engine::memory::MemoryPackage;
	use pretty_assertions::assert_eq;

	use super::*;

	fn pack(language: &str, entries: &[(&str, &str)]) -> TranslationPack {
		TranslationPack {
			language: language.to_string(),
			dictionary: entries.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
		}
	}

	#[tokio::test]
	async fn skips_english_and_missing_packs() {
		let base: Arc<dyn PluginPackage> = Arc::new(MemoryPackage::default().with_translation("pl", [("Bold", "Pogrubienie")]));
		let language = Language {
			ui: "en".to_string(),
			content: "pl".to_string(),
		};
		let packs = load_all_translations(&[Arc::clone(&base)], &language).await.unwrap();
		assert_eq!(packs, vec![pack("pl", &[("Bold", "Pogrubienie")])]);

		let english = load_all_translations(&[base], &Language::default()).await.unwrap();
		assert!(english.is_empty());
	}

	#[test]
	fn custom_translations_win() {
		let custom: CustomTranslations = BTreeMap::from([(
			"pl".to_string(),
			BTreeMap::from([
				("Bold".to_string(), TranslationValue::Single("Gruby".to_string())),
				("Items".to_string(), TranslationValue::Forms(vec!["Element".to_string(), "Elementy".to_string()])),
			]),
		)]);
		let merged = merge_translations(
			vec![pack("pl", &[("Bold", "Pogrubienie"), ("Italic", "Kursywa")]), pack("de", &[])],
			normalize_custom_translations(&custom),
		);
		assert_eq!(merged.len(), 2);
		assert_eq!(translate(&merged, "Bold"), Some("Gruby"));
		assert_eq!(translate(&merged, "Italic"), Some("Kursywa"));
		assert_eq!(translate(&merged, "Items"), Some("Element"));
		assert_eq!(translate(&merged, "Missing"), None);
	}
}
