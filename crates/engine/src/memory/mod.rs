//! In-memory reference engine.
//!
//! Models each root as a string rendered into its editable element's text. Used by embedders
//! without a real engine and by the host tests; [`MemoryEditor::simulate_crash`] and
//! [`MemoryContext::simulate_crash`] drive the watchdog paths.

mod context;
mod editor;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cke5_dom::Document;

pub use self::context::MemoryContext;
pub use self::editor::{MemoryEditor, NamedPlugin};
use crate::{
	Context, ContextConfig, ContextFactory, Editor, EditorConfig, EditorConstructor, EditorSource, EditorType, EngineLibrary, Plugin, PluginPackage,
	Result, TranslationPack,
};

/// Plugins every memory library ships in its base package.
pub const BASE_PLUGINS: &[&str] = &["Essentials", "Paragraph", "Heading", "Bold", "Italic", "Link", "List", "Undo"];

/// A plugin/translation bundle held in memory.
#[derive(Default)]
pub struct MemoryPackage {
	plugins: HashMap<String, Arc<dyn Plugin>>,
	translations: HashMap<String, TranslationPack>,
}

impl MemoryPackage {
	pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
		self.plugins.insert(plugin.name().to_string(), plugin);
		self
	}

	pub fn with_translation<I, K, V>(mut self, language: &str, entries: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let dictionary: BTreeMap<String, String> = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
		self.translations.insert(language.to_string(), TranslationPack {
			language: language.to_string(),
			dictionary,
		});
		self
	}
}

#[async_trait]
impl PluginPackage for MemoryPackage {
	fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
		self.plugins.get(name).cloned()
	}

	async fn translation(&self, language: &str) -> Result<Option<TranslationPack>> {
		Ok(self.translations.get(language).cloned())
	}
}

/// Constructor for one editor type of the memory engine.
pub struct MemoryConstructor {
	editor_type: EditorType,
	document: Document,
}

#[async_trait]
impl EditorConstructor for MemoryConstructor {
	fn editor_type(&self) -> EditorType {
		self.editor_type
	}

	async fn create(&self, source: EditorSource, config: EditorConfig) -> Result<Arc<dyn Editor>> {
		let editor: Arc<dyn Editor> = MemoryEditor::create(self.editor_type, self.document.clone(), source, config)?;
		Ok(editor)
	}
}

struct MemoryContextFactory;

#[async_trait]
impl ContextFactory for MemoryContextFactory {
	async fn create(&self, config: ContextConfig) -> Result<Arc<dyn Context>> {
		let context: Arc<dyn Context> = MemoryContext::new(config);
		Ok(context)
	}
}

/// [`EngineLibrary`] backed by the memory engine.
pub struct MemoryLibrary {
	document: Document,
	base: Arc<MemoryPackage>,
	premium: Arc<MemoryPackage>,
	premium_loads: AtomicUsize,
}

impl MemoryLibrary {
	/// Library whose base package holds [`BASE_PLUGINS`] and whose premium package is empty.
	pub fn new(document: Document) -> Self {
		Self::with_packages(document, base_package(), MemoryPackage::default())
	}

	pub fn with_packages(document: Document, base: MemoryPackage, premium: MemoryPackage) -> Self {
		Self {
			document,
			base: Arc::new(base),
			premium: Arc::new(premium),
			premium_loads: AtomicUsize::new(0),
		}
	}

	/// How many times the premium package was requested.
	pub fn premium_loads(&self) -> usize {
		self.premium_loads.load(Ordering::Acquire)
	}
}

/// The default base package, for extending with translations or extra plugins.
pub fn base_package() -> MemoryPackage {
	BASE_PLUGINS
		.iter()
		.fold(MemoryPackage::default(), |package, name| package.with_plugin(NamedPlugin::new(*name)))
}

#[async_trait]
impl EngineLibrary for MemoryLibrary {
	async fn editor_constructor(&self, editor_type: EditorType) -> Result<Arc<dyn EditorConstructor>> {
		let constructor: Arc<dyn EditorConstructor> = Arc::new(MemoryConstructor {
			editor_type,
			document: self.document.clone(),
		});
		Ok(constructor)
	}

	async fn base_package(&self) -> Result<Arc<dyn PluginPackage>> {
		let package: Arc<dyn PluginPackage> = self.base.clone();
		Ok(package)
	}

	async fn premium_package(&self) -> Result<Arc<dyn PluginPackage>> {
		self.premium_loads.fetch_add(1, Ordering::AcqRel);
		tracing::debug!("memory.premium.load");
		let package: Arc<dyn PluginPackage> = self.premium.clone();
		Ok(package)
	}

	async fn context_factory(&self) -> Result<Arc<dyn ContextFactory>> {
		let factory: Arc<dyn ContextFactory> = Arc::new(MemoryContextFactory);
		Ok(factory)
	}
}

#[cfg(test)]
mod tests;
