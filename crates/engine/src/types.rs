use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cke5_dom::NodeId;
use serde_json::Value;

use crate::Plugin;

/// Name of the root every single-root editor edits.
pub const MAIN_ROOT: &str = "main";

/// Internal root holding removed content; never reported as user content.
pub const GRAVEYARD_ROOT: &str = "$graveyard";

/// Supported editor flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorType {
	Inline,
	Classic,
	Balloon,
	Decoupled,
	Multiroot,
}

impl EditorType {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Inline => "inline",
			Self::Classic => "classic",
			Self::Balloon => "balloon",
			Self::Decoupled => "decoupled",
			Self::Multiroot => "multiroot",
		}
	}

	/// Every type except multiroot edits exactly one root.
	pub const fn is_single_root(self) -> bool {
		!matches!(self, Self::Multiroot)
	}

	/// Types that replace their host element instead of mounting into separate editables.
	pub const fn is_single_editing_like(self) -> bool {
		matches!(self, Self::Inline | Self::Classic | Self::Balloon)
	}
}

impl fmt::Display for EditorType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Returned when a string names no [`EditorType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported editor type: {0}")]
pub struct UnknownEditorType(pub String);

impl FromStr for EditorType {
	type Err = UnknownEditorType;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"inline" => Ok(Self::Inline),
			"classic" => Ok(Self::Classic),
			"balloon" => Ok(Self::Balloon),
			"decoupled" => Ok(Self::Decoupled),
			"multiroot" => Ok(Self::Multiroot),
			other => Err(UnknownEditorType(other.to_string())),
		}
	}
}

/// UI and content languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
	pub ui: String,
	pub content: String,
}

impl Default for Language {
	fn default() -> Self {
		Self {
			ui: "en".to_string(),
			content: "en".to_string(),
		}
	}
}

/// UI regions a host can mount outside the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiRegion {
	Toolbar,
	Menubar,
}

/// Content the editor starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialData {
	Single(String),
	Roots(BTreeMap<String, String>),
}

impl InitialData {
	/// Data for one root; `Single` only answers for [`MAIN_ROOT`].
	pub fn root(&self, name: &str) -> Option<&str> {
		match self {
			Self::Single(data) if name == MAIN_ROOT => Some(data),
			Self::Single(_) => None,
			Self::Roots(roots) => roots.get(name).map(String::as_str),
		}
	}
}

/// Where the editor mounts its editables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorSource {
	/// One element hosting the `main` root.
	Element(NodeId),
	/// One element per named root.
	Roots(BTreeMap<String, NodeId>),
}

/// One language's dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationPack {
	pub language: String,
	pub dictionary: BTreeMap<String, String>,
}

impl TranslationPack {
	pub fn is_empty(&self) -> bool {
		self.dictionary.is_empty()
	}
}

/// Everything an editor constructor needs besides its source.
#[derive(Clone)]
pub struct EditorConfig {
	pub plugins: Vec<Arc<dyn Plugin>>,
	/// Earlier packs win over later ones for the same key.
	pub translations: Vec<TranslationPack>,
	pub language: Language,
	pub license_key: Option<String>,
	pub initial_data: InitialData,
	/// Remaining engine settings with element/translation references already resolved.
	pub settings: Value,
}

impl fmt::Debug for EditorConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EditorConfig")
			.field("plugins", &self.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>())
			.field("translations", &self.translations.len())
			.field("language", &self.language)
			.field("initial_data", &self.initial_data)
			.finish_non_exhaustive()
	}
}

/// Configuration of a shared context.
#[derive(Clone, Default)]
pub struct ContextConfig {
	pub plugins: Vec<Arc<dyn Plugin>>,
	pub translations: Vec<TranslationPack>,
	pub language: Language,
	pub license_key: Option<String>,
	pub settings: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
	Initializing,
	Ready,
	/// Unrecoverable failure; data stays readable until destroyed.
	Crashed,
	Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
	Ready,
	/// Destroying attached editors; removing one now is the context's job, not the caller's.
	Destroying,
	Crashed,
	Destroyed,
}

/// Notifications emitted by an editor instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
	/// Model data changed in at least one root.
	ChangeData,
	/// The instance hit an unrecoverable error.
	Crashed(String),
	Destroyed,
}

/// Notifications emitted by a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
	/// An editor attached under `item_id` crashed; the context keeps running.
	ItemError { item_id: String, message: String },
	Crashed(String),
	Destroyed,
}
