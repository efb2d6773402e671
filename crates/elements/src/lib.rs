//! Element hosts binding a document to editor instances.
//!
//! A [`Session`] owns the shared registries and defines four custom elements on its
//! document:
//!
//! * `<cke5-editor>` builds an editor from a JSON preset and registers it by editor id.
//! * `<cke5-editable>` adds a root to an editor, before or after the editor exists.
//! * `<cke5-context>` runs a supervised context other editors can join.
//! * `<cke5-ui-part>` mounts an editor's toolbar or menu bar elsewhere in the page.
//!
//! Connection order between hosts does not matter: consumers wait on the registries, and
//! every disconnect waits for the matching connect before tearing anything down.

mod config;
mod descriptor;
mod error;
pub mod hosts;
pub mod pipeline;
mod session;

pub use config::HostConfig;
pub use descriptor::{
	ATTR_CONTENT, ATTR_CONTEXT, ATTR_CONTEXT_ID, ATTR_EDITABLE_CONTENT, ATTR_EDITABLE_HEIGHT, ATTR_EDITOR_ID, ATTR_LANGUAGE, ATTR_NAME, ATTR_PRESET,
	ATTR_ROOT_NAME, ATTR_SAVE_DEBOUNCE, ATTR_WATCHDOG, ContextDescriptor, ContextSettings, CustomTranslations, EditableSnapshot, EditorPreset,
	LanguageDescriptor, TranslationValue, WatchdogConfig,
};
pub use error::{HostError, Result};
pub use hosts::{ElementHost, HostState};
pub use session::{ContextsRegistry, CustomEditorPluginsRegistry, EditorsRegistry, Session};

pub const EDITOR_TAG: &str = "cke5-editor";
pub const EDITABLE_TAG: &str = "cke5-editable";
pub const CONTEXT_TAG: &str = "cke5-context";
pub const UI_PART_TAG: &str = "cke5-ui-part";

pub type EditorElement = ElementHost<hosts::EditorHost>;
pub type EditableElement = ElementHost<hosts::EditableHost>;
pub type ContextElement = ElementHost<hosts::ContextHost>;
pub type UiPartElement = ElementHost<hosts::UiPartHost>;
