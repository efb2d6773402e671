//! The editor-creation pipeline, split by step.
//!
//! [`crate::hosts`] drives these in order; each step is usable on its own.

mod builtin;
mod constructor;
mod context;
mod plugins;
mod references;
mod roots;
mod translations;

pub use builtin::{CHANGE_DATA_EVENT, ChangeDataDispatcher, ChangeListener, InputSync, snapshot_roots};
pub use constructor::load_editor_constructor;
pub use context::{AttachmentState, ContextAttachment, create_editor_in_context};
pub use plugins::{LoadedPlugins, load_editor_plugins};
pub use references::{NODE_REFERENCE, resolve_config_references};
pub use roots::{EditableMount, SourceQuery, content_element, declared_content, editable_hosts, initial_data, locate_sources};
pub use translations::{load_all_translations, merge_translations, normalize_custom_translations, translate};
