//! Engine capability surface consumed by the cke5 hosts.
//!
//! The hosts never depend on a concrete rich-text engine. They talk to an [`EngineLibrary`]
//! that hands out [`EditorConstructor`]s, [`PluginPackage`]s and a [`ContextFactory`], and
//! they supervise instances through [`Watchdog`]. The [`memory`] module provides a complete
//! in-memory implementation.

mod context;
mod editor;
mod error;
pub mod memory;
mod types;
mod watchdog;

pub use context::{Context, ContextFactory, ContextItem};
pub use editor::{Editor, EditorConstructor, EngineLibrary, Plugin, PluginPackage};
pub use error::{EngineError, Result};
pub use types::{
	ContextConfig, ContextEvent, ContextState, EditorConfig, EditorEvent, EditorSource, EditorState, EditorType, GRAVEYARD_ROOT, InitialData,
	Language, MAIN_ROOT, TranslationPack, UiRegion, UnknownEditorType,
};
pub use watchdog::{RestartPolicy, Supervised, Watchdog, WatchdogEvent};
