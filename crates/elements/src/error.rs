use cke5_dom::DomError;
use cke5_engine::EngineError;
use cke5_registry::RegistryError;
use thiserror::Error;

/// Errors raised while connecting or disconnecting element hosts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HostError {
	#[error("unsupported editor type: {0}")]
	UnsupportedEditorType(String),
	#[error("plugin \"{name}\" is not a custom plugin and is missing from the base and premium packages")]
	UnknownPlugin { name: String },
	#[error("unknown UI part \"{0}\", expected \"toolbar\" or \"menubar\"")]
	UnknownUiPart(String),
	/// Polling for editable roots ran out of time.
	#[error(
		"editables for roots [{}] did not appear in time; render the editable elements before the editor or declare no initial content for those roots",
		.roots.join(", ")
	)]
	MissingRoots { roots: Vec<String> },
	#[error("<{tag}> is missing the {attribute} attribute")]
	MissingAttribute { tag: &'static str, attribute: &'static str },
	#[error("invalid {attribute} attribute: {source}")]
	InvalidAttribute {
		attribute: &'static str,
		#[source]
		source: serde_json::Error,
	},
	/// The element left the document before its connect sequence finished.
	#[error("element disconnected while connecting")]
	Disconnected,
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error(transparent)]
	Engine(#[from] EngineError),
	#[error(transparent)]
	Dom(#[from] DomError),
}

pub type Result<T, E = HostError> = std::result::Result<T, E>;
