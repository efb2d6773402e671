//! Keyed registries of asynchronously created items.
//!
//! [`AsyncRegistry`] lets producers register items under string ids while consumers ask for
//! them before they exist; queued requests are fulfilled (or rejected) the moment the producer
//! registers (or records a failure). The `None` key is the default slot, aliasing the first item
//! registered after the registry was last empty.
//!
//! [`CustomPluginsRegistry`] is the simpler synchronous name → loader map used for
//! user-supplied plugins.

mod async_registry;
mod error;
mod plugins;

pub use async_registry::{AsyncRegistry, Destroyable, ErrorsSnapshot, Execution, ItemsSnapshot, RegistryKey, WatcherId};
pub use error::{RegistryError, Result, SharedError, describe_key};
pub use plugins::{CustomPluginsRegistry, PluginLoader};
