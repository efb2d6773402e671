use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::{RegistryError, Result, describe_key};

/// Produces a plugin on demand; may be asynchronous (lazy imports).
pub type PluginLoader<P> = Arc<dyn Fn() -> BoxFuture<'static, P> + Send + Sync>;

/// Synchronous name → loader map for user-supplied plugins.
///
/// Unlike [`crate::AsyncRegistry`] there is no waiting and no default slot: a lookup either finds
/// a loader or it does not.
pub struct CustomPluginsRegistry<P> {
	loaders: RwLock<HashMap<String, PluginLoader<P>>>,
}

impl<P> Default for CustomPluginsRegistry<P> {
	fn default() -> Self {
		Self {
			loaders: RwLock::new(HashMap::new()),
		}
	}
}

impl<P: Send + 'static> CustomPluginsRegistry<P> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a loader under `name`.
	///
	/// # Errors
	///
	/// Returns [`RegistryError::AlreadyRegistered`] when `name` is taken.
	pub fn register<F, Fut>(&self, name: impl Into<String>, loader: F) -> Result<()>
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = P> + Send + 'static,
	{
		let name = name.into();
		let mut loaders = self.loaders.write();
		if loaders.contains_key(&name) {
			return Err(RegistryError::AlreadyRegistered {
				id: describe_key(Some(&name)),
			});
		}
		tracing::debug!(plugin = %name, "custom_plugins.register");
		loaders.insert(name, Arc::new(move || loader().boxed()));
		Ok(())
	}

	/// Removes the loader registered under `name`.
	///
	/// # Errors
	///
	/// Returns [`RegistryError::NotRegistered`] when `name` is unknown.
	pub fn unregister(&self, name: &str) -> Result<()> {
		match self.loaders.write().remove(name) {
			Some(_) => Ok(()),
			None => Err(RegistryError::NotRegistered {
				id: describe_key(Some(name)),
			}),
		}
	}

	pub fn unregister_all(&self) {
		self.loaders.write().clear();
	}

	pub fn has(&self, name: &str) -> bool {
		self.loaders.read().contains_key(name)
	}

	/// Runs the loader for `name`, if any.
	pub async fn get(&self, name: &str) -> Option<P> {
		let loader = self.loaders.read().get(name).cloned()?;
		Some(loader().await)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn loads_registered_plugin() {
		let plugins = CustomPluginsRegistry::<&'static str>::new();
		plugins.register("Highlight", || async { "highlight-plugin" }).unwrap();

		assert!(plugins.has("Highlight"));
		assert_eq!(plugins.get("Highlight").await, Some("highlight-plugin"));
		assert_eq!(plugins.get("Missing").await, None);
	}

	#[test]
	fn duplicate_and_missing_names_fail() {
		let plugins = CustomPluginsRegistry::<u8>::new();
		plugins.register("A", || async { 1 }).unwrap();
		assert!(matches!(plugins.register("A", || async { 2 }), Err(RegistryError::AlreadyRegistered { .. })));

		plugins.unregister("A").unwrap();
		assert!(matches!(plugins.unregister("A"), Err(RegistryError::NotRegistered { .. })));
	}

	#[test]
	fn unregister_all_clears() {
		let plugins = CustomPluginsRegistry::<u8>::new();
		plugins.register("A", || async { 1 }).unwrap();
		plugins.register("B", || async { 2 }).unwrap();
		plugins.unregister_all();
		assert!(!plugins.has("A") && !plugins.has("B"));
	}
}
