use std::sync::Arc;

use cke5_engine::{Plugin, PluginPackage};

use crate::{HostError, Result, Session};

/// Plugins resolved for one editor or context.
pub struct LoadedPlugins {
	pub plugins: Vec<Arc<dyn Plugin>>,
	/// Packages the plugins came from; the premium one only when it was needed.
	pub packages: Vec<Arc<dyn PluginPackage>>,
}

/// Resolves plugin names against custom plugins, the base package and then the premium package.
///
/// The premium package is only requested once a name is missing everywhere else.
///
/// # Errors
///
/// [`HostError::UnknownPlugin`] naming the first plugin found nowhere.
pub async fn load_editor_plugins(session: &Session, names: &[String]) -> Result<LoadedPlugins> {
	let base = session.library().base_package().await?;
	let mut premium: Option<Arc<dyn PluginPackage>> = None;
	let mut plugins = Vec::with_capacity(names.len());

	for name in names {
		if let Some(plugin) = session.plugins().get(name).await {
			plugins.push(plugin);
			continue;
		}
		if let Some(plugin) = base.plugin(name) {
			plugins.push(plugin);
			continue;
		}
		let package = match &premium {
			Some(package) => Arc::clone(package),
			None => {
				let package = session.premium_package().await?;
				premium = Some(Arc::clone(&package));
				package
			}
		};
		let plugin = package.plugin(name).ok_or_else(|| HostError::UnknownPlugin { name: name.clone() })?;
		plugins.push(plugin);
	}

	let has_premium = premium.is_some();
	tracing::debug!(count = plugins.len(), has_premium, "pipeline.plugins");
	Ok(LoadedPlugins {
		plugins,
		packages: std::iter::once(base).chain(premium).collect(),
	})
}
