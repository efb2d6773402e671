use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs shared by every host of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
	/// How long an editor waits for its context to register.
	#[serde(default = "default_context_timeout")]
	pub context_timeout_ms: u64,
	/// How long decoupled and multi-root editors poll for their editables.
	#[serde(default = "default_root_wait_timeout")]
	pub root_wait_timeout_ms: u64,
	#[serde(default = "default_root_retry_interval")]
	pub root_retry_interval_ms: u64,
	/// Debounce for change events when an element sets no `data-cke-save-debounce-ms`.
	#[serde(default = "default_save_debounce")]
	pub default_save_debounce_ms: u64,
}

fn default_context_timeout() -> u64 {
	10_000
}

fn default_root_wait_timeout() -> u64 {
	2_000
}

fn default_root_retry_interval() -> u64 {
	100
}

fn default_save_debounce() -> u64 {
	300
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			context_timeout_ms: default_context_timeout(),
			root_wait_timeout_ms: default_root_wait_timeout(),
			root_retry_interval_ms: default_root_retry_interval(),
			default_save_debounce_ms: default_save_debounce(),
		}
	}
}

impl HostConfig {
	pub fn context_timeout(&self) -> Duration {
		Duration::from_millis(self.context_timeout_ms)
	}

	pub fn root_wait(&self) -> cke5_worker::WaitOptions {
		cke5_worker::WaitOptions {
			time_out_after: Duration::from_millis(self.root_wait_timeout_ms),
			retry_after: Duration::from_millis(self.root_retry_interval_ms),
		}
	}

	pub fn default_save_debounce(&self) -> Duration {
		Duration::from_millis(self.default_save_debounce_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_fields_take_defaults() {
		let config: HostConfig = serde_json::from_str(r#"{"root_wait_timeout_ms": 50}"#).unwrap();
		assert_eq!(config.root_wait_timeout_ms, 50);
		assert_eq!(config.context_timeout(), Duration::from_secs(10));
		assert_eq!(config.default_save_debounce(), Duration::from_millis(300));
	}
}
