use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic generation clock for restartable instances.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Cooperative "being destroyed" flag shared between a connect sequence and its disconnect.
///
/// The connect side checks [`Self::is_cancelled`] after every suspension point; the disconnect
/// side calls [`Self::cancel`] before awaiting the connect.
#[derive(Debug, Clone, Default)]
pub struct TeardownToken {
	cancel: CancellationToken,
}

impl TeardownToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true when teardown was requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests teardown.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Future resolving when teardown is requested.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generations_start_at_one() {
		let clock = GenerationClock::new();
		assert_eq!(clock.next(), 1);
		assert_eq!(clock.clone().next(), 2);
	}

	#[tokio::test]
	async fn clones_share_cancellation() {
		let token = TeardownToken::new();
		let connect = token.clone();
		assert!(!connect.is_cancelled());
		token.cancel();
		connect.cancelled().await;
		assert!(connect.is_cancelled());
	}
}
