use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::{TaskClass, spawn};

struct DebounceState<A> {
	seq: u64,
	timer: Option<JoinHandle<()>>,
	args: Option<A>,
}

struct DebounceInner<A> {
	delay: Duration,
	action: Box<dyn Fn(A) + Send + Sync>,
	state: Mutex<DebounceState<A>>,
}

impl<A: Send + 'static> DebounceInner<A> {
	fn fire(&self, seq: u64) {
		let args = {
			let Ok(mut state) = self.state.lock() else {
				return;
			};
			if state.seq != seq {
				return;
			}
			state.timer = None;
			state.args.take()
		};
		if let Some(args) = args {
			(self.action)(args);
		}
	}
}

/// Trailing-edge debouncer: only the last call within `delay` reaches the action.
///
/// Clones share the same timer.
pub struct Debounced<A> {
	inner: Arc<DebounceInner<A>>,
}

impl<A> Clone for Debounced<A> {
	fn clone(&self) -> Self {
		Self { inner: Arc::clone(&self.inner) }
	}
}

/// Wraps `action` so bursts of calls collapse into one call after `delay` of quiet.
pub fn debounce<A, F>(delay: Duration, action: F) -> Debounced<A>
where
	A: Send + 'static,
	F: Fn(A) + Send + Sync + 'static,
{
	Debounced {
		inner: Arc::new(DebounceInner {
			delay,
			action: Box::new(action),
			state: Mutex::new(DebounceState { seq: 0, timer: None, args: None }),
		}),
	}
}

impl<A: Send + 'static> Debounced<A> {
	/// Schedules the action with `args`, replacing any pending call.
	pub fn call(&self, args: A) {
		let Ok(mut state) = self.inner.state.lock() else {
			return;
		};
		state.seq = state.seq.wrapping_add(1);
		state.args = Some(args);
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}

		let seq = state.seq;
		let inner = Arc::clone(&self.inner);
		state.timer = Some(spawn(TaskClass::Listener, async move {
			tokio::time::sleep(inner.delay).await;
			inner.fire(seq);
		}));
	}

	/// Runs a pending call right away. Returns false when nothing was pending.
	pub fn flush(&self) -> bool {
		let args = {
			let Ok(mut state) = self.inner.state.lock() else {
				return false;
			};
			state.seq = state.seq.wrapping_add(1);
			if let Some(timer) = state.timer.take() {
				timer.abort();
			}
			state.args.take()
		};
		match args {
			Some(args) => {
				(self.inner.action)(args);
				true
			}
			None => false,
		}
	}

	/// Drops a pending call without running it.
	pub fn cancel(&self) {
		if let Ok(mut state) = self.inner.state.lock() {
			state.seq = state.seq.wrapping_add(1);
			state.args = None;
			if let Some(timer) = state.timer.take() {
				timer.abort();
			}
		}
	}

	/// Returns true while a call is waiting for its delay to elapse.
	pub fn is_pending(&self) -> bool {
		self.inner.state.lock().map(|s| s.args.is_some()).unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[tokio::test(start_paused = true)]
	async fn burst_collapses_to_last_call() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let debounced = debounce(Duration::from_millis(100), move |v: u32| sink.lock().unwrap().push(v));

		debounced.call(1);
		debounced.call(2);
		tokio::time::sleep(Duration::from_millis(50)).await;
		debounced.call(3);
		assert!(debounced.is_pending());

		tokio::time::sleep(Duration::from_millis(150)).await;
		assert_eq!(*seen.lock().unwrap(), vec![3]);
		assert!(!debounced.is_pending());
	}

	#[tokio::test(start_paused = true)]
	async fn flush_and_cancel() {
		let count = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&count);
		let debounced = debounce(Duration::from_millis(100), move |()| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		debounced.call(());
		assert!(debounced.flush());
		assert!(!debounced.flush());
		assert_eq!(count.load(Ordering::SeqCst), 1);

		debounced.call(());
		debounced.cancel();
		tokio::time::sleep(Duration::from_millis(200)).await;
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}
}
