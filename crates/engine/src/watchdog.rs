//! Crash supervision for editors and contexts.
//!
//! A [`Watchdog`] owns exactly one live instance at a time. When the instance reports a crash
//! the watchdog destroys it, builds a replacement through its creator and broadcasts
//! [`WatchdogEvent::Restarted`]. Holders of the old `Arc` keep a stale handle and must re-fetch
//! through [`Watchdog::instance`] or the event.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use cke5_registry::{Destroyable, SharedError};
use cke5_worker::{GenerationClock, TaskClass, TeardownToken};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{Context, ContextEvent, ContextState, Editor, EditorEvent, EditorState, EngineError, Result};

/// Instances a [`Watchdog`] can supervise.
#[async_trait]
pub trait Supervised: Destroyable {
	/// Resolves with the crash reason, or `None` once the instance is destroyed normally.
	async fn crashed(&self) -> Option<String>;
}

#[async_trait]
impl Supervised for dyn Editor {
	async fn crashed(&self) -> Option<String> {
		let mut events = self.subscribe();
		loop {
			match self.state() {
				EditorState::Crashed => return Some("editor crashed".to_string()),
				EditorState::Destroyed => return None,
				EditorState::Initializing | EditorState::Ready => {}
			}
			match events.recv().await {
				Ok(EditorEvent::Crashed(reason)) => return Some(reason),
				Ok(EditorEvent::Destroyed) | Err(broadcast::error::RecvError::Closed) => return None,
				Ok(EditorEvent::ChangeData) | Err(broadcast::error::RecvError::Lagged(_)) => {}
			}
		}
	}
}

#[async_trait]
impl Supervised for dyn Context {
	async fn crashed(&self) -> Option<String> {
		let mut events = self.subscribe();
		loop {
			match self.state() {
				ContextState::Crashed => return Some("context crashed".to_string()),
				ContextState::Destroying | ContextState::Destroyed => return None,
				ContextState::Ready => {}
			}
			match events.recv().await {
				Ok(ContextEvent::Crashed(reason)) => return Some(reason),
				Ok(ContextEvent::Destroyed) | Err(broadcast::error::RecvError::Closed) => return None,
				Ok(ContextEvent::ItemError { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {}
			}
		}
	}
}

/// When a crashed instance is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartPolicy {
	Never,
	OnCrash { max_restarts: usize, backoff: Duration },
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self::OnCrash {
			max_restarts: 3,
			backoff: Duration::ZERO,
		}
	}
}

impl RestartPolicy {
	fn restart_delay(&self, restart_count: usize) -> Option<Duration> {
		match self {
			Self::Never => None,
			Self::OnCrash { max_restarts, backoff } => (restart_count < *max_restarts).then_some(*backoff),
		}
	}
}

/// Notification broadcast by a [`Watchdog`].
pub enum WatchdogEvent<T: ?Sized> {
	/// A replacement is live; the previous instance is destroyed.
	Restarted { instance: Arc<T>, generation: u64 },
	/// The instance crashed and will not be replaced.
	Failed { message: String },
}

impl<T: ?Sized> Clone for WatchdogEvent<T> {
	fn clone(&self) -> Self {
		match self {
			Self::Restarted { instance, generation } => Self::Restarted {
				instance: Arc::clone(instance),
				generation: *generation,
			},
			Self::Failed { message } => Self::Failed { message: message.clone() },
		}
	}
}

type Creator<T> = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<T>>> + Send + Sync>;

struct Instance<T: ?Sized> {
	value: Arc<T>,
	generation: u64,
}

struct WatchdogInner<T: ?Sized> {
	creator: Creator<T>,
	policy: RestartPolicy,
	current: ArcSwapOption<Instance<T>>,
	clock: GenerationClock,
	restarts: AtomicUsize,
	events: broadcast::Sender<WatchdogEvent<T>>,
	teardown: TeardownToken,
	monitor: Mutex<Option<JoinHandle<()>>>,
}

/// Supervisor keeping one live instance and replacing it after crashes.
pub struct Watchdog<T: ?Sized> {
	inner: Arc<WatchdogInner<T>>,
}

impl<T> Watchdog<T>
where
	T: ?Sized + Supervised + 'static,
{
	pub fn new<F>(policy: RestartPolicy, creator: F) -> Self
	where
		F: Fn() -> BoxFuture<'static, Result<Arc<T>>> + Send + Sync + 'static,
	{
		let (events, _) = broadcast::channel(16);
		Self {
			inner: Arc::new(WatchdogInner {
				creator: Box::new(creator),
				policy,
				current: ArcSwapOption::empty(),
				clock: GenerationClock::new(),
				restarts: AtomicUsize::new(0),
				events,
				teardown: TeardownToken::new(),
				monitor: Mutex::new(None),
			}),
		}
	}

	/// Builds the first instance and starts supervising it.
	///
	/// # Errors
	///
	/// Whatever the creator fails with, or [`EngineError::Destroyed`] when the watchdog was
	/// destroyed while creating.
	pub async fn create(&self) -> Result<Arc<T>> {
		let value = (self.inner.creator)().await?;
		if self.inner.teardown.is_cancelled() {
			destroy_quietly(&value).await;
			return Err(EngineError::Destroyed);
		}

		let generation = self.inner.clock.next();
		self.inner.current.store(Some(Arc::new(Instance {
			value: Arc::clone(&value),
			generation,
		})));

		let inner = Arc::clone(&self.inner);
		let monitor = cke5_worker::spawn(TaskClass::Listener, monitor(inner));
		if let Some(previous) = self.inner.monitor.lock().replace(monitor) {
			previous.abort();
		}
		Ok(value)
	}

	/// The live instance, if any.
	pub fn instance(&self) -> Option<Arc<T>> {
		self.inner.current.load().as_ref().map(|instance| Arc::clone(&instance.value))
	}

	/// Generation of the live instance; bumps on every restart.
	pub fn generation(&self) -> Option<u64> {
		self.inner.current.load().as_ref().map(|instance| instance.generation)
	}

	pub fn restarts(&self) -> usize {
		self.inner.restarts.load(Ordering::Acquire)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<WatchdogEvent<T>> {
		self.inner.events.subscribe()
	}

	pub fn is_destroyed(&self) -> bool {
		self.inner.teardown.is_cancelled()
	}

	/// Stops supervision and destroys the live instance. Idempotent.
	pub async fn destroy(&self) -> std::result::Result<(), SharedError> {
		self.inner.teardown.cancel();
		let monitor = self.inner.monitor.lock().take();
		if let Some(monitor) = monitor
			&& let Err(err) = monitor.await
			&& !err.is_cancelled()
		{
			tracing::warn!(error = %cke5_worker::join_error_message(err), "watchdog.monitor.failed");
		}

		match self.inner.current.swap(None) {
			Some(instance) => instance.value.destroy().await,
			None => Ok(()),
		}
	}
}

async fn destroy_quietly<T: ?Sized + Supervised>(value: &Arc<T>) {
	if let Err(err) = value.destroy().await {
		tracing::warn!(error = %err, "watchdog.destroy.failed");
	}
}

async fn monitor<T>(inner: Arc<WatchdogInner<T>>)
where
	T: ?Sized + Supervised + 'static,
{
	loop {
		let Some(current) = inner.current.load_full() else {
			return;
		};
		let reason = tokio::select! {
			biased;
			_ = inner.teardown.cancelled() => return,
			reason = current.value.crashed() => reason,
		};
		let Some(reason) = reason else {
			return;
		};

		let restarts = inner.restarts.load(Ordering::Acquire);
		tracing::warn!(generation = current.generation, restarts, %reason, "watchdog.crash");
		let Some(backoff) = inner.policy.restart_delay(restarts) else {
			let _ = inner.events.send(WatchdogEvent::Failed { message: reason });
			return;
		};
		inner.restarts.store(restarts + 1, Ordering::Release);

		if backoff > Duration::ZERO {
			tokio::select! {
				_ = inner.teardown.cancelled() => return,
				_ = tokio::time::sleep(backoff) => {}
			}
		}
		destroy_quietly(&current.value).await;

		match (inner.creator)().await {
			Ok(value) if inner.teardown.is_cancelled() => {
				destroy_quietly(&value).await;
				return;
			}
			Ok(value) => {
				let generation = inner.clock.next();
				inner.current.store(Some(Arc::new(Instance {
					value: Arc::clone(&value),
					generation,
				})));
				tracing::info!(generation, "watchdog.restarted");
				let _ = inner.events.send(WatchdogEvent::Restarted { instance: value, generation });
			}
			Err(err) => {
				tracing::error!(error = %err, "watchdog.restart.failed");
				inner.current.store(None);
				let _ = inner.events.send(WatchdogEvent::Failed { message: err.to_string() });
				return;
			}
		}
	}
}

#[cfg(test)]
mod tests;
