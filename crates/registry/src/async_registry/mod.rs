//! Async item registry.
//!
//! Maps ids to items that are created (and destroyed) asynchronously by producers, while
//! consumers may ask for an id before its producer has finished.
//!
//! # Default slot
//!
//! The `None` key aliases the first item registered under a named key after the registry was
//! last empty, and the first error recorded while it holds no items. Pages rendering a single
//! editor can therefore address it without knowing its id.
//!
//! # Ordering
//!
//! All mutations happen under one lock. Queued callbacks and watchers run after the lock is
//! released but before the mutating call returns, in call order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{RegistryError, Result, SharedError, describe_key};

/// Registry key; `None` is the default slot.
pub type RegistryKey = Option<String>;

/// Copy of the registered items handed to watchers.
pub type ItemsSnapshot<T> = HashMap<RegistryKey, Arc<T>>;

/// Copy of the recorded errors handed to watchers.
pub type ErrorsSnapshot = HashMap<RegistryKey, SharedError>;

type WatchFn<T> = dyn Fn(&ItemsSnapshot<T>, &ErrorsSnapshot) + Send + Sync;
type Waiter<T> = Box<dyn FnOnce(std::result::Result<Arc<T>, SharedError>) + Send>;

/// A queued request, tagged so its caller can withdraw it.
struct Queued<T: ?Sized> {
	ticket: u64,
	resolve: Waiter<T>,
}

/// Items that release resources asynchronously.
#[async_trait]
pub trait Destroyable: Send + Sync {
	async fn destroy(&self) -> std::result::Result<(), SharedError>;
}

/// Handle returned by [`AsyncRegistry::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

struct RegistryState<T: ?Sized> {
	items: HashMap<RegistryKey, Arc<T>>,
	errors: HashMap<RegistryKey, SharedError>,
	pending: HashMap<RegistryKey, Vec<Queued<T>>>,
	watchers: Vec<(WatcherId, Arc<WatchFn<T>>)>,
	next_watcher: u64,
	next_ticket: u64,
}

struct Notification<T: ?Sized> {
	items: ItemsSnapshot<T>,
	errors: ErrorsSnapshot,
	watchers: Vec<Arc<WatchFn<T>>>,
}

impl<T: ?Sized> Notification<T> {
	fn deliver(self) {
		for watcher in self.watchers {
			watcher(&self.items, &self.errors);
		}
	}
}

impl<T: ?Sized> RegistryState<T> {
	fn new() -> Self {
		Self {
			items: HashMap::new(),
			errors: HashMap::new(),
			pending: HashMap::new(),
			watchers: Vec::new(),
			next_watcher: 0,
			next_ticket: 0,
		}
	}

	fn take_pending(&mut self, key: &RegistryKey) -> Vec<Waiter<T>> {
		self.pending.remove(key).unwrap_or_default().into_iter().map(|queued| queued.resolve).collect()
	}

	/// Drops the request queued under `ticket`, if it is still waiting.
	fn withdraw(&mut self, key: &RegistryKey, ticket: u64) {
		if let Some(queue) = self.pending.get_mut(key) {
			queue.retain(|queued| queued.ticket != ticket);
			if queue.is_empty() {
				self.pending.remove(key);
			}
		}
	}

	/// Clears the error for `key`, and the default-slot error when it is the same value.
	fn reset_errors(&mut self, key: &RegistryKey) {
		if key.is_some()
			&& let (Some(default), Some(own)) = (self.errors.get(&None), self.errors.get(key))
			&& Arc::ptr_eq(default, own)
		{
			self.errors.remove(&None);
		}
		self.errors.remove(key);
	}

	/// Aliases `item` under the default slot when it is the only item held.
	///
	/// Returns the waiters queued on the default slot.
	fn register_default(&mut self, key: &RegistryKey, item: &Arc<T>) -> Vec<Waiter<T>> {
		if key.is_none() || self.items.len() != 1 {
			return Vec::new();
		}
		self.reset_errors(&None);
		self.items.insert(None, Arc::clone(item));
		self.take_pending(&None)
	}

	/// Mirrors the first error onto the default slot while no items are held.
	fn error_default(&mut self, key: &RegistryKey, err: &SharedError) -> Vec<Waiter<T>> {
		if key.is_none() || self.errors.len() != 1 || !self.items.is_empty() {
			return Vec::new();
		}
		self.errors.insert(None, Arc::clone(err));
		self.take_pending(&None)
	}

	/// Drops the default alias when it points at `item`.
	fn unregister_default(&mut self, key: &RegistryKey, item: &Arc<T>) {
		if key.is_some()
			&& let Some(default) = self.items.get(&None)
			&& Arc::ptr_eq(default, item)
		{
			self.items.remove(&None);
			self.pending.remove(&None);
		}
	}

	fn notification(&self) -> Notification<T> {
		Notification {
			items: self.items.clone(),
			errors: self.errors.clone(),
			watchers: self.watchers.iter().map(|(_, w)| Arc::clone(w)).collect(),
		}
	}
}

/// Future returned by [`AsyncRegistry::execute`].
///
/// Already resolved when the item (or an error) was present at call time; otherwise resolves
/// once the producer registers or fails.
pub struct Execution<R> {
	state: ExecutionState<R>,
}

enum ExecutionState<R> {
	Ready(Option<Result<R>>),
	Waiting { rx: oneshot::Receiver<Result<R>>, id: String },
}

impl<R> Execution<R> {
	fn ready(result: Result<R>) -> Self {
		Self {
			state: ExecutionState::Ready(Some(result)),
		}
	}

	/// Returns true when the callback already ran.
	pub fn is_settled(&self) -> bool {
		matches!(self.state, ExecutionState::Ready(_))
	}
}

impl<R> Unpin for Execution<R> {}

impl<R> Future for Execution<R> {
	type Output = Result<R>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match &mut self.get_mut().state {
			ExecutionState::Ready(result) => match result.take() {
				Some(result) => Poll::Ready(result),
				None => Poll::Pending,
			},
			ExecutionState::Waiting { rx, id } => match Pin::new(rx).poll(cx) {
				Poll::Ready(Ok(result)) => Poll::Ready(result),
				Poll::Ready(Err(_)) => Poll::Ready(Err(RegistryError::Abandoned { id: id.clone() })),
				Poll::Pending => Poll::Pending,
			},
		}
	}
}

/// Keyed registry of asynchronously produced items with pending-request queuing.
pub struct AsyncRegistry<T: ?Sized> {
	state: Mutex<RegistryState<T>>,
}

impl<T: ?Sized> Default for AsyncRegistry<T> {
	fn default() -> Self {
		Self {
			state: Mutex::new(RegistryState::new()),
		}
	}
}

fn key_of(id: Option<&str>) -> RegistryKey {
	id.map(str::to_owned)
}

impl<T> AsyncRegistry<T>
where
	T: ?Sized + Send + Sync + 'static,
{
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `on_success` with the item under `id`, now or once it is registered.
	///
	/// A recorded error for `id` rejects the returned future with
	/// [`RegistryError::Initialization`]. Requests for a missing id queue in FIFO order.
	pub fn execute<R, F>(&self, id: Option<&str>, on_success: F) -> Execution<R>
	where
		R: Send + 'static,
		F: FnOnce(Arc<T>) -> R + Send + 'static,
	{
		self.enqueue(id, on_success, None::<fn(&SharedError)>).1
	}

	/// Like [`Self::execute`], additionally running `on_error` when the id fails.
	pub fn execute_with_error<R, F, E>(&self, id: Option<&str>, on_success: F, on_error: E) -> Execution<R>
	where
		R: Send + 'static,
		F: FnOnce(Arc<T>) -> R + Send + 'static,
		E: FnOnce(&SharedError) + Send + 'static,
	{
		self.enqueue(id, on_success, Some(on_error)).1
	}

	/// Resolves now when possible, otherwise queues the request and returns its ticket.
	fn enqueue<R, F, E>(&self, id: Option<&str>, on_success: F, on_error: Option<E>) -> (Option<u64>, Execution<R>)
	where
		R: Send + 'static,
		F: FnOnce(Arc<T>) -> R + Send + 'static,
		E: FnOnce(&SharedError) + Send + 'static,
	{
		let key = key_of(id);
		let mut state = self.state.lock();

		if let Some(err) = state.errors.get(&key).cloned() {
			drop(state);
			if let Some(on_error) = on_error {
				on_error(&err);
			}
			return (None, Execution::ready(Err(RegistryError::Initialization(err))));
		}

		if let Some(item) = state.items.get(&key).cloned() {
			drop(state);
			return (None, Execution::ready(Ok(on_success(item))));
		}

		let (tx, rx) = oneshot::channel();
		state.next_ticket = state.next_ticket.wrapping_add(1);
		let ticket = state.next_ticket;
		let resolve: Waiter<T> = Box::new(move |outcome| {
			let result = match outcome {
				Ok(item) => Ok(on_success(item)),
				Err(err) => {
					if let Some(on_error) = on_error {
						on_error(&err);
					}
					Err(RegistryError::Initialization(err))
				}
			};
			let _ = tx.send(result);
		});
		state.pending.entry(key).or_default().push(Queued { ticket, resolve });

		let execution = Execution {
			state: ExecutionState::Waiting { rx, id: describe_key(id) },
		};
		(Some(ticket), execution)
	}

	/// Stores `item` under `id` and fulfils every request queued for it.
	///
	/// # Errors
	///
	/// Returns [`RegistryError::AlreadyRegistered`] when `id` already holds an item.
	pub fn register(&self, id: Option<&str>, item: Arc<T>) -> Result<()> {
		let key = key_of(id);
		let (waiters, notification) = {
			let mut state = self.state.lock();
			if state.items.contains_key(&key) {
				return Err(RegistryError::AlreadyRegistered { id: describe_key(id) });
			}

			state.reset_errors(&key);
			state.items.insert(key.clone(), Arc::clone(&item));
			let mut waiters = state.take_pending(&key);
			waiters.extend(state.register_default(&key, &item));
			(waiters, state.notification())
		};

		tracing::debug!(id = %describe_key(id), flushed = waiters.len(), "registry.register");
		for waiter in waiters {
			waiter(Ok(Arc::clone(&item)));
		}
		notification.deliver();
		Ok(())
	}

	/// Records a failure for `id`, dropping any item and rejecting every queued request.
	pub fn error(&self, id: Option<&str>, err: SharedError) {
		let key = key_of(id);
		let (waiters, notification) = {
			let mut state = self.state.lock();
			state.items.remove(&key);
			state.errors.insert(key.clone(), Arc::clone(&err));
			let mut waiters = state.take_pending(&key);
			waiters.extend(state.error_default(&key, &err));
			(waiters, state.notification())
		};

		tracing::debug!(id = %describe_key(id), rejected = waiters.len(), error = %err, "registry.error");
		for waiter in waiters {
			waiter(Err(Arc::clone(&err)));
		}
		notification.deliver();
	}

	/// Forgets the error recorded for `id` (and the default slot's, when it is the same one).
	pub fn reset_errors(&self, id: Option<&str>) {
		self.state.lock().reset_errors(&key_of(id));
	}

	/// Removes the item under `id`, and the default alias when it points at the same item.
	///
	/// # Errors
	///
	/// Returns [`RegistryError::NotRegistered`] when `id` holds nothing.
	pub fn unregister(&self, id: Option<&str>) -> Result<()> {
		let key = key_of(id);
		let notification = {
			let mut state = self.state.lock();
			let Some(item) = state.items.get(&key).cloned() else {
				return Err(RegistryError::NotRegistered { id: describe_key(id) });
			};
			state.unregister_default(&key, &item);
			state.items.remove(&key);
			state.pending.remove(&key);
			state.notification()
		};

		tracing::debug!(id = %describe_key(id), "registry.unregister");
		notification.deliver();
		Ok(())
	}

	/// Returns a copy of all registered items, default alias included.
	pub fn items(&self) -> ItemsSnapshot<T> {
		self.state.lock().items.clone()
	}

	/// Returns a copy of all recorded errors.
	pub fn errors(&self) -> ErrorsSnapshot {
		self.state.lock().errors.clone()
	}

	pub fn has_item(&self, id: Option<&str>) -> bool {
		self.state.lock().items.contains_key(&key_of(id))
	}

	/// Returns the item under `id` without waiting.
	pub fn get(&self, id: Option<&str>) -> Option<Arc<T>> {
		self.state.lock().items.get(&key_of(id)).cloned()
	}

	/// Waits for the item under `id`, optionally bounded by `timeout`.
	///
	/// # Errors
	///
	/// [`RegistryError::Timeout`] when the deadline passes, otherwise whatever the underlying
	/// [`Self::execute`] resolves to. A wait that times out or is dropped leaves nothing queued.
	pub async fn wait_for(&self, id: Option<&str>, timeout: Option<Duration>) -> Result<Arc<T>> {
		let (ticket, execution) = self.enqueue(id, |item| item, None::<fn(&SharedError)>);
		let _withdraw = ticket.map(|ticket| Withdraw {
			state: &self.state,
			key: key_of(id),
			ticket,
		});
		match timeout {
			None => execution.await,
			Some(after) => match tokio::time::timeout(after, execution).await {
				Ok(result) => result,
				Err(_) => Err(RegistryError::Timeout { id: describe_key(id), after }),
			},
		}
	}

	/// Subscribes to mutations. `watcher` runs immediately with the current state.
	pub fn watch<F>(&self, watcher: F) -> WatcherId
	where
		F: Fn(&ItemsSnapshot<T>, &ErrorsSnapshot) + Send + Sync + 'static,
	{
		let watcher: Arc<WatchFn<T>> = Arc::new(watcher);
		let (id, items, errors) = {
			let mut state = self.state.lock();
			state.next_watcher = state.next_watcher.wrapping_add(1);
			let id = WatcherId(state.next_watcher);
			state.watchers.push((id, Arc::clone(&watcher)));
			(id, state.items.clone(), state.errors.clone())
		};
		watcher(&items, &errors);
		id
	}

	/// Removes a watcher. Returns false when it was not subscribed.
	pub fn unwatch(&self, id: WatcherId) -> bool {
		let mut state = self.state.lock();
		let before = state.watchers.len();
		state.watchers.retain(|(watcher_id, _)| *watcher_id != id);
		state.watchers.len() != before
	}

	/// Drops every item, error, queued request and watcher without destroying anything.
	pub fn reset(&self) {
		let mut state = self.state.lock();
		// Tickets stay unique so a stale wait cannot withdraw a newer request.
		let next_ticket = state.next_ticket;
		*state = RegistryState::new();
		state.next_ticket = next_ticket;
	}
}

/// Withdraws a [`AsyncRegistry::wait_for`] request when the wait ends without an answer.
struct Withdraw<'a, T: ?Sized> {
	state: &'a Mutex<RegistryState<T>>,
	key: RegistryKey,
	ticket: u64,
}

impl<T: ?Sized> Drop for Withdraw<'_, T> {
	fn drop(&mut self) {
		self.state.lock().withdraw(&self.key, self.ticket);
	}
}

impl<T> AsyncRegistry<T>
where
	T: ?Sized + Destroyable + 'static,
{
	/// Destroys every distinct item once, clears the registry, then notifies watchers.
	///
	/// # Errors
	///
	/// Returns the first destroy failure, after all destroys have completed.
	pub async fn destroy_all(&self) -> std::result::Result<(), SharedError> {
		let unique = {
			let mut state = self.state.lock();
			let mut unique: Vec<Arc<T>> = Vec::new();
			for (_, item) in state.items.drain() {
				if !unique.iter().any(|seen| Arc::ptr_eq(seen, &item)) {
					unique.push(item);
				}
			}
			state.errors.clear();
			state.pending.clear();
			unique
		};

		tracing::debug!(count = unique.len(), "registry.destroy_all");
		let results = futures::future::join_all(unique.iter().map(|item| item.destroy())).await;

		let notification = self.state.lock().notification();
		notification.deliver();

		let mut first_failure = None;
		for result in results {
			if let Err(err) = result {
				tracing::warn!(error = %err, "registry.destroy_all.failed");
				first_failure.get_or_insert(err);
			}
		}
		first_failure.map_or(Ok(()), Err)
	}
}

#[cfg(test)]
mod tests;
