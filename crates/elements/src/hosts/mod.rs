//! Element hosts.
//!
//! Every host is an [`ElementHost`] state machine driven by the document's connect and
//! disconnect callbacks. Connecting spawns the host's mount sequence; disconnecting hides the
//! element at once, cancels the mount, waits for it to finish and only then unmounts, so a late
//! mount can never leave an instance behind.

mod context;
mod editable;
mod editor;
mod ui_part;

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cke5_dom::{CustomElement, Document, ElementFactory, NodeId};
use cke5_worker::{TaskClass, TeardownToken};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub use self::context::{ContextHost, MountedContext};
pub use self::editable::{EditableHost, MountedEditable};
pub use self::editor::{EditorHost, MountedEditor};
pub use self::ui_part::{MountedUiPart, UiPartHost};
use crate::{HostError, Result, Session};

/// Where a host is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
	/// Not connected, or fully torn down.
	Idle,
	Connecting,
	Ready,
	/// The mount sequence failed; the failure was logged (and recorded where a registry owns it).
	Error,
	/// Disconnected; teardown is running.
	Destroying,
}

struct HostRecord<M> {
	state: HostState,
	connect: Option<JoinHandle<()>>,
	teardown: Option<JoinHandle<()>>,
	token: TeardownToken,
	mounted: Option<M>,
}

/// What one kind of element does when it connects and disconnects.
#[async_trait]
pub trait HostBehavior: Send + Sync + 'static {
	const TAG: &'static str;

	/// Resources a successful (or partially successful) mount leaves behind.
	type Mounted: Send + 'static;

	async fn mount(cx: &MountContext<Self::Mounted>) -> Result<()>;

	/// Releases what `mount` stored. Failures are logged, never returned.
	async fn unmount(session: &Arc<Session>, node: NodeId, mounted: Self::Mounted);
}

/// Handle a mount sequence uses to check for cancellation and store its resources.
pub struct MountContext<M> {
	pub session: Arc<Session>,
	pub node: NodeId,
	pub token: TeardownToken,
	record: Arc<Mutex<HostRecord<M>>>,
}

impl<M> MountContext<M> {
	pub fn document(&self) -> &Document {
		self.session.document()
	}

	/// Fails with [`HostError::Disconnected`] once the element was disconnected.
	pub fn check(&self) -> Result<()> {
		if self.token.is_cancelled() { Err(HostError::Disconnected) } else { Ok(()) }
	}

	/// Hands `mounted` to the eventual unmount, whatever happens to the rest of the sequence.
	pub fn store(&self, mounted: M) {
		self.record.lock().mounted = Some(mounted);
	}

	/// Mutable access to stored resources, if any.
	pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> Option<R> {
		self.record.lock().mounted.as_mut().map(f)
	}

	pub(crate) fn slot(&self) -> MountSlot<M> {
		MountSlot {
			record: Arc::clone(&self.record),
		}
	}
}

/// Owned [`MountContext::store`] for callbacks that outlive the borrow.
pub(crate) struct MountSlot<M> {
	record: Arc<Mutex<HostRecord<M>>>,
}

impl<M> MountSlot<M> {
	pub(crate) fn store(&self, mounted: M) {
		self.record.lock().mounted = Some(mounted);
	}
}

/// Controller attached to one host element.
pub struct ElementHost<B: HostBehavior> {
	session: Weak<Session>,
	node: NodeId,
	record: Arc<Mutex<HostRecord<B::Mounted>>>,
	behavior: PhantomData<fn() -> B>,
}

impl<B: HostBehavior> ElementHost<B> {
	fn new(session: Weak<Session>, node: NodeId) -> Self {
		Self {
			session,
			node,
			record: Arc::new(Mutex::new(HostRecord {
				state: HostState::Idle,
				connect: None,
				teardown: None,
				token: TeardownToken::new(),
				mounted: None,
			})),
			behavior: PhantomData,
		}
	}

	pub fn node(&self) -> NodeId {
		self.node
	}

	pub fn state(&self) -> HostState {
		self.record.lock().state
	}

	fn attach(&self) {
		let Some(session) = self.session.upgrade() else {
			return;
		};
		let mut record = self.record.lock();
		if matches!(record.state, HostState::Connecting | HostState::Ready | HostState::Error) {
			return;
		}
		if let Err(err) = session.document().set_hidden(self.node, false) {
			tracing::debug!(tag = B::TAG, error = %err, "host.unhide");
		}

		let previous = record.teardown.take();
		let token = TeardownToken::new();
		record.token = token.clone();
		record.state = HostState::Connecting;
		let cx = MountContext {
			session: Arc::clone(&session),
			node: self.node,
			token,
			record: Arc::clone(&self.record),
		};
		tracing::debug!(tag = B::TAG, node = %self.node, "host.attach");
		record.connect = Some(session.spawn_tracked(TaskClass::Mount, async move {
			if let Some(previous) = previous
				&& let Err(err) = previous.await
			{
				tracing::warn!(tag = B::TAG, error = %cke5_worker::join_error_message(err), "host.previous_teardown");
			}
			let result = B::mount(&cx).await;
			finish_mount::<B>(&cx, result);
		}));
	}

	fn detach(&self) {
		let Some(session) = self.session.upgrade() else {
			return;
		};
		if let Err(err) = session.document().set_hidden(self.node, true) {
			tracing::debug!(tag = B::TAG, error = %err, "host.hide");
		}
		let mut record = self.record.lock();
		if matches!(record.state, HostState::Idle | HostState::Destroying) {
			return;
		}
		record.state = HostState::Destroying;
		record.token.cancel();

		let connect = record.connect.take();
		let handle = Arc::clone(&self.record);
		let node = self.node;
		let teardown_session = Arc::clone(&session);
		tracing::debug!(tag = B::TAG, %node, "host.detach");
		record.teardown = Some(session.spawn_tracked(TaskClass::Teardown, async move {
			if let Some(connect) = connect
				&& let Err(err) = connect.await
			{
				tracing::warn!(tag = B::TAG, error = %cke5_worker::join_error_message(err), "host.connect.join");
			}
			let mounted = handle.lock().mounted.take();
			if let Some(mounted) = mounted {
				B::unmount(&teardown_session, node, mounted).await;
			}
			let mut record = handle.lock();
			if record.state == HostState::Destroying {
				record.state = HostState::Idle;
			}
		}));
	}
}

fn finish_mount<B: HostBehavior>(cx: &MountContext<B::Mounted>, result: Result<()>) {
	let mut record = cx.record.lock();
	if cx.token.is_cancelled() {
		if let Err(err) = result {
			tracing::debug!(tag = B::TAG, node = %cx.node, error = %err, "host.connect.cancelled");
		}
		return;
	}
	match result {
		Ok(()) => record.state = HostState::Ready,
		Err(err) => {
			record.state = HostState::Error;
			drop(record);
			tracing::error!(tag = B::TAG, node = %cx.node, error = %err, "host.connect.failed");
		}
	}
}

impl<B: HostBehavior> CustomElement for ElementHost<B> {
	fn connected(&self) {
		self.attach();
	}

	fn disconnected(&self) {
		self.detach();
	}
}

pub(crate) fn factory<B: HostBehavior>(session: &Arc<Session>) -> Arc<dyn ElementFactory> {
	let session = Arc::downgrade(session);
	Arc::new(move |_: &Document, node: NodeId| -> Arc<dyn CustomElement> { Arc::new(ElementHost::<B>::new(session.clone(), node)) })
}

/// Waits for the registry callback of a consumer host unless the element disconnects first.
async fn until_disconnected<T>(token: &TeardownToken, fut: impl std::future::Future<Output = T>) -> Result<T> {
	tokio::select! {
		biased;
		_ = token.cancelled() => Err(HostError::Disconnected),
		value = fut => Ok(value),
	}
}
