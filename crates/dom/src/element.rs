use std::sync::Arc;

use crate::{Document, NodeId};

/// Controller attached to a node whose tag was registered with [`Document::define`].
///
/// Callbacks run synchronously from the mutating document call, after the document lock is
/// released, so they may freely read and mutate the document. Long-running work must be
/// spawned.
pub trait CustomElement: Send + Sync {
	/// The node entered the connected tree.
	fn connected(&self);
	/// The node left the connected tree.
	fn disconnected(&self);
}

/// Builds the controller for one node; called once per node, on its first connection.
pub trait ElementFactory: Send + Sync {
	fn create(&self, document: &Document, node: NodeId) -> Arc<dyn CustomElement>;
}

impl<F> ElementFactory for F
where
	F: Fn(&Document, NodeId) -> Arc<dyn CustomElement> + Send + Sync,
{
	fn create(&self, document: &Document, node: NodeId) -> Arc<dyn CustomElement> {
		self(document, node)
	}
}
