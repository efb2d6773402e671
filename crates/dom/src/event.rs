use serde_json::Value;

use crate::NodeId;

/// A dispatched custom event.
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
	pub name: String,
	pub target: NodeId,
	/// Nodes the event is delivered to, target first; only the target unless bubbling.
	pub path: Vec<NodeId>,
	pub detail: Value,
}

impl DomEvent {
	/// Returns true when a listener on `node` would observe this event.
	pub fn reaches(&self, node: NodeId) -> bool {
		self.path.contains(&node)
	}
}
