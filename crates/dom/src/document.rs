use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::selector::SelectorSubject;
use crate::{CustomElement, DomError, DomEvent, ElementFactory, Result, Selector};

/// Stable identifier of a node within one [`Document`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
	pub const fn as_u64(self) -> u64 {
		self.0
	}

	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

struct Node {
	tag: String,
	attributes: BTreeMap<String, String>,
	children: Vec<NodeId>,
	parent: Option<NodeId>,
	hidden: bool,
	text: String,
	controller: Option<Arc<dyn CustomElement>>,
}

impl SelectorSubject for Node {
	fn tag(&self) -> &str {
		&self.tag
	}

	fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).map(String::as_str)
	}
}

struct Tree {
	nodes: HashMap<NodeId, Node>,
	next_id: u64,
	body: NodeId,
}

impl Tree {
	fn node(&self, id: NodeId) -> Result<&Node> {
		self.nodes.get(&id).ok_or(DomError::UnknownNode(id))
	}

	fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
		self.nodes.get_mut(&id).ok_or(DomError::UnknownNode(id))
	}

	fn is_connected(&self, mut id: NodeId) -> bool {
		loop {
			if id == self.body {
				return true;
			}
			match self.nodes.get(&id).and_then(|n| n.parent) {
				Some(parent) => id = parent,
				None => return false,
			}
		}
	}

	fn is_inclusive_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
		loop {
			if id == ancestor {
				return true;
			}
			match self.nodes.get(&id).and_then(|n| n.parent) {
				Some(parent) => id = parent,
				None => return false,
			}
		}
	}

	/// Pre-order walk of `root` and its descendants.
	fn subtree(&self, root: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack = vec![root];
		while let Some(id) = stack.pop() {
			out.push(id);
			if let Some(node) = self.nodes.get(&id) {
				stack.extend(node.children.iter().rev().copied());
			}
		}
		out
	}

	fn ancestors_chain(&self, id: NodeId) -> Vec<&Node> {
		let mut chain = Vec::new();
		let mut current = Some(id);
		while let Some(id) = current {
			let Some(node) = self.nodes.get(&id) else {
				break;
			};
			chain.push(node);
			current = node.parent;
		}
		chain
	}

	fn matches(&self, selector: &Selector, id: NodeId) -> bool {
		let chain = self.ancestors_chain(id);
		let subjects: Vec<&dyn SelectorSubject> = chain.iter().map(|n| *n as &dyn SelectorSubject).collect();
		selector.matches(&subjects)
	}

	fn detach(&mut self, id: NodeId) -> Result<()> {
		let parent = self.node(id)?.parent;
		if let Some(parent) = parent {
			self.node_mut(parent)?.children.retain(|c| *c != id);
			self.node_mut(id)?.parent = None;
		}
		Ok(())
	}
}

struct DocumentInner {
	tree: RwLock<Tree>,
	definitions: RwLock<HashMap<String, Arc<dyn ElementFactory>>>,
	ready: watch::Sender<bool>,
	events: broadcast::Sender<DomEvent>,
}

/// Shared handle to an in-memory document. Clones refer to the same document.
#[derive(Clone)]
pub struct Document {
	inner: Arc<DocumentInner>,
}

/// Non-owning document handle for controllers stored inside the document itself.
#[derive(Clone)]
pub struct WeakDocument {
	inner: Weak<DocumentInner>,
}

impl WeakDocument {
	pub fn upgrade(&self) -> Option<Document> {
		self.inner.upgrade().map(|inner| Document { inner })
	}
}

impl fmt::Debug for Document {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let tree = self.inner.tree.read();
		f.debug_struct("Document").field("nodes", &tree.nodes.len()).field("ready", &self.is_ready()).finish()
	}
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

enum Lifecycle {
	Connect(NodeId, Option<Arc<dyn CustomElement>>, Option<Arc<dyn ElementFactory>>),
	Disconnect(Arc<dyn CustomElement>),
}

impl Document {
	/// Creates an empty, not yet ready document with a `body` root.
	pub fn new() -> Self {
		let body = NodeId(0);
		let mut nodes = HashMap::new();
		nodes.insert(
			body,
			Node {
				tag: "body".to_string(),
				attributes: BTreeMap::new(),
				children: Vec::new(),
				parent: None,
				hidden: false,
				text: String::new(),
				controller: None,
			},
		);
		let (ready, _) = watch::channel(false);
		let (events, _) = broadcast::channel(256);
		Self {
			inner: Arc::new(DocumentInner {
				tree: RwLock::new(Tree { nodes, next_id: 1, body }),
				definitions: RwLock::new(HashMap::new()),
				ready,
				events,
			}),
		}
	}

	pub fn downgrade(&self) -> WeakDocument {
		WeakDocument {
			inner: Arc::downgrade(&self.inner),
		}
	}

	pub fn body(&self) -> NodeId {
		self.inner.tree.read().body
	}

	/// Marks the document as parsed; releases every [`Self::wait_ready`] caller.
	pub fn set_ready(&self) {
		self.inner.ready.send_replace(true);
	}

	pub fn is_ready(&self) -> bool {
		*self.inner.ready.borrow()
	}

	/// Resolves once [`Self::set_ready`] was called (immediately if it already was).
	pub async fn wait_ready(&self) {
		let mut rx = self.inner.ready.subscribe();
		let _ = rx.wait_for(|ready| *ready).await;
	}

	/// Creates a detached element.
	pub fn create_element(&self, tag: &str) -> NodeId {
		let mut tree = self.inner.tree.write();
		let id = NodeId(tree.next_id);
		tree.next_id += 1;
		tree.nodes.insert(
			id,
			Node {
				tag: tag.to_ascii_lowercase(),
				attributes: BTreeMap::new(),
				children: Vec::new(),
				parent: None,
				hidden: false,
				text: String::new(),
				controller: None,
			},
		);
		id
	}

	/// Creates a detached element with attributes.
	pub fn create_element_with(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
		let id = self.create_element(tag);
		let mut tree = self.inner.tree.write();
		if let Some(node) = tree.nodes.get_mut(&id) {
			node.attributes
				.extend(attributes.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));
		}
		id
	}

	pub fn tag_name(&self, node: NodeId) -> Option<String> {
		self.inner.tree.read().nodes.get(&node).map(|n| n.tag.clone())
	}

	pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
		self.inner.tree.read().nodes.get(&node)?.attributes.get(name).cloned()
	}

	pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
		self.inner
			.tree
			.read()
			.nodes
			.get(&node)
			.is_some_and(|n| n.attributes.contains_key(name))
	}

	pub fn set_attribute(&self, node: NodeId, name: &str, value: impl Into<String>) -> Result<()> {
		self.inner.tree.write().node_mut(node)?.attributes.insert(name.to_string(), value.into());
		Ok(())
	}

	pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<()> {
		self.inner.tree.write().node_mut(node)?.attributes.remove(name);
		Ok(())
	}

	pub fn set_hidden(&self, node: NodeId, hidden: bool) -> Result<()> {
		self.inner.tree.write().node_mut(node)?.hidden = hidden;
		Ok(())
	}

	pub fn is_hidden(&self, node: NodeId) -> bool {
		self.inner.tree.read().nodes.get(&node).is_some_and(|n| n.hidden)
	}

	/// Text content owned by the node itself (children excluded).
	pub fn text(&self, node: NodeId) -> Option<String> {
		self.inner.tree.read().nodes.get(&node).map(|n| n.text.clone())
	}

	pub fn set_text(&self, node: NodeId, text: impl Into<String>) -> Result<()> {
		self.inner.tree.write().node_mut(node)?.text = text.into();
		Ok(())
	}

	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.inner.tree.read().nodes.get(&node)?.parent
	}

	pub fn children(&self, node: NodeId) -> Vec<NodeId> {
		self.inner
			.tree
			.read()
			.nodes
			.get(&node)
			.map(|n| n.children.clone())
			.unwrap_or_default()
	}

	pub fn contains_node(&self, node: NodeId) -> bool {
		self.inner.tree.read().nodes.contains_key(&node)
	}

	/// Returns true when the node is attached (transitively) under `body`.
	pub fn is_connected(&self, node: NodeId) -> bool {
		self.inner.tree.read().is_connected(node)
	}

	/// Moves `child` to the end of `parent`'s children, firing lifecycle callbacks.
	pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
		let mut callbacks = Vec::new();
		{
			let mut tree = self.inner.tree.write();
			tree.node(parent)?;
			tree.node(child)?;
			if tree.is_inclusive_ancestor(child, parent) {
				return Err(DomError::HierarchyRequest { parent, child });
			}

			if tree.is_connected(child) {
				self.collect_disconnects(&tree, child, &mut callbacks);
			}
			tree.detach(child)?;
			tree.node_mut(parent)?.children.push(child);
			tree.node_mut(child)?.parent = Some(parent);
			if tree.is_connected(child) {
				self.collect_connects(&tree, child, &mut callbacks);
			}
		}
		self.run_lifecycle(callbacks);
		Ok(())
	}

	/// Detaches `node` from its parent, firing disconnect callbacks when it was connected.
	pub fn remove(&self, node: NodeId) -> Result<()> {
		let mut callbacks = Vec::new();
		{
			let mut tree = self.inner.tree.write();
			tree.node(node)?;
			if tree.is_connected(node) {
				self.collect_disconnects(&tree, node, &mut callbacks);
			}
			tree.detach(node)?;
		}
		self.run_lifecycle(callbacks);
		Ok(())
	}

	/// Detaches every child of `node`. The children stay alive and can be re-inserted.
	pub fn clear_children(&self, node: NodeId) -> Result<()> {
		for child in self.children(node) {
			self.remove(child)?;
		}
		Ok(())
	}

	fn collect_disconnects(&self, tree: &Tree, root: NodeId, out: &mut Vec<Lifecycle>) {
		for id in tree.subtree(root) {
			if let Some(controller) = tree.nodes.get(&id).and_then(|n| n.controller.clone()) {
				out.push(Lifecycle::Disconnect(controller));
			}
		}
	}

	fn collect_connects(&self, tree: &Tree, root: NodeId, out: &mut Vec<Lifecycle>) {
		let definitions = self.inner.definitions.read();
		for id in tree.subtree(root) {
			let Some(node) = tree.nodes.get(&id) else {
				continue;
			};
			if let Some(controller) = &node.controller {
				out.push(Lifecycle::Connect(id, Some(Arc::clone(controller)), None));
			} else if let Some(factory) = definitions.get(&node.tag) {
				out.push(Lifecycle::Connect(id, None, Some(Arc::clone(factory))));
			}
		}
	}

	fn run_lifecycle(&self, callbacks: Vec<Lifecycle>) {
		for callback in callbacks {
			match callback {
				Lifecycle::Disconnect(controller) => controller.disconnected(),
				Lifecycle::Connect(_, Some(controller), _) => controller.connected(),
				Lifecycle::Connect(id, None, Some(factory)) => {
					let controller = factory.create(self, id);
					{
						let mut tree = self.inner.tree.write();
						match tree.nodes.get_mut(&id) {
							Some(node) if node.controller.is_none() => node.controller = Some(Arc::clone(&controller)),
							_ => continue,
						}
					}
					controller.connected();
				}
				Lifecycle::Connect(_, None, None) => {}
			}
		}
	}

	/// Registers a custom element tag and upgrades connected nodes that already use it.
	///
	/// # Errors
	///
	/// [`DomError::AlreadyDefined`] when the tag has a definition.
	pub fn define(&self, tag: &str, factory: Arc<dyn ElementFactory>) -> Result<()> {
		let tag = tag.to_ascii_lowercase();
		{
			let mut definitions = self.inner.definitions.write();
			if definitions.contains_key(&tag) {
				return Err(DomError::AlreadyDefined(tag));
			}
			definitions.insert(tag.clone(), Arc::clone(&factory));
		}
		tracing::debug!(%tag, "dom.define");

		let upgrades: Vec<Lifecycle> = {
			let tree = self.inner.tree.read();
			tree.subtree(tree.body)
				.into_iter()
				.filter(|id| tree.nodes.get(id).is_some_and(|n| n.tag == tag && n.controller.is_none()))
				.map(|id| Lifecycle::Connect(id, None, Some(Arc::clone(&factory))))
				.collect()
		};
		self.run_lifecycle(upgrades);
		Ok(())
	}

	pub fn is_defined(&self, tag: &str) -> bool {
		self.inner.definitions.read().contains_key(&tag.to_ascii_lowercase())
	}

	/// Returns the controller attached to `node`, if its tag is defined and it was connected.
	pub fn controller(&self, node: NodeId) -> Option<Arc<dyn CustomElement>> {
		self.inner.tree.read().nodes.get(&node)?.controller.clone()
	}

	/// Connected nodes matching `selector`, in document order.
	pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
		let body = self.body();
		self.query_selector_all_in(body, selector)
	}

	pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
		Ok(self.query_selector_all(selector)?.into_iter().next())
	}

	/// Descendants of `scope` (exclusive) matching `selector`, in document order.
	pub fn query_selector_all_in(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
		let selector: Selector = selector.parse()?;
		let tree = self.inner.tree.read();
		tree.node(scope)?;
		Ok(tree
			.subtree(scope)
			.into_iter()
			.skip(1)
			.filter(|id| tree.matches(&selector, *id))
			.collect())
	}

	pub fn query_selector_in(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
		Ok(self.query_selector_all_in(scope, selector)?.into_iter().next())
	}

	/// Nearest inclusive ancestor of `node` matching `selector`.
	pub fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>> {
		let selector: Selector = selector.parse()?;
		let tree = self.inner.tree.read();
		let mut current = Some(node);
		while let Some(id) = current {
			if tree.matches(&selector, id) {
				return Ok(Some(id));
			}
			current = tree.nodes.get(&id).and_then(|n| n.parent);
		}
		Ok(None)
	}

	/// Dispatches a custom event on `target`; bubbling events also reach every ancestor.
	pub fn dispatch_event(&self, target: NodeId, name: &str, detail: Value, bubbles: bool) -> Result<()> {
		let path = {
			let tree = self.inner.tree.read();
			tree.node(target)?;
			if bubbles {
				let mut path = vec![target];
				let mut current = tree.nodes.get(&target).and_then(|n| n.parent);
				while let Some(id) = current {
					path.push(id);
					current = tree.nodes.get(&id).and_then(|n| n.parent);
				}
				path
			} else {
				vec![target]
			}
		};
		tracing::trace!(%target, event = name, "dom.dispatch");
		let _ = self.inner.events.send(DomEvent {
			name: name.to_string(),
			target,
			path,
			detail,
		});
		Ok(())
	}

	/// Subscribes to every event dispatched after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<DomEvent> {
		self.inner.events.subscribe()
	}
}

#[cfg(test)]
mod tests;
