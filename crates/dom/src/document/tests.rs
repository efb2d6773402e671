use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;

#[derive(Default)]
struct Journal {
	entries: Mutex<Vec<String>>,
}

impl Journal {
	fn take(&self) -> Vec<String> {
		std::mem::take(&mut *self.entries.lock())
	}
}

struct Recorder {
	label: String,
	journal: Arc<Journal>,
}

impl CustomElement for Recorder {
	fn connected(&self) {
		self.journal.entries.lock().push(format!("+{}", self.label));
	}

	fn disconnected(&self) {
		self.journal.entries.lock().push(format!("-{}", self.label));
	}
}

fn define_recorder(doc: &Document, tag: &str, journal: &Arc<Journal>) {
	let journal = Arc::clone(journal);
	doc.define(
		tag,
		Arc::new(move |doc: &Document, node: NodeId| -> Arc<dyn CustomElement> {
			Arc::new(Recorder {
				label: doc.attribute(node, "id").unwrap_or_default(),
				journal: Arc::clone(&journal),
			})
		}),
	)
	.unwrap();
}

#[test]
fn lifecycle_follows_tree_mutations() {
	let doc = Document::new();
	let journal = Arc::new(Journal::default());
	define_recorder(&doc, "x-host", &journal);

	let wrapper = doc.create_element("div");
	let a = doc.create_element_with("x-host", &[("id", "a")]);
	let b = doc.create_element_with("x-host", &[("id", "b")]);
	doc.append_child(wrapper, a).unwrap();
	doc.append_child(wrapper, b).unwrap();
	assert!(journal.take().is_empty(), "detached subtree must not connect");

	doc.append_child(doc.body(), wrapper).unwrap();
	assert_eq!(journal.take(), vec!["+a", "+b"]);

	let other = doc.create_element("section");
	doc.append_child(doc.body(), other).unwrap();
	doc.append_child(other, b).unwrap();
	assert_eq!(journal.take(), vec!["-b", "+b"]);

	doc.remove(wrapper).unwrap();
	assert_eq!(journal.take(), vec!["-a"]);
	assert!(!doc.is_connected(a));
	assert!(doc.is_connected(b));
}

#[test]
fn define_upgrades_connected_nodes_once() {
	let doc = Document::new();
	let node = doc.create_element_with("x-late", &[("id", "late")]);
	doc.append_child(doc.body(), node).unwrap();

	let journal = Arc::new(Journal::default());
	define_recorder(&doc, "x-late", &journal);
	assert_eq!(journal.take(), vec!["+late"]);
	assert!(doc.controller(node).is_some());

	let duplicate = doc.define("x-late", Arc::new(|_: &Document, _: NodeId| -> Arc<dyn CustomElement> { unreachable!() }));
	assert_eq!(duplicate, Err(DomError::AlreadyDefined("x-late".into())));
}

#[test]
fn rejects_cycles() {
	let doc = Document::new();
	let outer = doc.create_element("div");
	let inner = doc.create_element("div");
	doc.append_child(outer, inner).unwrap();
	assert!(matches!(doc.append_child(inner, outer), Err(DomError::HierarchyRequest { .. })));
}

#[test]
fn queries_connected_nodes_in_document_order() {
	let doc = Document::new();
	let first = doc.create_element_with("cke5-editable", &[("data-cke-editor-id", "e1"), ("data-cke-root-name", "a")]);
	let second = doc.create_element_with("cke5-editable", &[("data-cke-editor-id", "e1"), ("data-cke-root-name", "b")]);
	let detached = doc.create_element_with("cke5-editable", &[("data-cke-editor-id", "e1")]);
	let content = doc.create_element_with("div", &[("data-cke-editable-content", "")]);
	doc.append_child(doc.body(), first).unwrap();
	doc.append_child(doc.body(), second).unwrap();
	doc.append_child(second, content).unwrap();

	let found = doc.query_selector_all(r#"cke5-editable[data-cke-editor-id="e1"]"#).unwrap();
	assert_eq!(found, vec![first, second]);
	assert!(!found.contains(&detached));

	assert_eq!(doc.query_selector_in(second, "[data-cke-editable-content]").unwrap(), Some(content));
	assert_eq!(doc.query_selector_in(first, "[data-cke-editable-content]").unwrap(), None);
	assert_eq!(doc.closest(content, "cke5-editable").unwrap(), Some(second));
}

#[tokio::test]
async fn bubbling_events_reach_ancestors() {
	let doc = Document::new();
	let parent = doc.create_element("form");
	let child = doc.create_element("cke5-editor");
	doc.append_child(doc.body(), parent).unwrap();
	doc.append_child(parent, child).unwrap();

	let mut events = doc.subscribe();
	doc.dispatch_event(child, "change", serde_json::json!({ "value": "x" }), true).unwrap();
	doc.dispatch_event(child, "local", Value::Null, false).unwrap();

	let bubbled = events.recv().await.unwrap();
	assert!(bubbled.reaches(parent));
	assert_eq!(bubbled.detail["value"], "x");

	let local = events.recv().await.unwrap();
	assert!(local.reaches(child));
	assert!(!local.reaches(parent));
}

#[tokio::test]
async fn wait_ready_resolves_after_set_ready() {
	let doc = Document::new();
	let waiter = {
		let doc = doc.clone();
		tokio::spawn(async move { doc.wait_ready().await })
	};
	tokio::task::yield_now().await;
	assert!(!waiter.is_finished());

	doc.set_ready();
	waiter.await.unwrap();
	doc.wait_ready().await;
}
