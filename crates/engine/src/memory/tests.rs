use std::collections::BTreeMap;

use cke5_registry::Destroyable;
use serde_json::Value;

use super::*;
use crate::{ContextEvent, ContextItem, ContextState, EditorEvent, EditorState, EngineError, InitialData, Language, MAIN_ROOT, UiRegion};

fn config(initial_data: InitialData) -> EditorConfig {
	EditorConfig {
		plugins: vec![NamedPlugin::new("Essentials")],
		translations: Vec::new(),
		language: Language::default(),
		license_key: None,
		initial_data,
		settings: Value::Null,
	}
}

async fn classic(document: &Document, data: &str) -> (Arc<dyn Editor>, cke5_dom::NodeId) {
	let library = MemoryLibrary::new(document.clone());
	let element = document.create_element("div");
	document.append_child(document.body(), element).unwrap();
	let constructor = library.editor_constructor(EditorType::Classic).await.unwrap();
	let editor = constructor
		.create(EditorSource::Element(element), config(InitialData::Single(data.to_string())))
		.await
		.unwrap();
	(editor, element)
}

#[tokio::test]
async fn renders_initial_data() {
	let document = Document::new();
	let (editor, element) = classic(&document, "<p>Hi</p>").await;
	assert_eq!(editor.state(), EditorState::Ready);
	assert_eq!(editor.get_data(MAIN_ROOT).unwrap(), "<p>Hi</p>");
	assert_eq!(document.text(element).unwrap(), "<p>Hi</p>");
	assert_eq!(editor.root_names(), vec![MAIN_ROOT.to_string(), "$graveyard".to_string()]);
}

#[tokio::test]
async fn single_root_editors_reject_add_root() {
	let document = Document::new();
	let (editor, _) = classic(&document, "").await;
	assert!(matches!(
		editor.add_root("foo", None, false),
		Err(EngineError::UnsupportedOperation { operation: "add_root", .. })
	));
}

#[tokio::test]
async fn multiroot_manages_roots() {
	let document = Document::new();
	let library = MemoryLibrary::new(document.clone());
	let constructor = library.editor_constructor(EditorType::Multiroot).await.unwrap();
	let header = document.create_element("div");
	let roots = BTreeMap::from([("header".to_string(), header)]);
	let data = BTreeMap::from([("header".to_string(), "<h1>T</h1>".to_string())]);
	let editor = constructor
		.create(EditorSource::Roots(roots), config(InitialData::Roots(data)))
		.await
		.unwrap();

	let mut events = editor.subscribe();
	editor.add_root("foo", Some("<p>Foo</p>"), false).unwrap();
	assert_eq!(events.recv().await.unwrap(), EditorEvent::ChangeData);
	assert!(matches!(editor.add_root("foo", None, false), Err(EngineError::RootExists(_))));

	let body = document.create_element("div");
	editor.attach_editable("foo", body).unwrap();
	assert_eq!(document.text(body).unwrap(), "<p>Foo</p>");
	assert_eq!(editor.editable_element("foo"), Some(body));
	let memory = editor.as_any().downcast_ref::<MemoryEditor>().unwrap();
	assert_eq!(memory.is_undoable("foo"), Some(false));

	editor.detach_editable("foo").unwrap();
	editor.detach_root("foo").unwrap();
	assert!(!editor.has_root("foo"));
	assert!(editor.has_root("header"));
}

#[tokio::test]
async fn destroy_is_idempotent() {
	let document = Document::new();
	let (editor, _) = classic(&document, "x").await;
	let mut events = editor.subscribe();
	editor.destroy().await.unwrap();
	editor.destroy().await.unwrap();
	assert_eq!(events.recv().await.unwrap(), EditorEvent::Destroyed);
	assert!(events.try_recv().is_err());
	assert!(matches!(editor.get_data(MAIN_ROOT), Err(EngineError::Destroyed)));
	assert_eq!(editor.ui_element(UiRegion::Toolbar), None);
}

#[tokio::test]
async fn crashed_editor_keeps_data_readable() {
	let document = Document::new();
	let (editor, _) = classic(&document, "kept").await;
	let memory = editor.as_any().downcast_ref::<MemoryEditor>().unwrap();
	memory.simulate_crash("boom");
	assert_eq!(editor.state(), EditorState::Crashed);
	assert_eq!(editor.get_data(MAIN_ROOT).unwrap(), "kept");
	assert!(matches!(editor.set_data(MAIN_ROOT, "lost"), Err(EngineError::Crashed(_))));
}

#[tokio::test]
async fn premium_package_loads_are_counted() {
	let library = MemoryLibrary::new(Document::new());
	assert_eq!(library.premium_loads(), 0);
	let premium = library.premium_package().await.unwrap();
	assert!(premium.plugin("Bold").is_none());
	assert_eq!(library.premium_loads(), 1);
	assert!(library.base_package().await.unwrap().plugin("Bold").is_some());
}

#[tokio::test]
async fn context_tracks_and_destroys_editors() {
	let document = Document::new();
	let library = MemoryLibrary::new(document.clone());
	let context = library.context_factory().await.unwrap().create(ContextConfig::default()).await.unwrap();
	let constructor = library.editor_constructor(EditorType::Classic).await.unwrap();
	let mut events = context.subscribe();

	let first = context
		.add_editor(ContextItem {
			id: "a".to_string(),
			constructor: Arc::clone(&constructor),
			source: EditorSource::Element(document.create_element("div")),
			config: config(InitialData::Single("a".to_string())),
		})
		.await
		.unwrap();
	let second = context
		.add_editor(ContextItem {
			id: "b".to_string(),
			constructor,
			source: EditorSource::Element(document.create_element("div")),
			config: config(InitialData::Single("b".to_string())),
		})
		.await
		.unwrap();
	assert!(Arc::ptr_eq(&context.editors()[0], &first));

	first.as_any().downcast_ref::<MemoryEditor>().unwrap().simulate_crash("item");
	assert_eq!(
		events.recv().await.unwrap(),
		ContextEvent::ItemError {
			item_id: "a".to_string(),
			message: "item".to_string(),
		}
	);
	assert_eq!(context.state(), ContextState::Ready);

	context.remove_editor("a").await.unwrap();
	assert_eq!(first.state(), EditorState::Destroyed);
	assert!(matches!(context.remove_editor("a").await, Err(EngineError::UnknownItem(_))));

	context.destroy().await.unwrap();
	assert_eq!(second.state(), EditorState::Destroyed);
	assert_eq!(context.state(), ContextState::Destroyed);
	assert!(context.editors().is_empty());
}
