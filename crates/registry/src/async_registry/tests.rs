use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use super::*;

#[derive(Debug)]
struct Widget {
	name: &'static str,
	destroyed: AtomicUsize,
}

impl Widget {
	fn new(name: &'static str) -> Arc<Self> {
		Arc::new(Self {
			name,
			destroyed: AtomicUsize::new(0),
		})
	}

	fn destroy_count(&self) -> usize {
		self.destroyed.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Destroyable for Widget {
	async fn destroy(&self) -> std::result::Result<(), SharedError> {
		self.destroyed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Boom(&'static str);

fn boom(msg: &'static str) -> SharedError {
	Arc::new(Boom(msg))
}

#[test]
fn register_twice_fails() {
	let registry = AsyncRegistry::<Widget>::new();
	registry.register(Some("e1"), Widget::new("a")).unwrap();
	let err = registry.register(Some("e1"), Widget::new("b")).unwrap_err();
	assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
	assert_eq!(err.to_string(), "item with id \"e1\" is already registered");
}

#[test]
fn unregister_missing_fails() {
	let registry = AsyncRegistry::<Widget>::new();
	assert!(matches!(registry.unregister(Some("nope")), Err(RegistryError::NotRegistered { .. })));
}

#[test]
fn first_item_becomes_default() {
	let registry = AsyncRegistry::<Widget>::new();
	let first = Widget::new("first");
	let second = Widget::new("second");
	registry.register(Some("e1"), Arc::clone(&first)).unwrap();
	registry.register(Some("e2"), Arc::clone(&second)).unwrap();

	let default = registry.get(None).unwrap();
	assert!(Arc::ptr_eq(&default, &first));
	assert_eq!(registry.items().len(), 3);

	registry.unregister(Some("e2")).unwrap();
	assert!(registry.has_item(None));

	registry.unregister(Some("e1")).unwrap();
	assert!(!registry.has_item(None));
	assert!(registry.items().is_empty());
}

#[test]
fn default_follows_first_item_after_registry_empties() {
	let registry = AsyncRegistry::<Widget>::new();
	registry.register(Some("e1"), Widget::new("a")).unwrap();
	registry.unregister(Some("e1")).unwrap();

	let replacement = Widget::new("b");
	registry.register(Some("e2"), Arc::clone(&replacement)).unwrap();
	assert!(Arc::ptr_eq(&registry.get(None).unwrap(), &replacement));
}

#[tokio::test]
async fn queued_executes_resolve_in_order_after_register() {
	let registry = AsyncRegistry::<Widget>::new();
	let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

	let executions: Vec<_> = (0..3)
		.map(|n| {
			let order = Arc::clone(&order);
			registry.execute(Some("e1"), move |item: Arc<Widget>| {
				order.lock().push(n);
				item.name
			})
		})
		.collect();
	assert!(executions.iter().all(|e| !e.is_settled()));
	assert!(order.lock().is_empty());

	registry.register(Some("e1"), Widget::new("editor")).unwrap();
	// Callbacks ran before register returned.
	assert_eq!(*order.lock(), vec![0, 1, 2]);

	for execution in executions {
		assert_eq!(execution.await.unwrap(), "editor");
	}
}

#[tokio::test]
async fn execute_on_registered_item_runs_immediately() {
	let registry = AsyncRegistry::<Widget>::new();
	registry.register(Some("e1"), Widget::new("editor")).unwrap();
	let execution = registry.execute(Some("e1"), |item| item.name.len());
	assert!(execution.is_settled());
	assert_eq!(execution.await.unwrap(), 6);
}

#[tokio::test]
async fn error_rejects_pending_and_future_requests() {
	let registry = AsyncRegistry::<Widget>::new();
	let seen_errors = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&seen_errors);
	let pending = registry.execute_with_error(Some("e1"), |_| (), move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});

	registry.error(Some("e1"), boom("engine exploded"));
	assert_eq!(seen_errors.load(Ordering::SeqCst), 1);
	let err = pending.await.unwrap_err();
	assert_eq!(err.to_string(), "engine exploded");

	let later = registry.execute(Some("e1"), |_| ());
	assert!(matches!(later.await, Err(RegistryError::Initialization(_))));
}

#[test]
fn first_error_mirrors_onto_default_and_resets_together() {
	let registry = AsyncRegistry::<Widget>::new();
	registry.error(Some("e1"), boom("first"));
	registry.error(Some("e2"), boom("second"));

	let errors = registry.errors();
	assert_eq!(errors.len(), 3);
	assert_eq!(errors[&None].to_string(), "first");

	registry.reset_errors(Some("e2"));
	assert!(registry.errors().contains_key(&None));

	registry.reset_errors(Some("e1"));
	assert!(registry.errors().is_empty());
}

#[test]
fn register_clears_stale_error() {
	let registry = AsyncRegistry::<Widget>::new();
	registry.error(Some("e1"), boom("failed once"));
	registry.register(Some("e1"), Widget::new("retry")).unwrap();

	assert!(registry.errors().is_empty());
	assert!(registry.has_item(Some("e1")));
	assert!(registry.has_item(None));
}

#[tokio::test(start_paused = true)]
async fn wait_for_times_out() {
	let registry = AsyncRegistry::<Widget>::new();
	let err = registry.wait_for(Some("ghost"), Some(Duration::from_millis(100))).await.unwrap_err();
	assert!(matches!(err, RegistryError::Timeout { .. }));
}

#[tokio::test]
async fn wait_for_default_slot() {
	let registry = Arc::new(AsyncRegistry::<Widget>::new());
	let waiter = {
		let registry = Arc::clone(&registry);
		tokio::spawn(async move { registry.wait_for(None, None).await })
	};
	tokio::task::yield_now().await;

	let item = Widget::new("only");
	registry.register(Some("e1"), Arc::clone(&item)).unwrap();
	assert!(Arc::ptr_eq(&waiter.await.unwrap().unwrap(), &item));
}

#[tokio::test]
async fn reset_abandons_queued_requests() {
	let registry = AsyncRegistry::<Widget>::new();
	let pending = registry.execute(Some("e9"), |_| ());
	registry.reset();
	assert!(matches!(pending.await, Err(RegistryError::Abandoned { .. })));
}

#[tokio::test]
async fn destroy_all_destroys_each_item_once() {
	let registry = AsyncRegistry::<Widget>::new();
	let first = Widget::new("a");
	let second = Widget::new("b");
	registry.register(Some("e1"), Arc::clone(&first)).unwrap();
	registry.register(Some("e2"), Arc::clone(&second)).unwrap();

	let notifications = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&notifications);
	registry.watch(move |_, _| {
		counter.fetch_add(1, Ordering::SeqCst);
	});

	registry.destroy_all().await.unwrap();
	assert_eq!(first.destroy_count(), 1);
	assert_eq!(second.destroy_count(), 1);
	assert!(registry.items().is_empty());
	// Once on subscribe, once after destroy_all.
	assert_eq!(notifications.load(Ordering::SeqCst), 2);
}

#[test]
fn watchers_see_every_mutation_once() {
	let registry = AsyncRegistry::<Widget>::new();
	let history: Arc<parking_lot::Mutex<Vec<HashMap<RegistryKey, &'static str>>>> = Arc::default();
	let sink = Arc::clone(&history);
	let watcher = registry.watch(move |items, _| {
		sink.lock().push(items.iter().map(|(k, v)| (k.clone(), v.name)).collect());
	});

	registry.register(Some("e1"), Widget::new("a")).unwrap();
	registry.unregister(Some("e1")).unwrap();
	assert!(registry.unwatch(watcher));
	registry.register(Some("e2"), Widget::new("b")).unwrap();

	let history = history.lock();
	assert_eq!(history.len(), 3);
	assert!(history[0].is_empty());
	assert_eq!(
		history[1],
		HashMap::from([(Some("e1".to_string()), "a"), (None, "a")])
	);
	assert!(history[2].is_empty());
}

#[tokio::test(start_paused = true)]
async fn timed_out_wait_leaves_nothing_queued() {
	let registry = AsyncRegistry::<Widget>::new();
	for _ in 0..3 {
		let err = registry.wait_for(Some("ghost"), Some(Duration::from_millis(50))).await.unwrap_err();
		assert!(matches!(err, RegistryError::Timeout { .. }));
	}
	assert!(registry.state.lock().pending.is_empty());
}

#[tokio::test]
async fn dropped_wait_withdraws_only_its_own_request() {
	let registry = AsyncRegistry::<Widget>::new();
	let kept = registry.execute(Some("e1"), |item| item.name);
	{
		let waiting = registry.wait_for(Some("e1"), None);
		tokio::pin!(waiting);
		assert!(futures::poll!(waiting.as_mut()).is_pending());
		assert_eq!(registry.state.lock().pending[&Some("e1".to_string())].len(), 2);
	}
	assert_eq!(registry.state.lock().pending[&Some("e1".to_string())].len(), 1);

	registry.register(Some("e1"), Widget::new("editor")).unwrap();
	assert_eq!(kept.await.unwrap(), "editor");
}
