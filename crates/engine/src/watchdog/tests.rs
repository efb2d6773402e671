use std::sync::atomic::AtomicU64;

use futures::FutureExt;
use tokio::sync::watch;

use super::*;

struct Widget {
	serial: u64,
	crash: watch::Sender<Option<String>>,
	destroyed: AtomicUsize,
}

impl Widget {
	fn crash(&self, reason: &str) {
		self.crash.send_replace(Some(reason.to_string()));
	}
}

#[async_trait]
impl Destroyable for Widget {
	async fn destroy(&self) -> std::result::Result<(), SharedError> {
		self.destroyed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[async_trait]
impl Supervised for Widget {
	async fn crashed(&self) -> Option<String> {
		let mut rx = self.crash.subscribe();
		rx.wait_for(Option::is_some).await.ok().and_then(|reason| reason.clone())
	}
}

fn watchdog(policy: RestartPolicy) -> (Watchdog<Widget>, Arc<AtomicU64>) {
	let created = Arc::new(AtomicU64::new(0));
	let counter = Arc::clone(&created);
	let watchdog = Watchdog::new(policy, move || {
		let serial = counter.fetch_add(1, Ordering::SeqCst);
		async move {
			let (crash, _) = watch::channel(None);
			Ok(Arc::new(Widget {
				serial,
				crash,
				destroyed: AtomicUsize::new(0),
			}))
		}
		.boxed()
	});
	(watchdog, created)
}

#[tokio::test]
async fn restarts_after_crash() {
	let (watchdog, created) = watchdog(RestartPolicy::default());
	let mut events = watchdog.subscribe();
	let first = watchdog.create().await.unwrap();
	assert_eq!(watchdog.generation(), Some(1));

	first.crash("boom");
	let WatchdogEvent::Restarted { instance, generation } = events.recv().await.unwrap() else {
		panic!("expected restart");
	};
	assert_eq!(generation, 2);
	assert_eq!(instance.serial, 1);
	assert!(!Arc::ptr_eq(&instance, &first));
	assert!(Arc::ptr_eq(&watchdog.instance().unwrap(), &instance));
	assert_eq!(first.destroyed.load(Ordering::SeqCst), 1);
	assert_eq!(watchdog.restarts(), 1);
	assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn gives_up_after_max_restarts() {
	let (watchdog, _) = watchdog(RestartPolicy::OnCrash {
		max_restarts: 1,
		backoff: Duration::ZERO,
	});
	let mut events = watchdog.subscribe();
	let first = watchdog.create().await.unwrap();

	first.crash("one");
	let WatchdogEvent::Restarted { instance, .. } = events.recv().await.unwrap() else {
		panic!("expected restart");
	};
	instance.crash("two");
	let WatchdogEvent::Failed { message } = events.recv().await.unwrap() else {
		panic!("expected failure");
	};
	assert_eq!(message, "two");
}

#[tokio::test]
async fn never_policy_reports_failure() {
	let (watchdog, created) = watchdog(RestartPolicy::Never);
	let mut events = watchdog.subscribe();
	watchdog.create().await.unwrap().crash("boom");
	assert!(matches!(events.recv().await.unwrap(), WatchdogEvent::Failed { .. }));
	assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn destroy_releases_instance_once() {
	let (watchdog, _) = watchdog(RestartPolicy::default());
	let instance = watchdog.create().await.unwrap();
	watchdog.destroy().await.unwrap();
	watchdog.destroy().await.unwrap();
	assert!(watchdog.is_destroyed());
	assert!(watchdog.instance().is_none());
	assert_eq!(instance.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn create_after_destroy_is_rejected() {
	let (watchdog, _) = watchdog(RestartPolicy::default());
	watchdog.destroy().await.unwrap();
	assert!(matches!(watchdog.create().await, Err(EngineError::Destroyed)));
}
