use std::future::Future;
use std::sync::OnceLock;

use tokio::task::{JoinError, JoinHandle};

use crate::TaskClass;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(1)
			.thread_name("cke5-worker-global")
			.build()
			.expect("failed to build cke5-worker global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task tagged with a task class.
///
/// Falls back to a lazily-built global runtime when called outside of one, so element callbacks
/// fired from plain threads still make progress.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

/// Renders a join failure for logs: the panic payload when there is one.
pub fn join_error_message(err: JoinError) -> String {
	if err.is_cancelled() {
		return "task cancelled".to_string();
	}
	match err.try_into_panic() {
		Ok(payload) => {
			if let Some(msg) = payload.downcast_ref::<&'static str>() {
				(*msg).to_string()
			} else if let Some(msg) = payload.downcast_ref::<String>() {
				msg.clone()
			} else {
				"task panicked".to_string()
			}
		}
		Err(err) => err.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn extracts_string_payload() {
		let handle = spawn(TaskClass::Mount, async { panic!("{}", String::from("boom-string")) });
		let err = handle.await.unwrap_err();
		assert!(join_error_message(err).contains("boom-string"));
	}

	#[tokio::test]
	async fn reports_cancellation() {
		let handle = spawn(TaskClass::Listener, async {
			tokio::time::sleep(std::time::Duration::from_secs(60)).await;
		});
		handle.abort();
		let err = handle.await.unwrap_err();
		assert_eq!(join_error_message(err), "task cancelled");
	}
}
