use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Poll-with-retry settings for [`wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
	/// Total time budget before giving up.
	pub time_out_after: Duration,
	/// Delay between two attempts.
	pub retry_after: Duration,
}

impl Default for WaitOptions {
	fn default() -> Self {
		Self {
			time_out_after: Duration::from_millis(500),
			retry_after: Duration::from_millis(100),
		}
	}
}

/// Returned by [`wait_for`] once the budget is spent; carries the last observed failure.
#[derive(Debug, thiserror::Error)]
#[error("condition not met after {after:?}: {last}")]
pub struct WaitTimeout<E> {
	pub after: Duration,
	pub last: E,
}

/// Re-runs `attempt` until it succeeds or `options.time_out_after` elapses.
///
/// The first attempt runs immediately. On timeout the last error is returned inside
/// [`WaitTimeout`].
pub async fn wait_for<T, E, F, Fut>(mut attempt: F, options: WaitOptions) -> Result<T, WaitTimeout<E>>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let start = Instant::now();
	loop {
		match attempt().await {
			Ok(value) => return Ok(value),
			Err(last) => {
				let elapsed = start.elapsed();
				if elapsed >= options.time_out_after {
					tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "wait_for.timeout");
					return Err(WaitTimeout {
						after: options.time_out_after,
						last,
					});
				}
			}
		}
		tokio::time::sleep(options.retry_after).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn succeeds_after_retries() {
		let mut attempts = 0;
		let result: Result<u32, WaitTimeout<&str>> = wait_for(
			|| {
				attempts += 1;
				let n = attempts;
				async move { if n >= 3 { Ok(n) } else { Err("not yet") } }
			},
			WaitOptions {
				time_out_after: Duration::from_secs(1),
				retry_after: Duration::from_millis(10),
			},
		)
		.await;
		assert_eq!(result.ok(), Some(3));
	}

	#[tokio::test(start_paused = true)]
	async fn times_out_with_last_error() {
		let mut attempts = 0u32;
		let result: Result<(), WaitTimeout<String>> = wait_for(
			|| {
				attempts += 1;
				let n = attempts;
				async move { Err(format!("attempt {n}")) }
			},
			WaitOptions {
				time_out_after: Duration::from_millis(50),
				retry_after: Duration::from_millis(20),
			},
		)
		.await;
		let err = result.unwrap_err();
		assert_eq!(err.after, Duration::from_millis(50));
		assert_eq!(err.last, format!("attempt {attempts}"));
		assert!(attempts >= 3);
	}
}
