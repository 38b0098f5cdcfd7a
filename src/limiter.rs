use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct LimiterOptions {
	/// Delay before a scheduled run, in milliseconds.  `None` defers to the
	/// next tick of the executor.
	pub limit_msec: Option<u64>,
}

/// A rate-limiting scheduler.  Requests made while a run is already scheduled
/// are collapsed into it, so a burst of synchronous triggers produces a single
/// deferred run.  Dropping the limiter cancels anything still scheduled.
///
/// The delay is the only knob: run ordering and prioritization are left to
/// the runtime's task queue.
pub(crate) struct Limiter {
	id: String,
	limit_msec: Option<u64>,
	scheduled: Arc<Mutex<bool>>,
	cancel: CancellationToken,
}

impl Limiter {
	pub fn new(id: impl Into<String>, options: LimiterOptions) -> Self {
		Limiter {
			id: id.into(),
			limit_msec: options.limit_msec,
			scheduled: Arc::new(Mutex::new(false)),
			cancel: CancellationToken::new(),
		}
	}

	pub fn limit(&self, func: impl FnOnce() + Send + 'static) {
		{
			let mut scheduled = self.scheduled.lock();
			if *scheduled {
				return;
			}
			*scheduled = true;
		}

		tracing::trace!(id = %self.id, "scheduling a run");

		let scheduled = self.scheduled.clone();
		let cancel = self.cancel.clone();
		let delay = self.limit_msec;

		tokio::spawn(async move {
			let wait = async {
				match delay {
					Some(msec) => tokio::time::sleep(Duration::from_millis(msec)).await,
					None => tokio::task::yield_now().await,
				}
			};

			tokio::select! {
				_ = cancel.cancelled() => {}
				_ = wait => {
					// Cleared before running so the function itself can
					// schedule a follow-up run.
					*scheduled.lock() = false;
					func();
				}
			}
		});
	}
}

impl Drop for Limiter {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
