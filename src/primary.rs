use std::sync::{Arc, Weak};

use crate::resolvable::Resolvable;
use crate::reset::ResetType;
use crate::waitable::WaitableBody;

/// The computation behind a waitable.  Invoked at most once per generation;
/// receives [`PrimaryArgs`] for reporting results.  Synchronous work happens
/// in the function body; asynchronous work continues in the returned pending
/// future, whose error resolves as an uncaught diagnostic.
pub type PrimaryFunction<S, F> = Arc<dyn Fn(PrimaryArgs<S, F>) -> Resolvable<()> + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureBehavior {
	/// Normal runs set the error binding.
	SetError,
	/// Default-value runs soft-reset instead, so the primary function can be
	/// run again.
	SoftReset,
}

/// Callbacks handed to a primary function.  All of them compare the waitable's
/// generation counter against the one captured when the run started: after a
/// reset, `set_success` and `set_failure` are ignored and report `false`.
pub struct PrimaryArgs<S, F> {
	body: Weak<WaitableBody<S, F>>,
	initial_reset_count: u64,
	failure_behavior: FailureBehavior,
}

impl<S, F> Clone for PrimaryArgs<S, F> {
	fn clone(&self) -> Self {
		PrimaryArgs {
			body: self.body.clone(),
			initial_reset_count: self.initial_reset_count,
			failure_behavior: self.failure_behavior,
		}
	}
}

impl<S, F> PrimaryArgs<S, F>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	/// Sets the waitable's value, clearing any error, and marks the waitable
	/// as no longer busy.  `None` marks the waitable as no longer busy while
	/// leaving it incomplete.
	///
	/// Returns `false` if the call was ignored because of a reset.
	pub fn set_success(&self, value: Option<S>) -> bool {
		let Some(body) = self.body.upgrade() else {
			return false;
		};
		if body.reset_count.get() != self.initial_reset_count {
			return false;
		}

		let hook_value = value.clone();
		body.value.set(value);
		if body.error.get_ref().is_some() {
			body.error.set(None);
		}
		body.is_busy.set(false);

		if let Some(on_success) = &body.on_success {
			on_success(hook_value.as_ref());
		}

		true
	}

	/// Sets the waitable's error and marks the waitable as no longer busy.
	/// Does not clear the value.  During default-value runs, failures
	/// soft-reset the waitable instead of setting the error.
	///
	/// Returns `false` if the call was ignored because of a reset.
	pub fn set_failure(&self, failure: F) -> bool {
		let Some(body) = self.body.upgrade() else {
			return false;
		};
		if body.reset_count.get() != self.initial_reset_count {
			return false;
		}

		match self.failure_behavior {
			FailureBehavior::SetError => {
				let hook_value = failure.clone();
				body.error.set(Some(failure));
				body.is_busy.set(false);

				if let Some(on_failure) = &body.on_failure {
					on_failure(&hook_value);
				}
			}
			FailureBehavior::SoftReset => {
				body.reset(ResetType::Soft);
			}
		}

		true
	}

	/// `true` if the waitable was reset (or torn down) after this run
	/// started.  Cooperative long-running functions can poll this to avoid
	/// work whose result would be ignored anyway.
	pub fn was_reset(&self) -> bool {
		match self.body.upgrade() {
			Some(body) => body.reset_count.get() != self.initial_reset_count,
			None => true,
		}
	}

	pub(crate) fn has_error(&self) -> bool {
		match self.body.upgrade() {
			Some(body) => body.error.get_ref().is_some(),
			None => false,
		}
	}
}

/// Runs the primary function: marks the waitable as already-run and busy,
/// then invokes the function with generation-guarded callbacks.  An error
/// from the pending part clears busy, logs, and leaves value/error untouched;
/// only an explicit reset makes the waitable run again.
pub(crate) fn run_primary<S, F>(body: &Arc<WaitableBody<S, F>>)
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	body.inner.lock().already_ran = true;
	body.is_busy.set(true);

	let args = PrimaryArgs {
		body: Arc::downgrade(body),
		initial_reset_count: body.reset_count.get(),
		failure_behavior: FailureBehavior::SetError,
	};

	match (body.primary)(args) {
		Resolvable::Ready(()) => {}
		Resolvable::Pending(future) => {
			let id = body.id.clone();
			let is_busy = body.is_busy.clone();
			tokio::spawn(async move {
				if let Err(error) = future.await {
					tracing::error!(%id, %error, "waitable failed with an uncaught error");
					is_busy.set(false);
				}
			});
		}
	}
}

/// Runs the primary function as the default-value step.  Differs from
/// [`run_primary`] in failure handling: `set_failure` and uncaught errors
/// soft-reset the waitable so the primary function can run again, instead of
/// surfacing an error.
pub(crate) fn run_primary_for_default<S, F>(body: &Arc<WaitableBody<S, F>>)
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	body.inner.lock().already_ran = true;
	body.is_busy.set(true);

	if body.error.get_ref().is_some() {
		body.error.set(None);
	}

	let value_uid = body.value.change_uid();
	let error_uid = body.error.change_uid();

	let args = PrimaryArgs {
		body: Arc::downgrade(body),
		initial_reset_count: body.reset_count.get(),
		failure_behavior: FailureBehavior::SoftReset,
	};

	match (body.primary)(args) {
		Resolvable::Ready(()) => {}
		Resolvable::Pending(future) => {
			// The value resolves later, so consumers should see "loading" in
			// the interim -- unless something already mutated the bindings.
			if value_uid == body.value.change_uid()
				&& error_uid == body.error.change_uid()
				&& body.value.get_ref().is_some()
			{
				body.value.set(None);
			}

			let weak = Arc::downgrade(body);
			tokio::spawn(async move {
				if future.await.is_err() {
					if let Some(body) = weak.upgrade() {
						body.reset(ResetType::Soft);
					}
				}
			});
		}
	}
}
