use std::sync::Arc;
use std::time::Duration;

use enclose::enclose;
use tokio::sync::Notify;

use crate::binding::Binding;

#[derive(Clone)]
pub struct WaitOptions {
	/// If set, `wait` resolves with [`WaitResult::Timeout`] after this many
	/// milliseconds without a value.
	pub timeout_msec: Option<u64>,
	/// Keep waiting for a value even after an error is set.
	pub continue_waiting_on_failure: bool,
	/// Keep waiting for a value across resets.
	pub continue_waiting_on_reset: bool,
}

impl Default for WaitOptions {
	fn default() -> Self {
		WaitOptions {
			timeout_msec: None,
			continue_waiting_on_failure: false,
			continue_waiting_on_reset: true,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitResult {
	/// A value is defined.
	Success,
	/// An error is defined.
	Failure,
	/// The waitable was reset before a value could be resolved.
	Reset,
	/// No value was resolved before the allowed time elapsed.
	Timeout,
}

/// Waits for a waitable's value or error bindings to resolve, for a reset, or
/// for the timeout, whichever comes first.
///
/// Every wakeup re-checks conditions in precedence order, so a value always
/// wins over an error, which wins over a reset, which wins over the timeout.
pub(crate) async fn wait_for_bindings<S, F>(
	value: Binding<Option<S>>,
	error: Binding<Option<F>>,
	reset_count: Binding<u64>,
	options: WaitOptions,
) -> WaitResult
where
	S: Send + Sync + 'static,
	F: Send + Sync + 'static,
{
	if value.get_ref().is_some() {
		return WaitResult::Success;
	} else if error.get_ref().is_some() {
		return WaitResult::Failure;
	}

	let initial_reset_count = reset_count.get();
	let notify = Arc::new(Notify::new());

	let _guards = [
		value.add_change_listener(Arc::new(enclose!((notify) move || notify.notify_one()))),
		error.add_change_listener(Arc::new(enclose!((notify) move || notify.notify_one()))),
		reset_count.add_change_listener(Arc::new(enclose!((notify) move || notify.notify_one()))),
	];

	let deadline = options
		.timeout_msec
		.map(|msec| tokio::time::Instant::now() + Duration::from_millis(msec));

	loop {
		if value.get_ref().is_some() {
			return WaitResult::Success;
		}
		if !options.continue_waiting_on_failure && error.get_ref().is_some() {
			return WaitResult::Failure;
		}
		if !options.continue_waiting_on_reset && reset_count.get() != initial_reset_count {
			return WaitResult::Reset;
		}

		match deadline {
			Some(deadline) => tokio::select! {
				_ = notify.notified() => {}
				_ = tokio::time::sleep_until(deadline) => return WaitResult::Timeout,
			},
			None => notify.notified().await,
		}
	}
}
