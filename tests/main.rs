use std::sync::{Arc, Mutex};
use std::time::Duration;

use waitables::{
	waitable_function, Binding, DefaultValue, PrimaryArgs, ResetType, Resolvable, WaitOptions,
	WaitResult, Waitable, WaitableOptions, WrappedResult,
};


use mock::Spy;

/// Lets scheduled runs and spawned continuations settle.  Time is paused in
/// these tests, so the sleep returns as soon as every other task is idle.
async fn settle() {
	tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn sync_success() {
	let waitable = waitable_function(
		|| Resolvable::ready(WrappedResult::<_, String>::Success(42)),
		WaitableOptions::new("test"),
	);

	assert_eq!(waitable.wait(WaitOptions::default()).await, WaitResult::Success);
	assert_eq!(waitable.value().get(), Some(42));
	assert_eq!(waitable.error().get(), None);
	assert!(waitable.is_complete().get());
	assert!(!waitable.is_busy().get());
}

#[tokio::test(start_paused = true)]
async fn async_failure() {
	let waitable = waitable_function(
		|| {
			Resolvable::pending(async {
				Ok(WrappedResult::<i32, _>::Failure("nope".to_string()))
			})
		},
		WaitableOptions::new("test"),
	);

	assert_eq!(waitable.wait(WaitOptions::default()).await, WaitResult::Failure);
	assert_eq!(waitable.value().get(), None);
	assert_eq!(waitable.error().get(), Some("nope".to_string()));
	assert!(waitable.is_complete().get());
}

#[tokio::test(start_paused = true)]
async fn uncaught_error_clears_busy_but_stays_incomplete() {
	let waitable = Waitable::<i32, String>::new(
		|_args| Resolvable::pending(async { Err(anyhow::anyhow!("boom")) }),
		WaitableOptions::new("test"),
	);

	let result = waitable
		.wait(WaitOptions {
			timeout_msec: Some(100),
			..WaitOptions::default()
		})
		.await;

	assert_eq!(result, WaitResult::Timeout);
	assert!(!waitable.is_busy().get());
	assert!(!waitable.is_complete().get());
}

#[tokio::test(start_paused = true)]
async fn success_with_no_value_stays_incomplete() {
	let waitable = Waitable::<i32, String>::new(
		|args| {
			args.set_success(None);
			Resolvable::ready(())
		},
		WaitableOptions::new("test"),
	);

	let result = waitable
		.wait(WaitOptions {
			timeout_msec: Some(100),
			..WaitOptions::default()
		})
		.await;

	assert_eq!(result, WaitResult::Timeout);
	assert!(!waitable.is_busy().get());
	assert!(!waitable.is_complete().get());
}

#[tokio::test(start_paused = true)]
async fn default_value_shows_before_the_primary_resolves() {
	let waitable = Waitable::<i32, String>::new(
		|args| {
			Resolvable::pending(async move {
				tokio::time::sleep(Duration::from_millis(500)).await;
				args.set_success(Some(2));
				Ok(())
			})
		},
		WaitableOptions::new("test").default_value(DefaultValue::producer(|| Resolvable::ready(Some(1)))),
	);

	assert_eq!(waitable.value().get(), Some(1));
	assert!(waitable.is_complete().get());

	tokio::time::sleep(Duration::from_millis(600)).await;
	assert_eq!(waitable.value().get(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn hard_reset_reruns_and_reapplies_the_default() {
	let runs = Arc::new(Mutex::new(0));
	let waitable = Waitable::<i32, String>::new(
		{
			let runs = runs.clone();
			move |args| {
				*runs.lock().unwrap() += 1;
				args.set_success(Some(10));
				Resolvable::ready(())
			}
		},
		WaitableOptions::new("test").default_value(DefaultValue::producer(|| Resolvable::ready(Some(0)))),
	);

	assert_eq!(waitable.value().get(), Some(0));
	settle().await;
	assert_eq!(*runs.lock().unwrap(), 1);
	assert_eq!(waitable.value().get(), Some(10));

	waitable.reset(ResetType::Hard);
	assert_eq!(waitable.value().get(), Some(0));

	settle().await;
	assert_eq!(*runs.lock().unwrap(), 2);
	assert_eq!(waitable.value().get(), Some(10));
}

#[tokio::test(start_paused = true)]
async fn soft_reset_keeps_the_value_and_clears_the_error() {
	let waitable = Waitable::<i32, String>::new(
		|args| {
			args.set_failure("bad".to_string());
			Resolvable::ready(())
		},
		WaitableOptions::new("test").default_value(DefaultValue::producer(|| Resolvable::ready(Some(5)))),
	);

	settle().await;
	assert_eq!(waitable.value().get(), Some(5));
	assert_eq!(waitable.error().get(), Some("bad".to_string()));

	waitable.reset(ResetType::Soft);
	assert_eq!(waitable.value().get(), Some(5));
	assert_eq!(waitable.error().get(), None);
}

#[tokio::test(start_paused = true)]
async fn results_reported_after_a_reset_are_ignored() {
	let captured: Arc<Mutex<Option<PrimaryArgs<i32, String>>>> = Arc::new(Mutex::new(None));
	let waitable = Waitable::new(
		{
			let captured = captured.clone();
			move |args| {
				*captured.lock().unwrap() = Some(args);
				Resolvable::ready(())
			}
		},
		WaitableOptions::new("test"),
	);

	settle().await;
	let args = captured.lock().unwrap().take().unwrap();
	assert!(!args.was_reset());

	waitable.reset(ResetType::Hard);
	assert!(args.was_reset());
	assert!(!args.set_success(Some(1)));
	assert!(!args.set_failure("late".to_string()));
	assert_eq!(waitable.value().get(), None);
	assert_eq!(waitable.error().get(), None);
}

#[tokio::test(start_paused = true)]
async fn forcing_a_result_overrides_the_primary_function() {
	let waitable = Waitable::<i32, String>::new(
		|args| {
			args.set_success(Some(1));
			Resolvable::ready(())
		},
		WaitableOptions::new("test"),
	);

	// Forced before the scheduled run, so the primary function never fires.
	waitable.force().set(Some(WrappedResult::Success(99)));
	settle().await;
	assert_eq!(waitable.value().get(), Some(99));
	assert!(!waitable.is_busy().get());

	waitable.force().set(Some(WrappedResult::Failure("forced".to_string())));
	assert_eq!(waitable.value().get(), None);
	assert_eq!(waitable.error().get(), Some("forced".to_string()));

	// Clearing the force slot hard-resets and hands control back to the
	// primary function.
	waitable.force().set(None);
	assert_eq!(waitable.value().get(), None);
	assert_eq!(waitable.error().get(), None);

	settle().await;
	assert_eq!(waitable.value().get(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn forcing_wins_over_an_in_flight_primary_run() {
	let waitable = Waitable::<i32, String>::new(
		|args| {
			Resolvable::pending(async move {
				tokio::time::sleep(Duration::from_millis(300)).await;
				args.set_success(Some(1));
				Ok(())
			})
		},
		WaitableOptions::new("test"),
	);

	settle().await;
	assert!(waitable.is_busy().get());

	waitable.force().set(Some(WrappedResult::Success(99)));
	assert_eq!(waitable.value().get(), Some(99));
	assert!(!waitable.is_busy().get());

	// The late set_success from the still-running primary fails the
	// generation guard instead of overwriting the forced result.
	tokio::time::sleep(Duration::from_millis(400)).await;
	assert_eq!(waitable.value().get(), Some(99));
	assert_eq!(waitable.error().get(), None);
}

#[tokio::test(start_paused = true)]
async fn locked_waitables_run_only_after_unlocking() {
	let spy = mock::SharedSpy::new();
	spy.get().expect_invoked().times(0).return_const(());

	let gate = Binding::new("gate", false);
	let waitable = Waitable::<u64, String>::new(
		{
			let spy = spy.clone();
			move |args| {
				spy.get().invoked(1);
				args.set_success(Some(1));
				Resolvable::ready(())
			}
		},
		WaitableOptions::new("test").locked_until(gate.clone()),
	);

	settle().await;
	assert!(waitable.is_locked().get());
	assert!(waitable.is_locked_without_value().get());
	spy.get().checkpoint();

	spy.get().expect_invoked().times(1).return_const(());
	gate.set(true);
	settle().await;

	assert!(!waitable.is_locked().get());
	assert_eq!(waitable.value().get(), Some(1));
	spy.get().checkpoint();
}

#[tokio::test(start_paused = true)]
async fn a_locked_waitable_with_a_default_value_is_not_locked_without_value() {
	let gate = Binding::new("gate", false);
	let waitable = Waitable::<i32, String>::new(
		|args| {
			args.set_success(Some(2));
			Resolvable::ready(())
		},
		WaitableOptions::new("test")
			.locked_until(gate)
			.default_value(DefaultValue::producer(|| Resolvable::ready(Some(1)))),
	);

	assert!(waitable.is_locked().get());
	assert!(!waitable.is_locked_without_value().get());
}

#[tokio::test(start_paused = true)]
async fn bursts_of_resets_collapse_into_one_run() {
	let spy = mock::SharedSpy::new();
	spy.get().expect_invoked().times(1).return_const(());

	let waitable = Waitable::<u64, String>::new(
		{
			let spy = spy.clone();
			move |args| {
				spy.get().invoked(1);
				args.set_success(Some(1));
				Resolvable::ready(())
			}
		},
		WaitableOptions::new("test").limit_msec(100),
	);

	tokio::time::sleep(Duration::from_millis(200)).await;
	spy.get().checkpoint();

	spy.get().expect_invoked().times(1).return_const(());
	waitable.reset(ResetType::Hard);
	waitable.reset(ResetType::Hard);
	waitable.reset(ResetType::Hard);

	tokio::time::sleep(Duration::from_millis(200)).await;
	spy.get().checkpoint();
}

#[tokio::test(start_paused = true)]
async fn reset_sources_trigger_resets() {
	let hard = Binding::new("hard", 0);
	let soft = Binding::new("soft", 0);

	let waitable = Waitable::<i32, String>::new(
		|args| {
			args.set_failure("bad".to_string());
			Resolvable::ready(())
		},
		WaitableOptions::new("test")
			.hard_reset_on(hard.to_watchable())
			.soft_reset_on(soft.to_watchable()),
	);

	assert_eq!(waitable.wait(WaitOptions::default()).await, WaitResult::Failure);
	assert_eq!(waitable.error().get(), Some("bad".to_string()));

	soft.set(1);
	assert_eq!(waitable.error().get(), None);

	settle().await;
	assert_eq!(waitable.error().get(), Some("bad".to_string()));

	hard.set(1);
	assert_eq!(waitable.error().get(), None);
}

#[tokio::test(start_paused = true)]
async fn hooks_fire_on_success_failure_and_reset() {
	let events = Arc::new(Mutex::new(Vec::new()));

	let waitable = Waitable::<i32, String>::new(
		|args| {
			args.set_success(Some(1));
			Resolvable::ready(())
		},
		WaitableOptions::new("test")
			.on_success({
				let events = events.clone();
				move |value| events.lock().unwrap().push(format!("success {value:?}"))
			})
			.on_reset({
				let events = events.clone();
				move |reset_type| events.lock().unwrap().push(format!("reset {reset_type:?}"))
			}),
	);

	waitable.wait(WaitOptions::default()).await;
	waitable.reset(ResetType::Soft);

	let events = events.lock().unwrap().clone();
	assert_eq!(events, vec!["success Some(1)".to_string(), "reset Soft".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn wait_can_report_resets() {
	let waitable = Waitable::<i32, String>::new(
		|_args| Resolvable::ready(()),
		WaitableOptions::new("test"),
	);

	let waiter = tokio::spawn({
		let waitable = waitable.clone();
		async move {
			waitable
				.wait(WaitOptions {
					continue_waiting_on_reset: false,
					..WaitOptions::default()
				})
				.await
		}
	});

	settle().await;
	waitable.reset(ResetType::Hard);

	assert_eq!(waiter.await.unwrap(), WaitResult::Reset);
}

#[tokio::test(start_paused = true)]
async fn wait_can_outlast_failures() {
	let attempt = Arc::new(Mutex::new(0));
	let waitable = Waitable::<i32, String>::new(
		{
			let attempt = attempt.clone();
			move |args| {
				let mut attempt = attempt.lock().unwrap();
				*attempt += 1;
				if *attempt == 1 {
					args.set_failure("first try".to_string());
				} else {
					args.set_success(Some(8));
				}
				Resolvable::ready(())
			}
		},
		WaitableOptions::new("test"),
	);

	let waiter = tokio::spawn({
		let waitable = waitable.clone();
		async move {
			waitable
				.wait(WaitOptions {
					continue_waiting_on_failure: true,
					..WaitOptions::default()
				})
				.await
		}
	});

	settle().await;
	assert_eq!(waitable.error().get(), Some("first try".to_string()));

	waitable.reset(ResetType::Soft);
	assert_eq!(waiter.await.unwrap(), WaitResult::Success);
	assert_eq!(waitable.value().get(), Some(8));
}
