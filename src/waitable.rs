use std::fmt::Debug;
use std::sync::Arc;

use enclose::enclose;
use parking_lot::Mutex;

use crate::binding::{derive, AreEqual, Binding, ListenerGuard, Watchable};
use crate::default_value::{run_default_value, DefaultValue};
use crate::limiter::{Limiter, LimiterOptions};
use crate::lock;
use crate::primary::{run_primary, PrimaryArgs, PrimaryFunction};
use crate::reset::ResetType;
use crate::resolvable::Resolvable;
use crate::result::WrappedResult;
use crate::wait::{wait_for_bindings, WaitOptions, WaitResult};

pub type SuccessHook<S> = Arc<dyn Fn(Option<&S>) + Send + Sync>;
pub type FailureHook<F> = Arc<dyn Fn(&F) + Send + Sync>;
pub type ResetHook = Arc<dyn Fn(ResetType) + Send + Sync>;

/// Diagnostics configuration.  Explicit per-waitable state rather than a
/// process-wide toggle.
#[derive(Clone, Copy, Default)]
pub struct Diagnostics {
	/// Log which lock conditions block the primary function, and which
	/// conditions later released it.
	pub log_locking: bool,
}

pub struct WaitableOptions<S, F> {
	/// A technical, but human-readable ID, which isn't guaranteed to be
	/// unique.
	pub id: String,
	pub default_value: DefaultValue<S>,
	/// The waitable is locked while any of these conditions is false.
	pub locked_until: Vec<Binding<bool>>,
	/// The waitable is locked while any of these conditions is true.
	pub locked_while: Vec<Binding<bool>>,
	/// Any change to these sources hard-resets the waitable.
	pub hard_reset_on: Vec<Arc<dyn Watchable>>,
	/// Any change to these sources soft-resets the waitable.
	pub soft_reset_on: Vec<Arc<dyn Watchable>>,
	/// Called on each accepted `set_success`.
	pub on_success: Option<SuccessHook<S>>,
	/// Called on each accepted `set_failure`.
	pub on_failure: Option<FailureHook<F>>,
	/// Called on each reset.
	pub on_reset: Option<ResetHook>,
	pub are_values_equal: Option<AreEqual<Option<S>>>,
	pub detect_value_changes: bool,
	pub are_errors_equal: Option<AreEqual<Option<F>>>,
	pub detect_error_changes: bool,
	pub limiter: LimiterOptions,
	pub diagnostics: Diagnostics,
}

impl<S, F> WaitableOptions<S, F> {
	pub fn new(id: impl Into<String>) -> Self {
		WaitableOptions {
			id: id.into(),
			default_value: DefaultValue::None,
			locked_until: Vec::new(),
			locked_while: Vec::new(),
			hard_reset_on: Vec::new(),
			soft_reset_on: Vec::new(),
			on_success: None,
			on_failure: None,
			on_reset: None,
			are_values_equal: None,
			detect_value_changes: true,
			are_errors_equal: None,
			detect_error_changes: true,
			limiter: LimiterOptions::default(),
			diagnostics: Diagnostics::default(),
		}
	}

	pub fn default_value(mut self, default_value: DefaultValue<S>) -> Self {
		self.default_value = default_value;
		self
	}

	pub fn locked_until(mut self, condition: Binding<bool>) -> Self {
		self.locked_until.push(condition);
		self
	}

	pub fn locked_while(mut self, condition: Binding<bool>) -> Self {
		self.locked_while.push(condition);
		self
	}

	pub fn hard_reset_on(mut self, source: Arc<dyn Watchable>) -> Self {
		self.hard_reset_on.push(source);
		self
	}

	pub fn soft_reset_on(mut self, source: Arc<dyn Watchable>) -> Self {
		self.soft_reset_on.push(source);
		self
	}

	pub fn on_success(mut self, hook: impl Fn(Option<&S>) + Send + Sync + 'static) -> Self {
		self.on_success = Some(Arc::new(hook));
		self
	}

	pub fn on_failure(mut self, hook: impl Fn(&F) + Send + Sync + 'static) -> Self {
		self.on_failure = Some(Arc::new(hook));
		self
	}

	pub fn on_reset(mut self, hook: impl Fn(ResetType) + Send + Sync + 'static) -> Self {
		self.on_reset = Some(Arc::new(hook));
		self
	}

	pub fn limit_msec(mut self, limit_msec: u64) -> Self {
		self.limiter.limit_msec = Some(limit_msec);
		self
	}

	pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
		self.diagnostics = diagnostics;
		self
	}
}

/// A state representation for a value or error producing, synchronous or
/// asynchronous computation, which may:
///
/// - have a value or error, or not
/// - be complete or incomplete
/// - be busy or not
/// - be locked or unlocked
/// - be waited for
/// - be reset, allowing the computation to be restarted
///
/// `Waitable` is a cloneable handle.  Dropping the last handle tears down all
/// listener registrations and cancels any pending scheduled execution.
pub struct Waitable<S, F> {
	body: Arc<WaitableBody<S, F>>,
}

impl<S, F> Clone for Waitable<S, F> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub(crate) struct WaitableBody<S, F> {
	pub(crate) id: String,
	pub(crate) value: Binding<Option<S>>,
	pub(crate) error: Binding<Option<F>>,
	pub(crate) force: Binding<Option<WrappedResult<S, F>>>,
	pub(crate) is_busy: Binding<bool>,
	pub(crate) is_complete: Binding<bool>,
	pub(crate) is_locked: Binding<bool>,
	pub(crate) is_locked_without_value: Binding<bool>,
	/// Incremented on each reset.  Stale callback invocations are detected by
	/// comparing against this.
	pub(crate) reset_count: Binding<u64>,
	pub(crate) limiter: Limiter,
	pub(crate) primary: PrimaryFunction<S, F>,
	pub(crate) default_value: DefaultValue<S>,
	pub(crate) are_values_equal: AreEqual<Option<S>>,
	pub(crate) on_success: Option<SuccessHook<S>>,
	pub(crate) on_failure: Option<FailureHook<F>>,
	locked_until: Vec<Binding<bool>>,
	locked_while: Vec<Binding<bool>>,
	diagnostics: Diagnostics,
	on_reset: Option<ResetHook>,
	pub(crate) inner: Mutex<WaitableInner>,
}

pub(crate) struct WaitableInner {
	/// If true, the primary function has already been started for the
	/// current generation and won't run again.
	pub(crate) already_ran: bool,
	/// If true, the last execution attempt found the waitable locked.
	last_exec_attempt_was_locked: bool,
	guards: Vec<ListenerGuard>,
}

impl<S, F> Waitable<S, F>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	/// Creates a waitable whose state is driven by `primary`.
	///
	/// The default value step runs synchronously before this returns; the
	/// primary function itself is scheduled through the rate-limiting
	/// scheduler, so it runs no earlier than the next tick.  Must be called
	/// within a tokio runtime.
	pub fn new(
		primary: impl Fn(PrimaryArgs<S, F>) -> Resolvable<()> + Send + Sync + 'static,
		options: WaitableOptions<S, F>,
	) -> Self {
		Self::with_primary(Arc::new(primary), options)
	}

	pub(crate) fn with_primary(
		primary: PrimaryFunction<S, F>,
		options: WaitableOptions<S, F>,
	) -> Self {
		let id = options.id;

		let value = match (options.detect_value_changes, options.are_values_equal.clone()) {
			(false, _) => Binding::without_change_detection(format!("{id}_value"), None),
			(true, Some(eq)) => Binding::with_equality(format!("{id}_value"), None, eq),
			(true, None) => Binding::new(format!("{id}_value"), None),
		};
		let error = match (options.detect_error_changes, options.are_errors_equal) {
			(false, _) => Binding::without_change_detection(format!("{id}_error"), None),
			(true, Some(eq)) => Binding::with_equality(format!("{id}_error"), None, eq),
			(true, None) => Binding::new(format!("{id}_error"), None),
		};
		let force = Binding::new(format!("{id}_force"), None::<WrappedResult<S, F>>);
		let is_busy = Binding::new(format!("{id}_isBusy"), false);
		let reset_count = Binding::new(format!("{id}_resetCount"), 0u64);

		// No change detection here: isComplete must notify on every
		// transition, even between two complete states (default value
		// followed by the real value).
		let (is_complete, mut guards) = derive(
			format!("{id}_isComplete"),
			&[&value, &error],
			false,
			enclose!((value, error) move || {
				value.get_ref().is_some() || error.get_ref().is_some()
			}),
		);

		let locked_until = options.locked_until;
		let locked_while = options.locked_while;
		let lock_sources: Vec<&dyn Watchable> = locked_until
			.iter()
			.map(|condition| condition as &dyn Watchable)
			.chain(locked_while.iter().map(|condition| condition as &dyn Watchable))
			.collect();
		let (is_locked, lock_guards) = derive(
			format!("{id}_isLocked"),
			&lock_sources,
			true,
			enclose!((locked_until, locked_while) move || {
				lock::is_locked(&locked_until, &locked_while)
			}),
		);
		guards.extend(lock_guards);

		let (is_locked_without_value, locked_without_value_guards) = derive(
			format!("{id}_isLockedWithoutValue"),
			&[&is_locked, &value],
			true,
			enclose!((is_locked, value) move || {
				is_locked.get() && value.get_ref().is_none()
			}),
		);
		guards.extend(locked_without_value_guards);

		let are_values_equal = options
			.are_values_equal
			.unwrap_or_else(|| Arc::new(|a: &Option<S>, b: &Option<S>| a == b));

		let body = Arc::new(WaitableBody {
			limiter: Limiter::new(id.clone(), options.limiter),
			id,
			value,
			error,
			force,
			is_busy,
			is_complete,
			is_locked,
			is_locked_without_value,
			reset_count,
			primary,
			default_value: options.default_value,
			are_values_equal,
			on_success: options.on_success,
			on_failure: options.on_failure,
			locked_until,
			locked_while,
			diagnostics: options.diagnostics,
			on_reset: options.on_reset,
			inner: Mutex::new(WaitableInner {
				already_ran: false,
				last_exec_attempt_was_locked: false,
				guards: Vec::new(),
			}),
		});

		// Becoming unlocked schedules execution; lock conditions never reset.
		let weak = Arc::downgrade(&body);
		guards.push(body.is_locked.add_change_listener(Arc::new(move || {
			if let Some(body) = weak.upgrade() {
				if !body.is_locked.get() {
					body.schedule_if_needed();
				}
			}
		})));

		// Forcing a result adopts it directly; clearing the force slot
		// hard-resets.
		let weak = Arc::downgrade(&body);
		guards.push(body.force.add_change_listener(Arc::new(move || {
			if let Some(body) = weak.upgrade() {
				body.apply_force();
			}
		})));

		for source in &options.hard_reset_on {
			let weak = Arc::downgrade(&body);
			guards.push(source.watch(Arc::new(move || {
				if let Some(body) = weak.upgrade() {
					body.reset(ResetType::Hard);
				}
			})));
		}
		for source in &options.soft_reset_on {
			let weak = Arc::downgrade(&body);
			guards.push(source.watch(Arc::new(move || {
				if let Some(body) = weak.upgrade() {
					body.reset(ResetType::Soft);
				}
			})));
		}

		body.inner.lock().guards = guards;

		run_default_value(&body);
		body.schedule_if_needed();

		Waitable { body }
	}

	pub fn id(&self) -> &str {
		&self.body.id
	}

	/// The success value, or `None` if either incomplete or failed.
	pub fn value(&self) -> &Binding<Option<S>> {
		&self.body.value
	}

	/// The failure value, or `None` if either incomplete or successful.
	pub fn error(&self) -> &Binding<Option<F>> {
		&self.body.error
	}

	/// Forces the waitable to adopt the given result, bypassing the primary
	/// function -- usually for testing.  Setting back to `None` hard-resets.
	pub fn force(&self) -> &Binding<Option<WrappedResult<S, F>>> {
		&self.body.force
	}

	/// `true` while the primary function is being run / waited for.
	pub fn is_busy(&self) -> &Binding<bool> {
		&self.body.is_busy
	}

	/// `true` if either the value or the error is defined.
	pub fn is_complete(&self) -> &Binding<bool> {
		&self.body.is_complete
	}

	pub fn is_locked(&self) -> &Binding<bool> {
		&self.body.is_locked
	}

	/// `true` when locked and no value is present yet, so pre-existing
	/// values keep rendering while a relock recomputes.
	pub fn is_locked_without_value(&self) -> &Binding<bool> {
		&self.body.is_locked_without_value
	}

	/// Resets the waitable so the primary function can run again.
	pub fn reset(&self, reset_type: ResetType) {
		self.body.reset(reset_type);
	}

	/// Resolves once the waitable is complete or reset, or when the wait
	/// times out.
	pub async fn wait(&self, options: WaitOptions) -> WaitResult {
		wait_for_bindings(
			self.body.value.clone(),
			self.body.error.clone(),
			self.body.reset_count.clone(),
			options,
		)
		.await
	}
}

impl<S, F> WaitableBody<S, F>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	pub(crate) fn reset(self: &Arc<Self>, reset_type: ResetType) {
		{
			let mut inner = self.inner.lock();
			inner.already_ran = false;
			inner.last_exec_attempt_was_locked = false;
		}

		self.is_busy.set(false);
		self.reset_count.set(self.reset_count.get() + 1);

		match reset_type {
			ResetType::Hard => run_default_value(self),
			ResetType::Soft => {
				if self.error.get_ref().is_some() {
					self.error.set(None);
				}
			}
		}

		if let Some(on_reset) = &self.on_reset {
			on_reset(reset_type);
		}

		self.schedule_if_needed();
	}

	pub(crate) fn schedule_if_needed(self: &Arc<Self>) {
		let weak = Arc::downgrade(self);
		self.limiter.limit(move || {
			if let Some(body) = weak.upgrade() {
				body.exec_primary_func_if_needed();
			}
		});
	}

	/// The scheduled unit of work: runs the primary function unless it
	/// already ran this generation or the waitable is locked.
	fn exec_primary_func_if_needed(self: &Arc<Self>) {
		if self.inner.lock().already_ran {
			return;
		}

		if self.is_locked.get() {
			let mut inner = self.inner.lock();
			if !inner.last_exec_attempt_was_locked && self.diagnostics.log_locking {
				lock::log_locked(&self.id, &self.locked_until, &self.locked_while);
			}
			inner.last_exec_attempt_was_locked = true;
			return;
		}

		{
			let mut inner = self.inner.lock();
			if inner.last_exec_attempt_was_locked {
				if self.diagnostics.log_locking {
					lock::log_unlocked(&self.id, &self.locked_until, &self.locked_while);
				}
				inner.last_exec_attempt_was_locked = false;
			}
		}

		run_primary(self);
	}

	fn apply_force(self: &Arc<Self>) {
		match self.force.get() {
			Some(result) => {
				// The forced result owns the waitable's state: the primary
				// function must not run again this generation, and a run
				// already in flight must fail the generation guard instead of
				// overwriting the adopted result.
				self.inner.lock().already_ran = true;
				self.reset_count.set(self.reset_count.get() + 1);

				match result {
					WrappedResult::Success(value) => {
						self.value.set(Some(value));
						if self.error.get_ref().is_some() {
							self.error.set(None);
						}
					}
					WrappedResult::Failure(failure) => {
						self.error.set(Some(failure));
						if self.value.get_ref().is_some() {
							self.value.set(None);
						}
					}
				}

				self.is_busy.set(false);
			}
			None => self.reset(ResetType::Hard),
		}
	}
}

impl<S, F> Debug for Waitable<S, F>
where
	S: Debug + Clone + PartialEq + Send + Sync + 'static,
	F: Debug + Clone + PartialEq + Send + Sync + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Waitable")
			.field("id", &self.body.id)
			.field("value", &*self.body.value.get_ref())
			.field("error", &*self.body.error.get_ref())
			.field("is_busy", &self.body.is_busy.get())
			.finish()
	}
}
