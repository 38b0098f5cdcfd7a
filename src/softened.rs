use std::sync::Arc;

use enclose::enclose;
use parking_lot::Mutex;

use crate::default_value::DefaultValue;
use crate::derived::{derived_waitable, DerivedDependencies, TransformerEntry};
use crate::limiter::LimiterOptions;
use crate::reset::ResetType;
use crate::resolvable::Resolvable;
use crate::waitable::{Waitable, WaitableOptions};

struct Memory<S, F> {
	last_success: Option<S>,
	last_failure: Option<F>,
}

/// Derives a waitable from another waitable, remembering the last known value
/// of the original until a new one is available.  Useful for waitables that
/// are frequently reset, where the last known value is good enough in the
/// interim, for display purposes for example.
///
/// Hard resets on the softened waitable clear the remembered values.  The
/// `default_value` and `limiter` settings of `options` are ignored; the
/// softened waitable always defaults to the original's current value and runs
/// unthrottled.
pub fn softened_waitable<S, F>(
	original: &Waitable<S, F>,
	mut options: WaitableOptions<S, F>,
) -> Waitable<S, F>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	let memory: Arc<Mutex<Memory<S, F>>> = Arc::new(Mutex::new(Memory {
		last_success: None,
		last_failure: None,
	}));

	options.default_value = DefaultValue::producer(enclose!((original) move || {
		Resolvable::ready(original.value().get())
	}));
	options.limiter = LimiterOptions::default();
	options.soft_reset_on.push(original.is_complete().to_watchable());

	let caller_on_reset = options.on_reset.take();
	options.on_reset = Some(Arc::new(enclose!((memory) move |reset_type| {
		if reset_type == ResetType::Hard {
			let mut memory = memory.lock();
			memory.last_success = None;
			memory.last_failure = None;
		}

		if let Some(on_reset) = &caller_on_reset {
			on_reset(reset_type);
		}
	})));

	let transformer = TransformerEntry::loaded(enclose!((original) move |_values, args| {
		let mut memory = memory.lock();

		if let Some(value) = original.value().get() {
			memory.last_failure = None;
			memory.last_success = Some(value.clone());
			Resolvable::ready(Some(value))
		} else if let Some(error) = original.error().get() {
			memory.last_success = None;
			memory.last_failure = Some(error.clone());
			args.set_failure(error);
			Resolvable::ready(None)
		} else if let Some(value) = memory.last_success.clone() {
			Resolvable::ready(Some(value))
		} else if let Some(error) = memory.last_failure.clone() {
			args.set_failure(error);
			Resolvable::ready(None)
		} else {
			Resolvable::ready(None)
		}
	}));

	derived_waitable::<S, S, F>(DerivedDependencies::None, vec![transformer], options)
}
