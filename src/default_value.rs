use std::sync::Arc;

use crate::primary::run_primary_for_default;
use crate::resolvable::Resolvable;
use crate::waitable::WaitableBody;

pub type DefaultValueProducer<S> = Arc<dyn Fn() -> Resolvable<Option<S>> + Send + Sync>;

/// How a waitable's value is initialized at creation and on every hard reset.
pub enum DefaultValue<S> {
	/// No default: value and error are simply cleared.
	None,
	/// A producer generating the default value, synchronously or not.
	/// Producer errors are swallowed; default value generation never fails
	/// the waitable.
	Producer(DefaultValueProducer<S>),
	/// Run the primary function itself as the default-value step.  Failures
	/// soft-reset the waitable instead of setting an error.
	UsePrimaryFunction,
}

impl<S> Clone for DefaultValue<S> {
	fn clone(&self) -> Self {
		match self {
			DefaultValue::None => DefaultValue::None,
			DefaultValue::Producer(producer) => DefaultValue::Producer(producer.clone()),
			DefaultValue::UsePrimaryFunction => DefaultValue::UsePrimaryFunction,
		}
	}
}

impl<S> Default for DefaultValue<S> {
	fn default() -> Self {
		DefaultValue::None
	}
}

impl<S> DefaultValue<S> {
	pub fn producer(func: impl Fn() -> Resolvable<Option<S>> + Send + Sync + 'static) -> Self {
		DefaultValue::Producer(Arc::new(func))
	}
}

/// Applies the waitable's default value setting: clears the error, then
/// either clears the value, runs the producer, or runs the primary function
/// in default-value mode.
///
/// Change UIDs stashed before a producer runs detect concurrent mutations; a
/// stale producer result is discarded rather than clobbering newer state.
pub(crate) fn run_default_value<S, F>(body: &Arc<WaitableBody<S, F>>)
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	let producer = match &body.default_value {
		DefaultValue::UsePrimaryFunction => {
			run_primary_for_default(body);
			return;
		}
		DefaultValue::None => {
			if body.error.get_ref().is_some() {
				body.error.set(None);
			}
			if body.value.get_ref().is_some() {
				body.value.set(None);
			}
			return;
		}
		DefaultValue::Producer(producer) => producer.clone(),
	};

	if body.error.get_ref().is_some() {
		body.error.set(None);
	}

	let value_uid = body.value.change_uid();
	let error_uid = body.error.change_uid();

	match producer() {
		Resolvable::Ready(default) => {
			if value_uid != body.value.change_uid() || error_uid != body.error.change_uid() {
				return;
			}

			let equal = (body.are_values_equal)(&*body.value.get_ref(), &default);
			if !equal {
				body.value.set(default);
			}
		}
		Resolvable::Pending(future) => {
			// Show "loading" until the default resolves, skipping the extra
			// set when the value is already undefined.
			if value_uid == body.value.change_uid()
				&& error_uid == body.error.change_uid()
				&& body.value.get_ref().is_some()
			{
				body.value.set(None);
			}

			let value_uid = body.value.change_uid();
			let error_uid = body.error.change_uid();

			let weak = Arc::downgrade(body);
			tokio::spawn(async move {
				match future.await {
					Ok(default) => {
						let Some(body) = weak.upgrade() else {
							return;
						};
						if value_uid != body.value.change_uid()
							|| error_uid != body.error.change_uid()
						{
							return;
						}

						let equal = (body.are_values_equal)(&*body.value.get_ref(), &default);
						if !equal {
							body.value.set(default);
						}
					}
					Err(error) => {
						tracing::debug!(%error, "ignoring default value producer error");
					}
				}
			});
		}
	}
}
