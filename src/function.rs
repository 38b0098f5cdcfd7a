use crate::resolvable::Resolvable;
use crate::result::WrappedResult;
use crate::waitable::{Waitable, WaitableOptions};

/// A waitable whose state is the result of the given function.
///
/// This is a more natural form than [`Waitable::new`] for computations that
/// produce exactly one success or failure per run: the function returns a
/// wrapped result instead of calling `set_success` / `set_failure` itself.
/// An error from the pending part of the function is treated as an uncaught
/// error, not as a failure result.
pub fn waitable_function<S, F>(
	func: impl Fn() -> Resolvable<WrappedResult<S, F>> + Send + Sync + 'static,
	options: WaitableOptions<S, F>,
) -> Waitable<S, F>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	Waitable::new(
		move |args| match func() {
			Resolvable::Ready(result) => {
				apply(result, &args);
				Resolvable::ready(())
			}
			Resolvable::Pending(future) => Resolvable::pending(async move {
				let result = future.await?;
				apply(result, &args);
				Ok(())
			}),
		},
		options,
	)
}

fn apply<S, F>(result: WrappedResult<S, F>, args: &crate::primary::PrimaryArgs<S, F>)
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	match result {
		WrappedResult::Success(value) => {
			args.set_success(Some(value));
		}
		WrappedResult::Failure(failure) => {
			args.set_failure(failure);
		}
	}
}

/// A waitable that is complete with the given result from the moment it is
/// created.  Useful as a placeholder dependency and in tests.  The force slot
/// still works, so the result can be swapped out later; resets re-produce the
/// original result.
pub fn const_waitable<S, F>(
	id: impl Into<String>,
	result: WrappedResult<S, F>,
) -> Waitable<S, F>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	let waitable = waitable_function(
		{
			let result = result.clone();
			move || Resolvable::ready(result.clone())
		},
		WaitableOptions::new(id),
	);
	waitable.force().set(Some(result));
	waitable
}
