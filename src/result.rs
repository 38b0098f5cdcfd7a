/// The outcome of a computation: a success value or a failure value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WrappedResult<S, F> {
	Success(S),
	Failure(F),
}

impl<S, F> WrappedResult<S, F> {
	pub fn is_ok(&self) -> bool {
		matches!(self, WrappedResult::Success(_))
	}

	pub fn success(&self) -> Option<&S> {
		match self {
			WrappedResult::Success(value) => Some(value),
			WrappedResult::Failure(_) => None,
		}
	}

	pub fn failure(&self) -> Option<&F> {
		match self {
			WrappedResult::Success(_) => None,
			WrappedResult::Failure(value) => Some(value),
		}
	}
}

impl<S, F> From<Result<S, F>> for WrappedResult<S, F> {
	fn from(result: Result<S, F>) -> Self {
		match result {
			Ok(value) => WrappedResult::Success(value),
			Err(value) => WrappedResult::Failure(value),
		}
	}
}
