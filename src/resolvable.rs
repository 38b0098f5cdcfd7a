use futures::future::BoxFuture;
use futures::FutureExt;

/// A value that is either immediately available or still being produced.
///
/// Pending futures resolve to `anyhow::Result` so asynchronous producers have
/// a failure channel; how a failure is handled depends on the consumer (the
/// primary-function runner logs it, the default value step swallows it).
pub enum Resolvable<T> {
	Ready(T),
	Pending(BoxFuture<'static, anyhow::Result<T>>),
}

impl<T> Resolvable<T> {
	pub fn ready(value: T) -> Self {
		Resolvable::Ready(value)
	}

	pub fn pending<Fut>(future: Fut) -> Self
	where
		Fut: std::future::Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		Resolvable::Pending(future.boxed())
	}
}

impl<T> From<T> for Resolvable<T> {
	fn from(value: T) -> Self {
		Resolvable::Ready(value)
	}
}
