mod binding;
mod default_value;
mod derived;
mod function;
mod limiter;
mod lock;
mod primary;
mod reset;
mod resolvable;
mod result;
mod softened;
mod wait;
mod waitable;

pub use binding::{AreEqual, Binding, Listener, ListenerGuard, Watchable};
pub use default_value::{DefaultValue, DefaultValueProducer};
pub use derived::{
	derived_waitable, DependencyValues, DerivedDependencies, DerivedDependency, NamedTransformers,
	Transformer, TransformerEntry,
};
pub use function::{const_waitable, waitable_function};
pub use limiter::LimiterOptions;
pub use primary::{PrimaryArgs, PrimaryFunction};
pub use reset::ResetType;
pub use resolvable::Resolvable;
pub use result::WrappedResult;
pub use softened::softened_waitable;
pub use wait::{WaitOptions, WaitResult};
pub use waitable::{Diagnostics, FailureHook, ResetHook, SuccessHook, Waitable, WaitableOptions};
