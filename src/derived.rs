use std::sync::Arc;

use fxhash::FxHashMap;

use crate::binding::Binding;
use crate::default_value::DefaultValue;
use crate::primary::PrimaryArgs;
use crate::resolvable::Resolvable;
use crate::waitable::{Waitable, WaitableOptions};

/// A single source a derived waitable can depend on.
pub enum DerivedDependency<V, F> {
	Waitable(Waitable<V, F>),
	Binding(Binding<V>),
}

impl<V, F> Clone for DerivedDependency<V, F> {
	fn clone(&self) -> Self {
		match self {
			DerivedDependency::Waitable(waitable) => DerivedDependency::Waitable(waitable.clone()),
			DerivedDependency::Binding(binding) => DerivedDependency::Binding(binding.clone()),
		}
	}
}

impl<V, F> From<Waitable<V, F>> for DerivedDependency<V, F> {
	fn from(waitable: Waitable<V, F>) -> Self {
		DerivedDependency::Waitable(waitable)
	}
}

impl<V, F> From<Binding<V>> for DerivedDependency<V, F> {
	fn from(binding: Binding<V>) -> Self {
		DerivedDependency::Binding(binding)
	}
}

/// The dependency set of a derived waitable: nothing, one source, an ordered
/// list, or named sources.  Dependency values are extracted in declaration
/// order, so the reported "last" error is deterministic.
pub enum DerivedDependencies<V, F> {
	None,
	Single(DerivedDependency<V, F>),
	List(Vec<DerivedDependency<V, F>>),
	Named(Vec<(&'static str, DerivedDependency<V, F>)>),
}

impl<V, F> Clone for DerivedDependencies<V, F> {
	fn clone(&self) -> Self {
		match self {
			DerivedDependencies::None => DerivedDependencies::None,
			DerivedDependencies::Single(dep) => DerivedDependencies::Single(dep.clone()),
			DerivedDependencies::List(deps) => DerivedDependencies::List(deps.clone()),
			DerivedDependencies::Named(deps) => DerivedDependencies::Named(deps.clone()),
		}
	}
}

impl<V, F> DerivedDependencies<V, F> {
	pub fn single(dependency: impl Into<DerivedDependency<V, F>>) -> Self {
		DerivedDependencies::Single(dependency.into())
	}

	pub fn list(dependencies: impl IntoIterator<Item = DerivedDependency<V, F>>) -> Self {
		DerivedDependencies::List(dependencies.into_iter().collect())
	}

	pub fn named(
		dependencies: impl IntoIterator<Item = (&'static str, DerivedDependency<V, F>)>,
	) -> Self {
		DerivedDependencies::Named(dependencies.into_iter().collect())
	}

	fn for_each_dependency(&self, mut visit: impl FnMut(&DerivedDependency<V, F>)) {
		match self {
			DerivedDependencies::None => {}
			DerivedDependencies::Single(dep) => visit(dep),
			DerivedDependencies::List(deps) => {
				for dep in deps {
					visit(dep);
				}
			}
			DerivedDependencies::Named(deps) => {
				for (_, dep) in deps {
					visit(dep);
				}
			}
		}
	}
}

/// Extracted dependency values, mirroring the shape of the dependency set.
/// A `None` entry means the corresponding waitable had no value yet.
#[derive(Clone, Debug, PartialEq)]
pub enum DependencyValues<V> {
	None,
	Single(Option<V>),
	List(Vec<Option<V>>),
	Named(FxHashMap<&'static str, Option<V>>),
}

impl<V> DependencyValues<V> {
	pub fn single(&self) -> Option<&V> {
		match self {
			DependencyValues::Single(value) => value.as_ref(),
			_ => None,
		}
	}

	pub fn list(&self) -> &[Option<V>] {
		match self {
			DependencyValues::List(values) => values,
			_ => &[],
		}
	}

	pub fn named(&self, key: &str) -> Option<&V> {
		match self {
			DependencyValues::Named(values) => values.get(key).and_then(Option::as_ref),
			_ => None,
		}
	}
}

pub(crate) struct ExtractedValues<V, F> {
	pub all_loaded: bool,
	pub any_errors: bool,
	pub last_error: Option<F>,
	pub values: DependencyValues<V>,
}

/// Reads the current value of every dependency.  A waitable dependency with an
/// undefined value marks the set as not loaded; its error, if defined, is
/// recorded.  Binding dependencies are always considered loaded.
pub(crate) fn extract_dependency_values<V, F>(
	dependencies: &DerivedDependencies<V, F>,
) -> ExtractedValues<V, F>
where
	V: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	let mut all_loaded = true;
	let mut any_errors = false;
	let mut last_error = None;

	let mut extract = |dep: &DerivedDependency<V, F>| -> Option<V> {
		match dep {
			DerivedDependency::Waitable(waitable) => {
				let value = waitable.value().get();
				if value.is_none() {
					all_loaded = false;
					if let Some(error) = waitable.error().get() {
						any_errors = true;
						last_error = Some(error);
					}
				}
				value
			}
			DerivedDependency::Binding(binding) => Some(binding.get()),
		}
	};

	let values = match dependencies {
		DerivedDependencies::None => DependencyValues::None,
		DerivedDependencies::Single(dep) => DependencyValues::Single(extract(dep)),
		DerivedDependencies::List(deps) => {
			DependencyValues::List(deps.iter().map(&mut extract).collect())
		}
		DerivedDependencies::Named(deps) => DependencyValues::Named(
			deps.iter().map(|(key, dep)| (*key, extract(dep))).collect(),
		),
	};

	ExtractedValues {
		all_loaded,
		any_errors,
		last_error,
		values,
	}
}

/// Computes a derived waitable's value from its dependency values.  Returning
/// `None` without having called `set_failure` leaves the waitable incomplete.
pub type Transformer<S, V, F> =
	Arc<dyn Fn(DependencyValues<V>, PrimaryArgs<S, F>) -> Resolvable<Option<S>> + Send + Sync>;

/// Transformers keyed by the dependency state they apply to.  Within one
/// entry, the more specific slot wins: `if_loaded` over `always` for the
/// loaded state, `if_error` over `if_error_or_loading` over `always` for the
/// error state, and likewise for loading.
pub struct NamedTransformers<S, V, F> {
	pub if_loaded: Option<Transformer<S, V, F>>,
	pub if_error: Option<Transformer<S, V, F>>,
	pub if_loading: Option<Transformer<S, V, F>>,
	pub if_error_or_loading: Option<Transformer<S, V, F>>,
	pub always: Option<Transformer<S, V, F>>,
}

impl<S, V, F> Default for NamedTransformers<S, V, F> {
	fn default() -> Self {
		NamedTransformers {
			if_loaded: None,
			if_error: None,
			if_loading: None,
			if_error_or_loading: None,
			always: None,
		}
	}
}

impl<S, V, F> Clone for NamedTransformers<S, V, F> {
	fn clone(&self) -> Self {
		NamedTransformers {
			if_loaded: self.if_loaded.clone(),
			if_error: self.if_error.clone(),
			if_loading: self.if_loading.clone(),
			if_error_or_loading: self.if_error_or_loading.clone(),
			always: self.always.clone(),
		}
	}
}

impl<S, V, F> NamedTransformers<S, V, F> {
	pub fn if_loaded(
		mut self,
		transformer: impl Fn(DependencyValues<V>, PrimaryArgs<S, F>) -> Resolvable<Option<S>>
			+ Send
			+ Sync
			+ 'static,
	) -> Self {
		self.if_loaded = Some(Arc::new(transformer));
		self
	}

	pub fn if_error(
		mut self,
		transformer: impl Fn(DependencyValues<V>, PrimaryArgs<S, F>) -> Resolvable<Option<S>>
			+ Send
			+ Sync
			+ 'static,
	) -> Self {
		self.if_error = Some(Arc::new(transformer));
		self
	}

	pub fn if_loading(
		mut self,
		transformer: impl Fn(DependencyValues<V>, PrimaryArgs<S, F>) -> Resolvable<Option<S>>
			+ Send
			+ Sync
			+ 'static,
	) -> Self {
		self.if_loading = Some(Arc::new(transformer));
		self
	}

	pub fn if_error_or_loading(
		mut self,
		transformer: impl Fn(DependencyValues<V>, PrimaryArgs<S, F>) -> Resolvable<Option<S>>
			+ Send
			+ Sync
			+ 'static,
	) -> Self {
		self.if_error_or_loading = Some(Arc::new(transformer));
		self
	}

	pub fn always(
		mut self,
		transformer: impl Fn(DependencyValues<V>, PrimaryArgs<S, F>) -> Resolvable<Option<S>>
			+ Send
			+ Sync
			+ 'static,
	) -> Self {
		self.always = Some(Arc::new(transformer));
		self
	}
}

/// One entry in an ordered transformer list.  The first entry applicable to
/// the current dependency state is used; a bare `Loaded` entry is shorthand
/// for `if_loaded`.
pub enum TransformerEntry<S, V, F> {
	Loaded(Transformer<S, V, F>),
	Named(NamedTransformers<S, V, F>),
}

impl<S, V, F> Clone for TransformerEntry<S, V, F> {
	fn clone(&self) -> Self {
		match self {
			TransformerEntry::Loaded(transformer) => TransformerEntry::Loaded(transformer.clone()),
			TransformerEntry::Named(named) => TransformerEntry::Named(named.clone()),
		}
	}
}

impl<S, V, F> TransformerEntry<S, V, F> {
	pub fn loaded(
		transformer: impl Fn(DependencyValues<V>, PrimaryArgs<S, F>) -> Resolvable<Option<S>>
			+ Send
			+ Sync
			+ 'static,
	) -> Self {
		TransformerEntry::Loaded(Arc::new(transformer))
	}
}

impl<S, V, F> From<NamedTransformers<S, V, F>> for TransformerEntry<S, V, F> {
	fn from(named: NamedTransformers<S, V, F>) -> Self {
		TransformerEntry::Named(named)
	}
}

fn loaded_transformer<S, V, F>(entries: &[TransformerEntry<S, V, F>]) -> Option<Transformer<S, V, F>> {
	entries.iter().find_map(|entry| match entry {
		TransformerEntry::Loaded(transformer) => Some(transformer.clone()),
		TransformerEntry::Named(named) => named.if_loaded.clone().or_else(|| named.always.clone()),
	})
}

fn error_transformer<S, V, F>(entries: &[TransformerEntry<S, V, F>]) -> Option<Transformer<S, V, F>> {
	entries.iter().find_map(|entry| match entry {
		TransformerEntry::Loaded(_) => None,
		TransformerEntry::Named(named) => named
			.if_error
			.clone()
			.or_else(|| named.if_error_or_loading.clone())
			.or_else(|| named.always.clone()),
	})
}

fn loading_transformer<S, V, F>(entries: &[TransformerEntry<S, V, F>]) -> Option<Transformer<S, V, F>> {
	entries.iter().find_map(|entry| match entry {
		TransformerEntry::Loaded(_) => None,
		TransformerEntry::Named(named) => named
			.if_loading
			.clone()
			.or_else(|| named.if_error_or_loading.clone())
			.or_else(|| named.always.clone()),
	})
}

/// A waitable derived from zero or more other waitables and bindings.  Its
/// value is computed by the first transformer applicable to the current
/// dependency state:
///
/// - loaded: every waitable dependency has a value
/// - error: some waitable dependency has no value but has an error
/// - loading: some waitable dependency has neither a value nor an error
///
/// Any change that completes a dependency, and any plain binding change,
/// hard-resets the derived waitable so it recomputes.  The derived waitable is
/// additionally locked while any dependency is locked without a value.
pub fn derived_waitable<S, V, F>(
	dependencies: DerivedDependencies<V, F>,
	transformers: Vec<TransformerEntry<S, V, F>>,
	mut options: WaitableOptions<S, F>,
) -> Waitable<S, F>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	V: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	dependencies.for_each_dependency(|dep| match dep {
		DerivedDependency::Waitable(waitable) => {
			options
				.hard_reset_on
				.push(waitable.is_complete().to_watchable());
			options
				.locked_while
				.push(waitable.is_locked_without_value().clone());
		}
		DerivedDependency::Binding(binding) => {
			options.hard_reset_on.push(binding.to_watchable());
		}
	});

	// Derived values come from dependencies, so the sensible starting point is
	// to evaluate immediately rather than wait for the scheduler.
	if matches!(options.default_value, DefaultValue::None) {
		options.default_value = DefaultValue::UsePrimaryFunction;
	}

	Waitable::new(
		move |args| evaluate(&dependencies, &transformers, args),
		options,
	)
}

fn evaluate<S, V, F>(
	dependencies: &DerivedDependencies<V, F>,
	transformers: &[TransformerEntry<S, V, F>],
	args: PrimaryArgs<S, F>,
) -> Resolvable<()>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	V: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	let extracted = extract_dependency_values(dependencies);

	if extracted.all_loaded {
		run_transformer(
			loaded_transformer(transformers),
			extracted.values,
			args,
			apply_success,
		)
	} else if extracted.any_errors {
		let last_error = extracted.last_error;
		run_transformer(
			error_transformer(transformers),
			extracted.values,
			args,
			move |value, args| match value {
				Some(value) => {
					args.set_success(Some(value));
				}
				None => {
					// The transformer may have reported its own failure
					// already; the propagated dependency error is only the
					// fallback.
					if !args.has_error() {
						if let Some(error) = last_error.clone() {
							args.set_failure(error);
						}
					}
				}
			},
		)
	} else {
		run_transformer(
			loading_transformer(transformers),
			extracted.values,
			args,
			apply_success,
		)
	}
}

fn apply_success<S, F>(value: Option<S>, args: &PrimaryArgs<S, F>)
where
	S: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	// An undefined transformer result must not clobber a failure the
	// transformer set explicitly.
	if value.is_some() || !args.has_error() {
		args.set_success(value);
	}
}

fn run_transformer<S, V, F>(
	transformer: Option<Transformer<S, V, F>>,
	values: DependencyValues<V>,
	args: PrimaryArgs<S, F>,
	apply: impl Fn(Option<S>, &PrimaryArgs<S, F>) + Send + 'static,
) -> Resolvable<()>
where
	S: Clone + PartialEq + Send + Sync + 'static,
	V: Clone + PartialEq + Send + Sync + 'static,
	F: Clone + PartialEq + Send + Sync + 'static,
{
	let Some(transformer) = transformer else {
		apply(None, &args);
		return Resolvable::ready(());
	};

	match transformer(values, args.clone()) {
		Resolvable::Ready(value) => {
			apply(value, &args);
			Resolvable::ready(())
		}
		Resolvable::Pending(future) => Resolvable::pending(async move {
			let value = match future.await {
				Ok(value) => value,
				Err(error) => {
					tracing::debug!(%error, "ignoring derived waitable transformer error");
					None
				}
			};
			apply(value, &args);
			Ok(())
		}),
	}
}
