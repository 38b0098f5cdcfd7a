use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use smallvec::SmallVec;

pub type Listener = Arc<dyn Fn() + Send + Sync>;
pub type AreEqual<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A mutable observable value cell.
///
/// Writes are equality-gated: if the new value compares equal to the current
/// one, the underlying value is untouched and no listener fires.  The equality
/// function is pluggable and change detection can be disabled entirely, in
/// which case every `set` notifies.
pub struct Binding<T> {
	body: Arc<BindingBody<T>>,
}

impl<T> Clone for Binding<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

struct BindingBody<T> {
	id: String,
	value: RwLock<T>,
	change_uid: AtomicU64,
	eq: Option<AreEqual<T>>,
	listeners: Mutex<Listeners>,
}

struct Listeners {
	next_key: u64,
	entries: SmallVec<[(u64, Listener); 2]>,
}

impl<T> Binding<T>
where
	T: Send + Sync + 'static,
{
	pub fn new(id: impl Into<String>, value: T) -> Self
	where
		T: PartialEq,
	{
		Self::with_equality(id, value, Arc::new(|a: &T, b: &T| a == b))
	}

	pub fn with_equality(id: impl Into<String>, value: T, eq: AreEqual<T>) -> Self {
		Self::make(id, value, Some(eq))
	}

	/// A binding that notifies on every `set`, even when the value is
	/// unchanged.
	pub fn without_change_detection(id: impl Into<String>, value: T) -> Self {
		Self::make(id, value, None)
	}

	fn make(id: impl Into<String>, value: T, eq: Option<AreEqual<T>>) -> Self {
		Binding {
			body: Arc::new(BindingBody {
				id: id.into(),
				value: RwLock::new(value),
				change_uid: AtomicU64::new(0),
				eq,
				listeners: Mutex::new(Listeners {
					next_key: 0,
					entries: SmallVec::new(),
				}),
			}),
		}
	}

	#[inline]
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.body.value.read().clone()
	}

	#[inline]
	pub fn get_ref(&self) -> RwLockReadGuard<'_, T> {
		self.body.value.read()
	}

	pub fn set(&self, value: T) {
		{
			let mut current = self.body.value.write();
			if let Some(eq) = &self.body.eq {
				if eq(&current, &value) {
					return;
				}
			}
			*current = value;
		}

		self.body.change_uid.fetch_add(1, Ordering::SeqCst);
		self.body.notify();
	}

	/// A monotonically increasing token, bumped on every accepted mutation.
	pub fn change_uid(&self) -> u64 {
		self.body.change_uid.load(Ordering::SeqCst)
	}

	pub fn id(&self) -> &str {
		&self.body.id
	}

	/// Registers a change listener.  The registration lives as long as the
	/// returned guard.
	#[must_use]
	pub fn add_change_listener(&self, listener: Listener) -> ListenerGuard {
		let key = {
			let mut listeners = self.body.listeners.lock();
			let key = listeners.next_key;
			listeners.next_key += 1;
			listeners.entries.push((key, listener));
			key
		};

		let weak = Arc::downgrade(&self.body);
		ListenerGuard::new(move || {
			if let Some(body) = Weak::upgrade(&weak) {
				body.listeners.lock().entries.retain(|(k, _)| *k != key);
			}
		})
	}

	pub fn to_watchable(&self) -> Arc<dyn Watchable> {
		Arc::new(self.clone())
	}
}

impl<T> BindingBody<T> {
	fn notify(&self) {
		// Snapshot so listeners can register or remove listeners (or set
		// this binding again) without deadlocking.
		let snapshot: SmallVec<[Listener; 2]> = {
			let listeners = self.listeners.lock();
			listeners.entries.iter().map(|(_, l)| l.clone()).collect()
		};

		for listener in snapshot {
			listener();
		}
	}
}

impl<T> Debug for Binding<T>
where
	T: Debug + Send + Sync + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Binding")
			.field("id", &self.body.id)
			.field("value", &*self.get_ref())
			.finish()
	}
}

/// An untyped view of a binding: something that can be listened to for
/// changes.  Used for reset triggers and derived-binding inputs, where the
/// value type does not matter.
pub trait Watchable: Send + Sync {
	fn id(&self) -> &str;

	fn change_uid(&self) -> u64;

	#[must_use]
	fn watch(&self, listener: Listener) -> ListenerGuard;
}

impl<T> Watchable for Binding<T>
where
	T: Send + Sync + 'static,
{
	fn id(&self) -> &str {
		Binding::id(self)
	}

	fn change_uid(&self) -> u64 {
		Binding::change_uid(self)
	}

	fn watch(&self, listener: Listener) -> ListenerGuard {
		self.add_change_listener(listener)
	}
}

/// Removes the associated listener registration when dropped.
pub struct ListenerGuard {
	remover: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerGuard {
	pub(crate) fn new(remover: impl FnOnce() + Send + 'static) -> Self {
		ListenerGuard {
			remover: Some(Box::new(remover)),
		}
	}
}

impl Drop for ListenerGuard {
	fn drop(&mut self) {
		if let Some(remover) = self.remover.take() {
			remover();
		}
	}
}

/// Builds a binding whose value is recomputed from `compute` whenever any of
/// the `sources` change.  The returned guards keep the recomputation wired up.
pub(crate) fn derive<T, C>(
	id: impl Into<String>,
	sources: &[&dyn Watchable],
	detect_changes: bool,
	compute: C,
) -> (Binding<T>, Vec<ListenerGuard>)
where
	T: PartialEq + Send + Sync + 'static,
	C: Fn() -> T + Send + Sync + 'static,
{
	let binding = if detect_changes {
		Binding::new(id, compute())
	} else {
		Binding::without_change_detection(id, compute())
	};

	let compute = Arc::new(compute);
	let guards = sources
		.iter()
		.map(|source| {
			let binding = binding.clone();
			let compute = compute.clone();
			source.watch(Arc::new(move || binding.set(compute())))
		})
		.collect();

	(binding, guards)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	use super::{derive, Binding};

	#[test]
	fn equal_values_are_suppressed() {
		let binding = Binding::new("b", 1);
		let fired = Arc::new(AtomicUsize::new(0));

		let _guard = binding.add_change_listener(Arc::new({
			let fired = fired.clone();
			move || {
				fired.fetch_add(1, Ordering::SeqCst);
			}
		}));

		let uid = binding.change_uid();
		binding.set(1);
		assert_eq!(fired.load(Ordering::SeqCst), 0);
		assert_eq!(binding.change_uid(), uid);

		binding.set(2);
		assert_eq!(fired.load(Ordering::SeqCst), 1);
		assert_eq!(binding.change_uid(), uid + 1);
	}

	#[test]
	fn change_detection_can_be_disabled() {
		let binding = Binding::without_change_detection("b", 1);
		let fired = Arc::new(AtomicUsize::new(0));

		let _guard = binding.add_change_listener(Arc::new({
			let fired = fired.clone();
			move || {
				fired.fetch_add(1, Ordering::SeqCst);
			}
		}));

		binding.set(1);
		binding.set(1);
		assert_eq!(fired.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn dropping_the_guard_removes_the_listener() {
		let binding = Binding::new("b", 0);
		let fired = Arc::new(AtomicUsize::new(0));

		let guard = binding.add_change_listener(Arc::new({
			let fired = fired.clone();
			move || {
				fired.fetch_add(1, Ordering::SeqCst);
			}
		}));

		binding.set(1);
		drop(guard);
		binding.set(2);

		assert_eq!(fired.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn derived_bindings_recompute() {
		let a = Binding::new("a", 1);
		let b = Binding::new("b", 2);

		let (sum, _guards) = derive("sum", &[&a, &b], true, {
			let a = a.clone();
			let b = b.clone();
			move || a.get() + b.get()
		});

		assert_eq!(sum.get(), 3);
		a.set(10);
		assert_eq!(sum.get(), 12);
		b.set(0);
		assert_eq!(sum.get(), 10);
	}
}
