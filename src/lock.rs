use crate::binding::Binding;

/// A waitable is locked while any `locked_until` condition is false or any
/// `locked_while` condition is true.
pub(crate) fn is_locked(locked_until: &[Binding<bool>], locked_while: &[Binding<bool>]) -> bool {
	any_falsey(locked_until) || any_truthy(locked_while)
}

pub(crate) fn any_falsey(bindings: &[Binding<bool>]) -> bool {
	bindings.iter().any(|binding| !binding.get())
}

pub(crate) fn any_truthy(bindings: &[Binding<bool>]) -> bool {
	bindings.iter().any(|binding| binding.get())
}

/// Diagnostic logging for lock contention.  Records which conditions are
/// currently blocking the waitable.  Never affects control flow.
pub(crate) fn log_locked(id: &str, locked_until: &[Binding<bool>], locked_while: &[Binding<bool>]) {
	let mut reasons = Vec::new();

	for condition in locked_until {
		if !condition.get() {
			reasons.push(format!("{} is falsey", condition.id()));
		}
	}

	for condition in locked_while {
		if condition.get() {
			reasons.push(format!("{} is truthy", condition.id()));
		}
	}

	tracing::debug!(
		id,
		"tried to execute waitable, but it's locked because: {}",
		reasons.join(" and ")
	);
}

/// Counterpart of [`log_locked`], recording the transition out of the locked
/// state.
pub(crate) fn log_unlocked(id: &str, locked_until: &[Binding<bool>], locked_while: &[Binding<bool>]) {
	let mut reasons = Vec::new();

	for condition in locked_until {
		if condition.get() {
			reasons.push(format!("{} is truthy", condition.id()));
		}
	}

	for condition in locked_while {
		if !condition.get() {
			reasons.push(format!("{} is falsey", condition.id()));
		}
	}

	tracing::debug!(id, "no longer locked because: {}", reasons.join(" and "));
}
