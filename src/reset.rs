/// `Hard` clears the current value and error before re-running the default
/// value step.  `Soft` clears only the error, keeping any value as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetType {
	Hard,
	Soft,
}
