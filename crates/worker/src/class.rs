/// Execution classes used to tag spawned host work in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Connect sequences driven by an element entering the document.
	Mount,
	/// Disconnect sequences driven by an element leaving the document.
	Teardown,
	/// Long-lived listeners (change mirroring, watchdog monitors).
	Listener,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Mount => "mount",
			Self::Teardown => "teardown",
			Self::Listener => "listener",
		}
	}
}
