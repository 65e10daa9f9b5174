/// Shared execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Latency-sensitive work on the caller's thread (foreground paragraph checks).
	Interactive,
	/// Deferred work that may be coalesced, skipped under pressure or interrupted.
	Background,
	/// CPU-intensive work fanned out to scoped helper threads.
	CpuBlocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::CpuBlocking => "cpu_blocking",
		}
	}
}
