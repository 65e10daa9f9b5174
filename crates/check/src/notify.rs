//! One-shot user notifications for engine failures.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Receives messages that should be shown to the user without blocking.
pub trait NotificationSink: Send + Sync {
	fn notify(&self, message: &str);
}

/// Default sink: logs at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
	fn notify(&self, message: &str) {
		tracing::warn!(message, "notify.user");
	}
}

/// Forwards each distinct message to the sink once.
pub struct Notifier {
	sink: Arc<dyn NotificationSink>,
	seen: Mutex<FxHashSet<String>>,
}

impl Notifier {
	pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
		Self {
			sink,
			seen: Mutex::new(FxHashSet::default()),
		}
	}

	/// Forwards `message` unless it was already shown. Returns true when forwarded.
	pub fn notify_once(&self, message: impl Into<String>) -> bool {
		let message = message.into();
		if !self.seen.lock().insert(message.clone()) {
			tracing::trace!(message = %message, "notify.suppressed");
			return false;
		}
		self.sink.notify(&message);
		true
	}

	/// Forgets every shown message.
	pub fn clear(&self) {
		self.seen.lock().clear();
	}
}

impl Default for Notifier {
	fn default() -> Self {
		Self::new(Arc::new(TracingSink))
	}
}

impl std::fmt::Debug for Notifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Notifier").field("seen", &self.seen.lock().len()).finish()
	}
}
