//! Process-wide engine context.
//!
//! Created once when the engine starts and dropped on shutdown; every
//! document and the recheck worker share it through an `Arc`.

use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::System;

use crate::config::{CheckConfig, ContextSize};
use crate::error::ConfigError;
use crate::notify::{NotificationSink, Notifier};

bitflags::bitflags! {
	/// Extra diagnostics per component.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct DebugFlags: u32 {
		/// Dump snapshot mappings after each refresh.
		const SNAPSHOT = 1 << 0;
		/// Log every cache store and invalidation.
		const CACHE = 1 << 1;
		/// Dump the queue after each insertion.
		const QUEUE = 1 << 2;
		/// Trace position resolution steps.
		const DETECTOR = 1 << 3;
		/// Trace worker iterations.
		const WORKER = 1 << 4;
		/// Trace cache file reads and writes.
		const PERSIST = 1 << 5;
	}
}

/// Reports available system memory for the worker's backpressure valve.
pub trait MemoryProbe: Send + Sync {
	/// Available memory in bytes, or `None` when unknown.
	fn available_bytes(&self) -> Option<u64>;
}

/// [`MemoryProbe`] backed by `sysinfo`.
pub struct SystemMemoryProbe {
	system: Mutex<System>,
}

impl SystemMemoryProbe {
	pub fn new() -> Self {
		Self {
			system: Mutex::new(System::new()),
		}
	}
}

impl Default for SystemMemoryProbe {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryProbe for SystemMemoryProbe {
	fn available_bytes(&self) -> Option<u64> {
		let mut system = self.system.lock();
		system.refresh_memory();
		match system.available_memory() {
			0 => None,
			bytes => Some(bytes),
		}
	}
}

/// Shared configuration, diagnostics switches and collaborators.
pub struct CheckContext {
	config: CheckConfig,
	classes: Arc<[ContextSize]>,
	debug: DebugFlags,
	test_mode: bool,
	memory: Arc<dyn MemoryProbe>,
	notifier: Notifier,
}

impl CheckContext {
	/// Validates `config` and builds a context with the default collaborators.
	pub fn new(config: CheckConfig) -> Result<Self, ConfigError> {
		config.validate()?;
		let debug = config.debug_flags()?;
		Ok(Self {
			classes: config.context_sizes().into(),
			config,
			debug,
			test_mode: false,
			memory: Arc::new(SystemMemoryProbe::new()),
			notifier: Notifier::default(),
		})
	}

	/// Synchronous text-level checks and no cache files.
	pub fn with_test_mode(mut self, test_mode: bool) -> Self {
		self.test_mode = test_mode;
		self
	}

	pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
		self.memory = probe;
		self
	}

	pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
		self.notifier = Notifier::new(sink);
		self
	}

	pub fn with_debug(mut self, flags: DebugFlags) -> Self {
		self.debug |= flags;
		self
	}

	pub fn config(&self) -> &CheckConfig {
		&self.config
	}

	/// Context size per rule class, indexed by class number.
	pub fn classes(&self) -> &Arc<[ContextSize]> {
		&self.classes
	}

	#[inline]
	pub fn debug(&self, flag: DebugFlags) -> bool {
		self.debug.contains(flag)
	}

	pub fn is_test_mode(&self) -> bool {
		self.test_mode
	}

	/// Whether text-level classes go through the background worker.
	pub fn use_queue(&self) -> bool {
		self.config.use_queue && !self.test_mode
	}

	pub fn memory(&self) -> &dyn MemoryProbe {
		self.memory.as_ref()
	}

	pub fn notifier(&self) -> &Notifier {
		&self.notifier
	}

	/// Releases per-session state ahead of drop.
	pub(crate) fn teardown(&self) {
		self.notifier.clear();
		tracing::debug!("context.teardown");
	}
}

impl std::fmt::Debug for CheckContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CheckContext")
			.field("classes", &self.classes)
			.field("debug", &self.debug)
			.field("test_mode", &self.test_mode)
			.finish_non_exhaustive()
	}
}
