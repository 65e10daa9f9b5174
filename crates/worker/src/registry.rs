use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::TaskClass;

/// Lifecycle state of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
	#[default]
	Idle,
	Running,
	/// Dequeuing without executing because available memory is low.
	Throttled,
	Stopped,
}

/// Snapshot for one registered worker.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
	pub name: String,
	pub class: TaskClass,
	pub state: WorkerState,
	/// Generation of the entry currently (or last) executed.
	pub generation: u64,
	pub pending: usize,
	pub processed: u64,
	pub skipped: u64,
	pub last_exit: Option<String>,
}

impl WorkerRecord {
	pub fn new(name: impl Into<String>, class: TaskClass) -> Self {
		Self {
			name: name.into(),
			class,
			state: WorkerState::Idle,
			generation: 0,
			pending: 0,
			processed: 0,
			skipped: 0,
			last_exit: None,
		}
	}
}

/// In-memory worker registry for status snapshots.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	inner: Arc<RwLock<FxHashMap<String, WorkerRecord>>>,
}

impl WorkerRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Upserts one record.
	pub fn upsert(&self, record: WorkerRecord) {
		self.inner.write().insert(record.name.clone(), record);
	}

	/// Applies `f` to the named record, if registered.
	pub fn update(&self, name: &str, f: impl FnOnce(&mut WorkerRecord)) {
		if let Some(record) = self.inner.write().get_mut(name) {
			f(record);
		}
	}

	/// Returns one record by name.
	pub fn get(&self, name: &str) -> Option<WorkerRecord> {
		self.inner.read().get(name).cloned()
	}
}
