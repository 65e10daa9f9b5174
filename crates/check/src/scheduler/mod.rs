//! The background recheck worker.
//!
//! # Role
//!
//! One dedicated thread drains the [`RecheckQueue`]. For each entry it runs
//! the owning document's [`SingleDocument::run_entry`]; when the queue is
//! empty it looks for unchecked paragraphs itself, starting at the cursor of
//! the focused document, so text-level checking keeps moving without explicit
//! requests.
//!
//! # Backpressure
//!
//! Every `heap_check_interval` iterations the worker asks the
//! [`MemoryProbe`](crate::MemoryProbe) how much memory is left. Below
//! `min_available_memory_mb` it becomes throttled: it keeps dequeuing but
//! skips execution and idle fill, probing on every iteration until memory
//! recovers.
//!
//! # Failure
//!
//! A panic inside the engine is caught per entry, reported once through the
//! notifier and recorded in the [`WorkerRegistry`]; the loop carries on.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;

use lectern_primitives::DocId;
use lectern_worker::{GenerationToken, TaskClass, WorkerRecord, WorkerRegistry, WorkerState, panic_message, spawn_named_thread};
use parking_lot::Mutex;

use crate::context::{CheckContext, DebugFlags};
use crate::document::{EntryOutcome, OpenDocuments};
use crate::queue::{Job, QueueEntry, RecheckQueue};
use crate::strategy::CheckStrategy;

#[cfg(test)]
mod tests;

/// Thread and registry name of the recheck worker.
pub const WORKER_NAME: &str = "lectern-recheck";

/// Where the previous entry ended, to continue idle fill from there.
#[derive(Debug, Clone)]
struct Position {
	doc: DocId,
	class: usize,
	end: usize,
}

struct Worker {
	queue: Arc<RecheckQueue>,
	documents: Arc<OpenDocuments>,
	ctx: Arc<CheckContext>,
	strategy: Arc<dyn CheckStrategy>,
	registry: WorkerRegistry,
	iterations: u64,
	throttled: bool,
	last: Option<Position>,
}

impl Worker {
	fn run(mut self) {
		self.registry.upsert(WorkerRecord::new(WORKER_NAME, TaskClass::Background));
		tracing::debug!(worker = WORKER_NAME, "worker.start");
		let queue = Arc::clone(&self.queue);
		loop {
			match queue.next_job(|| self.idle_entry()) {
				Job::Stop => break,
				Job::Reset => self.reset(),
				Job::Check { entry, token } => {
					let retry = self.execute(&entry, &token);
					queue.finish();
					if let Some(entry) = retry {
						queue.requeue(entry);
					}
				}
			}
		}
		self.registry.update(WORKER_NAME, |r| r.state = WorkerState::Stopped);
		tracing::debug!(worker = WORKER_NAME, iterations = self.iterations, "worker.stop");
	}

	fn reset(&mut self) {
		self.strategy.reset();
		for doc in self.documents.all() {
			doc.clear_caches();
		}
		self.last = None;
		tracing::info!(worker = WORKER_NAME, "worker.reset");
	}

	/// Counts an iteration and re-probes memory when due. Returns false while throttled.
	fn memory_ok(&mut self) -> bool {
		self.iterations += 1;
		let interval = u64::from(self.ctx.config().heap_check_interval.max(1));
		if !self.throttled && self.iterations % interval != 0 {
			return true;
		}
		let min_bytes = self.ctx.config().min_available_memory_mb.saturating_mul(1024 * 1024);
		let available = self.ctx.memory().available_bytes();
		let ok = available.is_none_or(|bytes| bytes >= min_bytes);
		if ok == self.throttled {
			if ok {
				tracing::info!(available, "worker.throttle.end");
			} else {
				tracing::warn!(available, min_bytes, "worker.throttle.start");
			}
			let state = if ok { WorkerState::Running } else { WorkerState::Throttled };
			self.registry.update(WORKER_NAME, |r| r.state = state);
		}
		self.throttled = !ok;
		ok
	}

	/// Runs one entry. Returns it again when it was abandoned because the
	/// document moved on and still needs checking.
	fn execute(&mut self, entry: &QueueEntry, token: &GenerationToken) -> Option<QueueEntry> {
		let trace = self.ctx.debug(DebugFlags::WORKER);
		if !self.memory_ok() {
			self.registry.update(WORKER_NAME, |r| r.skipped += 1);
			if trace {
				tracing::debug!(doc = %entry.doc, class = entry.class, "worker.entry.throttled");
			}
			return None;
		}
		let Some(doc) = self.documents.get(&entry.doc) else {
			self.registry.update(WORKER_NAME, |r| r.skipped += 1);
			return None;
		};

		let pending = self.queue.len();
		self.registry.update(WORKER_NAME, |r| {
			r.state = WorkerState::Running;
			r.generation = token.generation();
			r.pending = pending;
		});
		if trace {
			tracing::debug!(
				doc = %entry.doc,
				class = entry.class,
				start = entry.range.start(),
				end = entry.range.end(),
				generation = token.generation(),
				pending,
				"worker.entry.start"
			);
		}

		let mut retry = None;
		match catch_unwind(AssertUnwindSafe(|| doc.run_entry(entry, token))) {
			Ok(EntryOutcome::Completed { changed }) => {
				tracing::debug!(doc = %entry.doc, class = entry.class, changed, "worker.entry.done");
				self.registry.update(WORKER_NAME, |r| r.processed += 1);
			}
			Ok(outcome @ (EntryOutcome::Stale | EntryOutcome::Interrupted))
				if self.documents.get(&entry.doc).is_some_and(|open| Arc::ptr_eq(&open, &doc)) =>
			{
				tracing::debug!(doc = %entry.doc, class = entry.class, ?outcome, "worker.entry.retry");
				self.registry.update(WORKER_NAME, |r| r.skipped += 1);
				retry = Some(entry.clone());
			}
			Ok(outcome) => {
				tracing::debug!(doc = %entry.doc, class = entry.class, ?outcome, "worker.entry.dropped");
				self.registry.update(WORKER_NAME, |r| r.skipped += 1);
			}
			Err(payload) => {
				let message = panic_message(payload.as_ref()).unwrap_or_else(|| "unknown panic".to_string());
				tracing::error!(doc = %entry.doc, class = entry.class, %message, "worker.entry.panicked");
				self.ctx.notifier().notify_once(format!("background check failed: {message}"));
				self.registry.update(WORKER_NAME, |r| {
					r.skipped += 1;
					r.last_exit = Some(message);
				});
			}
		}
		self.registry.update(WORKER_NAME, |r| r.state = WorkerState::Idle);
		self.last = Some(Position {
			doc: entry.doc.clone(),
			class: entry.class,
			end: entry.range.end(),
		});
		retry
	}

	/// Next unchecked paragraph, if the worker may look for one.
	///
	/// Order: the focused document from its cursor, then the document of the
	/// previous entry from where it ended, then every other document. Within
	/// a document the class of the previous entry goes first.
	fn idle_entry(&mut self) -> Option<QueueEntry> {
		if !self.ctx.config().idle_fill || self.throttled {
			return None;
		}
		let docs = self.documents.all();
		let focused = docs.iter().position(|d| d.host().is_focused());
		let previous = self
			.last
			.as_ref()
			.and_then(|last| docs.iter().position(|d| *d.id() == last.doc));
		let mut order: Vec<usize> = focused.into_iter().chain(previous).collect();
		order.dedup();
		let rest: Vec<usize> = (0..docs.len()).filter(|i| !order.contains(i)).collect();
		order.extend(rest);

		let classes = self.ctx.classes().len();
		for i in order {
			let doc = &docs[i];
			let (from, first_class) = match &self.last {
				_ if Some(i) == focused => (doc.cursor_text_index().map_or(0, |t| t.get()), 0),
				Some(last) if *doc.id() == last.doc => (last.end, last.class),
				_ => (0, 0),
			};
			let class_order = (first_class..classes).chain(0..first_class);
			for class in class_order {
				if let Some(entry) = doc.next_unchecked(class, from) {
					if self.ctx.debug(DebugFlags::WORKER) {
						tracing::debug!(doc = %entry.doc, class, start = entry.range.start(), "worker.idle.fill");
					}
					return Some(entry);
				}
			}
		}
		None
	}
}

/// Handle to the running recheck worker.
pub struct RecheckScheduler {
	queue: Arc<RecheckQueue>,
	registry: WorkerRegistry,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl RecheckScheduler {
	/// Spawns the worker thread.
	pub fn start(
		queue: Arc<RecheckQueue>,
		documents: Arc<OpenDocuments>,
		ctx: Arc<CheckContext>,
		strategy: Arc<dyn CheckStrategy>,
		registry: WorkerRegistry,
	) -> std::io::Result<Self> {
		let worker = Worker {
			queue: Arc::clone(&queue),
			documents,
			ctx,
			strategy,
			registry: registry.clone(),
			iterations: 0,
			throttled: false,
			last: None,
		};
		let handle = spawn_named_thread(TaskClass::Background, WORKER_NAME, move || worker.run())?;
		Ok(Self {
			queue,
			registry,
			handle: Mutex::new(Some(handle)),
		})
	}

	pub fn queue(&self) -> &Arc<RecheckQueue> {
		&self.queue
	}

	pub fn status(&self) -> Option<WorkerRecord> {
		self.registry.get(WORKER_NAME)
	}

	/// Stops the worker and waits for it to exit. Idempotent.
	pub fn shutdown(&self) {
		let Some(handle) = self.handle.lock().take() else {
			return;
		};
		self.queue.stop();
		if let Err(payload) = handle.join() {
			let message = panic_message(payload.as_ref()).unwrap_or_else(|| "unknown panic".to_string());
			tracing::error!(%message, "worker.join.failed");
			self.registry.update(WORKER_NAME, |r| {
				r.state = WorkerState::Stopped;
				r.last_exit = Some(message);
			});
		}
	}
}

impl Drop for RecheckScheduler {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl std::fmt::Debug for RecheckScheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RecheckScheduler")
			.field("pending", &self.queue.len())
			.field("status", &self.status())
			.finish()
	}
}
