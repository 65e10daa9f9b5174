//! The engine facade the host talks to.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lectern_primitives::{CharIdx, DocId, FlatIndex};
use lectern_worker::{WorkerRecord, WorkerRegistry};

use crate::config::CheckConfig;
use crate::context::{CheckContext, DebugFlags};
use crate::detector::CheckRequest;
use crate::document::{CheckResult, OpenDocuments, SingleDocument};
use crate::error::StartError;
use crate::host::{DocumentAccessor, RuleEngine};
use crate::persist::CacheStore;
use crate::queue::{AddOutcome, RecheckQueue};
use crate::scheduler::RecheckScheduler;
use crate::strategy::{CheckStrategy, strategy_for};

/// Owns the open documents, the recheck worker and the rule engine strategy.
///
/// Every method is safe to call from any thread. Dropping the engine shuts
/// the worker down.
pub struct CheckEngine {
	ctx: Arc<CheckContext>,
	strategy: Arc<dyn CheckStrategy>,
	documents: Arc<OpenDocuments>,
	queue: Arc<RecheckQueue>,
	scheduler: Option<RecheckScheduler>,
	store: Option<CacheStore>,
	stopped: AtomicBool,
}

impl CheckEngine {
	/// Builds the strategy, spawns the worker when queueing is enabled and
	/// locates the cache directory.
	pub fn new(ctx: CheckContext, engine: Arc<dyn RuleEngine>) -> Result<Self, StartError> {
		let ctx = Arc::new(ctx);
		let config = ctx.config();
		let strategy = strategy_for(config.engine_mode, engine, config.max_suggestions);
		let queue = Arc::new(
			RecheckQueue::new(Duration::from_millis(config.interrupt_wait_ms)).with_dump(ctx.debug(DebugFlags::QUEUE)),
		);
		let documents = Arc::new(OpenDocuments::new());
		let scheduler = if ctx.use_queue() {
			Some(RecheckScheduler::start(
				Arc::clone(&queue),
				Arc::clone(&documents),
				Arc::clone(&ctx),
				Arc::clone(&strategy),
				WorkerRegistry::new(),
			)?)
		} else {
			None
		};
		let store = CacheStore::from_context(&ctx).unwrap_or_else(|error| {
			tracing::warn!(%error, "engine.persist.unavailable");
			None
		});
		tracing::info!(
			classes = ctx.classes().len(),
			queued = scheduler.is_some(),
			persist = store.is_some(),
			test_mode = ctx.is_test_mode(),
			"engine.start"
		);
		Ok(Self {
			ctx,
			strategy,
			documents,
			queue,
			scheduler,
			store,
			stopped: AtomicBool::new(false),
		})
	}

	/// Validates `config` and starts an engine with the default collaborators.
	pub fn from_config(config: CheckConfig, engine: Arc<dyn RuleEngine>) -> Result<Self, StartError> {
		Self::new(CheckContext::new(config)?, engine)
	}

	pub fn context(&self) -> &CheckContext {
		&self.ctx
	}

	/// Registers a document and takes its first snapshot.
	///
	/// Reopening an id replaces the previous document. Saved caches are
	/// restored when the document is unchanged since they were written.
	pub fn open_document(&self, id: DocId, host: Arc<dyn DocumentAccessor>) -> Arc<SingleDocument> {
		let queue = self.scheduler.as_ref().map(|_| Arc::clone(&self.queue));
		let doc = Arc::new(SingleDocument::new(
			id.clone(),
			host,
			Arc::clone(&self.ctx),
			Arc::clone(&self.strategy),
			queue,
		));
		doc.refresh();
		if let Some(store) = &self.store {
			match store.load(&doc, self.strategy.fingerprint()) {
				Ok(restored) => tracing::debug!(%id, restored, "engine.persist.load"),
				Err(error) => tracing::warn!(%id, %error, "engine.persist.load_failed"),
			}
		}
		if let Some(previous) = self.documents.insert(Arc::clone(&doc)) {
			self.queue.dispose(&id);
			previous.dispose();
		}
		if self.scheduler.is_some() {
			self.queue.wake();
		}
		tracing::debug!(%id, paragraphs = doc.snapshot().len(), "engine.open");
		doc
	}

	/// Unregisters a document, waiting briefly for the worker to leave it,
	/// and persists its caches.
	pub fn close_document(&self, id: &DocId) -> bool {
		let Some(doc) = self.documents.remove(id) else {
			return false;
		};
		self.queue.dispose(id);
		self.queue.interrupt(id, true);
		self.persist(&doc);
		doc.dispose();
		tracing::debug!(%id, "engine.close");
		true
	}

	fn persist(&self, doc: &SingleDocument) {
		let Some(store) = &self.store else {
			return;
		};
		if let Err(error) = store.save(doc, self.strategy.fingerprint()) {
			tracing::warn!(doc = %doc.id(), %error, "engine.persist.save_failed");
		}
	}

	pub fn document(&self, id: &DocId) -> Option<Arc<SingleDocument>> {
		self.documents.get(id)
	}

	/// Synchronous check of one sentence of one paragraph.
	///
	/// An unknown document yields no matches.
	pub fn get_check_results(&self, id: &DocId, request: &CheckRequest) -> CheckResult {
		match self.documents.get(id) {
			Some(doc) => doc.check(request),
			None => {
				tracing::debug!(%id, "engine.check.unknown_document");
				CheckResult {
					sentence_start: request.sentence_start,
					sentence_end: request.text.chars().count(),
					..CheckResult::default()
				}
			}
		}
	}

	/// Queues a recheck of `flat` for one rule class.
	///
	/// Returns `None` when the document, paragraph or class is unknown, or
	/// when the engine runs without a worker.
	pub fn add_queue_entry(&self, id: &DocId, flat: FlatIndex, class: usize, override_running: bool) -> Option<AddOutcome> {
		let doc = self.documents.get(id)?;
		let t = doc.snapshot().text_index(flat)?;
		doc.enqueue(class, t, false, override_running)
	}

	/// Drops cached results of one paragraph and schedules it again.
	pub fn invalidate(&self, id: &DocId, flat: FlatIndex) -> bool {
		self.documents.get(id).is_some_and(|doc| doc.invalidate(flat))
	}

	pub fn ignore_once(&self, id: &DocId, flat: FlatIndex, rule_id: &str, pos: CharIdx) -> bool {
		self.documents.get(id).is_some_and(|doc| doc.ignore_once(flat, rule_id, pos))
	}

	/// Forgets every cached result and reinitializes the rule engine.
	pub fn reset(&self) {
		if self.scheduler.is_some() {
			self.queue.reset();
			return;
		}
		self.strategy.reset();
		for doc in self.documents.all() {
			doc.clear_caches();
		}
	}

	pub fn worker_status(&self) -> Option<WorkerRecord> {
		self.scheduler.as_ref().and_then(RecheckScheduler::status)
	}

	/// Number of queued rechecks.
	pub fn pending(&self) -> usize {
		self.queue.len()
	}

	/// Persists open documents, stops the worker and tears down shared state.
	/// Idempotent.
	pub fn shutdown(&self) {
		if self.stopped.swap(true, Ordering::AcqRel) {
			return;
		}
		for doc in self.documents.all() {
			self.persist(&doc);
		}
		match &self.scheduler {
			Some(scheduler) => scheduler.shutdown(),
			None => self.queue.stop(),
		}
		for doc in self.documents.all() {
			doc.dispose();
		}
		self.ctx.teardown();
		tracing::info!("engine.shutdown");
	}
}

impl Drop for CheckEngine {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl std::fmt::Debug for CheckEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CheckEngine")
			.field("documents", &self.documents.len())
			.field("pending", &self.queue.len())
			.field("scheduler", &self.scheduler)
			.finish_non_exhaustive()
	}
}
