//! Per-document checking state and the foreground check path.
//!
//! # Role
//!
//! [`SingleDocument`] owns everything the engine knows about one open
//! document: the paragraph snapshot, one [`MatchCache`] per rule class, the
//! ignore-once set and the position detector. The host calls
//! [`SingleDocument::check`] synchronously; the recheck worker calls
//! [`SingleDocument::run_entry`] for queued text-level work.
//!
//! # Invariants
//!
//! - Cached offsets are in host coordinates: footnote anchors are counted.
//! - Background results are stored only if the snapshot generation they were
//!   computed from is still current when the cache write lock is held.
//! - Every public method returns early once the document is disposed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lectern_primitives::{CharIdx, DocId, FlatIndex, Locale, RuleMatch, TextIndex, TextRange};
use lectern_worker::{GenerationClock, GenerationToken};
use parking_lot::{Mutex, RwLock};

use crate::context::{CheckContext, DebugFlags};
use crate::detector::{Analysis, ChangeDetector, CheckRequest, Recheck, RequestKind, Tracked};
use crate::footnotes::{restore_offsets, strip_footnotes};
use crate::host::DocumentAccessor;
use crate::ignored::IgnoredMatches;
use crate::match_cache::{CacheSet, MatchCache};
use crate::queue::{AddOutcome, QueueEntry, RecheckQueue};
use crate::snapshot::{DocumentCache, MANUAL_LINEBREAK, ParagraphSnapshot, SnapshotParagraph};
use crate::strategy::CheckStrategy;


/// Matches for the sentence the host asked about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
	pub matches: Vec<RuleMatch>,
	pub sentence_start: CharIdx,
	/// Start of the next sentence, or the paragraph length.
	pub sentence_end: CharIdx,
	/// `None` when the paragraph could not be placed in the document.
	pub paragraph: Option<FlatIndex>,
}

/// Result of running one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
	/// Results stored; `changed` paragraphs had their markup refreshed.
	Completed { changed: usize },
	/// The token was cancelled before the results were stored.
	Interrupted,
	/// The snapshot moved on while the engine ran.
	Stale,
	/// Disposed document, unknown class or a range past the end.
	Skipped,
}

/// Matches for the most recent paragraph that could not be placed.
struct Standalone {
	text: String,
	locale: Locale,
	cache: MatchCache,
}

/// One paragraph's matches ready to be stored.
struct Checked {
	flat: FlatIndex,
	matches: Vec<RuleMatch>,
	sentence_ends: Vec<CharIdx>,
}

pub struct SingleDocument {
	id: DocId,
	host: Arc<dyn DocumentAccessor>,
	ctx: Arc<CheckContext>,
	strategy: Arc<dyn CheckStrategy>,
	queue: Option<Arc<RecheckQueue>>,
	snapshot: DocumentCache,
	caches: CacheSet,
	ignored: RwLock<IgnoredMatches>,
	detector: Mutex<ChangeDetector>,
	standalone: Mutex<Option<Standalone>>,
	disposed: AtomicBool,
}

impl SingleDocument {
	pub fn new(
		id: DocId,
		host: Arc<dyn DocumentAccessor>,
		ctx: Arc<CheckContext>,
		strategy: Arc<dyn CheckStrategy>,
		queue: Option<Arc<RecheckQueue>>,
	) -> Self {
		let classes = ctx.classes().len();
		Self {
			id,
			host,
			strategy,
			queue,
			snapshot: DocumentCache::new(GenerationClock::new()),
			caches: CacheSet::new(classes),
			ignored: RwLock::new(IgnoredMatches::new()),
			detector: Mutex::new(ChangeDetector::new()),
			standalone: Mutex::new(None),
			disposed: AtomicBool::new(false),
			ctx,
		}
	}

	pub fn id(&self) -> &DocId {
		&self.id
	}

	pub fn host(&self) -> &dyn DocumentAccessor {
		self.host.as_ref()
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}

	/// Marks the document closed. Later calls become no-ops.
	pub fn dispose(&self) {
		if !self.disposed.swap(true, Ordering::AcqRel) {
			tracing::debug!(doc = %self.id, "document.dispose");
		}
	}

	pub fn snapshot(&self) -> Arc<ParagraphSnapshot> {
		self.snapshot.load()
	}

	/// Re-reads every paragraph from the host. Returns false when the host failed.
	pub fn refresh(&self) -> bool {
		if self.is_disposed() {
			return false;
		}
		let Some(snapshot) = self.snapshot.refresh(self.host.as_ref()) else {
			return false;
		};
		if self.ctx.debug(DebugFlags::SNAPSHOT) {
			for (t, flat) in (0..snapshot.text_len()).filter_map(|t| snapshot.flat_index(TextIndex(t)).map(|f| (t, f))) {
				tracing::debug!(doc = %self.id, text = t, %flat, "snapshot.mapping");
			}
		}
		true
	}

	pub fn caches(&self) -> &CacheSet {
		&self.caches
	}

	pub fn ignored(&self) -> &RwLock<IgnoredMatches> {
		&self.ignored
	}

	fn tracked(&self) -> Tracked<'_> {
		Tracked {
			host: self.host.as_ref(),
			snapshot: &self.snapshot,
			caches: &self.caches,
			ignored: &self.ignored,
			classes: self.ctx.classes(),
			change_radius: self.ctx.config().change_radius(),
			trace: self.ctx.debug(DebugFlags::DETECTOR),
		}
	}

	/// Synchronous check of one sentence.
	pub fn check(&self, request: &CheckRequest) -> CheckResult {
		let text_len = request.text.chars().count();
		if self.is_disposed() {
			return CheckResult {
				sentence_start: request.sentence_start,
				sentence_end: text_len,
				..CheckResult::default()
			};
		}

		let analysis = self.detector.lock().analyze(&self.tracked(), request);
		if analysis.text_changed
			&& let Some(queue) = &self.queue
		{
			queue.interrupt(&self.id, false);
		}
		let queued = self.ctx.use_queue() && self.queue.is_some() && request.kind != RequestKind::Dialog;
		self.schedule_rechecks(&analysis, queued);

		let Some(flat) = analysis.paragraph else {
			return self.check_standalone(request);
		};
		let snapshot = self.snapshot.load();
		let Some(paragraph) = snapshot.paragraph(flat).cloned() else {
			return self.check_standalone(request);
		};
		let text_index = snapshot.text_index(flat);

		for (class, &size) in self.ctx.classes().iter().enumerate() {
			if !self.strategy.has_rules_for_class(class) {
				continue;
			}
			let Some(cache) = self.caches.class(class) else {
				continue;
			};
			if cache.read().has_paragraph(flat.get()) {
				continue;
			}
			match text_index {
				Some(t) if size.is_text_level() => {
					if queued {
						self.enqueue(class, t, false, false);
					} else if let Some(range) = snapshot.check_range(t, size, false) {
						self.run_range(class, range, None, Some(flat));
					}
				}
				_ => {
					self.check_paragraph(&snapshot, flat, &paragraph, class);
				}
			}
		}

		let (sentence_start, sentence_end) = self
			.caches
			.class(0)
			.and_then(|cache| cache.read().sentence_bounds(flat.get(), request.sentence_start))
			.unwrap_or((request.sentence_start, text_len));
		let mut matches: Vec<RuleMatch> = self
			.caches
			.merged(flat.get())
			.into_iter()
			.filter(|m| m.start >= sentence_start && m.start < sentence_end)
			.collect();
		self.ignored.read().filter(flat.get(), &mut matches);
		tracing::trace!(
			doc = %self.id,
			%flat,
			sentence_start,
			sentence_end,
			matches = matches.len(),
			"document.check"
		);
		CheckResult {
			matches,
			sentence_start,
			sentence_end,
			paragraph: Some(flat),
		}
	}

	/// Queues or runs the text-level rechecks the detector asked for.
	fn schedule_rechecks(&self, analysis: &Analysis, queued: bool) {
		if analysis.rechecks.is_empty() {
			return;
		}
		let snapshot = self.snapshot.load();
		for (class, range) in self.recheck_ranges(&snapshot, &analysis.rechecks) {
			if queued {
				self.add_entry(class, range);
			} else {
				self.run_range(class, range, None, analysis.paragraph);
			}
		}
	}

	/// One covering range per class: the union of every recheck's context window.
	fn recheck_ranges(&self, snapshot: &ParagraphSnapshot, rechecks: &[Recheck]) -> Vec<(usize, TextRange)> {
		let classes = self.ctx.classes();
		let mut out: Vec<(usize, TextRange)> = Vec::new();
		for recheck in rechecks {
			let Some(&size) = classes.get(recheck.class) else {
				continue;
			};
			let Some(range) = snapshot.check_range(recheck.paragraph, size, true) else {
				continue;
			};
			match out.iter_mut().find(|(class, _)| *class == recheck.class) {
				Some((_, covering)) => {
					if let Some(union) = TextRange::new(covering.start().min(range.start()), covering.end().max(range.end())) {
						*covering = union;
					}
				}
				None => out.push((recheck.class, range)),
			}
		}
		out
	}

	/// Checks a paragraph on its own with one rule class and caches the result.
	fn check_paragraph(&self, snapshot: &ParagraphSnapshot, flat: FlatIndex, paragraph: &SnapshotParagraph, class: usize) {
		let text = engine_text(&paragraph.text, &paragraph.footnotes);
		let matches = match self.strategy.check(&text, &paragraph.locale, class) {
			Ok(matches) => matches,
			Err(error) => {
				self.report_engine_error(&error);
				Vec::new()
			}
		};
		let matches = matches.into_iter().map(|m| restore_offsets(m, &paragraph.footnotes)).collect();
		let sentence_ends = self.strategy.sentence_ends(&paragraph.text, &paragraph.locale);
		let Some(cache) = self.caches.class(class) else {
			return;
		};
		let mut cache = cache.write();
		if self.snapshot.load().generation() != snapshot.generation() {
			tracing::debug!(doc = %self.id, %flat, class, "document.check.stale");
			return;
		}
		cache.put_paragraph(flat.get(), matches, &sentence_ends);
		if self.ctx.debug(DebugFlags::CACHE) {
			tracing::debug!(doc = %self.id, %flat, class, "cache.store.paragraph");
		}
	}

	/// Checks text the snapshot does not know, keeping one paragraph of results.
	fn check_standalone(&self, request: &CheckRequest) -> CheckResult {
		let mut standalone = self.standalone.lock();
		let reuse = standalone
			.as_ref()
			.is_some_and(|s| s.text == request.text && s.locale == request.locale);
		if !reuse {
			let text = engine_text(&request.text, &request.footnotes);
			let matches = match self.strategy.check(&text, &request.locale, 0) {
				Ok(matches) => matches,
				Err(error) => {
					self.report_engine_error(&error);
					Vec::new()
				}
			};
			let mut cache = MatchCache::new();
			cache.put_paragraph(
				0,
				matches.into_iter().map(|m| restore_offsets(m, &request.footnotes)).collect(),
				&self.strategy.sentence_ends(&request.text, &request.locale),
			);
			tracing::debug!(doc = %self.id, "document.check.standalone");
			*standalone = Some(Standalone {
				text: request.text.clone(),
				locale: request.locale.clone(),
				cache,
			});
		}
		let text_len = request.text.chars().count();
		let Some(cache) = standalone.as_ref().map(|s| &s.cache) else {
			return CheckResult::default();
		};
		let (sentence_start, sentence_end) = cache
			.sentence_bounds(0, request.sentence_start)
			.unwrap_or((request.sentence_start, text_len));
		CheckResult {
			matches: cache.matches_in_range(0, sentence_start, sentence_end).unwrap_or_default(),
			sentence_start,
			sentence_end,
			paragraph: None,
		}
	}

	fn report_engine_error(&self, error: &crate::error::EngineError) {
		tracing::warn!(doc = %self.id, %error, "document.engine.failed");
		self.ctx.notifier().notify_once(error.to_string());
	}

	/// Runs one queued recheck.
	pub fn run_entry(&self, entry: &QueueEntry, token: &GenerationToken) -> EntryOutcome {
		self.run_range(entry.class, entry.range, Some(token), None)
	}

	/// Checks the text paragraphs of `range` as one text with one rule class
	/// and stores the results of every paragraph in it.
	///
	/// Paragraphs whose results changed get their markup refreshed, except
	/// `skip_mark`, which the caller is about to report itself.
	fn run_range(&self, class: usize, range: TextRange, token: Option<&GenerationToken>, skip_mark: Option<FlatIndex>) -> EntryOutcome {
		if self.is_disposed() {
			return EntryOutcome::Skipped;
		}
		let snapshot = self.snapshot.load();
		let (Some(cache), Some(doc_text)) = (self.caches.class(class), snapshot.doc_text(range)) else {
			tracing::debug!(doc = %self.id, class, start = range.start(), end = range.end(), "document.run.skipped");
			return EntryOutcome::Skipped;
		};
		let flats: Vec<FlatIndex> = range.iter().filter_map(|t| snapshot.flat_index(TextIndex(t))).collect();
		let (Some(&first), Some(&last)) = (flats.first(), flats.last()) else {
			return EntryOutcome::Skipped;
		};
		let locale = snapshot.paragraph(first).map(|p| p.locale.clone()).unwrap_or_default();

		let matches = match self.strategy.check(&doc_text.text, &locale, class) {
			Ok(matches) => matches,
			Err(error) => {
				self.report_engine_error(&error);
				Vec::new()
			}
		};

		let mut checked = Vec::with_capacity(flats.len());
		for (i, &flat) in flats.iter().enumerate() {
			if token.is_some_and(GenerationToken::is_cancelled) {
				tracing::debug!(doc = %self.id, class, %flat, "document.run.interrupted");
				return EntryOutcome::Interrupted;
			}
			let Some(paragraph) = snapshot.paragraph(flat) else {
				return EntryOutcome::Skipped;
			};
			let (start, len) = (doc_text.starts[i], doc_text.lengths[i]);
			let local = matches
				.iter()
				.filter(|m| m.start >= start && m.start < start + len)
				.map(|m| {
					let mut local = m.shifted(-(start as isize));
					local.length = local.length.min(len - local.start);
					restore_offsets(local, &paragraph.footnotes)
				})
				.collect();
			checked.push(Checked {
				flat,
				matches: local,
				sentence_ends: self.strategy.sentence_ends(&paragraph.text, &paragraph.locale),
			});
		}

		let changed: Vec<usize> = {
			let mut cache = cache.write();
			if token.is_some_and(GenerationToken::is_cancelled) {
				return EntryOutcome::Interrupted;
			}
			if self.snapshot.load().generation() != snapshot.generation() {
				tracing::debug!(doc = %self.id, class, generation = snapshot.generation(), "document.run.stale");
				return EntryOutcome::Stale;
			}
			let span = first.get()..last.get() + 1;
			let before = cache.slice(span.clone());
			for Checked {
				flat,
				matches,
				sentence_ends,
			} in checked
			{
				cache.put_paragraph(flat.get(), matches, &sentence_ends);
			}
			before.difference(&cache.slice(span)).into_iter().collect()
		};
		if self.ctx.debug(DebugFlags::CACHE) {
			tracing::debug!(
				doc = %self.id,
				class,
				start = range.start(),
				end = range.end(),
				changed = changed.len(),
				"cache.store.range"
			);
		}

		let mut marked = 0;
		for flat in changed.into_iter().map(FlatIndex) {
			if Some(flat) != skip_mark && self.remark(flat) {
				marked += 1;
			}
		}
		EntryOutcome::Completed { changed: marked }
	}

	/// Matches of every class for `flat`, minus ignored ones.
	pub fn markup(&self, flat: FlatIndex) -> Vec<RuleMatch> {
		let mut matches = self.caches.merged(flat.get());
		self.ignored.read().filter(flat.get(), &mut matches);
		matches
	}

	/// Pushes the current markup of `flat` to the host. Returns false on host failure.
	pub fn remark(&self, flat: FlatIndex) -> bool {
		if self.is_disposed() {
			return false;
		}
		match self.host.mark_paragraph(flat, &self.markup(flat)) {
			Ok(()) => true,
			Err(error) => {
				tracing::warn!(doc = %self.id, %flat, %error, "document.mark.failed");
				false
			}
		}
	}

	/// Queues the context window of text paragraph `t` for `class`.
	pub fn enqueue(&self, class: usize, t: TextIndex, changed: bool, override_running: bool) -> Option<AddOutcome> {
		if self.is_disposed() {
			return None;
		}
		let size = *self.ctx.classes().get(class)?;
		let range = self.snapshot.load().check_range(t, size, changed)?;
		let mut entry = QueueEntry::new(range, class, size, self.id.clone());
		if override_running {
			entry = entry.overriding();
		}
		Some(self.queue.as_ref()?.add(entry))
	}

	fn add_entry(&self, class: usize, range: TextRange) -> Option<AddOutcome> {
		let size = *self.ctx.classes().get(class)?;
		Some(self.queue.as_ref()?.add(QueueEntry::new(range, class, size, self.id.clone())))
	}

	/// Drops cached results of `flat` and schedules it again for every class.
	pub fn invalidate(&self, flat: FlatIndex) -> bool {
		if self.is_disposed() {
			return false;
		}
		let snapshot = self.snapshot.load();
		if flat.get() >= snapshot.len() {
			return false;
		}
		self.caches.remove_paragraph(flat.get());
		if let Some(t) = snapshot.text_index(flat)
			&& self.ctx.use_queue()
		{
			for class in 0..self.caches.len() {
				self.enqueue(class, t, true, false);
			}
		}
		tracing::debug!(doc = %self.id, %flat, "document.invalidate");
		true
	}

	/// Hides one match until the paragraph changes and refreshes its markup.
	pub fn ignore_once(&self, flat: FlatIndex, rule_id: &str, pos: CharIdx) -> bool {
		if self.is_disposed() || flat.get() >= self.snapshot.load().len() {
			return false;
		}
		self.ignored.write().ignore(flat.get(), rule_id, pos);
		tracing::debug!(doc = %self.id, %flat, rule_id, pos, "document.ignore_once");
		self.remark(flat)
	}

	/// Next text paragraph not yet checked for `class`, searching forward from
	/// `from` and wrapping around.
	pub fn next_unchecked(&self, class: usize, from: usize) -> Option<QueueEntry> {
		if self.is_disposed() || !self.strategy.has_rules_for_class(class) {
			return None;
		}
		let size = *self.ctx.classes().get(class)?;
		let snapshot = self.snapshot.load();
		let len = snapshot.text_len();
		let from = if from < len { from } else { 0 };
		let cache = self.caches.class(class)?.read();
		let t = (from..len)
			.chain(0..from)
			.map(TextIndex)
			.find(|&t| snapshot.flat_index(t).is_some_and(|flat| !cache.has_paragraph(flat.get())))?;
		let range = snapshot.check_range(t, size, false)?;
		Some(QueueEntry::new(range, class, size, self.id.clone()))
	}

	/// Text paragraph under the host cursor, if it maps into the snapshot.
	pub fn cursor_text_index(&self) -> Option<TextIndex> {
		let flat = self.host.cursor().ok().flatten()?;
		self.snapshot.load().text_index(flat)
	}

	/// Forgets every cached result, e.g. after the rule set changed.
	pub fn clear_caches(&self) {
		self.caches.clear();
		*self.standalone.lock() = None;
		tracing::debug!(doc = %self.id, "document.clear_caches");
	}
}

impl std::fmt::Debug for SingleDocument {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SingleDocument")
			.field("id", &self.id)
			.field("snapshot", &self.snapshot)
			.field("classes", &self.caches.len())
			.field("disposed", &self.is_disposed())
			.finish_non_exhaustive()
	}
}

/// Documents currently open, shared by the engine and the recheck worker.
#[derive(Debug, Default)]
pub struct OpenDocuments {
	inner: RwLock<Vec<Arc<SingleDocument>>>,
}

impl OpenDocuments {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `doc`, replacing an open document with the same id.
	pub fn insert(&self, doc: Arc<SingleDocument>) -> Option<Arc<SingleDocument>> {
		let mut docs = self.inner.write();
		let previous = docs.iter().position(|d| d.id() == doc.id()).map(|i| docs.remove(i));
		docs.push(doc);
		previous
	}

	pub fn remove(&self, id: &DocId) -> Option<Arc<SingleDocument>> {
		let mut docs = self.inner.write();
		let at = docs.iter().position(|d| d.id() == id)?;
		Some(docs.remove(at))
	}

	pub fn get(&self, id: &DocId) -> Option<Arc<SingleDocument>> {
		self.inner.read().iter().find(|d| d.id() == id).cloned()
	}

	/// Every open document in opening order.
	pub fn all(&self) -> Vec<Arc<SingleDocument>> {
		self.inner.read().clone()
	}

	pub fn len(&self) -> usize {
		self.inner.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.read().is_empty()
	}
}

/// Paragraph text as the rule engine sees it.
fn engine_text(text: &str, footnotes: &[CharIdx]) -> String {
	strip_footnotes(text, footnotes).replace('\n', &MANUAL_LINEBREAK.to_string())
}
