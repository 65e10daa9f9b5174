use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use lectern_primitives::{FlatIndex, Locale, RuleMatch};

use super::*;
use crate::config::{CheckConfig, EngineMode};
use crate::context::MemoryProbe;
use crate::detector::CheckRequest;
use crate::document::SingleDocument;
use crate::error::EngineError;
use crate::host::RuleEngine;
use crate::notify::NotificationSink;
use crate::strategy::strategy_for;
use crate::test_support::{FakeHost, WordEngine, en};

struct Fixed(Option<u64>);

impl MemoryProbe for Fixed {
	fn available_bytes(&self) -> Option<u64> {
		self.0
	}
}

#[derive(Default)]
struct Collect(Mutex<Vec<String>>);

impl NotificationSink for Collect {
	fn notify(&self, message: &str) {
		self.0.lock().push(message.to_string());
	}
}

struct Panicky;

impl RuleEngine for Panicky {
	fn check(&self, _text: &str, _locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError> {
		if rule_class == 1 {
			panic!("rule crashed");
		}
		Ok(Vec::new())
	}
}

/// Blocks the next text-level check once armed.
struct Armed {
	inner: WordEngine,
	armed: AtomicBool,
	entered: Barrier,
	release: Barrier,
}

impl RuleEngine for Armed {
	fn check(&self, text: &str, locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError> {
		if rule_class > 0 && self.armed.swap(false, Ordering::SeqCst) {
			self.entered.wait();
			self.release.wait();
		}
		self.inner.check(text, locale, rule_class)
	}
}

struct Harness {
	host: Arc<FakeHost>,
	doc: Arc<SingleDocument>,
	queue: Arc<RecheckQueue>,
	sink: Arc<Collect>,
	scheduler: RecheckScheduler,
}

fn config(classes: &[i32], idle_fill: bool) -> CheckConfig {
	CheckConfig {
		rule_classes: classes.to_vec(),
		idle_fill,
		..CheckConfig::default()
	}
}

fn harness(texts: &[&str], config: CheckConfig, engine: Arc<dyn RuleEngine>, memory: Option<u64>) -> Harness {
	let sink = Arc::new(Collect::default());
	let ctx = Arc::new(
		CheckContext::new(config)
			.unwrap()
			.with_memory_probe(Arc::new(Fixed(memory)))
			.with_notification_sink(sink.clone()),
	);
	let host = Arc::new(FakeHost::with_texts(texts));
	let queue = Arc::new(RecheckQueue::new(Duration::from_millis(50)));
	let strategy = strategy_for(EngineMode::Local, engine, 15);
	let doc = Arc::new(SingleDocument::new(
		DocId::new("doc"),
		host.clone(),
		Arc::clone(&ctx),
		Arc::clone(&strategy),
		Some(Arc::clone(&queue)),
	));
	assert!(doc.refresh());
	let documents = Arc::new(OpenDocuments::new());
	documents.insert(Arc::clone(&doc));
	let scheduler = RecheckScheduler::start(Arc::clone(&queue), documents, ctx, strategy, WorkerRegistry::new()).unwrap();
	Harness {
		host,
		doc,
		queue,
		sink,
		scheduler,
	}
}

fn wait_until(what: &str, mut f: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while !f() {
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		std::thread::sleep(Duration::from_millis(5));
	}
}

fn at(text: &str, flat: usize) -> CheckRequest {
	CheckRequest::new(text, en()).with_hint(FlatIndex(flat))
}

#[test]
fn worker_runs_queued_entries_and_marks_host() {
	let h = harness(
		&["Alpha one.", "Alpha two."],
		config(&[0, 1], false),
		Arc::new(WordEngine::new("Helo")),
		None,
	);
	h.doc.check(&at("Alpha two.", 1));
	wait_until("markup", || !h.host.marks.lock().is_empty());

	let marks = h.host.take_marks();
	assert_eq!(marks[0].0, FlatIndex(1));
	assert_eq!(&*marks[0].1[0].rule_id, "REPEAT");

	h.scheduler.shutdown();
	let status = h.scheduler.status().unwrap();
	assert_eq!(status.state, WorkerState::Stopped);
	assert_eq!(status.processed, 1);
}

#[test]
fn idle_fill_checks_every_paragraph() {
	let h = harness(
		&["Alpha one.", "Helo two.", "Beta three."],
		config(&[0, 1], true),
		Arc::new(WordEngine::new("Helo")),
		None,
	);
	wait_until("full coverage", || {
		(0..2).all(|class| {
			let cache = h.doc.caches().class(class).unwrap().read();
			(0..3).all(|p| cache.has_paragraph(p))
		})
	});
	assert_eq!(h.doc.markup(FlatIndex(1)).len(), 1);
	h.scheduler.shutdown();
}

#[test]
fn low_memory_skips_execution() {
	let config = CheckConfig {
		heap_check_interval: 1,
		..config(&[0, 1], true)
	};
	let h = harness(&["Alpha one.", "Alpha two."], config, Arc::new(WordEngine::new("Helo")), Some(0));
	wait_until("throttle", || h.scheduler.status().is_some_and(|s| s.state == WorkerState::Throttled));

	h.doc.check(&at("Alpha two.", 1));
	wait_until("skipped entry", || h.scheduler.status().is_some_and(|s| s.skipped >= 2));
	assert!(h.doc.caches().class(1).unwrap().read().is_empty());
	assert!(h.queue.is_empty());
	h.scheduler.shutdown();
}

#[test]
fn reset_clears_document_caches() {
	let h = harness(&["Helo x."], config(&[0], false), Arc::new(WordEngine::new("Helo")), None);
	assert_eq!(h.doc.check(&at("Helo x.", 0)).matches.len(), 1);
	assert!(h.doc.caches().class(0).unwrap().read().has_paragraph(0));

	h.queue.reset();
	wait_until("reset", || !h.doc.caches().class(0).unwrap().read().has_paragraph(0));
	h.scheduler.shutdown();
}

#[test]
fn engine_panic_is_reported_and_worker_survives() {
	let h = harness(&["Alpha one.", "Alpha two."], config(&[0, 1], false), Arc::new(Panicky), None);
	h.doc.check(&at("Alpha two.", 1));
	wait_until("notification", || !h.sink.0.lock().is_empty());
	assert_eq!(*h.sink.0.lock(), ["background check failed: rule crashed"]);
	wait_until("record", || h.scheduler.status().is_some_and(|s| s.last_exit.is_some()));
	assert_eq!(h.scheduler.status().unwrap().last_exit.as_deref(), Some("rule crashed"));

	h.doc.invalidate(FlatIndex(0));
	wait_until("second attempt", || h.scheduler.status().is_some_and(|s| s.skipped >= 2));
	h.scheduler.shutdown();
	h.scheduler.shutdown();
	assert_eq!(h.scheduler.status().unwrap().state, WorkerState::Stopped);
}

fn has_repeat(doc: &SingleDocument, flat: usize) -> bool {
	doc.markup(FlatIndex(flat)).iter().any(|m| &*m.rule_id == "REPEAT")
}

#[test]
fn edit_while_running_is_rechecked() {
	let engine = Arc::new(Armed {
		inner: WordEngine::new("Helo"),
		armed: AtomicBool::new(false),
		entered: Barrier::new(2),
		release: Barrier::new(2),
	});
	let h = harness(&["Foo a.", "Bar b.", "Bar c."], config(&[0, 1], false), engine.clone(), None);
	h.doc.check(&at("Bar c.", 2));
	wait_until("repeated start", || has_repeat(&h.doc, 2));
	wait_until("idle queue", || h.queue.is_empty() && h.queue.running().is_none());

	engine.armed.store(true, Ordering::SeqCst);
	h.host.edit(1, "Bar b2.");
	h.doc.check(&at("Bar b2.", 1));
	engine.entered.wait();
	h.host.edit(1, "Qux b.");
	h.doc.check(&at("Qux b.", 1));
	engine.release.wait();

	wait_until("stale match dropped", || !has_repeat(&h.doc, 2));
	wait_until("drained", || h.queue.is_empty() && h.queue.running().is_none());
	assert!(!has_repeat(&h.doc, 2));
	assert!(h.doc.caches().class(1).unwrap().read().has_paragraph(2));
	h.scheduler.shutdown();
}

#[test]
fn document_registered_later_is_filled_after_wake() {
	let ctx = Arc::new(CheckContext::new(config(&[0, 1], true)).unwrap().with_memory_probe(Arc::new(Fixed(None))));
	let queue = Arc::new(RecheckQueue::new(Duration::from_millis(50)));
	let strategy = strategy_for(EngineMode::Local, Arc::new(WordEngine::new("Helo")), 15);
	let documents = Arc::new(OpenDocuments::new());
	let scheduler = RecheckScheduler::start(
		Arc::clone(&queue),
		Arc::clone(&documents),
		Arc::clone(&ctx),
		Arc::clone(&strategy),
		WorkerRegistry::new(),
	)
	.unwrap();
	wait_until("worker asleep", || scheduler.status().is_some());
	std::thread::sleep(Duration::from_millis(20));

	let doc = Arc::new(SingleDocument::new(
		DocId::new("late"),
		Arc::new(FakeHost::with_texts(&["Same start.", "Same end."])),
		ctx,
		strategy,
		Some(Arc::clone(&queue)),
	));
	assert!(doc.refresh());
	documents.insert(Arc::clone(&doc));
	queue.wake();
	wait_until("idle fill", || has_repeat(&doc, 1));
	scheduler.shutdown();
}
