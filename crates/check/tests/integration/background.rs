use std::sync::Arc;

use lectern_check::{CheckConfig, CheckRequest};
use lectern_primitives::{DocId, FlatIndex};
use lectern_worker::WorkerState;

use crate::common::{MemoryHost, Speller, config, en, queued_engine, wait_until};

fn has_repeat(matches: &[lectern_primitives::RuleMatch]) -> bool {
	matches.iter().any(|m| &*m.rule_id == "REPEATED_START")
}

#[test]
fn worker_marks_text_level_results() {
	let engine = queued_engine(config(&[0, 1]), Speller::new());
	let host = MemoryHost::new(&["Alpha one.", "Alpha two.", "Beta three."]);
	let id = DocId::new("report");
	engine.open_document(id.clone(), host.clone());
	let ask = || engine.get_check_results(&id, &CheckRequest::new("Alpha two.", en()).with_hint(FlatIndex(1)));

	// the foreground answers before the worker has run
	ask();
	wait_until("repeated start markup", || host.marks_for(1).is_some_and(|m| has_repeat(&m)));
	assert!(has_repeat(&ask().matches));
	assert!(engine.worker_status().is_some_and(|s| s.processed >= 1));

	assert!(engine.add_queue_entry(&id, FlatIndex(2), 1, false).is_some());
	assert_eq!(engine.add_queue_entry(&id, FlatIndex(2), 7, false), None);
	assert_eq!(engine.add_queue_entry(&id, FlatIndex(9), 1, false), None);
}

#[test]
fn idle_worker_fills_unchecked_paragraphs() {
	let config = CheckConfig {
		idle_fill: true,
		..config(&[0, 1])
	};
	let engine = queued_engine(config, Speller::new());
	let id = DocId::new("idle");
	let doc = engine.open_document(id, MemoryHost::new(&["Same start.", "Same end.", "Other."]));

	wait_until("idle fill", || has_repeat(&doc.markup(FlatIndex(1))));
	wait_until("sentence-level fill", || doc.caches().class(0).is_some_and(|c| c.read().paragraph_count() == 3));
}

#[test]
fn closing_a_document_purges_its_work() {
	let engine = queued_engine(config(&[0, -2]), Speller::new());
	let id = DocId::new("closing");
	let texts: Vec<String> = (0..50).map(|i| format!("Line {i} here.")).collect();
	let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
	let doc = engine.open_document(id.clone(), MemoryHost::new(&texts));
	engine.get_check_results(&id, &CheckRequest::new("Line 3 here.", en()).with_hint(FlatIndex(3)));

	assert!(engine.close_document(&id));
	assert!(doc.is_disposed());
	assert!(engine.document(&id).is_none());
	assert_eq!(engine.pending(), 0);
	assert!(!engine.close_document(&id));
}

#[test]
fn reopening_replaces_the_previous_document() {
	let engine = queued_engine(config(&[0]), Speller::new());
	let id = DocId::new("twice");
	let first = engine.open_document(id.clone(), MemoryHost::new(&["One."]));
	let second = engine.open_document(id.clone(), MemoryHost::new(&["Two."]));
	assert!(first.is_disposed());
	assert!(!second.is_disposed());
	assert!(engine.document(&id).is_some_and(|doc| Arc::ptr_eq(&doc, &second)));
}

#[test]
fn reset_and_shutdown_reach_the_worker() {
	let engine = queued_engine(config(&[0, 1]), Speller::new());
	let id = DocId::new("lifecycle");
	let doc = engine.open_document(id.clone(), MemoryHost::new(&["Helo there.", "Fine."]));
	engine.get_check_results(&id, &CheckRequest::new("Helo there.", en()).with_hint(FlatIndex(0)));
	assert!(doc.caches().class(0).is_some_and(|c| c.read().has_paragraph(0)));

	engine.reset();
	wait_until("reset", || doc.caches().class(0).is_some_and(|c| c.read().is_empty()));

	engine.shutdown();
	assert!(doc.is_disposed());
	assert!(engine.worker_status().is_some_and(|s| s.state == WorkerState::Stopped));
}
