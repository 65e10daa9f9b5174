use std::sync::Arc;

use lectern_check::{CheckConfig, CheckEngine, CheckRequest};
use lectern_primitives::{DocId, FlatIndex, RuleMatch};
use pretty_assertions::assert_eq;

use crate::common::{MemoryHost, Speller, en, foreground_engine, init_tracing};

fn request(text: &str) -> CheckRequest {
	CheckRequest::new(text, en())
}

fn spans(matches: &[RuleMatch]) -> Vec<(usize, usize, String)> {
	matches.iter().map(|m| (m.start, m.length, m.rule_id.to_string())).collect()
}

#[test]
fn edit_invalidates_only_the_edited_paragraph() {
	let speller = Speller::new();
	let engine = foreground_engine(&[0], Arc::clone(&speller));
	let host = MemoryHost::new(&["Helo world.", "This is fine."]);
	let id = DocId::new("letter");
	let doc = engine.open_document(id.clone(), host.clone());

	let first = engine.get_check_results(&id, &request("Helo world.").with_hint(FlatIndex(0)));
	assert_eq!(spans(&first.matches), [(0, 4, "SPELLING".to_string())]);
	assert_eq!(first.matches[0].suggestions.as_slice(), ["Hello".to_string()]);
	assert_eq!((first.sentence_start, first.sentence_end), (0, 11));
	assert!(doc.caches().class(0).unwrap().read().has_paragraph(0));

	let second = engine.get_check_results(&id, &request("This is fine.").with_hint(FlatIndex(1)));
	assert!(second.matches.is_empty());

	host.edit(0, "Hello world.");
	let edited = engine.get_check_results(&id, &request("Hello world.").with_hint(FlatIndex(0)));
	assert!(edited.matches.is_empty());
	assert_eq!(doc.caches().class(0).unwrap().read().paragraph_matches(1), Some(vec![]));
	assert_eq!(speller.texts(0), ["Helo world.", "This is fine.", "Hello world."]);
}

#[test]
fn inserted_paragraph_shifts_cached_results() {
	let speller = Speller::new();
	let engine = foreground_engine(&[0, 1], Arc::clone(&speller));
	let texts = ["Helo one.", "Fine two.", "Three teh."];
	let host = MemoryHost::new(&texts);
	let id = DocId::new("essay");
	let doc = engine.open_document(id.clone(), host.clone());
	for (flat, text) in texts.iter().enumerate() {
		engine.get_check_results(&id, &request(text).with_hint(FlatIndex(flat)));
	}
	speller.clear();

	host.insert(1, "New wrold.");
	let result = engine.get_check_results(&id, &request("New wrold."));
	assert_eq!(result.paragraph, Some(FlatIndex(1)));
	assert_eq!(spans(&result.matches), [(4, 5, "SPELLING".to_string())]);

	// sentence-level results of the old paragraphs moved instead of being recomputed
	assert_eq!(speller.texts(0), ["New wrold."]);
	let class0 = doc.caches().class(0).unwrap().read().clone();
	assert_eq!(class0.paragraph_matches(0).map(|m| spans(&m)), Some(vec![(0, 4, "SPELLING".to_string())]));
	assert_eq!(class0.paragraph_matches(2), Some(vec![]));
	assert_eq!(class0.paragraph_matches(3).map(|m| spans(&m)), Some(vec![(6, 3, "SPELLING".to_string())]));
	assert_eq!(speller.texts(1).len(), 1);
}

#[test]
fn repeated_paragraph_start_is_found_across_paragraphs() {
	let speller = Speller::new();
	let engine = foreground_engine(&[0, 1], Arc::clone(&speller));
	let host = MemoryHost::new(&["Then we left.", "Then we came back."]);
	let id = DocId::new("story");
	engine.open_document(id.clone(), host);

	let result = engine.get_check_results(&id, &request("Then we came back.").with_hint(FlatIndex(1)));
	assert_eq!(spans(&result.matches), [(0, 4, "REPEATED_START".to_string())]);
}

#[test]
fn text_outside_the_document_is_checked_standalone() {
	let speller = Speller::new();
	let engine = foreground_engine(&[0], Arc::clone(&speller));
	let id = DocId::new("notes");
	engine.open_document(id.clone(), MemoryHost::new(&["First.", "Second."]));

	let result = engine.get_check_results(&id, &request("A teh cat."));
	assert_eq!(result.paragraph, None);
	assert_eq!(spans(&result.matches), [(2, 3, "SPELLING".to_string())]);
	engine.get_check_results(&id, &request("A teh cat."));
	assert_eq!(speller.texts(0), ["A teh cat."]);
}

#[test]
fn ignored_match_is_hidden_until_the_paragraph_changes() {
	let engine = foreground_engine(&[0], Speller::new());
	let host = MemoryHost::new(&["Helo there."]);
	let id = DocId::new("memo");
	engine.open_document(id.clone(), host.clone());
	let ask = |text: &str| engine.get_check_results(&id, &request(text).with_hint(FlatIndex(0)));

	assert_eq!(ask("Helo there.").matches.len(), 1);
	assert!(engine.ignore_once(&id, FlatIndex(0), "SPELLING", 0));
	assert!(ask("Helo there.").matches.is_empty());
	assert_eq!(host.marks_for(0), Some(vec![]));

	host.edit(0, "Helo there!");
	assert_eq!(ask("Helo there!").matches.len(), 1);
}

#[test]
fn unknown_document_has_no_matches() {
	let engine = foreground_engine(&[0], Speller::new());
	let result = engine.get_check_results(&DocId::new("missing"), &request("Helo."));
	assert!(result.matches.is_empty());
	assert_eq!(result.sentence_end, 5);
	assert!(!engine.invalidate(&DocId::new("missing"), FlatIndex(0)));
	assert!(!engine.close_document(&DocId::new("missing")));
}

#[test]
fn reset_forgets_cached_results() {
	let speller = Speller::new();
	let engine = foreground_engine(&[0], Arc::clone(&speller));
	let id = DocId::new("draft");
	let doc = engine.open_document(id.clone(), MemoryHost::new(&["Helo."]));
	engine.get_check_results(&id, &request("Helo.").with_hint(FlatIndex(0)));

	engine.reset();
	assert!(doc.caches().class(0).unwrap().read().is_empty());
	engine.get_check_results(&id, &request("Helo.").with_hint(FlatIndex(0)));
	assert_eq!(speller.texts(0).len(), 2);
}

#[test]
fn engine_starts_from_a_config_file() {
	init_tracing();
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("lectern.toml");
	std::fs::write(
		&path,
		"rule_classes = [0, 1]\nuse_queue = false\nidle_fill = false\n\n[persist]\nenabled = false\n",
	)
	.unwrap();
	let config = CheckConfig::load(&path).unwrap();
	let engine = CheckEngine::from_config(config, Speller::new()).unwrap();
	assert!(engine.worker_status().is_none());

	let id = DocId::new("from-file");
	engine.open_document(id.clone(), MemoryHost::new(&["So it begins.", "So it ends."]));
	let result = engine.get_check_results(&id, &request("So it ends.").with_hint(FlatIndex(1)));
	assert_eq!(spans(&result.matches), [(0, 2, "REPEATED_START".to_string())]);
	engine.shutdown();
	engine.shutdown();
}
