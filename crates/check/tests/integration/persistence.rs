use std::path::Path;
use std::sync::Arc;

use lectern_check::{CheckConfig, CheckContext, CheckEngine, CheckRequest, PersistConfig};
use lectern_primitives::{DocId, FlatIndex};
use pretty_assertions::assert_eq;

use crate::common::{MemoryHost, Speller, config, en, init_tracing};

const TEXTS: [&str; 3] = ["Helo world.", "Nothing wrong here.", "Fix teh typo."];

fn persisting_engine(dir: &Path, speller: Arc<Speller>) -> CheckEngine {
	init_tracing();
	let config = CheckConfig {
		use_queue: false,
		persist: PersistConfig {
			enabled: true,
			dir: Some(dir.to_path_buf()),
			min_characters: 1,
		},
		..config(&[0])
	};
	CheckEngine::new(CheckContext::new(config).unwrap(), speller).unwrap()
}

fn check_all(engine: &CheckEngine, id: &DocId) -> Vec<usize> {
	TEXTS
		.iter()
		.enumerate()
		.map(|(flat, text)| {
			engine
				.get_check_results(id, &CheckRequest::new(*text, en()).with_hint(FlatIndex(flat)))
				.matches
				.len()
		})
		.collect()
}

#[test]
fn closed_document_reopens_warm() {
	let cache_dir = tempfile::tempdir().unwrap();
	let doc_path = cache_dir.path().join("book.odt");
	let speller = Speller::new();
	let engine = persisting_engine(cache_dir.path(), Arc::clone(&speller));
	let id = DocId::new("book");

	engine.open_document(id.clone(), MemoryHost::at_path(&TEXTS, &doc_path));
	assert_eq!(check_all(&engine, &id), [1, 0, 1]);
	assert!(engine.close_document(&id));
	speller.clear();

	let doc = engine.open_document(id.clone(), MemoryHost::at_path(&TEXTS, &doc_path));
	assert_eq!(doc.caches().class(0).unwrap().read().paragraph_count(), 3);
	assert_eq!(check_all(&engine, &id), [1, 0, 1]);
	assert!(speller.texts(0).is_empty());
}

#[test]
fn edited_document_starts_cold() {
	let cache_dir = tempfile::tempdir().unwrap();
	let doc_path = cache_dir.path().join("book.odt");
	let speller = Speller::new();
	let engine = persisting_engine(cache_dir.path(), Arc::clone(&speller));
	let id = DocId::new("book");

	engine.open_document(id.clone(), MemoryHost::at_path(&TEXTS, &doc_path));
	check_all(&engine, &id);
	engine.close_document(&id);

	let edited = ["Hello world.", TEXTS[1], TEXTS[2]];
	let doc = engine.open_document(id.clone(), MemoryHost::at_path(&edited, &doc_path));
	assert!(doc.caches().class(0).unwrap().read().is_empty());
}

#[test]
fn shutdown_persists_open_documents() {
	let cache_dir = tempfile::tempdir().unwrap();
	let doc_path = cache_dir.path().join("notes.odt");
	let id = DocId::new("notes");
	{
		let engine = persisting_engine(cache_dir.path(), Speller::new());
		engine.open_document(id.clone(), MemoryHost::at_path(&TEXTS, &doc_path));
		check_all(&engine, &id);
	}

	let speller = Speller::new();
	let engine = persisting_engine(cache_dir.path(), Arc::clone(&speller));
	engine.open_document(id.clone(), MemoryHost::at_path(&TEXTS, &doc_path));
	assert_eq!(check_all(&engine, &id), [1, 0, 1]);
	assert!(speller.texts(0).is_empty());
}
