//! In-memory host document and deterministic rule engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lectern_check::{
	CheckConfig, CheckContext, CheckEngine, DocumentAccessor, EngineError, HostError, HostParagraph, HostResult,
	MemoryProbe, PersistConfig, RuleEngine,
};
use lectern_primitives::{CharIdx, FlatIndex, Locale, RuleMatch};
use parking_lot::Mutex;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

pub fn en() -> Locale {
	Locale::new("en", "US")
}

/// Document held in memory; records every markup update.
#[derive(Default)]
pub struct MemoryHost {
	paragraphs: Mutex<Vec<HostParagraph>>,
	marks: Mutex<Vec<(usize, Vec<RuleMatch>)>>,
	path: Option<PathBuf>,
}

impl MemoryHost {
	pub fn new(texts: &[&str]) -> Arc<Self> {
		Arc::new(Self {
			paragraphs: Mutex::new(texts.iter().map(|t| HostParagraph::body(*t, en())).collect()),
			..Self::default()
		})
	}

	pub fn at_path(texts: &[&str], path: impl Into<PathBuf>) -> Arc<Self> {
		Arc::new(Self {
			paragraphs: Mutex::new(texts.iter().map(|t| HostParagraph::body(*t, en())).collect()),
			path: Some(path.into()),
			..Self::default()
		})
	}

	pub fn edit(&self, flat: usize, text: &str) {
		self.paragraphs.lock()[flat].text = text.to_string();
	}

	pub fn insert(&self, flat: usize, text: &str) {
		self.paragraphs.lock().insert(flat, HostParagraph::body(text, en()));
	}

	/// Latest markup pushed for `flat`.
	pub fn marks_for(&self, flat: usize) -> Option<Vec<RuleMatch>> {
		self.marks.lock().iter().rev().find(|(f, _)| *f == flat).map(|(_, m)| m.clone())
	}

	fn with<T>(&self, flat: FlatIndex, f: impl FnOnce(&HostParagraph) -> T) -> HostResult<T> {
		let paragraphs = self.paragraphs.lock();
		paragraphs.get(flat.get()).map(f).ok_or(HostError::StaleIndex {
			index: flat.get(),
			len: paragraphs.len(),
		})
	}
}

impl DocumentAccessor for MemoryHost {
	fn paragraphs(&self) -> HostResult<Vec<HostParagraph>> {
		Ok(self.paragraphs.lock().clone())
	}

	fn paragraph_count(&self) -> HostResult<usize> {
		Ok(self.paragraphs.lock().len())
	}

	fn paragraph_text(&self, flat: FlatIndex) -> HostResult<String> {
		self.with(flat, |p| p.text.clone())
	}

	fn locale(&self, flat: FlatIndex) -> HostResult<Locale> {
		self.with(flat, |p| p.locale.clone())
	}

	fn footnotes(&self, flat: FlatIndex) -> HostResult<Vec<CharIdx>> {
		self.with(flat, |p| p.footnotes.clone())
	}

	fn cursor(&self) -> HostResult<Option<FlatIndex>> {
		Ok(None)
	}

	fn path(&self) -> Option<PathBuf> {
		self.path.clone()
	}

	fn mark_paragraph(&self, flat: FlatIndex, matches: &[RuleMatch]) -> HostResult<()> {
		self.marks.lock().push((flat.get(), matches.to_vec()));
		Ok(())
	}
}

/// Class 0 flags a fixed list of misspellings; every other class flags a
/// paragraph that starts with the same word as the one before it.
#[derive(Default)]
pub struct Speller {
	calls: Mutex<Vec<(String, usize)>>,
}

const MISSPELLINGS: &[(&str, &str)] = &[("Helo", "Hello"), ("teh", "the"), ("wrold", "world")];

impl Speller {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Texts handed to the engine for `class`, in call order.
	pub fn texts(&self, class: usize) -> Vec<String> {
		self.calls
			.lock()
			.iter()
			.filter(|(_, c)| *c == class)
			.map(|(t, _)| t.clone())
			.collect()
	}

	pub fn clear(&self) {
		self.calls.lock().clear();
	}
}

impl RuleEngine for Speller {
	fn check(&self, text: &str, _locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError> {
		self.calls.lock().push((text.to_string(), rule_class));
		let mut out = Vec::new();
		if rule_class == 0 {
			let mut offset = 0;
			for word in text.split(' ') {
				let bare = word.trim_end_matches(['.', ',', '!', '?']);
				if let Some((_, fix)) = MISSPELLINGS.iter().find(|(wrong, _)| *wrong == bare) {
					out.push(
						RuleMatch::new(offset, bare.chars().count(), "SPELLING", "Possible spelling mistake")
							.with_suggestions([*fix]),
					);
				}
				offset += word.chars().count() + 1;
			}
			return Ok(out);
		}
		let mut offset = 0;
		let mut previous: Option<&str> = None;
		for paragraph in text.split("\n\n") {
			let first = paragraph.split_whitespace().next();
			if let Some(word) = first
				&& first == previous
			{
				out.push(RuleMatch::new(
					offset,
					word.chars().count(),
					"REPEATED_START",
					"Paragraph starts like the previous one",
				));
			}
			previous = first;
			offset += paragraph.chars().count() + 2;
		}
		Ok(out)
	}
}

/// Reports plenty of free memory.
pub struct Roomy;

impl MemoryProbe for Roomy {
	fn available_bytes(&self) -> Option<u64> {
		Some(u64::MAX)
	}
}

pub fn config(rule_classes: &[i32]) -> CheckConfig {
	CheckConfig {
		rule_classes: rule_classes.to_vec(),
		idle_fill: false,
		persist: PersistConfig {
			enabled: false,
			..PersistConfig::default()
		},
		..CheckConfig::default()
	}
}

/// Engine that runs every rule class in the foreground.
pub fn foreground_engine(rule_classes: &[i32], engine: Arc<Speller>) -> CheckEngine {
	init_tracing();
	let ctx = CheckContext::new(config(rule_classes)).unwrap().with_test_mode(true);
	CheckEngine::new(ctx, engine).unwrap()
}

/// Engine with a recheck worker.
pub fn queued_engine(config: CheckConfig, engine: Arc<Speller>) -> CheckEngine {
	init_tracing();
	let ctx = CheckContext::new(config).unwrap().with_memory_probe(Arc::new(Roomy));
	CheckEngine::new(ctx, engine).unwrap()
}

pub fn wait_until(what: &str, mut f: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while !f() {
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		std::thread::sleep(Duration::from_millis(2));
	}
}
