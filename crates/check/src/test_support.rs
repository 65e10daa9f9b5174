//! In-memory collaborators for unit tests.

use std::path::PathBuf;

use lectern_primitives::{CharIdx, FlatIndex, Locale, RuleMatch};
use parking_lot::Mutex;

use crate::error::{EngineError, HostError, HostResult};
use crate::host::{DocumentAccessor, HostParagraph, RuleEngine};

pub(crate) fn en() -> Locale {
	Locale::new("en", "US")
}

#[derive(Default)]
pub(crate) struct FakeHost {
	pub paragraphs: Mutex<Vec<HostParagraph>>,
	pub cursor: Mutex<Option<FlatIndex>>,
	pub current: Mutex<Option<FlatIndex>>,
	pub marks: Mutex<Vec<(FlatIndex, Vec<RuleMatch>)>>,
	pub failing: Mutex<bool>,
	pub path: Option<PathBuf>,
}

impl FakeHost {
	pub fn with_texts(texts: &[&str]) -> Self {
		let host = Self::default();
		host.set_texts(texts);
		host
	}

	pub fn set_texts(&self, texts: &[&str]) {
		*self.paragraphs.lock() = texts.iter().map(|t| HostParagraph::body(*t, en())).collect();
	}

	pub fn set_paragraphs(&self, paragraphs: Vec<HostParagraph>) {
		*self.paragraphs.lock() = paragraphs;
	}

	pub fn edit(&self, flat: usize, text: &str) {
		self.paragraphs.lock()[flat].text = text.to_string();
	}

	pub fn insert(&self, flat: usize, text: &str) {
		self.paragraphs.lock().insert(flat, HostParagraph::body(text, en()));
	}

	pub fn remove(&self, flat: usize) {
		self.paragraphs.lock().remove(flat);
	}

	pub fn fail(&self, failing: bool) {
		*self.failing.lock() = failing;
	}

	pub fn take_marks(&self) -> Vec<(FlatIndex, Vec<RuleMatch>)> {
		std::mem::take(&mut *self.marks.lock())
	}

	fn with<T>(&self, flat: FlatIndex, f: impl FnOnce(&HostParagraph) -> T) -> HostResult<T> {
		if *self.failing.lock() {
			return Err(HostError::Disposed);
		}
		let paragraphs = self.paragraphs.lock();
		paragraphs.get(flat.get()).map(f).ok_or(HostError::StaleIndex {
			index: flat.get(),
			len: paragraphs.len(),
		})
	}
}

impl DocumentAccessor for FakeHost {
	fn paragraphs(&self) -> HostResult<Vec<HostParagraph>> {
		if *self.failing.lock() {
			return Err(HostError::Unavailable("fake host failure".into()));
		}
		Ok(self.paragraphs.lock().clone())
	}

	fn paragraph_count(&self) -> HostResult<usize> {
		if *self.failing.lock() {
			return Err(HostError::Disposed);
		}
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
		Ok(*self.cursor.lock())
	}

	fn current_flat_paragraph(&self) -> HostResult<Option<FlatIndex>> {
		Ok(*self.current.lock())
	}

	fn path(&self) -> Option<PathBuf> {
		self.path.clone()
	}

	fn mark_paragraph(&self, flat: FlatIndex, matches: &[RuleMatch]) -> HostResult<()> {
		self.marks.lock().push((flat, matches.to_vec()));
		Ok(())
	}
}

/// Flags every occurrence of `word` (class 0) and, for text-level classes,
/// every paragraph that repeats the first word of the previous one.
pub(crate) struct WordEngine {
	pub word: &'static str,
	pub calls: Mutex<Vec<(String, usize)>>,
	pub fail_class: Option<usize>,
}

impl WordEngine {
	pub fn new(word: &'static str) -> Self {
		Self {
			word,
			calls: Mutex::new(Vec::new()),
			fail_class: None,
		}
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}
}

impl RuleEngine for WordEngine {
	fn check(&self, text: &str, _locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError> {
		self.calls.lock().push((text.to_string(), rule_class));
		if self.fail_class == Some(rule_class) {
			return Err(EngineError::Failed {
				rule_class,
				message: "boom".into(),
			});
		}
		let chars: Vec<char> = text.chars().collect();
		let word: Vec<char> = self.word.chars().collect();
		let mut out = Vec::new();
		if rule_class == 0 {
			for start in 0..chars.len().saturating_sub(word.len() - 1) {
				if chars[start..start + word.len()] == word[..] {
					out.push(RuleMatch::new(start, word.len(), "WORD", format!("avoid {}", self.word)));
				}
			}
			return Ok(out);
		}
		let mut offset = 0;
		let mut previous: Option<String> = None;
		for paragraph in text.split("\n\n") {
			let first = paragraph.split_whitespace().next().map(str::to_string);
			if let (Some(prev), Some(cur)) = (&previous, &first)
				&& prev == cur
			{
				out.push(RuleMatch::new(offset, cur.chars().count(), "REPEAT", "repeated start"));
			}
			previous = first;
			offset += paragraph.chars().count() + 2;
		}
		Ok(out)
	}
}
