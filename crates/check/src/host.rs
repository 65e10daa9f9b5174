//! Collaborator interfaces: the host document and the rule engine.

use std::path::PathBuf;

use lectern_primitives::{CharIdx, FlatIndex, Locale, ParagraphKind, RuleMatch};

use crate::error::{EngineError, HostResult};

/// One paragraph as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostParagraph {
	pub text: String,
	pub locale: Locale,
	/// Character offsets of footnote anchors inside `text`.
	pub footnotes: Vec<CharIdx>,
	pub kind: ParagraphKind,
	/// Paragraph style marks a chapter boundary.
	pub heading: bool,
}

impl HostParagraph {
	pub fn body(text: impl Into<String>, locale: Locale) -> Self {
		Self {
			text: text.into(),
			locale,
			..Self::default()
		}
	}

	pub fn with_kind(mut self, kind: ParagraphKind) -> Self {
		self.kind = kind;
		self
	}

	pub fn heading(mut self) -> Self {
		self.heading = true;
		self
	}

	pub fn with_footnotes(mut self, footnotes: Vec<CharIdx>) -> Self {
		self.footnotes = footnotes;
		self
	}
}

/// Access to the live document.
///
/// Indices may be stale by the time they are used; implementations report
/// that through [`HostError`](crate::HostError) instead of panicking.
pub trait DocumentAccessor: Send + Sync {
	/// Every paragraph in flat order.
	fn paragraphs(&self) -> HostResult<Vec<HostParagraph>>;

	fn paragraph_count(&self) -> HostResult<usize>;

	fn paragraph_text(&self, flat: FlatIndex) -> HostResult<String>;

	fn locale(&self, flat: FlatIndex) -> HostResult<Locale>;

	fn footnotes(&self, flat: FlatIndex) -> HostResult<Vec<CharIdx>>;

	/// Flat paragraph under the view cursor.
	fn cursor(&self) -> HostResult<Option<FlatIndex>>;

	/// Paragraph the host's automatic iteration is currently positioned on, if it can tell.
	fn current_flat_paragraph(&self) -> HostResult<Option<FlatIndex>> {
		Ok(None)
	}

	/// True while the document has input focus.
	fn is_focused(&self) -> bool {
		false
	}

	/// File backing the document, used to key warm-start caches.
	fn path(&self) -> Option<PathBuf> {
		None
	}

	/// Replaces the rendered markup of one paragraph.
	fn mark_paragraph(&self, flat: FlatIndex, matches: &[RuleMatch]) -> HostResult<()>;
}

/// The grammar/style checker. Pure function of its input text.
pub trait RuleEngine: Send + Sync {
	/// Checks `text` with the rules of `rule_class`.
	///
	/// Multi-paragraph input uses `"\n\n"` as paragraph separator. Offsets in
	/// the returned matches are character offsets into `text`.
	fn check(&self, text: &str, locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError>;

	/// Exclusive character end offsets of each sentence; the last equals the
	/// text length. Empty text yields `[0]`.
	fn sentence_ends(&self, text: &str, _locale: &Locale) -> Vec<CharIdx> {
		split_sentences(text)
	}

	/// Reinitializes the engine after a configuration change.
	fn reset(&self) {}

	fn has_rules_for_class(&self, _rule_class: usize) -> bool {
		true
	}

	/// Identifies the rule set; persisted caches from another fingerprint are ignored.
	fn fingerprint(&self) -> u64 {
		0
	}
}

/// Fallback sentence splitter: a sentence ends after `.`, `!` or `?`
/// followed by whitespace, the whitespace included.
pub fn split_sentences(text: &str) -> Vec<CharIdx> {
	#[derive(PartialEq)]
	enum State {
		Inside,
		Terminal,
		Gap,
	}
	let mut ends = Vec::new();
	let mut state = State::Inside;
	let mut len = 0;
	for (i, c) in text.chars().enumerate() {
		if state == State::Gap && !c.is_whitespace() {
			ends.push(i);
			state = State::Inside;
		}
		state = match (state, c) {
			(_, '.' | '!' | '?') => State::Terminal,
			(State::Terminal | State::Gap, c) if c.is_whitespace() => State::Gap,
			_ => State::Inside,
		};
		len = i + 1;
	}
	if ends.last() != Some(&len) {
		ends.push(len);
	}
	ends
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_on_terminal_punctuation() {
		assert_eq!(split_sentences("One. Two! Three"), [5, 10, 15]);
		assert_eq!(split_sentences("No end"), [6]);
		assert_eq!(split_sentences("Done."), [5]);
		assert_eq!(split_sentences(""), [0]);
		assert_eq!(split_sentences("e.g. x"), [5, 6]);
		assert_eq!(split_sentences("3.5 kg"), [6]);
	}
}
