//! Point-in-time copy of a document's paragraphs.
//!
//! # Role
//!
//! [`ParagraphSnapshot`] is an immutable value holding every flat paragraph
//! plus the flat/text index mappings and chapter headings. [`DocumentCache`]
//! publishes it through an [`ArcSwap`]: a refresh builds the next snapshot off
//! to the side and swaps it in, so readers never observe a half-built one.
//!
//! # Invariants
//!
//! - `to_text` is monotonic non-decreasing where defined, `None` for non-body paragraphs.
//! - `to_flat` is strictly increasing and `to_text[to_flat[t]] == Some(t)`.
//! - `headings` is sorted ascending over text indices.
//! - Every mutation publishes a new generation.

use std::sync::Arc;

use arc_swap::ArcSwap;
use lectern_primitives::{CharIdx, CharLen, FlatIndex, Locale, ParagraphKind, TextIndex, TextRange};
use lectern_worker::GenerationClock;

use crate::config::ContextSize;
use crate::footnotes::strip_footnotes;
use crate::host::{DocumentAccessor, HostParagraph};


/// Separator placed between paragraphs of a multi-paragraph check text.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Replacement for in-paragraph line breaks in check texts.
pub const MANUAL_LINEBREAK: char = '\r';

/// One cached paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotParagraph {
	pub text: Arc<str>,
	pub locale: Locale,
	pub footnotes: Arc<[CharIdx]>,
	pub kind: ParagraphKind,
}

impl SnapshotParagraph {
	/// True when text and locale match the live paragraph.
	pub fn is_equal(&self, text: &str, locale: &Locale) -> bool {
		*self.text == *text && self.locale == *locale
	}
}

/// Multi-paragraph text prepared for the rule engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocText {
	pub text: String,
	/// Character offset of each paragraph inside `text`.
	pub starts: Vec<CharIdx>,
	/// Character length of each paragraph inside `text`.
	pub lengths: Vec<CharLen>,
}

/// Immutable snapshot of all paragraphs of one document.
#[derive(Debug, Clone, Default)]
pub struct ParagraphSnapshot {
	paragraphs: Vec<SnapshotParagraph>,
	to_text: Vec<Option<TextIndex>>,
	to_flat: Vec<FlatIndex>,
	headings: Vec<TextIndex>,
	generation: u64,
}

impl ParagraphSnapshot {
	/// Builds a snapshot and both index mappings from the host enumeration.
	pub fn from_host(paragraphs: Vec<HostParagraph>, generation: u64) -> Self {
		let mut out = Self {
			paragraphs: Vec::with_capacity(paragraphs.len()),
			to_text: Vec::with_capacity(paragraphs.len()),
			to_flat: Vec::new(),
			headings: Vec::new(),
			generation,
		};
		for (flat, p) in paragraphs.into_iter().enumerate() {
			if p.kind.is_body() {
				let text = TextIndex(out.to_flat.len());
				if p.heading {
					out.headings.push(text);
				}
				out.to_text.push(Some(text));
				out.to_flat.push(FlatIndex(flat));
			} else {
				out.to_text.push(None);
			}
			out.paragraphs.push(SnapshotParagraph {
				text: Arc::from(p.text),
				locale: p.locale,
				footnotes: Arc::from(p.footnotes),
				kind: p.kind,
			});
		}
		out
	}

	/// Number of flat paragraphs.
	#[inline]
	pub fn len(&self) -> usize {
		self.paragraphs.len()
	}

	/// An empty snapshot means "not yet initialized", never "empty document".
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.paragraphs.is_empty()
	}

	/// Number of body-text paragraphs.
	#[inline]
	pub fn text_len(&self) -> usize {
		self.to_flat.len()
	}

	#[inline]
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn paragraph(&self, flat: FlatIndex) -> Option<&SnapshotParagraph> {
		self.paragraphs.get(flat.get())
	}

	pub fn paragraphs(&self) -> &[SnapshotParagraph] {
		&self.paragraphs
	}

	pub fn text(&self, flat: FlatIndex) -> Option<&str> {
		self.paragraph(flat).map(|p| &*p.text)
	}

	/// Text index of a flat paragraph; `None` for headers, footers, footnotes and frames.
	pub fn text_index(&self, flat: FlatIndex) -> Option<TextIndex> {
		self.to_text.get(flat.get()).copied().flatten()
	}

	pub fn flat_index(&self, text: TextIndex) -> Option<FlatIndex> {
		self.to_flat.get(text.get()).copied()
	}

	pub fn text_paragraph(&self, text: TextIndex) -> Option<&SnapshotParagraph> {
		self.flat_index(text).and_then(|flat| self.paragraph(flat))
	}

	pub fn headings(&self) -> &[TextIndex] {
		&self.headings
	}

	pub fn is_equal(&self, flat: FlatIndex, text: &str, locale: &Locale) -> bool {
		self.paragraph(flat).is_some_and(|p| p.is_equal(text, locale))
	}

	/// Finds a paragraph with the given text, scanning forward from `from` then backward.
	pub fn find_flat(&self, text: &str, locale: &Locale, from: usize) -> Option<FlatIndex> {
		let from = from.min(self.len());
		(from..self.len())
			.chain((0..from).rev())
			.map(FlatIndex)
			.find(|&flat| self.is_equal(flat, text, locale))
	}

	/// Same paragraphs and headings, ignoring generation.
	pub fn same_content(&self, other: &ParagraphSnapshot) -> bool {
		self.paragraphs == other.paragraphs && self.headings == other.headings
	}

	/// Total characters over all paragraphs.
	pub fn total_chars(&self) -> usize {
		self.paragraphs.iter().map(|p| p.text.chars().count()).sum()
	}

	/// Copy with one paragraph replaced, or `None` when `flat` is out of range.
	pub fn with_paragraph(&self, flat: FlatIndex, text: &str, locale: &Locale, footnotes: &[CharIdx], generation: u64) -> Option<Self> {
		let mut next = self.clone();
		let slot = next.paragraphs.get_mut(flat.get())?;
		slot.text = Arc::from(text);
		slot.locale = locale.clone();
		slot.footnotes = Arc::from(footnotes);
		next.generation = generation;
		Some(next)
	}

	/// Text range of the chapter containing `t`: from the closest heading at or
	/// before `t` to the next heading.
	pub fn chapter(&self, t: TextIndex) -> Option<TextRange> {
		if t.get() >= self.text_len() {
			return None;
		}
		let after = self.headings.partition_point(|h| *h <= t);
		let start = if after == 0 { 0 } else { self.headings[after - 1].get() };
		let end = self.headings.get(after).map_or(self.text_len(), |h| h.get());
		TextRange::new(start, end)
	}

	/// First text paragraph to check for `t` at the given context size.
	///
	/// A changed paragraph doubles a fixed neighbour window.
	pub fn start_of_check(&self, t: TextIndex, size: ContextSize, changed: bool) -> Option<usize> {
		let chapter = self.chapter(t)?;
		Some(match size {
			ContextSize::Paragraph => t.get(),
			ContextSize::Neighbors(n) => t.get().saturating_sub(window(n, changed)).max(chapter.start()),
			ContextSize::Chapter => chapter.start(),
			ContextSize::Document => 0,
		})
	}

	/// One past the last text paragraph to check for `t`.
	pub fn end_of_check(&self, t: TextIndex, size: ContextSize, changed: bool) -> Option<usize> {
		let chapter = self.chapter(t)?;
		Some(match size {
			ContextSize::Paragraph => t.get() + 1,
			ContextSize::Neighbors(n) => (t.get() + window(n, changed) + 1).min(chapter.end()),
			ContextSize::Chapter => chapter.end(),
			ContextSize::Document => self.text_len(),
		})
	}

	pub fn check_range(&self, t: TextIndex, size: ContextSize, changed: bool) -> Option<TextRange> {
		TextRange::new(self.start_of_check(t, size, changed)?, self.end_of_check(t, size, changed)?)
	}

	/// Joins the text paragraphs of `range` for the rule engine.
	///
	/// Footnote anchors are removed and manual line breaks become
	/// [`MANUAL_LINEBREAK`], so paragraph boundaries are only ever
	/// [`PARAGRAPH_SEPARATOR`]. Returns `None` when the range exceeds the snapshot.
	pub fn doc_text(&self, range: TextRange) -> Option<DocText> {
		if range.end() > self.text_len() {
			return None;
		}
		let mut out = DocText {
			text: String::new(),
			starts: Vec::with_capacity(range.len()),
			lengths: Vec::with_capacity(range.len()),
		};
		let mut offset = 0;
		for t in range.iter() {
			let p = self.text_paragraph(TextIndex(t))?;
			if t > range.start() {
				out.text.push_str(PARAGRAPH_SEPARATOR);
				offset += PARAGRAPH_SEPARATOR.len();
			}
			let clean = strip_footnotes(&p.text, &p.footnotes).replace('\n', "\r");
			let len = clean.chars().count();
			out.text.push_str(&clean);
			out.starts.push(offset);
			out.lengths.push(len);
			offset += len;
		}
		Some(out)
	}
}

#[inline]
fn window(n: usize, changed: bool) -> usize {
	if changed { n * 2 } else { n }
}

/// Atomically published [`ParagraphSnapshot`] of one document.
pub struct DocumentCache {
	current: ArcSwap<ParagraphSnapshot>,
	clock: GenerationClock,
}

impl DocumentCache {
	pub fn new(clock: GenerationClock) -> Self {
		Self {
			current: ArcSwap::from_pointee(ParagraphSnapshot::default()),
			clock,
		}
	}

	/// Current snapshot.
	pub fn load(&self) -> Arc<ParagraphSnapshot> {
		self.current.load_full()
	}

	/// Pulls every paragraph from the host and publishes a rebuilt snapshot.
	///
	/// Returns `None` and keeps the previous snapshot when the host fails or
	/// reports no paragraphs. An unchanged document keeps the current
	/// snapshot, generation included.
	pub fn refresh(&self, host: &dyn DocumentAccessor) -> Option<Arc<ParagraphSnapshot>> {
		let paragraphs = match host.paragraphs() {
			Ok(paragraphs) if !paragraphs.is_empty() => paragraphs,
			Ok(_) => {
				tracing::warn!("snapshot.refresh.empty");
				return None;
			}
			Err(error) => {
				tracing::warn!(%error, "snapshot.refresh.failed");
				return None;
			}
		};
		let mut next = ParagraphSnapshot::from_host(paragraphs, 0);
		let current = self.load();
		if !current.is_empty() && current.same_content(&next) {
			tracing::trace!(generation = current.generation(), "snapshot.refresh.unchanged");
			return Some(current);
		}
		next.generation = self.clock.next();
		tracing::debug!(
			paragraphs = next.len(),
			text_paragraphs = next.text_len(),
			headings = next.headings().len(),
			generation = next.generation(),
			"snapshot.refresh"
		);
		let next = Arc::new(next);
		self.current.store(Arc::clone(&next));
		Some(next)
	}

	/// Replaces one paragraph in place. Returns false when `flat` is out of range.
	pub fn set_paragraph(&self, flat: FlatIndex, text: &str, locale: &Locale, footnotes: &[CharIdx]) -> bool {
		let mut applied = false;
		self.current.rcu(|current| match current.with_paragraph(flat, text, locale, footnotes, self.clock.next()) {
			Some(next) => {
				applied = true;
				Arc::new(next)
			}
			None => {
				applied = false;
				Arc::clone(current)
			}
		});
		if applied {
			tracing::trace!(%flat, "snapshot.set_paragraph");
		}
		applied
	}
}

impl std::fmt::Debug for DocumentCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let current = self.current.load();
		f.debug_struct("DocumentCache")
			.field("paragraphs", &current.len())
			.field("generation", &current.generation())
			.finish()
	}
}
