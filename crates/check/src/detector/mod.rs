//! Mapping a check request onto the paragraph snapshot.
//!
//! # Role
//!
//! The host asks for a check with nothing but the live paragraph text and a
//! best-effort flat index. [`ChangeDetector::analyze`] finds which snapshot
//! paragraph that is, notices when its text changed, and reconciles the
//! snapshot when paragraphs were inserted or removed. Every cache keyed by
//! flat index is invalidated or shifted here, before the foreground reads it.
//!
//! # Resolution order
//!
//! 1. A flat index supplied by the host is trusted when it is in range.
//! 2. Automatic iteration: the previous paragraph when the request continues
//!    it, otherwise the one after it. Cursor and dialog requests ask the host
//!    for the cursor paragraph, then scan the snapshot from the last cursor.
//! 3. If that fails and the paragraph count changed, the snapshot is rebuilt
//!    and caches are shifted by the common prefix/suffix of old and new.
//!
//! Host failures never escape: they degrade to "not found" and the caller
//! falls back to a standalone check.

use std::ops::Range;
use std::sync::Arc;

use lectern_primitives::{CharIdx, FlatIndex, Locale, TextIndex};
use parking_lot::RwLock;

use crate::config::ContextSize;
use crate::host::DocumentAccessor;
use crate::ignored::IgnoredMatches;
use crate::match_cache::CacheSet;
use crate::snapshot::{DocumentCache, ParagraphSnapshot};


/// Who triggered a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
	/// Background iteration by the host's proofreading loop.
	#[default]
	Automatic,
	/// Context menu or other request at the view cursor.
	Cursor,
	/// The spelling and grammar dialog.
	Dialog,
}

/// One foreground check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
	pub text: String,
	pub locale: Locale,
	/// Footnote anchor offsets inside `text`.
	pub footnotes: Vec<CharIdx>,
	pub flat_hint: Option<FlatIndex>,
	pub kind: RequestKind,
	/// Start of the sentence the host wants results for.
	pub sentence_start: CharIdx,
}

impl CheckRequest {
	pub fn new(text: impl Into<String>, locale: Locale) -> Self {
		Self {
			text: text.into(),
			locale,
			footnotes: Vec::new(),
			flat_hint: None,
			kind: RequestKind::Automatic,
			sentence_start: 0,
		}
	}

	pub fn with_hint(mut self, flat: FlatIndex) -> Self {
		self.flat_hint = Some(flat);
		self
	}

	pub fn with_kind(mut self, kind: RequestKind) -> Self {
		self.kind = kind;
		self
	}

	pub fn at(mut self, sentence_start: CharIdx) -> Self {
		self.sentence_start = sentence_start;
		self
	}

	pub fn with_footnotes(mut self, footnotes: Vec<CharIdx>) -> Self {
		self.footnotes = footnotes;
		self
	}
}

/// A text paragraph a text-level class has to look at again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recheck {
	pub class: usize,
	pub paragraph: TextIndex,
}

/// Outcome of [`ChangeDetector::analyze`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
	/// Resolved paragraph; `None` when the request could not be placed.
	pub paragraph: Option<FlatIndex>,
	pub text_changed: bool,
	/// Flat paragraphs whose markup may have to be redrawn.
	pub changed: Option<Range<usize>>,
	pub rechecks: Vec<Recheck>,
	/// Paragraphs were inserted or removed; background work on the old layout is stale.
	pub structure_changed: bool,
}

impl Analysis {
	fn resolved(flat: FlatIndex) -> Self {
		Self {
			paragraph: Some(flat),
			..Self::default()
		}
	}

	fn merge(&mut self, other: Analysis) {
		self.paragraph = other.paragraph;
		self.text_changed |= other.text_changed;
		self.rechecks.extend(other.rechecks);
		self.changed = match (self.changed.take(), other.changed) {
			(Some(a), Some(b)) => Some(a.start.min(b.start)..a.end.max(b.end)),
			(a, b) => a.or(b),
		};
	}
}

/// Per-document state the detector reads and invalidates.
pub struct Tracked<'a> {
	pub host: &'a dyn DocumentAccessor,
	pub snapshot: &'a DocumentCache,
	pub caches: &'a CacheSet,
	pub ignored: &'a RwLock<IgnoredMatches>,
	pub classes: &'a [ContextSize],
	/// Neighbour window added around a changed paragraph.
	pub change_radius: usize,
	pub trace: bool,
}

impl Tracked<'_> {
	fn rechecks_for(&self, snapshot: &ParagraphSnapshot, flats: Range<usize>) -> Vec<Recheck> {
		let mut out = Vec::new();
		for flat in flats {
			let Some(paragraph) = snapshot.text_index(FlatIndex(flat)) else {
				continue;
			};
			out.extend(
				self.classes
					.iter()
					.enumerate()
					.filter(|(_, size)| size.is_text_level())
					.map(|(class, _)| Recheck { class, paragraph }),
			);
		}
		out
	}

	fn around(&self, flats: Range<usize>, len: usize) -> Range<usize> {
		flats.start.saturating_sub(self.change_radius)..(flats.end + self.change_radius).min(len)
	}
}

/// Remembers where the previous requests landed.
#[derive(Debug, Default)]
pub struct ChangeDetector {
	last_flat: Option<FlatIndex>,
	last_cursor: usize,
}

impl ChangeDetector {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn last_flat(&self) -> Option<FlatIndex> {
		self.last_flat
	}

	/// Resolves `request` to a flat paragraph and applies any change it reveals.
	pub fn analyze(&mut self, doc: &Tracked<'_>, request: &CheckRequest) -> Analysis {
		let mut snapshot = doc.snapshot.load();
		if snapshot.is_empty() {
			match doc.snapshot.refresh(doc.host) {
				Some(fresh) => snapshot = fresh,
				None => return Analysis::default(),
			}
		}

		match request.flat_hint {
			Some(hint) if hint.get() < snapshot.len() => return self.apply(doc, &snapshot, hint, request),
			Some(_) => {}
			None => {
				if let Some(flat) = self.resolve(doc, &snapshot, request) {
					return self.apply(doc, &snapshot, flat, request);
				}
			}
		}

		let live = match doc.host.paragraph_count() {
			Ok(live) => live,
			Err(error) => {
				tracing::warn!(%error, "detector.host.failed");
				return Analysis::default();
			}
		};
		if live == snapshot.len() {
			if let Some(flat) = self.current_paragraph(doc, snapshot.len()) {
				return self.apply(doc, &snapshot, flat, request);
			}
			if doc.trace {
				tracing::debug!(len = live, "detector.unresolved");
			}
			return Analysis::default();
		}

		let Some((mut analysis, snapshot)) = self.reconcile(doc, &snapshot) else {
			return Analysis::default();
		};
		let flat = request
			.flat_hint
			.filter(|hint| hint.get() < snapshot.len())
			.or_else(|| self.resolve(doc, &snapshot, request))
			.or_else(|| self.current_paragraph(doc, snapshot.len()))
			.or_else(|| snapshot.find_flat(&request.text, &request.locale, self.from_last()));
		if let Some(flat) = flat {
			let applied = self.apply(doc, &snapshot, flat, request);
			analysis.merge(applied);
		}
		analysis
	}

	fn from_last(&self) -> usize {
		self.last_flat.map_or(0, |flat| flat.get())
	}

	fn current_paragraph(&self, doc: &Tracked<'_>, len: usize) -> Option<FlatIndex> {
		match doc.host.current_flat_paragraph() {
			Ok(Some(flat)) if flat.get() < len => Some(flat),
			Ok(_) => None,
			Err(error) => {
				tracing::warn!(%error, "detector.host.failed");
				None
			}
		}
	}

	fn resolve(&mut self, doc: &Tracked<'_>, snapshot: &ParagraphSnapshot, request: &CheckRequest) -> Option<FlatIndex> {
		let (text, locale) = (request.text.as_str(), &request.locale);
		match request.kind {
			RequestKind::Automatic => {
				if request.sentence_start > 0
					&& let Some(last) = self.last_flat
					&& snapshot.is_equal(last, text, locale)
				{
					return Some(last);
				}
				let next = match self.last_flat {
					Some(last) if last.get() + 1 < snapshot.len() => FlatIndex(last.get() + 1),
					_ => FlatIndex(0),
				};
				let found = snapshot.is_equal(next, text, locale).then_some(next);
				if doc.trace {
					tracing::debug!(candidate = %next, found = found.is_some(), "detector.resolve.automatic");
				}
				found
			}
			RequestKind::Cursor | RequestKind::Dialog => {
				// a cursor index into a restructured document would land on the wrong paragraph
				if !doc.host.paragraph_count().is_ok_and(|live| live == snapshot.len()) {
					return None;
				}
				if let Ok(Some(cursor)) = doc.host.cursor()
					&& cursor.get() < snapshot.len()
					&& doc.host.paragraph_text(cursor).is_ok_and(|live| live == text)
				{
					self.last_cursor = cursor.get();
					return Some(cursor);
				}
				let from = if self.last_cursor < snapshot.len() { self.last_cursor } else { 0 };
				let found = snapshot.find_flat(text, locale, from);
				if let Some(flat) = found {
					self.last_cursor = flat.get();
				}
				if doc.trace {
					tracing::debug!(from, found = ?found, "detector.resolve.cursor");
				}
				found
			}
		}
	}

	/// Records `flat` as the current paragraph and invalidates it if its content changed.
	fn apply(&mut self, doc: &Tracked<'_>, snapshot: &ParagraphSnapshot, flat: FlatIndex, request: &CheckRequest) -> Analysis {
		self.last_flat = Some(flat);
		let Some(cached) = snapshot.paragraph(flat) else {
			return Analysis::default();
		};
		if cached.is_equal(&request.text, &request.locale) && *cached.footnotes == *request.footnotes {
			return Analysis::resolved(flat);
		}

		doc.snapshot.set_paragraph(flat, &request.text, &request.locale, &request.footnotes);
		doc.caches.remove_paragraph(flat.get());
		doc.ignored.write().remove_paragraph(flat.get());
		let rechecks = doc.rechecks_for(snapshot, flat.get()..flat.get() + 1);
		tracing::debug!(%flat, rechecks = rechecks.len(), "detector.paragraph.changed");
		Analysis {
			paragraph: Some(flat),
			text_changed: true,
			changed: Some(doc.around(flat.get()..flat.get() + 1, snapshot.len())),
			rechecks,
			structure_changed: false,
		}
	}

	/// Rebuilds the snapshot after paragraphs were inserted or removed.
	///
	/// Paragraphs in the common prefix and suffix of old and new keep their
	/// cache entries; the differing middle is dropped and the suffix shifted.
	/// Headers and footers compare equal to each other so that page numbers
	/// do not widen the changed region, but a header whose text differs still
	/// loses its cached results.
	fn reconcile(&mut self, doc: &Tracked<'_>, old: &ParagraphSnapshot) -> Option<(Analysis, Arc<ParagraphSnapshot>)> {
		let new = doc.snapshot.refresh(doc.host)?;
		let (old_len, new_len) = (old.len(), new.len());
		let same = |o: usize, n: usize| {
			let (a, b) = (&old.paragraphs()[o], &new.paragraphs()[n]);
			a.text == b.text || (a.kind.is_page_furniture() && b.kind.is_page_furniture())
		};
		let common = old_len.min(new_len);
		let mut prefix = 0;
		while prefix < common && same(prefix, prefix) {
			prefix += 1;
		}
		let mut suffix = 0;
		while suffix < common - prefix && same(old_len - 1 - suffix, new_len - 1 - suffix) {
			suffix += 1;
		}

		let removed = prefix..old_len - suffix;
		let inserted = prefix..new_len - suffix;
		let delta = new_len as isize - old_len as isize;
		doc.caches.remove_and_shift_range(removed.clone(), delta);
		doc.ignored.write().remove_and_shift(removed.clone(), delta);

		// furniture matched by kind may still have new text
		let kept = (0..prefix).map(|i| (i, i)).chain((0..suffix).map(|k| (old_len - 1 - k, new_len - 1 - k)));
		for (o, n) in kept {
			if old.paragraphs()[o].text != new.paragraphs()[n].text {
				doc.caches.remove_paragraph(n);
				doc.ignored.write().remove_paragraph(n);
			}
		}

		let region = if inserted.is_empty() {
			let at = prefix.min(new_len.saturating_sub(1));
			at..at + 1
		} else {
			inserted.clone()
		};
		let rechecks = doc.rechecks_for(&new, region.clone());
		if let Some(last) = self.last_flat
			&& last.get() >= removed.end
		{
			self.last_flat = last.get().checked_add_signed(delta).map(FlatIndex);
		}
		tracing::debug!(
			old = old_len,
			new = new_len,
			removed_start = removed.start,
			removed_end = removed.end,
			inserted = inserted.len(),
			generation = new.generation(),
			"detector.reconcile"
		);
		let analysis = Analysis {
			paragraph: None,
			text_changed: true,
			changed: Some(doc.around(region, new_len)),
			rechecks,
			structure_changed: true,
		};
		Some((analysis, new))
	}
}
