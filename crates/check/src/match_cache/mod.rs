//! Sentence-granular store of rule matches for one rule class.
//!
//! Entries are keyed by `(flat paragraph, sentence start)`. Each entry also
//! records where the next sentence starts, so a request for any offset can be
//! answered from the sentence that contains it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use lectern_primitives::{CharIdx, RuleMatch};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};


/// Matches of one sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceEntry {
	pub next_sentence: CharIdx,
	pub matches: Vec<RuleMatch>,
}

/// Cached matches of one rule class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCache {
	entries: BTreeMap<(usize, CharIdx), SentenceEntry>,
}

impl MatchCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores the matches of one sentence, replacing any previous entry.
	pub fn put(&mut self, paragraph: usize, sentence_start: CharIdx, next_sentence: CharIdx, matches: Vec<RuleMatch>) {
		self.entries.insert((paragraph, sentence_start), SentenceEntry { next_sentence, matches });
	}

	/// Replaces every entry of `paragraph` with `matches` split at `sentence_ends`.
	///
	/// A match belongs to the sentence containing its start. An empty
	/// `sentence_ends` stores a single sentence covering the paragraph.
	pub fn put_paragraph(&mut self, paragraph: usize, mut matches: Vec<RuleMatch>, sentence_ends: &[CharIdx]) {
		self.remove(paragraph);
		matches.sort_by(RuleMatch::position_cmp);
		let mut start = 0;
		let mut rest = matches.as_slice();
		for (i, &end) in sentence_ends.iter().enumerate() {
			let last = i + 1 == sentence_ends.len();
			let split = if last { rest.len() } else { rest.partition_point(|m| m.start < end) };
			let (sentence, tail) = rest.split_at(split);
			self.put(paragraph, start, end, sentence.to_vec());
			rest = tail;
			start = end;
		}
		if sentence_ends.is_empty() {
			let end = rest.iter().map(RuleMatch::end).max().unwrap_or(0);
			self.put(paragraph, 0, end, rest.to_vec());
		}
	}

	pub fn get(&self, paragraph: usize, sentence_start: CharIdx) -> Option<&SentenceEntry> {
		self.entries.get(&(paragraph, sentence_start))
	}

	fn paragraph_entries(&self, paragraph: usize) -> impl Iterator<Item = (CharIdx, &SentenceEntry)> {
		self.entries.range((paragraph, 0)..=(paragraph, CharIdx::MAX)).map(|(&(_, start), entry)| (start, entry))
	}

	pub fn has_paragraph(&self, paragraph: usize) -> bool {
		self.paragraph_entries(paragraph).next().is_some()
	}

	/// Every match of a paragraph, or `None` when it was never checked.
	pub fn paragraph_matches(&self, paragraph: usize) -> Option<Vec<RuleMatch>> {
		let mut entries = self.paragraph_entries(paragraph).peekable();
		entries.peek()?;
		Some(entries.flat_map(|(_, entry)| entry.matches.iter().cloned()).collect())
	}

	/// Matches of `paragraph` starting inside `[start, end)`.
	///
	/// Returns `None` when no cached sentence begins inside the range.
	pub fn matches_in_range(&self, paragraph: usize, start: CharIdx, end: CharIdx) -> Option<Vec<RuleMatch>> {
		let mut found = false;
		let mut out = Vec::new();
		for (sentence_start, entry) in self.paragraph_entries(paragraph) {
			if sentence_start >= end {
				break;
			}
			if sentence_start < start {
				continue;
			}
			found = true;
			out.extend(entry.matches.iter().filter(|m| m.start >= start && m.start < end).cloned());
		}
		found.then_some(out)
	}

	/// Bounds `[start, next)` of the cached sentence containing `pos`.
	pub fn sentence_bounds(&self, paragraph: usize, pos: CharIdx) -> Option<(CharIdx, CharIdx)> {
		self.paragraph_entries(paragraph)
			.find(|(start, entry)| *start <= pos && pos < entry.next_sentence)
			.map(|(start, entry)| (start, entry.next_sentence))
	}

	/// Start of the cached sentence containing `pos`, `pos` itself when unknown.
	pub fn sentence_start(&self, paragraph: usize, pos: CharIdx) -> CharIdx {
		self.sentence_bounds(paragraph, pos).map_or(pos, |(start, _)| start)
	}

	/// Start of the sentence after the one containing `pos`.
	pub fn next_sentence(&self, paragraph: usize, pos: CharIdx) -> Option<CharIdx> {
		self.sentence_bounds(paragraph, pos).map(|(_, next)| next)
	}

	/// Drops every sentence entry of a paragraph.
	pub fn remove(&mut self, paragraph: usize) {
		let keys: Vec<_> = self.paragraph_entries(paragraph).map(|(start, _)| (paragraph, start)).collect();
		for key in keys {
			self.entries.remove(&key);
		}
	}

	/// Drops every entry whose paragraph lies in `range`.
	pub fn remove_range(&mut self, range: Range<usize>) {
		if range.is_empty() {
			return;
		}
		let mut tail = self.entries.split_off(&(range.start, 0));
		let mut keep = tail.split_off(&(range.end, 0));
		self.entries.append(&mut keep);
		tail.clear();
	}

	/// Removes paragraphs `first..=last` and moves every entry after `last` by `delta`.
	pub fn remove_and_shift(&mut self, first: usize, last: usize, delta: isize) {
		self.remove_and_shift_range(first..last.saturating_add(1), delta);
	}

	/// Removes paragraphs in `removed` and moves every entry at or after its end by `delta`.
	///
	/// Entries that would land before `removed.start` (or below zero) are
	/// dropped, so the shift can never collide with the untouched prefix.
	pub fn remove_and_shift_range(&mut self, removed: Range<usize>, delta: isize) {
		let tail = self.entries.split_off(&(removed.start, 0));
		let mut dropped = 0usize;
		for ((paragraph, sentence), entry) in tail {
			if paragraph < removed.end {
				continue;
			}
			match paragraph.checked_add_signed(delta) {
				Some(moved) if moved >= removed.start => {
					self.entries.insert((moved, sentence), entry);
				}
				_ => dropped += 1,
			}
		}
		if dropped > 0 {
			tracing::debug!(dropped, "match_cache.shift.collision");
		}
	}

	/// Paragraphs whose matches differ between the two caches.
	///
	/// Considers the union of paragraphs of both sides; a paragraph missing on
	/// one side counts as having no matches. Two paragraphs are equal when they
	/// hold the same number of matches and every match of either side has a
	/// counterpart with the same start, length and rule.
	pub fn difference(&self, other: &MatchCache) -> BTreeSet<usize> {
		let paragraphs: BTreeSet<usize> = self.entries.keys().chain(other.entries.keys()).map(|&(p, _)| p).collect();
		paragraphs
			.into_iter()
			.filter(|&p| {
				let mine = self.paragraph_matches(p).unwrap_or_default();
				let theirs = other.paragraph_matches(p).unwrap_or_default();
				mine.len() != theirs.len()
					|| mine.iter().any(|m| !theirs.iter().any(|o| m.same_issue(o)))
					|| theirs.iter().any(|o| !mine.iter().any(|m| m.same_issue(o)))
			})
			.collect()
	}

	/// Copy of the entries of paragraphs in `range`.
	pub fn slice(&self, range: Range<usize>) -> MatchCache {
		if range.is_empty() {
			return MatchCache::new();
		}
		MatchCache {
			entries: self
				.entries
				.range((range.start, 0)..(range.end, 0))
				.map(|(&k, v)| (k, v.clone()))
				.collect(),
		}
	}

	/// Innermost match at `pos`: the latest-starting one, shortest on ties.
	pub fn match_at(&self, paragraph: usize, pos: CharIdx) -> Option<&RuleMatch> {
		self.paragraph_entries(paragraph)
			.flat_map(|(_, entry)| entry.matches.iter())
			.filter(|m| m.touches(pos))
			.max_by(|a, b| a.start.cmp(&b.start).then(b.length.cmp(&a.length)))
	}

	/// Number of checked paragraphs (entries with sentence start 0).
	pub fn paragraph_count(&self) -> usize {
		self.entries.keys().filter(|(_, sentence)| *sentence == 0).count()
	}

	/// Number of sentence entries.
	pub fn entry_count(&self) -> usize {
		self.entries.len()
	}

	pub fn match_count(&self) -> usize {
		self.entries.values().map(|e| e.matches.len()).sum()
	}

	/// Highest cached paragraph index.
	pub fn last_paragraph(&self) -> Option<usize> {
		self.entries.keys().next_back().map(|&(p, _)| p)
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}

/// One [`MatchCache`] per rule class of a document.
///
/// Classes are locked independently so the worker can store one class while
/// the foreground reads another.
#[derive(Debug, Default)]
pub struct CacheSet {
	classes: Vec<RwLock<MatchCache>>,
}

impl CacheSet {
	pub fn new(classes: usize) -> Self {
		Self {
			classes: (0..classes).map(|_| RwLock::new(MatchCache::new())).collect(),
		}
	}

	pub fn len(&self) -> usize {
		self.classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}

	pub fn class(&self, class: usize) -> Option<&RwLock<MatchCache>> {
		self.classes.get(class)
	}

	pub fn remove_paragraph(&self, paragraph: usize) {
		for cache in &self.classes {
			cache.write().remove(paragraph);
		}
	}

	pub fn remove_and_shift_range(&self, removed: Range<usize>, delta: isize) {
		for cache in &self.classes {
			cache.write().remove_and_shift_range(removed.clone(), delta);
		}
	}

	/// Matches of every class for one paragraph, in position order.
	pub fn merged(&self, paragraph: usize) -> Vec<RuleMatch> {
		let mut out: Vec<RuleMatch> = self
			.classes
			.iter()
			.filter_map(|cache| cache.read().paragraph_matches(paragraph))
			.flatten()
			.collect();
		out.sort_by(RuleMatch::position_cmp);
		out
	}

	/// Copies of every class cache.
	pub fn to_vec(&self) -> Vec<MatchCache> {
		self.classes.iter().map(|cache| cache.read().clone()).collect()
	}

	/// Replaces every class cache. Ignored unless `caches` has one entry per class.
	pub fn restore(&self, caches: Vec<MatchCache>) -> bool {
		if caches.len() != self.classes.len() {
			return false;
		}
		for (slot, cache) in self.classes.iter().zip(caches) {
			*slot.write() = cache;
		}
		true
	}

	pub fn clear(&self) {
		for cache in &self.classes {
			cache.write().clear();
		}
	}
}
