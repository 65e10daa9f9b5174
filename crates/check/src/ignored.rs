//! Matches the user chose to ignore once.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;

use lectern_primitives::{CharIdx, RuleMatch};
use serde::{Deserialize, Serialize};

/// Per-document set of `(paragraph, rule, position)` triples.
///
/// Paragraphs are flat indices and follow the same shift rules as the
/// match caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredMatches {
	paragraphs: BTreeMap<usize, BTreeMap<Arc<str>, BTreeSet<CharIdx>>>,
}

impl IgnoredMatches {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn ignore(&mut self, paragraph: usize, rule_id: &str, pos: CharIdx) {
		self.paragraphs
			.entry(paragraph)
			.or_default()
			.entry(Arc::from(rule_id))
			.or_default()
			.insert(pos);
	}

	/// True when a position in `[start, end)` was ignored for `rule_id`.
	pub fn is_ignored(&self, paragraph: usize, start: CharIdx, end: CharIdx, rule_id: &str) -> bool {
		let end = end.max(start + 1);
		self.paragraphs
			.get(&paragraph)
			.and_then(|rules| rules.get(rule_id))
			.is_some_and(|positions| positions.range(start..end).next().is_some())
	}

	/// Drops ignored matches from `matches`.
	pub fn filter(&self, paragraph: usize, matches: &mut Vec<RuleMatch>) {
		if !self.paragraphs.contains_key(&paragraph) {
			return;
		}
		matches.retain(|m| !self.is_ignored(paragraph, m.start, m.end(), &m.rule_id));
	}

	pub fn remove_paragraph(&mut self, paragraph: usize) {
		self.paragraphs.remove(&paragraph);
	}

	/// Removes paragraphs in `removed` and moves those at or after its end by `delta`.
	pub fn remove_and_shift(&mut self, removed: Range<usize>, delta: isize) {
		let tail = self.paragraphs.split_off(&removed.start);
		for (paragraph, rules) in tail {
			if paragraph < removed.end {
				continue;
			}
			match paragraph.checked_add_signed(delta) {
				Some(moved) if moved >= removed.start => {
					self.paragraphs.insert(moved, rules);
				}
				_ => {}
			}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.paragraphs.is_empty()
	}

	/// Number of ignored positions.
	pub fn len(&self) -> usize {
		self.paragraphs.values().flat_map(BTreeMap::values).map(BTreeSet::len).sum()
	}

	pub fn clear(&mut self) {
		self.paragraphs.clear();
	}
}
