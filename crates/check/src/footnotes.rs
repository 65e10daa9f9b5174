//! Footnote anchor handling.
//!
//! Hosts embed one placeholder character per footnote anchor in paragraph
//! text. The rule engine must not see them, and its offsets must be mapped
//! back onto the text the host renders.

use lectern_primitives::{CharIdx, RuleMatch};

/// Removes the anchor characters at `footnotes` (character offsets, ascending).
/// Offsets past the end of `text` are ignored.
pub fn strip_footnotes(text: &str, footnotes: &[CharIdx]) -> String {
	if footnotes.is_empty() {
		return text.to_string();
	}
	text.chars()
		.enumerate()
		.filter(|(i, _)| footnotes.binary_search(i).is_err())
		.map(|(_, c)| c)
		.collect()
}

/// Maps a match computed on stripped text back onto the original text.
///
/// An anchor at or before the start moves the match right; an anchor inside
/// the match makes it one character longer.
pub fn restore_offsets(mut m: RuleMatch, footnotes: &[CharIdx]) -> RuleMatch {
	for &anchor in footnotes {
		if anchor <= m.start {
			m.start += 1;
		} else if anchor < m.end() {
			m.length += 1;
		}
	}
	m
}
