use serde::{Deserialize, Serialize};

/// A position inside a paragraph, measured in characters (not bytes).
///
/// This is the canonical offset space for matches, sentence starts and
/// footnote anchors.
pub type CharIdx = usize;

/// A length inside a paragraph, measured in characters (not bytes).
pub type CharLen = usize;

/// Half-open range `[start, end)` of text paragraph indices.
///
/// Construction guarantees `start < end`; an empty range cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
	start: usize,
	end: usize,
}

impl TextRange {
	/// Creates a range, returning `None` when `start >= end`.
	pub const fn new(start: usize, end: usize) -> Option<Self> {
		if start < end { Some(Self { start, end }) } else { None }
	}

	/// Range covering exactly one paragraph.
	pub const fn single(index: usize) -> Self {
		Self {
			start: index,
			end: index + 1,
		}
	}

	#[inline]
	pub const fn start(&self) -> usize {
		self.start
	}

	#[inline]
	pub const fn end(&self) -> usize {
		self.end
	}

	#[inline]
	#[allow(clippy::len_without_is_empty)]
	pub const fn len(&self) -> usize {
		self.end - self.start
	}

	#[inline]
	pub const fn contains(&self, index: usize) -> bool {
		index >= self.start && index < self.end
	}

	/// Returns true when `other` lies completely inside `self`.
	#[inline]
	pub const fn covers(&self, other: &TextRange) -> bool {
		self.start <= other.start && other.end <= self.end
	}

	#[inline]
	pub const fn overlaps(&self, other: &TextRange) -> bool {
		self.start < other.end && other.start < self.end
	}

	pub fn iter(&self) -> std::ops::Range<usize> {
		self.start..self.end
	}
}
