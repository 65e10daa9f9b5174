use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a paragraph among every paragraph the host exposes
/// (body text, headers, footers, footnotes, frames), in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlatIndex(pub usize);

/// Position of a paragraph among body-text paragraphs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextIndex(pub usize);

impl FlatIndex {
	#[inline]
	pub const fn get(self) -> usize {
		self.0
	}
}

impl TextIndex {
	#[inline]
	pub const fn get(self) -> usize {
		self.0
	}
}

impl fmt::Display for FlatIndex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "flat:{}", self.0)
	}
}

impl fmt::Display for TextIndex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "text:{}", self.0)
	}
}

/// Structural role of a paragraph as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParagraphKind {
	/// Body text. The only kind that has a text index.
	#[default]
	Body,
	/// Page header content.
	Header,
	/// Page footer content.
	Footer,
	/// Footnote body.
	Footnote,
	/// Endnote body.
	Endnote,
	/// Text frame or shape content.
	Frame,
}

impl ParagraphKind {
	/// Returns true for paragraphs that belong to the body-text coordinate space.
	#[inline]
	pub const fn is_body(self) -> bool {
		matches!(self, Self::Body)
	}

	/// Returns true for page furniture whose text may change without user edits
	/// (page numbers, running titles).
	#[inline]
	pub const fn is_page_furniture(self) -> bool {
		matches!(self, Self::Header | Self::Footer)
	}
}
