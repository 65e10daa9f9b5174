use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::range::{CharIdx, CharLen};

/// Suggested replacements for one match.
pub type Suggestions = SmallVec<[String; 4]>;

/// One issue reported by the rule engine, positioned inside a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
	pub start: CharIdx,
	pub length: CharLen,
	pub rule_id: Arc<str>,
	pub message: String,
	pub short_message: String,
	pub suggestions: Suggestions,
	pub url: Option<String>,
}

impl RuleMatch {
	pub fn new(start: CharIdx, length: CharLen, rule_id: impl AsRef<str>, message: impl Into<String>) -> Self {
		Self {
			start,
			length,
			rule_id: Arc::from(rule_id.as_ref()),
			message: message.into(),
			short_message: String::new(),
			suggestions: Suggestions::new(),
			url: None,
		}
	}

	pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.suggestions = suggestions.into_iter().map(Into::into).collect();
		self
	}

	/// Exclusive end offset.
	#[inline]
	pub fn end(&self) -> CharIdx {
		self.start + self.length
	}

	/// Returns true when `pos` lies on the match, end position included.
	#[inline]
	pub fn touches(&self, pos: CharIdx) -> bool {
		pos >= self.start && pos <= self.end()
	}

	/// Identity used when comparing cached results: position, extent and rule.
	#[inline]
	pub fn same_issue(&self, other: &RuleMatch) -> bool {
		self.start == other.start && self.length == other.length && self.rule_id == other.rule_id
	}

	/// Returns a copy moved by `delta` characters (saturating at zero).
	pub fn shifted(&self, delta: isize) -> Self {
		let mut out = self.clone();
		out.start = self.start.saturating_add_signed(delta);
		out
	}

	/// Ordering used for presentation: by start, then shorter first.
	pub fn position_cmp(&self, other: &RuleMatch) -> Ordering {
		self.start.cmp(&other.start).then(self.length.cmp(&other.length))
	}
}
