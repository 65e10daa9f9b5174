use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Language tag of a paragraph (`language[-COUNTRY[-variant]]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Locale {
	pub language: String,
	pub country: String,
	pub variant: String,
}

/// Error returned when a locale tag cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocaleParseError {
	#[error("empty locale tag")]
	Empty,
	#[error("invalid language subtag: {0:?}")]
	InvalidLanguage(String),
}

impl Locale {
	pub fn new(language: impl Into<String>, country: impl Into<String>) -> Self {
		Self {
			language: language.into(),
			country: country.into(),
			variant: String::new(),
		}
	}

	/// Locale with an empty language, used when the host reports none.
	pub fn none() -> Self {
		Self::default()
	}

	pub fn is_none(&self) -> bool {
		self.language.is_empty()
	}

	/// Returns true when both locales name the same language, ignoring region and variant.
	pub fn same_language(&self, other: &Locale) -> bool {
		self.language.eq_ignore_ascii_case(&other.language)
	}
}

impl fmt::Display for Locale {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.language)?;
		if !self.country.is_empty() {
			write!(f, "-{}", self.country)?;
		}
		if !self.variant.is_empty() {
			write!(f, "-{}", self.variant)?;
		}
		Ok(())
	}
}

impl FromStr for Locale {
	type Err = LocaleParseError;

	fn from_str(tag: &str) -> Result<Self, Self::Err> {
		let tag = tag.trim();
		if tag.is_empty() {
			return Err(LocaleParseError::Empty);
		}
		let mut parts = tag.split(['-', '_']);
		let language = parts.next().unwrap_or_default();
		if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphabetic()) {
			return Err(LocaleParseError::InvalidLanguage(language.to_string()));
		}
		let country = parts.next().unwrap_or_default();
		let variant = parts.collect::<Vec<_>>().join("-");
		Ok(Self {
			language: language.to_ascii_lowercase(),
			country: country.to_ascii_uppercase(),
			variant,
		})
	}
}
