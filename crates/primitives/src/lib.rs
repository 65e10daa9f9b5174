//! Core value types shared by the lectern crates: document identities,
//! the two paragraph coordinate spaces, locales and rule matches.

/// Document identity keys.
pub mod ids;
/// Locale tags attached to paragraphs.
pub mod locale;
/// Flat and text paragraph coordinates.
pub mod paragraph;
/// Character offsets and paragraph ranges.
pub mod range;
/// Rule-engine match records.
pub mod rule_match;

pub use ids::DocId;
pub use locale::{Locale, LocaleParseError};
pub use paragraph::{FlatIndex, ParagraphKind, TextIndex};
pub use range::{CharIdx, CharLen, TextRange};
pub use rule_match::{RuleMatch, Suggestions};
