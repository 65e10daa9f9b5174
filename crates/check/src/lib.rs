#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Incremental grammar-check engine.
//!
//! The host editor asks [`CheckEngine::get_check_results`] for the matches of
//! one sentence at a time. The engine keeps a snapshot of every paragraph of
//! each open document, caches rule engine output per sentence and rule class,
//! notices edits and paragraph insertions or deletions, and rechecks the
//! paragraphs that text-level rules need on a background thread.
//!
//! The host document and the rule engine are collaborators behind the
//! [`DocumentAccessor`] and [`RuleEngine`] traits.

pub mod config;
pub mod context;
pub mod detector;
pub mod document;
pub mod error;
pub mod footnotes;
pub mod handler;
pub mod host;
pub mod ignored;
pub mod match_cache;
pub mod notify;
pub mod persist;
pub mod queue;
pub mod scheduler;
pub mod snapshot;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{CheckConfig, ContextSize, EngineMode, PersistConfig};
pub use context::{CheckContext, DebugFlags, MemoryProbe, SystemMemoryProbe};
pub use detector::{CheckRequest, RequestKind};
pub use document::{CheckResult, EntryOutcome, SingleDocument};
pub use error::{ConfigError, EngineError, HostError, HostResult, PersistError, StartError};
pub use handler::CheckEngine;
pub use host::{DocumentAccessor, HostParagraph, RuleEngine, split_sentences};
pub use ignored::IgnoredMatches;
pub use match_cache::MatchCache;
pub use notify::{NotificationSink, TracingSink};
pub use queue::AddOutcome;
