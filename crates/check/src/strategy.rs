//! Rule engine execution strategies.
//!
//! [`LocalStrategy`] runs the engine on the calling thread.
//! [`ParallelStrategy`] splits long sentence-level checks at sentence
//! boundaries and runs the chunks on scoped threads. Text-level classes always
//! run in one piece because their rules look across sentences.

use std::sync::Arc;

use lectern_primitives::{CharIdx, Locale, RuleMatch};
use lectern_worker::{TaskClass, panic_message};

use crate::config::EngineMode;
use crate::error::EngineError;
use crate::host::RuleEngine;

/// Single interface over the engine execution variants.
pub trait CheckStrategy: Send + Sync {
	fn check(&self, text: &str, locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError>;

	fn sentence_ends(&self, text: &str, locale: &Locale) -> Vec<CharIdx>;

	fn reset(&self);

	fn has_rules_for_class(&self, rule_class: usize) -> bool;

	fn fingerprint(&self) -> u64;
}

/// Builds the strategy selected by `mode`.
pub fn strategy_for(mode: EngineMode, engine: Arc<dyn RuleEngine>, max_suggestions: usize) -> Arc<dyn CheckStrategy> {
	match mode {
		EngineMode::Local => Arc::new(LocalStrategy::new(engine, max_suggestions)),
		EngineMode::Parallel { threads } => Arc::new(ParallelStrategy::new(engine, threads, max_suggestions)),
	}
}

fn cap_suggestions(mut matches: Vec<RuleMatch>, max: usize) -> Vec<RuleMatch> {
	for m in &mut matches {
		m.suggestions.truncate(max);
	}
	matches
}

/// Runs the engine on the calling thread.
pub struct LocalStrategy {
	engine: Arc<dyn RuleEngine>,
	max_suggestions: usize,
}

impl LocalStrategy {
	pub fn new(engine: Arc<dyn RuleEngine>, max_suggestions: usize) -> Self {
		Self { engine, max_suggestions }
	}
}

impl CheckStrategy for LocalStrategy {
	fn check(&self, text: &str, locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError> {
		tracing::trace!(worker_class = TaskClass::Interactive.as_str(), rule_class, "strategy.local.check");
		self.engine
			.check(text, locale, rule_class)
			.map(|matches| cap_suggestions(matches, self.max_suggestions))
	}

	fn sentence_ends(&self, text: &str, locale: &Locale) -> Vec<CharIdx> {
		self.engine.sentence_ends(text, locale)
	}

	fn reset(&self) {
		self.engine.reset();
	}

	fn has_rules_for_class(&self, rule_class: usize) -> bool {
		self.engine.has_rules_for_class(rule_class)
	}

	fn fingerprint(&self) -> u64 {
		self.engine.fingerprint()
	}
}

/// Splits long sentence-level checks across scoped threads.
pub struct ParallelStrategy {
	engine: Arc<dyn RuleEngine>,
	threads: usize,
	min_chunk_chars: usize,
	max_suggestions: usize,
}

impl ParallelStrategy {
	/// Texts shorter than this run on the calling thread.
	pub const DEFAULT_MIN_CHUNK_CHARS: usize = 2000;

	pub fn new(engine: Arc<dyn RuleEngine>, threads: usize, max_suggestions: usize) -> Self {
		Self {
			engine,
			threads: threads.max(1),
			min_chunk_chars: Self::DEFAULT_MIN_CHUNK_CHARS,
			max_suggestions,
		}
	}

	pub fn with_min_chunk_chars(mut self, min_chunk_chars: usize) -> Self {
		self.min_chunk_chars = min_chunk_chars;
		self
	}

	/// Groups sentences into at most `threads` contiguous chunks of similar size.
	///
	/// Returns `[start, end)` character ranges.
	fn chunks(&self, total: usize, sentence_ends: &[CharIdx]) -> Vec<(CharIdx, CharIdx)> {
		let target = total.div_ceil(self.threads).max(1);
		let mut out = Vec::with_capacity(self.threads);
		let mut start = 0;
		for &end in sentence_ends {
			let end = end.min(total);
			if end <= start {
				continue;
			}
			if end - start >= target && out.len() + 1 < self.threads {
				out.push((start, end));
				start = end;
			}
		}
		if start < total || out.is_empty() {
			out.push((start, total));
		}
		out
	}
}

impl CheckStrategy for ParallelStrategy {
	fn check(&self, text: &str, locale: &Locale, rule_class: usize) -> Result<Vec<RuleMatch>, EngineError> {
		let total = text.chars().count();
		if rule_class != 0 || self.threads < 2 || total < self.min_chunk_chars {
			return self
				.engine
				.check(text, locale, rule_class)
				.map(|matches| cap_suggestions(matches, self.max_suggestions));
		}

		let chunks = self.chunks(total, &self.engine.sentence_ends(text, locale));
		let byte_at: Vec<usize> = text.char_indices().map(|(b, _)| b).chain(std::iter::once(text.len())).collect();
		tracing::trace!(
			worker_class = TaskClass::CpuBlocking.as_str(),
			chunks = chunks.len(),
			chars = total,
			"strategy.parallel.check"
		);

		let engine = self.engine.as_ref();
		let results: Vec<Result<Vec<RuleMatch>, EngineError>> = std::thread::scope(|scope| {
			let handles: Vec<_> = chunks
				.iter()
				.map(|&(start, end)| {
					let chunk = &text[byte_at[start]..byte_at[end]];
					(start, scope.spawn(move || engine.check(chunk, locale, rule_class)))
				})
				.collect();
			handles
				.into_iter()
				.map(|(start, handle)| match handle.join() {
					Ok(result) => result.map(|matches| matches.into_iter().map(|m| m.shifted(start as isize)).collect()),
					Err(payload) => Err(EngineError::Failed {
						rule_class,
						message: panic_message(payload.as_ref()).unwrap_or_else(|| "<unknown panic>".to_string()),
					}),
				})
				.collect()
		});

		let mut out = Vec::new();
		for result in results {
			out.extend(result?);
		}
		out.sort_by(RuleMatch::position_cmp);
		Ok(cap_suggestions(out, self.max_suggestions))
	}

	fn sentence_ends(&self, text: &str, locale: &Locale) -> Vec<CharIdx> {
		self.engine.sentence_ends(text, locale)
	}

	fn reset(&self) {
		self.engine.reset();
	}

	fn has_rules_for_class(&self, rule_class: usize) -> bool {
		self.engine.has_rules_for_class(rule_class)
	}

	fn fingerprint(&self) -> u64 {
		self.engine.fingerprint()
	}
}
