//! Engine configuration loaded from TOML.
//!
//! ```toml
//! rule_classes = [0, 1, -1]
//! use_queue = true
//! engine_mode = { kind = "parallel", threads = 4 }
//!
//! [persist]
//! enabled = true
//! min_characters = 25000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::DebugFlags;
use crate::error::ConfigError;

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// How many neighbouring paragraphs a rule class needs to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextSize {
	/// The paragraph alone (sentence-level rules).
	Paragraph,
	/// `n` paragraphs before and after, clipped to the enclosing chapter.
	Neighbors(usize),
	/// Every paragraph between the surrounding headings.
	Chapter,
	/// The whole body text.
	Document,
}

impl ContextSize {
	/// Decodes the configuration value: `0` paragraph, `n > 0` neighbours,
	/// `-1` chapter, anything below whole document.
	pub const fn from_raw(raw: i32) -> Self {
		match raw {
			0 => Self::Paragraph,
			n if n > 0 => Self::Neighbors(n as usize),
			-1 => Self::Chapter,
			_ => Self::Document,
		}
	}

	pub const fn as_raw(self) -> i32 {
		match self {
			Self::Paragraph => 0,
			Self::Neighbors(n) => n as i32,
			Self::Chapter => -1,
			Self::Document => -2,
		}
	}

	/// True for every class that needs more than the checked paragraph.
	#[inline]
	pub const fn is_text_level(self) -> bool {
		!matches!(self, Self::Paragraph)
	}

	/// True for chapter and whole-document scans.
	#[inline]
	pub const fn is_unbounded(self) -> bool {
		matches!(self, Self::Chapter | Self::Document)
	}
}

/// Rule engine execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineMode {
	/// Run the engine on the calling thread.
	#[default]
	Local,
	/// Split long paragraphs at sentence boundaries across scoped threads.
	Parallel { threads: usize },
}

/// Warm-start cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
	pub enabled: bool,
	/// Directory for cache files; the platform cache dir when unset.
	pub dir: Option<PathBuf>,
	/// Documents shorter than this (in characters) are not persisted.
	pub min_characters: usize,
}

impl Default for PersistConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			dir: None,
			min_characters: 25_000,
		}
	}
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
	/// Minimum-context parameter per rule class. Index 0 is the sentence-level class.
	pub rule_classes: Vec<i32>,
	pub use_queue: bool,
	pub engine_mode: EngineMode,
	pub heap_check_interval: u32,
	pub min_available_memory_mb: u64,
	pub interrupt_wait_ms: u64,
	pub idle_fill: bool,
	pub persist: PersistConfig,
	pub max_suggestions: usize,
	pub debug: Vec<String>,
}

impl Default for CheckConfig {
	fn default() -> Self {
		Self {
			rule_classes: vec![0],
			use_queue: true,
			engine_mode: EngineMode::Local,
			heap_check_interval: 50,
			min_available_memory_mb: 256,
			interrupt_wait_ms: 3000,
			idle_fill: true,
			persist: PersistConfig::default(),
			max_suggestions: 15,
			debug: Vec::new(),
		}
	}
}

impl CheckConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml_str(&input)?;
		tracing::debug!(path = %path.display(), classes = config.rule_classes.len(), "config.load");
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		match self.rule_classes.first() {
			None => return Err(ConfigError::Invalid("rule_classes must not be empty".into())),
			Some(&first) if first != 0 => {
				return Err(ConfigError::Invalid(format!("rule class 0 must have context 0, got {first}")));
			}
			Some(_) => {}
		}
		if let EngineMode::Parallel { threads: 0 } = self.engine_mode {
			return Err(ConfigError::Invalid("parallel engine mode needs at least one thread".into()));
		}
		if self.max_suggestions == 0 {
			return Err(ConfigError::Invalid("max_suggestions must be positive".into()));
		}
		if self.heap_check_interval == 0 {
			return Err(ConfigError::Invalid("heap_check_interval must be positive".into()));
		}
		self.debug_flags()?;
		Ok(())
	}

	/// Decoded context size per rule class.
	pub fn context_sizes(&self) -> Vec<ContextSize> {
		self.rule_classes.iter().copied().map(ContextSize::from_raw).collect()
	}

	/// Widest fixed neighbour window across all classes.
	///
	/// Used to widen the changed range reported after an edit.
	pub fn change_radius(&self) -> usize {
		self.context_sizes()
			.into_iter()
			.filter_map(|size| match size {
				ContextSize::Neighbors(n) => Some(n),
				_ => None,
			})
			.max()
			.unwrap_or(0)
	}

	/// Resolves the `debug` names into flags.
	pub fn debug_flags(&self) -> Result<DebugFlags> {
		self.debug.iter().try_fold(DebugFlags::empty(), |acc, name| {
			DebugFlags::from_name(&name.to_ascii_uppercase())
				.map(|flag| acc | flag)
				.ok_or_else(|| ConfigError::UnknownDebugFlag(name.clone()))
		})
	}
}
