//! Error types shared across the check engine.

use std::path::PathBuf;

use lectern_primitives::Locale;
use thiserror::Error;

/// Failure reported by a [`DocumentAccessor`](crate::DocumentAccessor).
///
/// The core never propagates these to its callers; they degrade to empty
/// results or a "paragraph not found" resolution at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
	#[error("document has been disposed")]
	Disposed,
	#[error("paragraph index {index} out of range (document has {len})")]
	StaleIndex { index: usize, len: usize },
	#[error("host unavailable: {0}")]
	Unavailable(String),
}

/// Failure reported by the rule engine for one check call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
	#[error("rule class {rule_class} failed: {message}")]
	Failed { rule_class: usize, message: String },
	#[error("no rules available for locale {0}")]
	Unsupported(Locale),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
	#[error("invalid configuration: {0}")]
	Invalid(String),
	#[error("unknown debug flag: {0}")]
	UnknownDebugFlag(String),
}

/// Errors raised while reading or writing warm-start cache files.
#[derive(Debug, Error)]
pub enum PersistError {
	#[error("I/O error on {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },
	#[error("cache encoding failed: {0}")]
	Codec(#[from] postcard::Error),
	#[error("not a lectern cache file")]
	BadMagic,
	#[error("cache format version {found} does not match {expected}")]
	Version { found: u32, expected: u32 },
	#[error("cache was written by a different rule engine")]
	Fingerprint,
	#[error("no cache directory available")]
	NoCacheDir,
}

/// Errors raised while starting a [`CheckEngine`](crate::CheckEngine).
#[derive(Debug, Error)]
pub enum StartError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("failed to spawn recheck worker: {0}")]
	Spawn(#[from] std::io::Error),
}

/// Result type for host accessor calls.
pub type HostResult<T> = std::result::Result<T, HostError>;
