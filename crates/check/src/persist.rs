//! Warm-start cache files.
//!
//! When a large document is closed its match caches and ignore-once set are
//! written to a per-document file; reopening the same unchanged document
//! restores them instead of rechecking everything.
//!
//! File layout: [`MAGIC`], [`SCHEMA_VERSION`] as little-endian `u32`, then a
//! brotli-compressed postcard payload. A file is only restored when the rule
//! engine fingerprint, the paragraph texts and the number of rule classes all
//! match the document being opened.

use std::hash::Hasher;
use std::io::{Read, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::context::{CheckContext, DebugFlags};
use crate::document::SingleDocument;
use crate::error::PersistError;
use crate::ignored::IgnoredMatches;
use crate::match_cache::MatchCache;

/// Magic bytes identifying a cache file.
pub const MAGIC: &[u8; 8] = b"LECTCACH";

/// Bumped whenever the payload layout changes.
pub const SCHEMA_VERSION: u32 = 1;

const HEADER_SIZE: usize = MAGIC.len() + size_of::<u32>();

const EXTENSION: &str = "lcache";

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
	fingerprint: u64,
	paragraphs: Vec<String>,
	caches: Vec<MatchCache>,
	ignored: IgnoredMatches,
}

/// Reads and writes cache files in one directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
	dir: PathBuf,
	min_characters: usize,
	trace: bool,
}

impl CacheStore {
	pub fn new(dir: impl Into<PathBuf>, min_characters: usize) -> Self {
		Self {
			dir: dir.into(),
			min_characters,
			trace: false,
		}
	}

	/// Store configured by `ctx`, or `None` when persistence is off.
	///
	/// Test mode never touches the disk.
	pub fn from_context(ctx: &CheckContext) -> Result<Option<Self>, PersistError> {
		let persist = &ctx.config().persist;
		if !persist.enabled || ctx.is_test_mode() {
			return Ok(None);
		}
		let dir = match &persist.dir {
			Some(dir) => dir.clone(),
			None => dirs::cache_dir().ok_or(PersistError::NoCacheDir)?.join("lectern"),
		};
		Ok(Some(Self {
			dir,
			min_characters: persist.min_characters,
			trace: ctx.debug(DebugFlags::PERSIST),
		}))
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Cache file used for the document stored at `doc_path`.
	pub fn file_for(&self, doc_path: &Path) -> PathBuf {
		let mut hasher = FxHasher::default();
		hasher.write(doc_path.as_os_str().as_encoded_bytes());
		self.dir.join(format!("{:016x}.{EXTENSION}", hasher.finish()))
	}

	/// Writes the caches of `doc`. Documents below the size threshold have
	/// any stale file removed instead. Returns true when a file was written.
	pub fn save(&self, doc: &SingleDocument, fingerprint: u64) -> Result<bool, PersistError> {
		let Some(doc_path) = doc.host().path() else {
			return Ok(false);
		};
		let file = self.file_for(&doc_path);
		let snapshot = doc.snapshot();
		let chars = snapshot.total_chars();
		if snapshot.is_empty() || chars < self.min_characters {
			match std::fs::remove_file(&file) {
				Ok(()) => tracing::debug!(path = %file.display(), chars, "persist.remove"),
				Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
				Err(error) => return Err(PersistError::Io { path: file, error }),
			}
			return Ok(false);
		}

		let payload = CacheFile {
			fingerprint,
			paragraphs: snapshot.paragraphs().iter().map(|p| p.text.to_string()).collect(),
			caches: doc.caches().to_vec(),
			ignored: doc.ignored().read().clone(),
		};
		let bytes = encode(&payload)?;
		std::fs::create_dir_all(&self.dir).map_err(|error| PersistError::Io {
			path: self.dir.clone(),
			error,
		})?;
		std::fs::write(&file, &bytes).map_err(|error| PersistError::Io {
			path: file.clone(),
			error,
		})?;
		tracing::debug!(path = %file.display(), bytes = bytes.len(), paragraphs = payload.paragraphs.len(), "persist.save");
		Ok(true)
	}

	/// Restores the caches of `doc` from its file. Returns true when restored.
	///
	/// A missing file or one describing different paragraph texts is not an
	/// error; an unreadable or foreign file is.
	pub fn load(&self, doc: &SingleDocument, fingerprint: u64) -> Result<bool, PersistError> {
		let Some(doc_path) = doc.host().path() else {
			return Ok(false);
		};
		let file = self.file_for(&doc_path);
		let bytes = match std::fs::read(&file) {
			Ok(bytes) => bytes,
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
			Err(error) => return Err(PersistError::Io { path: file, error }),
		};
		let payload = decode(&bytes)?;
		if payload.fingerprint != fingerprint {
			return Err(PersistError::Fingerprint);
		}

		let snapshot = doc.snapshot();
		let matches_document = snapshot.len() == payload.paragraphs.len()
			&& snapshot.paragraphs().iter().zip(&payload.paragraphs).all(|(p, text)| *p.text == **text);
		if !matches_document {
			if self.trace {
				tracing::debug!(path = %file.display(), "persist.load.outdated");
			}
			return Ok(false);
		}
		if !doc.caches().restore(payload.caches) {
			if self.trace {
				tracing::debug!(path = %file.display(), "persist.load.class_mismatch");
			}
			return Ok(false);
		}
		*doc.ignored().write() = payload.ignored;
		tracing::debug!(path = %file.display(), paragraphs = snapshot.len(), "persist.load");
		Ok(true)
	}
}

fn encode(payload: &CacheFile) -> Result<Vec<u8>, PersistError> {
	let raw = postcard::to_stdvec(payload)?;
	let mut out = Vec::with_capacity(HEADER_SIZE + raw.len() / 4);
	out.extend_from_slice(MAGIC);
	out.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
	{
		let mut writer = brotli::CompressorWriter::new(&mut out, BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
		writer.write_all(&raw).map_err(|error| PersistError::Io {
			path: PathBuf::new(),
			error,
		})?;
	}
	Ok(out)
}

fn decode(bytes: &[u8]) -> Result<CacheFile, PersistError> {
	if bytes.len() < HEADER_SIZE || &bytes[..MAGIC.len()] != MAGIC {
		return Err(PersistError::BadMagic);
	}
	let mut version = [0u8; size_of::<u32>()];
	version.copy_from_slice(&bytes[MAGIC.len()..HEADER_SIZE]);
	let found = u32::from_le_bytes(version);
	if found != SCHEMA_VERSION {
		return Err(PersistError::Version {
			found,
			expected: SCHEMA_VERSION,
		});
	}
	let mut raw = Vec::new();
	brotli::Decompressor::new(&bytes[HEADER_SIZE..], BROTLI_BUFFER)
		.read_to_end(&mut raw)
		.map_err(|error| PersistError::Io {
			path: PathBuf::new(),
			error,
		})?;
	Ok(postcard::from_bytes(&raw)?)
}
