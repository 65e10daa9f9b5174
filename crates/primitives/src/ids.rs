use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of an open document.
///
/// Queue entries and persisted caches refer to documents through this key
/// rather than through a handle, so a document can be disposed while work
/// for it is still queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(Arc<str>);

impl DocId {
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(Arc::from(id.as_ref()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DocId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for DocId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for DocId {
	fn from(id: String) -> Self {
		Self(Arc::from(id))
	}
}
