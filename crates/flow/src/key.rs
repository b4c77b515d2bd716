use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::error::BuildError;

/// A single segment of a [`QueryKey`].
pub type KeySegment = String;

/// Ordered sequence of segments identifying cached results.
///
/// Equality is structural over the segments. Filters used by cache-control operations match by
/// prefix, so `["user.profile"]` matches both `["user.profile"]` and `["user.profile", "v2"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
	/// Builds the single segment base key a terminal builder method is called with.
	pub fn new(base: impl Into<KeySegment>) -> Result<Self, BuildError> {
		let base = base.into();
		if base.is_empty() {
			return Err(BuildError::EmptyKey);
		}

		Ok(Self(vec![base]))
	}

	/// Appends a call-site fragment to this key, never replacing what is already there.
	#[must_use]
	pub fn with_fragment(&self, fragment: impl Into<KeySegment>) -> Self {
		let mut segments = self.0.clone();
		segments.push(fragment.into());
		Self(segments)
	}

	#[must_use]
	pub fn segments(&self) -> &[KeySegment] {
		&self.0
	}

	/// The first segment.
	#[must_use]
	pub fn base(&self) -> &str {
		self.0.first().map_or("", String::as_str)
	}

	/// Whether `filter` is a prefix of this key.
	#[must_use]
	pub fn matches(&self, filter: &Self) -> bool {
		self.0.starts_with(&filter.0)
	}
}

impl fmt::Display for QueryKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[")?;
		for (idx, segment) in self.0.iter().enumerate() {
			if idx > 0 {
				write!(f, ", ")?;
			}
			write!(f, "\"{segment}\"")?;
		}
		write!(f, "]")
	}
}

/// Single writer side of a procedure's effective key.
///
/// Only the procedure's own execution path publishes through this, every cache-control handle
/// reads through a [`KeyWatch`].
#[derive(Debug)]
pub(crate) struct KeyPublisher(watch::Sender<QueryKey>);

impl KeyPublisher {
	pub(crate) fn new(initial: QueryKey) -> Self {
		let (tx, _) = watch::channel(initial);
		Self(tx)
	}

	pub(crate) fn publish(&self, key: QueryKey) {
		// `send_replace` never fails, even with no receivers alive
		self.0.send_replace(key);
	}

	pub(crate) fn current(&self) -> QueryKey {
		self.0.borrow().clone()
	}

	pub(crate) fn watch(&self) -> KeyWatch {
		KeyWatch(self.0.subscribe())
	}
}

/// Read-only view of a procedure's effective key.
#[derive(Debug, Clone)]
pub struct KeyWatch(watch::Receiver<QueryKey>);

impl KeyWatch {
	/// The key as last published by the owning procedure.
	#[must_use]
	pub fn current(&self) -> QueryKey {
		self.0.borrow().clone()
	}
}
