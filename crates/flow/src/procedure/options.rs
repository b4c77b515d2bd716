use crate::key::KeySegment;

use std::time::Duration;

/// Call-site options of [`QueryBinding::use_query`](super::QueryBinding::use_query).
///
/// Every `Some` field overrides the engine default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseQueryOptions {
	/// Extra key fragment, the query then runs under `[base, fragment]`.
	pub key: Option<KeySegment>,
	pub stale_time: Option<Duration>,
	/// `Some(false)` skips execution entirely.
	pub enabled: Option<bool>,
}

impl UseQueryOptions {
	#[must_use]
	pub fn with_key(mut self, fragment: impl Into<KeySegment>) -> Self {
		self.key = Some(fragment.into());
		self
	}

	#[must_use]
	pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
		self.stale_time = Some(stale_time);
		self
	}

	#[must_use]
	pub fn with_enabled(mut self, enabled: bool) -> Self {
		self.enabled = Some(enabled);
		self
	}
}

/// Call-site options of [`MutationBinding::use_mutation`](super::MutationBinding::use_mutation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseMutationOptions {
	pub key: Option<KeySegment>,
}

impl UseMutationOptions {
	#[must_use]
	pub fn with_key(mut self, fragment: impl Into<KeySegment>) -> Self {
		self.key = Some(fragment.into());
		self
	}
}

/// Call-site options of the [`InfiniteQueryBinding`](super::InfiniteQueryBinding) methods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseInfiniteQueryOptions {
	pub key: Option<KeySegment>,
	pub stale_time: Option<Duration>,
}

impl UseInfiniteQueryOptions {
	#[must_use]
	pub fn with_key(mut self, fragment: impl Into<KeySegment>) -> Self {
		self.key = Some(fragment.into());
		self
	}

	#[must_use]
	pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
		self.stale_time = Some(stale_time);
		self
	}
}
