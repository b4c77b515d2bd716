use crate::{
	engine::QueryEngine,
	key::{KeyWatch, QueryKey},
	procedure::{Procedure, ProcedureKind},
	registry::Registry,
};

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use tracing::trace;

/// Cache-control operations for one readable leaf.
///
/// The handle reads the leaf's key at the moment each operation runs, so a key fragment
/// published by a later execution of the procedure is picked up by an already obtained handle.
#[derive(Clone)]
pub struct CacheControlHandle {
	key: KeyWatch,
	kind: ProcedureKind,
	engine: Arc<dyn QueryEngine>,
}

impl fmt::Debug for CacheControlHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CacheControlHandle")
			.field("key", &self.key.current())
			.field("kind", &self.kind)
			.finish_non_exhaustive()
	}
}

impl CacheControlHandle {
	fn new(ctx: &Procedure) -> Self {
		Self {
			key: ctx.watch_key(),
			kind: ctx.kind(),
			engine: Arc::clone(ctx.engine()),
		}
	}

	#[must_use]
	pub fn key(&self) -> QueryKey {
		self.key.current()
	}

	#[must_use]
	pub const fn kind(&self) -> ProcedureKind {
		self.kind
	}

	/// Marks every cache entry matching the key as stale.
	pub async fn invalidate(&self) -> QueryKey {
		let key = self.key.current();
		let count = self.engine.invalidate_by_key(&key).await;
		trace!(%key, count, "invalidate");

		key
	}

	/// Re-runs every cache entry matching the key.
	pub async fn refetch(&self) -> QueryKey {
		let key = self.key.current();
		let count = self.engine.refetch_by_key(&key).await;
		trace!(%key, count, "refetch");

		key
	}

	/// Cancels in flight executions matching the key.
	pub async fn abort(&self) -> QueryKey {
		let key = self.key.current();
		let count = self.engine.cancel_by_key(&key).await;
		trace!(%key, count, "abort");

		key
	}
}

/// Registry shaped map of [`CacheControlHandle`]s, see [`Utils::use_utils`].
#[derive(Debug, Clone, Default)]
pub struct UtilsTree {
	groups: IndexMap<String, IndexMap<String, CacheControlHandle>>,
}

impl UtilsTree {
	#[must_use]
	pub fn group(&self, group: &str) -> Option<&IndexMap<String, CacheControlHandle>> {
		self.groups.get(group)
	}

	#[must_use]
	pub fn get(&self, group: &str, leaf: &str) -> Option<&CacheControlHandle> {
		self.group(group)?.get(leaf)
	}

	pub fn groups(&self) -> impl Iterator<Item = (&str, &IndexMap<String, CacheControlHandle>)> {
		self.groups.iter().map(|(name, leaves)| (name.as_str(), leaves))
	}

	/// Number of handles across all groups.
	#[must_use]
	pub fn len(&self) -> usize {
		self.groups.values().map(IndexMap::len).sum()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Derives cache-control handles from a [`Registry`].
#[derive(Debug, Clone)]
pub struct Utils {
	registry: Arc<Registry>,
}

impl Utils {
	#[must_use]
	pub const fn new(registry: Arc<Registry>) -> Self {
		Self { registry }
	}

	/// Folds the registry into a fresh [`UtilsTree`].
	///
	/// Every group is kept, but only with its readable leaves: mutations and leaves that were
	/// never finished are left out. Nothing is cached between calls.
	#[must_use]
	pub fn use_utils(&self) -> UtilsTree {
		let groups = self
			.registry
			.groups()
			.map(|(group_name, group)| {
				let handles = group
					.iter()
					.filter_map(|(leaf_name, leaf)| {
						let ctx = leaf.ctx()?;
						ctx.kind()
							.is_readable()
							.then(|| (leaf_name.to_owned(), CacheControlHandle::new(ctx)))
					})
					.collect::<IndexMap<_, _>>();

				(group_name.to_owned(), handles)
			})
			.collect();

		UtilsTree { groups }
	}
}
