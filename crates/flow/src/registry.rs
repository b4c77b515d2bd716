//! Two level, insertion ordered map of procedure bindings: group name, then leaf name.
//!
//! The registry is assembled by the caller, usually through the [`registry!`](crate::registry!)
//! macro, and only its shape matters to [`Utils`](crate::Utils): every leaf exposes its
//! [`Procedure`] (if it was finished) through the [`Leaf`] trait.

use crate::procedure::{
	InfiniteQueryBinding, MutationBinding, Procedure, ProcedureBuilder, ProcedureValue,
	QueryBinding,
};

use std::{fmt, sync::Arc};

use downcast_rs::{impl_downcast, DowncastSync};
use indexmap::IndexMap;

/// Anything that can sit at a leaf of a [`Registry`].
pub trait Leaf: DowncastSync {
	/// `None` while the procedure has not been finished by a terminal builder method.
	fn ctx(&self) -> Option<&Procedure>;
}

impl_downcast!(sync Leaf);

impl<I: ProcedureValue, O: ProcedureValue> Leaf for QueryBinding<I, O> {
	fn ctx(&self) -> Option<&Procedure> {
		Some(QueryBinding::ctx(self))
	}
}

impl<I: ProcedureValue, O: ProcedureValue> Leaf for MutationBinding<I, O> {
	fn ctx(&self) -> Option<&Procedure> {
		Some(MutationBinding::ctx(self))
	}
}

impl<I: ProcedureValue, O: ProcedureValue> Leaf for InfiniteQueryBinding<I, O> {
	fn ctx(&self) -> Option<&Procedure> {
		Some(InfiniteQueryBinding::ctx(self))
	}
}

impl<IS, OS> Leaf for ProcedureBuilder<IS, OS>
where
	IS: Send + Sync + 'static,
	OS: Send + Sync + 'static,
{
	fn ctx(&self) -> Option<&Procedure> {
		None
	}
}

/// Leaves of one group, in insertion order.
#[derive(Clone, Default)]
pub struct Group {
	leaves: IndexMap<String, Arc<dyn Leaf>>,
}

impl fmt::Debug for Group {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map()
			.entries(
				self.leaves
					.iter()
					.map(|(name, leaf)| (name, leaf.ctx().map(Procedure::key))),
			)
			.finish()
	}
}

impl Group {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a leaf, replacing any previous one with the same name.
	#[must_use]
	pub fn leaf(mut self, name: impl Into<String>, leaf: impl Leaf) -> Self {
		self.leaves.insert(name.into(), Arc::new(leaf));
		self
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Arc<dyn Leaf>> {
		self.leaves.get(name)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Leaf>)> {
		self.leaves.iter().map(|(name, leaf)| (name.as_str(), leaf))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.leaves.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.leaves.is_empty()
	}
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
	groups: IndexMap<String, Group>,
}

impl Registry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a group, replacing any previous one with the same name.
	#[must_use]
	pub fn group(mut self, name: impl Into<String>, group: Group) -> Self {
		self.groups.insert(name.into(), group);
		self
	}

	#[must_use]
	pub fn get(&self, group: &str) -> Option<&Group> {
		self.groups.get(group)
	}

	#[must_use]
	pub fn leaf(&self, group: &str, leaf: &str) -> Option<&Arc<dyn Leaf>> {
		self.get(group)?.get(leaf)
	}

	/// The leaf at `group.leaf` as its concrete binding type.
	#[must_use]
	pub fn binding<B: Leaf>(&self, group: &str, leaf: &str) -> Option<&B> {
		self.leaf(group, leaf)?.downcast_ref::<B>()
	}

	pub fn groups(&self) -> impl Iterator<Item = (&str, &Group)> {
		self.groups.iter().map(|(name, group)| (name.as_str(), group))
	}
}

/// Builds a [`Registry`] out of a nested literal.
///
/// ```ignore
/// let registry = registry! {
/// 	user {
/// 		profile: profile.clone(),
/// 		rename: rename.clone(),
/// 	},
/// 	files {
/// 		list: list.clone(),
/// 	},
/// };
/// ```
#[macro_export]
macro_rules! registry {
	($($group:ident { $($leaf:ident : $binding:expr),* $(,)? }),* $(,)?) => {
		$crate::Registry::new()
			$(
				.group(
					::core::stringify!($group),
					$crate::Group::new()
						$(.leaf(::core::stringify!($leaf), $binding))*
				)
			)*
	};
}
