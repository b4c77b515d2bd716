use crate::{
	engine::{from_data, into_data},
	error::{BuildError, ProcedureError},
	key::{KeySegment, QueryKey},
	schema::{SchemaSlot, ValidationMode},
};

use std::{fmt, future::Future, sync::Arc};

use futures::FutureExt;

use super::{
	Core, Procedure, ProcedureBuilder, ProcedureKind, ProcedureValue, ResolverArgs,
	UseMutationOptions,
};

/// Binding returned by [`ProcedureBuilder::mutation`].
pub struct MutationBinding<I, O> {
	core: Arc<Core<I, O>>,
}

impl<I, O> Clone for MutationBinding<I, O> {
	fn clone(&self) -> Self {
		Self {
			core: Arc::clone(&self.core),
		}
	}
}

impl<I, O> fmt::Debug for MutationBinding<I, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MutationBinding")
			.field("ctx", &self.core.ctx)
			.finish()
	}
}

impl<IS, OS> ProcedureBuilder<IS, OS> {
	/// Finishes the procedure as an imperative write keyed by `[key]`.
	pub fn mutation<I, O, F, Fut>(
		self,
		key: impl Into<KeySegment>,
		resolver: F,
	) -> Result<MutationBinding<I, O>, BuildError>
	where
		IS: SchemaSlot<I>,
		OS: SchemaSlot<O>,
		I: ProcedureValue,
		O: ProcedureValue,
		F: Fn(ResolverArgs<I>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
	{
		self.finish(key, ProcedureKind::Mutation, resolver)
			.map(|core| MutationBinding { core })
	}
}

impl<I: ProcedureValue, O: ProcedureValue> MutationBinding<I, O> {
	#[must_use]
	pub fn ctx(&self) -> &Procedure {
		self.core.ctx()
	}

	/// Prepares a [`Mutation`], a key fragment in `options` is applied and published right away.
	#[must_use]
	pub fn use_mutation(&self, options: UseMutationOptions) -> Mutation<I, O> {
		Mutation {
			key: self.core.ctx().effective_key(options.key),
			core: Arc::clone(&self.core),
		}
	}
}

/// A mutation ready to run, see [`MutationBinding::use_mutation`].
pub struct Mutation<I, O> {
	core: Arc<Core<I, O>>,
	key: QueryKey,
}

impl<I, O> fmt::Debug for Mutation<I, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Mutation").field("key", &self.key).finish()
	}
}

impl<I: ProcedureValue, O: ProcedureValue> Mutation<I, O> {
	#[must_use]
	pub const fn key(&self) -> &QueryKey {
		&self.key
	}

	/// Runs the mutation through the engine.
	///
	/// The input is validated as the first step of the mutation itself, the resolver only runs
	/// for accepted inputs. Outputs are never verified.
	pub async fn mutate(&self, input: I) -> Result<O, ProcedureError> {
		let mutation = {
			let core = Arc::clone(&self.core);
			let key = self.key.clone();

			async move {
				let input = core.validate_input(&key, input, ValidationMode::Parse)?;
				core.resolve(&key, input).await.map(into_data)
			}
			.boxed()
		};

		let data = self
			.core
			.ctx()
			.engine()
			.run_mutation(self.key.clone(), mutation)
			.await?;

		from_data(data, &self.key)
	}
}
