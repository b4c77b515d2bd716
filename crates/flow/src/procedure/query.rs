use crate::{
	engine::{from_data, into_data, QueryFn, QueryOptions},
	error::{BuildError, ProcedureError},
	key::KeySegment,
	schema::{SchemaSlot, ValidationMode},
};

use std::{fmt, future::Future, sync::Arc};

use futures::FutureExt;
use tracing::debug;

use super::{
	Core, Procedure, ProcedureBuilder, ProcedureKind, ProcedureValue, ResolverArgs, UseQueryOptions,
};

/// Binding returned by [`ProcedureBuilder::query`].
pub struct QueryBinding<I, O> {
	core: Arc<Core<I, O>>,
}

impl<I, O> Clone for QueryBinding<I, O> {
	fn clone(&self) -> Self {
		Self {
			core: Arc::clone(&self.core),
		}
	}
}

impl<I, O> fmt::Debug for QueryBinding<I, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("QueryBinding")
			.field("ctx", &self.core.ctx)
			.finish()
	}
}

impl<IS, OS> ProcedureBuilder<IS, OS> {
	/// Finishes the procedure as a one-shot read cached under `[key]`.
	pub fn query<I, O, F, Fut>(
		self,
		key: impl Into<KeySegment>,
		resolver: F,
	) -> Result<QueryBinding<I, O>, BuildError>
	where
		IS: SchemaSlot<I>,
		OS: SchemaSlot<O>,
		I: ProcedureValue,
		O: ProcedureValue,
		F: Fn(ResolverArgs<I>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
	{
		self.finish(key, ProcedureKind::Query, resolver)
			.map(|core| QueryBinding { core })
	}
}

impl<I: ProcedureValue, O: ProcedureValue> QueryBinding<I, O> {
	#[must_use]
	pub fn ctx(&self) -> &Procedure {
		self.core.ctx()
	}

	/// Runs the query through the engine, answering from cache when the engine allows it.
	///
	/// The input is validated before anything reaches the engine, a rejected input never reaches
	/// the resolver. With output verification enabled the resolved value is checked every time
	/// the engine executes.
	pub async fn use_query(&self, input: I, options: UseQueryOptions) -> Result<O, ProcedureError> {
		let key = self.core.ctx().effective_key(options.key);
		let input = self
			.core
			.validate_input(&key, input, ValidationMode::Parse)?;

		if options.enabled == Some(false) {
			debug!(%key, "query is disabled, skipping execution");
			return Err(ProcedureError::Disabled(key));
		}

		let fetch: QueryFn = {
			let core = Arc::clone(&self.core);
			let key = key.clone();

			Arc::new(move || {
				let core = Arc::clone(&core);
				let key = key.clone();
				let input = input.clone();

				async move {
					let output = core.resolve(&key, input).await?;
					core.verify_output(&key, output).map(into_data)
				}
				.boxed()
			})
		};

		let data = self
			.core
			.ctx()
			.engine()
			.run_query(
				key.clone(),
				fetch,
				QueryOptions {
					stale_time: options.stale_time,
				},
			)
			.await?;

		from_data(data, &key)
	}
}
