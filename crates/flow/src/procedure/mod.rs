use crate::{
	engine::{QueryClient, QueryEngine},
	error::{BuildError, ProcedureError, SchemaError},
	key::{KeyPublisher, KeySegment, KeyWatch, QueryKey},
	schema::{Declared, SafeParse, Schema, SchemaSlot, Unvalidated, ValidationMode},
};

use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

mod infinite;
mod mutation;
mod options;
mod query;

pub use infinite::{InfiniteData, InfiniteQueryBinding, PageParams};
pub use mutation::{Mutation, MutationBinding};
pub use options::{UseInfiniteQueryOptions, UseMutationOptions, UseQueryOptions};
pub use query::QueryBinding;

/// Bounds every procedure input and output satisfies.
///
/// Inputs are kept to refetch and outputs are handed out of the cache by clone, both end up in
/// failure logs.
pub trait ProcedureValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> ProcedureValue for T {}

/// Operation kind of a finished procedure, fixed by the terminal builder method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
	Query,
	Mutation,
	Infinite,
}

impl ProcedureKind {
	/// Query and infinite procedures read cached data, mutations don't.
	#[must_use]
	pub const fn is_readable(self) -> bool {
		matches!(self, Self::Query | Self::Infinite)
	}
}

impl fmt::Display for ProcedureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Query => write!(f, "query"),
			Self::Mutation => write!(f, "mutation"),
			Self::Infinite => write!(f, "infinite"),
		}
	}
}

struct Inner {
	base: QueryKey,
	kind: ProcedureKind,
	key: KeyPublisher,
	input_declared: bool,
	output_declared: bool,
	verify_output: bool,
	log_payloads: bool,
	engine: Arc<dyn QueryEngine>,
}

/// The finished descriptor of one remote operation, shared between its binding and every
/// cache-control handle derived from it.
#[derive(Clone)]
pub struct Procedure(Arc<Inner>);

impl fmt::Debug for Procedure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Procedure")
			.field("key", &self.key())
			.field("kind", &self.0.kind)
			.field("input_declared", &self.0.input_declared)
			.field("output_declared", &self.0.output_declared)
			.field("verify_output", &self.0.verify_output)
			.finish_non_exhaustive()
	}
}

impl Procedure {
	/// Current effective key, the base key unless a call site supplied a fragment.
	#[must_use]
	pub fn key(&self) -> QueryKey {
		self.0.key.current()
	}

	/// The key given to the terminal builder method.
	#[must_use]
	pub fn base_key(&self) -> &QueryKey {
		&self.0.base
	}

	#[must_use]
	pub fn kind(&self) -> ProcedureKind {
		self.0.kind
	}

	#[must_use]
	pub fn has_input_schema(&self) -> bool {
		self.0.input_declared
	}

	#[must_use]
	pub fn has_output_schema(&self) -> bool {
		self.0.output_declared
	}

	#[must_use]
	pub fn verifies_output(&self) -> bool {
		self.0.verify_output
	}

	#[must_use]
	pub fn watch_key(&self) -> KeyWatch {
		self.0.key.watch()
	}

	#[must_use]
	pub fn engine(&self) -> &Arc<dyn QueryEngine> {
		&self.0.engine
	}

	/// Whether both handles point to the same procedure.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	/// Key a single execution runs under.
	///
	/// A non empty `fragment` yields `[base, fragment]` and is published, so cache-control handles
	/// target it from now on. Without one the execution runs under the base key and the
	/// published key is left as is.
	pub(crate) fn effective_key(&self, fragment: Option<KeySegment>) -> QueryKey {
		match fragment.filter(|fragment| !fragment.is_empty()) {
			Some(fragment) => {
				let key = self.0.base.with_fragment(fragment);
				self.0.key.publish(key.clone());
				key
			}
			None => self.0.base.clone(),
		}
	}
}

/// What a resolver is called with.
#[derive(Debug, Clone)]
pub struct ResolverArgs<I> {
	pub input: I,
	pub ctx: Procedure,
}

type Resolver<I, O> =
	Box<dyn Fn(ResolverArgs<I>) -> BoxFuture<'static, anyhow::Result<O>> + Send + Sync>;

/// Validation and execution steps shared by every binding kind.
pub(crate) struct Core<I, O> {
	ctx: Procedure,
	input: Box<dyn SchemaSlot<I>>,
	output: Box<dyn SchemaSlot<O>>,
	resolver: Resolver<I, O>,
}

impl<I: ProcedureValue, O: ProcedureValue> Core<I, O> {
	pub(crate) const fn ctx(&self) -> &Procedure {
		&self.ctx
	}

	pub(crate) fn validate_input(
		&self,
		key: &QueryKey,
		input: I,
		mode: ValidationMode,
	) -> Result<I, ProcedureError> {
		match mode {
			ValidationMode::Parse => self
				.input
				.parse(input.clone())
				.map_err(|source| self.input_rejected(key, mode, &input, source)),

			ValidationMode::SafeParse => match self.input.safe_parse(input) {
				SafeParse::Success(input) => Ok(input),
				SafeParse::Failure { value, error } => {
					Err(self.input_rejected(key, mode, &value, error))
				}
			},
		}
	}

	fn input_rejected(
		&self,
		key: &QueryKey,
		mode: ValidationMode,
		value: &I,
		source: SchemaError,
	) -> ProcedureError {
		if self.ctx.0.log_payloads {
			error!(%key, %mode, ?value, "Error validating input: {source}");
		} else {
			error!(%key, %mode, "Error validating input: {source}");
		}

		ProcedureError::InputValidation {
			key: key.clone(),
			mode,
			source,
		}
	}

	/// Only checks when verification was asked for and an output schema is present.
	pub(crate) fn verify_output(&self, key: &QueryKey, output: O) -> Result<O, ProcedureError> {
		if !self.ctx.0.verify_output || !self.output.is_declared() {
			return Ok(output);
		}

		match self.output.safe_parse(output) {
			SafeParse::Success(output) => Ok(output),
			SafeParse::Failure { value, error } => {
				if self.ctx.0.log_payloads {
					error!(%key, ?value, "Error validating output: {error}");
				} else {
					error!(%key, "Error validating output: {error}");
				}

				Err(ProcedureError::OutputValidation {
					key: key.clone(),
					source: error,
				})
			}
		}
	}

	pub(crate) async fn resolve(&self, key: &QueryKey, input: I) -> Result<O, ProcedureError> {
		(self.resolver)(ResolverArgs {
			input,
			ctx: self.ctx.clone(),
		})
		.await
		.map_err(|e| {
			error!(%key, "Resolver failed: {e:#}");
			ProcedureError::Resolver(e)
		})
	}
}

/// Options for [`ProcedureBuilder::output`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
	/// Validate resolved query outputs against the output schema.
	pub verify_output: bool,
}

impl OutputOptions {
	#[must_use]
	pub const fn verified() -> Self {
		Self {
			verify_output: true,
		}
	}
}

/// Entry point handing out procedure builders bound to one engine.
#[derive(Clone)]
pub struct Flow {
	engine: Arc<dyn QueryEngine>,
	log_payloads: bool,
}

impl fmt::Debug for Flow {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Flow")
			.field("log_payloads", &self.log_payloads)
			.finish_non_exhaustive()
	}
}

impl Flow {
	pub fn new<E: QueryEngine>(engine: Arc<E>) -> Self {
		Self {
			engine,
			log_payloads: true,
		}
	}

	/// Uses the client's own config to decide on payload logging.
	#[must_use]
	pub fn for_client(client: Arc<QueryClient>) -> Self {
		let log_payloads = client.config().log_payloads;
		Self::new(client).log_payloads(log_payloads)
	}

	#[must_use]
	pub fn log_payloads(mut self, log_payloads: bool) -> Self {
		self.log_payloads = log_payloads;
		self
	}

	#[must_use]
	pub fn engine(&self) -> &Arc<dyn QueryEngine> {
		&self.engine
	}

	/// A fresh builder on every call.
	#[must_use]
	pub fn procedure(&self) -> ProcedureBuilder {
		ProcedureBuilder {
			engine: Arc::clone(&self.engine),
			log_payloads: self.log_payloads,
			input: Unvalidated,
			output: Unvalidated,
			verify_output: false,
		}
	}
}

/// Builder for a [`Procedure`].
///
/// Every step consumes the builder and hands back a new one whose type parameters record the
/// declared schemas, so a resolver only type checks against the input and output they accept.
/// A terminal method (`query`, `mutation` or `infinite_query`) finishes it.
pub struct ProcedureBuilder<IS = Unvalidated, OS = Unvalidated> {
	engine: Arc<dyn QueryEngine>,
	log_payloads: bool,
	input: IS,
	output: OS,
	verify_output: bool,
}

impl<IS, OS> fmt::Debug for ProcedureBuilder<IS, OS> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProcedureBuilder")
			.field("input", &std::any::type_name::<IS>())
			.field("output", &std::any::type_name::<OS>())
			.field("verify_output", &self.verify_output)
			.finish_non_exhaustive()
	}
}

impl<IS, OS> ProcedureBuilder<IS, OS> {
	/// Declares, or replaces, the input schema.
	pub fn input<S: Schema>(self, schema: S) -> ProcedureBuilder<Declared<S>, OS> {
		self.replace_input(Some(schema))
	}

	/// Like [`input`](Self::input), but an absent schema only warns and leaves the input unchecked.
	pub fn input_maybe<S: Schema>(self, schema: Option<S>) -> ProcedureBuilder<Declared<S>, OS> {
		if schema.is_none() {
			warn!("Input set but empty");
		}

		self.replace_input(schema)
	}

	/// Declares, or replaces, the output schema. Once verification is enabled it stays enabled.
	pub fn output<S: Schema>(
		self,
		schema: S,
		options: OutputOptions,
	) -> ProcedureBuilder<IS, Declared<S>> {
		self.replace_output(Some(schema), options)
	}

	/// Like [`output`](Self::output), but an absent schema only warns.
	pub fn output_maybe<S: Schema>(
		self,
		schema: Option<S>,
		options: OutputOptions,
	) -> ProcedureBuilder<IS, Declared<S>> {
		if schema.is_none() {
			warn!("Output set but empty");
		}

		self.replace_output(schema, options)
	}

	fn replace_input<S>(self, schema: Option<S>) -> ProcedureBuilder<Declared<S>, OS> {
		ProcedureBuilder {
			engine: self.engine,
			log_payloads: self.log_payloads,
			input: Declared::new(schema),
			output: self.output,
			verify_output: self.verify_output,
		}
	}

	fn replace_output<S>(
		self,
		schema: Option<S>,
		options: OutputOptions,
	) -> ProcedureBuilder<IS, Declared<S>> {
		ProcedureBuilder {
			engine: self.engine,
			log_payloads: self.log_payloads,
			input: self.input,
			output: Declared::new(schema),
			verify_output: self.verify_output || options.verify_output,
		}
	}

	fn finish<I, O, F, Fut>(
		self,
		key: impl Into<KeySegment>,
		kind: ProcedureKind,
		resolver: F,
	) -> Result<Arc<Core<I, O>>, BuildError>
	where
		IS: SchemaSlot<I>,
		OS: SchemaSlot<O>,
		I: ProcedureValue,
		O: ProcedureValue,
		F: Fn(ResolverArgs<I>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
	{
		let base = QueryKey::new(key)?;

		let ctx = Procedure(Arc::new(Inner {
			key: KeyPublisher::new(base.clone()),
			base,
			kind,
			input_declared: self.input.is_declared(),
			output_declared: self.output.is_declared(),
			verify_output: self.verify_output,
			log_payloads: self.log_payloads,
			engine: self.engine,
		}));

		Ok(Arc::new(Core {
			ctx,
			input: Box::new(self.input),
			output: Box::new(self.output),
			resolver: Box::new(move |args: ResolverArgs<I>| resolver(args).boxed()),
		}))
	}
}
