use crate::{
	engine::{
		data_ref, from_data, into_data, PageFn, PageParamFn, PageRequest, Pages, Paging, QueryData,
	},
	error::{BuildError, ProcedureError},
	key::{KeySegment, QueryKey},
	schema::{SchemaSlot, ValidationMode},
};

use std::{fmt, future::Future, sync::Arc};

use futures::FutureExt;

use super::{
	Core, Procedure, ProcedureBuilder, ProcedureKind, ProcedureValue, ResolverArgs,
	UseInfiniteQueryOptions,
};

type DeriveParam<I, O> = Arc<dyn Fn(&O, &[O]) -> Option<I> + Send + Sync>;

/// How an infinite query finds the page parameters around the pages it already holds.
///
/// Page parameters share the procedure's input type, the first one is the input handed to
/// [`InfiniteQueryBinding::use_infinite_query`].
pub struct PageParams<I, O> {
	next: DeriveParam<I, O>,
	previous: Option<DeriveParam<I, O>>,
	initial: Option<Pages>,
}

impl<I, O> Clone for PageParams<I, O> {
	fn clone(&self) -> Self {
		Self {
			next: Arc::clone(&self.next),
			previous: self.previous.clone(),
			initial: self.initial.clone(),
		}
	}
}

impl<I, O> fmt::Debug for PageParams<I, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PageParams")
			.field("has_previous", &self.previous.is_some())
			.field("has_initial_data", &self.initial.is_some())
			.finish_non_exhaustive()
	}
}

impl<I: ProcedureValue, O: ProcedureValue> PageParams<I, O> {
	/// `next` gets the last page and all pages, `None` means there is no next page.
	pub fn new(next: impl Fn(&O, &[O]) -> Option<I> + Send + Sync + 'static) -> Self {
		Self {
			next: Arc::new(next),
			previous: None,
			initial: None,
		}
	}

	/// `previous` gets the first page and all pages.
	#[must_use]
	pub fn with_previous(
		mut self,
		previous: impl Fn(&O, &[O]) -> Option<I> + Send + Sync + 'static,
	) -> Self {
		self.previous = Some(Arc::new(previous));
		self
	}

	/// Pages the cache starts with for a key that holds none yet, the first
	/// [`InfiniteQueryBinding::use_infinite_query`] under that key then returns them without
	/// fetching. They are not validated.
	#[must_use]
	pub fn with_initial_data(mut self, data: InfiniteData<O, I>) -> Self {
		self.initial = Some(data.into_pages());
		self
	}
}

fn erase<I: ProcedureValue, O: ProcedureValue>(derive: DeriveParam<I, O>) -> PageParamFn {
	Arc::new(move |edge: &QueryData, pages: &[QueryData]| {
		let edge = data_ref::<O>(edge)?;
		let pages = pages
			.iter()
			.filter_map(data_ref::<O>)
			.cloned()
			.collect::<Vec<_>>();

		derive(edge, &pages).map(into_data)
	})
}

/// Pages accumulated by an infinite query together with the parameter each was fetched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfiniteData<O, P> {
	pub pages: Vec<O>,
	pub page_params: Vec<P>,
}

impl<O: ProcedureValue, P: ProcedureValue> InfiniteData<O, P> {
	fn into_pages(self) -> Pages {
		Pages {
			pages: self.pages.into_iter().map(into_data).collect(),
			page_params: self.page_params.into_iter().map(into_data).collect(),
		}
	}

	fn from_pages(pages: Pages, key: &QueryKey) -> Result<Self, ProcedureError> {
		Ok(Self {
			pages: pages
				.pages
				.into_iter()
				.map(|page| from_data(page, key))
				.collect::<Result<_, _>>()?,
			page_params: pages
				.page_params
				.into_iter()
				.map(|param| from_data(param, key))
				.collect::<Result<_, _>>()?,
		})
	}
}

/// Binding returned by [`ProcedureBuilder::infinite_query`].
pub struct InfiniteQueryBinding<I, O> {
	core: Arc<Core<I, O>>,
	params: PageParams<I, O>,
}

impl<I, O> Clone for InfiniteQueryBinding<I, O> {
	fn clone(&self) -> Self {
		Self {
			core: Arc::clone(&self.core),
			params: self.params.clone(),
		}
	}
}

impl<I, O> fmt::Debug for InfiniteQueryBinding<I, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InfiniteQueryBinding")
			.field("ctx", &self.core.ctx)
			.field("params", &self.params)
			.finish()
	}
}

impl<IS, OS> ProcedureBuilder<IS, OS> {
	/// Finishes the procedure as a paginated read cached under `[key]`.
	pub fn infinite_query<I, O, F, Fut>(
		self,
		key: impl Into<KeySegment>,
		resolver: F,
		params: PageParams<I, O>,
	) -> Result<InfiniteQueryBinding<I, O>, BuildError>
	where
		IS: SchemaSlot<I>,
		OS: SchemaSlot<O>,
		I: ProcedureValue,
		O: ProcedureValue,
		F: Fn(ResolverArgs<I>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
	{
		self.finish(key, ProcedureKind::Infinite, resolver)
			.map(|core| InfiniteQueryBinding { core, params })
	}
}

impl<I: ProcedureValue, O: ProcedureValue> InfiniteQueryBinding<I, O> {
	#[must_use]
	pub fn ctx(&self) -> &Procedure {
		self.core.ctx()
	}

	/// Fetches the first page, `input` being its page parameter, unless the engine still holds
	/// fresh pages for this key.
	///
	/// Every page parameter is validated in safe-parse mode before its page is fetched. Outputs
	/// are never verified.
	pub async fn use_infinite_query(
		&self,
		input: I,
		options: UseInfiniteQueryOptions,
	) -> Result<InfiniteData<O, I>, ProcedureError> {
		let key = self.core.ctx().effective_key(options.key.clone());
		let input = self
			.core
			.validate_input(&key, input, ValidationMode::SafeParse)?;

		self.run(key, &options, PageRequest::Initial(into_data(input)))
			.await
	}

	/// Appends the page after the last one, a no-op once there is no next page parameter.
	pub async fn fetch_next_page(
		&self,
		options: UseInfiniteQueryOptions,
	) -> Result<InfiniteData<O, I>, ProcedureError> {
		let key = self.core.ctx().effective_key(options.key.clone());
		self.run(key, &options, PageRequest::Next).await
	}

	/// Prepends the page before the first one, a no-op without a previous page parameter.
	pub async fn fetch_previous_page(
		&self,
		options: UseInfiniteQueryOptions,
	) -> Result<InfiniteData<O, I>, ProcedureError> {
		let key = self.core.ctx().effective_key(options.key.clone());
		self.run(key, &options, PageRequest::Previous).await
	}

	async fn run(
		&self,
		key: QueryKey,
		options: &UseInfiniteQueryOptions,
		request: PageRequest,
	) -> Result<InfiniteData<O, I>, ProcedureError> {
		let pages = self
			.core
			.ctx()
			.engine()
			.run_infinite_query(key.clone(), self.paging(&key, options), request)
			.await?;

		InfiniteData::from_pages(pages, &key)
	}

	fn paging(&self, key: &QueryKey, options: &UseInfiniteQueryOptions) -> Paging {
		let fetch_page: PageFn = {
			let core = Arc::clone(&self.core);
			let key = key.clone();

			Arc::new(move |param: QueryData| {
				let core = Arc::clone(&core);
				let key = key.clone();

				async move {
					let input = core.validate_input(
						&key,
						from_data::<I>(param, &key)?,
						ValidationMode::SafeParse,
					)?;

					core.resolve(&key, input).await.map(into_data)
				}
				.boxed()
			})
		};

		Paging {
			fetch_page,
			next_page_param: erase(Arc::clone(&self.params.next)),
			previous_page_param: self.params.previous.clone().map(erase),
			stale_time: options.stale_time,
			initial_pages: self.params.initial.clone(),
		}
	}
}
