//! The cache/query engine procedures delegate execution to.
//!
//! Values cross this boundary type erased as [`QueryData`] and are downcast back to their
//! concrete type by the procedure binding that produced them.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};
use futures::future::BoxFuture;

use super::{error::ProcedureError, key::QueryKey};

mod client;
mod config;

pub use client::QueryClient;
pub use config::QueryClientConfig;

/// Anything a procedure can produce or take as a page parameter.
pub trait AnyQueryData: DowncastSync {}

impl_downcast!(sync AnyQueryData);

impl<T: Send + Sync + 'static> AnyQueryData for T {}

impl fmt::Debug for dyn AnyQueryData {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<AnyQueryData>")
	}
}

/// Shared, type erased value stored in the cache.
pub type QueryData = Arc<dyn AnyQueryData>;

pub type QueryResult = Result<QueryData, ProcedureError>;

/// Query execution function, kept by the engine so it can refetch.
pub type QueryFn = Arc<dyn Fn() -> BoxFuture<'static, QueryResult> + Send + Sync>;

/// Fetches one page given its page parameter.
pub type PageFn = Arc<dyn Fn(QueryData) -> BoxFuture<'static, QueryResult> + Send + Sync>;

/// Derives a neighbouring page parameter from one edge page and every page fetched so far.
pub type PageParamFn = Arc<dyn Fn(&QueryData, &[QueryData]) -> Option<QueryData> + Send + Sync>;

pub(crate) fn into_data<T: Send + Sync + 'static>(value: T) -> QueryData {
	Arc::new(value)
}

pub(crate) fn from_data<T: Clone + Send + Sync + 'static>(
	data: QueryData,
	key: &QueryKey,
) -> Result<T, ProcedureError> {
	data.downcast_arc::<T>()
		.map(Arc::unwrap_or_clone)
		.map_err(|_| ProcedureError::DataTypeMismatch(key.clone()))
}

pub(crate) fn data_ref<T: Send + Sync + 'static>(data: &QueryData) -> Option<&T> {
	(**data).downcast_ref::<T>()
}

/// Options handed to [`QueryEngine::run_query`], unset fields fall back to the engine defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
	pub stale_time: Option<Duration>,
}

/// Everything the engine needs to fetch and refetch a paginated read.
#[derive(Clone)]
pub struct Paging {
	pub fetch_page: PageFn,
	pub next_page_param: PageParamFn,
	pub previous_page_param: Option<PageParamFn>,
	pub stale_time: Option<Duration>,
	/// Served and stored, instead of fetching, by an initial request for a key with no entry.
	pub initial_pages: Option<Pages>,
}

impl fmt::Debug for Paging {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Paging")
			.field("has_previous_page_param", &self.previous_page_param.is_some())
			.field("stale_time", &self.stale_time)
			.field("initial_pages", &self.initial_pages)
			.finish_non_exhaustive()
	}
}

/// Which page an infinite query asks for.
#[derive(Debug)]
pub enum PageRequest {
	/// First page, answered from cache when fresh.
	Initial(QueryData),
	Next,
	Previous,
}

/// Accumulated pages of an infinite query, in display order.
#[derive(Debug, Clone, Default)]
pub struct Pages {
	pub pages: Vec<QueryData>,
	pub page_params: Vec<QueryData>,
}

/// Contract of the external cache/query engine.
///
/// Cache-control operations take a filter key and act on every entry whose key it prefixes,
/// returning how many entries they touched. They never fail, errors stay in the engine.
#[async_trait]
pub trait QueryEngine: Send + Sync + 'static {
	async fn run_query(&self, key: QueryKey, fetch: QueryFn, options: QueryOptions) -> QueryResult;

	async fn run_mutation(
		&self,
		key: QueryKey,
		mutation: BoxFuture<'static, QueryResult>,
	) -> QueryResult;

	async fn run_infinite_query(
		&self,
		key: QueryKey,
		paging: Paging,
		request: PageRequest,
	) -> Result<Pages, ProcedureError>;

	async fn invalidate_by_key(&self, filter: &QueryKey) -> usize;

	async fn refetch_by_key(&self, filter: &QueryKey) -> usize;

	async fn cancel_by_key(&self, filter: &QueryKey) -> usize;

	/// Cached data stored under exactly `key`.
	async fn get_query_data(&self, key: &QueryKey) -> Option<QueryData>;

	/// Mutations in flight under keys matching `filter`.
	async fn is_mutating(&self, filter: &QueryKey) -> usize;
}
