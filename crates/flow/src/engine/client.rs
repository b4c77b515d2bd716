use crate::{error::ProcedureError, key::QueryKey};

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::{
	PageRequest, Pages, Paging, QueryClientConfig, QueryData, QueryEngine, QueryFn, QueryOptions,
	QueryResult,
};

#[derive(Debug, Clone, Copy, Default)]
struct Freshness {
	updated_at: Option<Instant>,
	invalidated: bool,
}

impl Freshness {
	fn is_fresh(&self, stale_time: Duration) -> bool {
		!self.invalidated
			&& self
				.updated_at
				.is_some_and(|updated_at| updated_at.elapsed() < stale_time)
	}

	fn touch(&mut self) {
		self.updated_at = Some(Instant::now());
		self.invalidated = false;
	}
}

struct QueryEntry {
	data: Option<QueryData>,
	freshness: Freshness,
	/// Function of the last execution under this key, used to refetch.
	fetch: QueryFn,
}

struct InfiniteEntry {
	pages: Pages,
	freshness: Freshness,
	paging: Paging,
}

/// Executions currently running under one key, all cancelled through `token`.
struct InFlight {
	token: CancellationToken,
	running: usize,
	/// Tells apart entries for the same key created before and after a cancellation.
	generation: u64,
}

#[derive(Default)]
struct State {
	queries: HashMap<QueryKey, QueryEntry>,
	infinite: HashMap<QueryKey, InfiniteEntry>,
	in_flight: HashMap<QueryKey, InFlight>,
	generations: u64,
	mutations: HashMap<QueryKey, usize>,
}

/// In-memory [`QueryEngine`].
///
/// Every query and infinite query result is cached under the exact key it ran with, while the
/// cache-control operations (`invalidate_by_key`, `refetch_by_key`, `cancel_by_key`) act on all
/// entries prefixed by the given filter.
pub struct QueryClient {
	config: QueryClientConfig,
	state: Mutex<State>,
}

impl fmt::Debug for QueryClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("QueryClient")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl Default for QueryClient {
	fn default() -> Self {
		Self::new(QueryClientConfig::default())
	}
}

impl QueryClient {
	#[must_use]
	pub fn new(config: QueryClientConfig) -> Self {
		Self {
			config,
			state: Mutex::new(State::default()),
		}
	}

	#[must_use]
	pub const fn config(&self) -> &QueryClientConfig {
		&self.config
	}

	/// Runs `fut`, resolving early with [`ProcedureError::Cancelled`] if `cancel_by_key` hits
	/// `key` in the meantime.
	async fn execute(&self, key: &QueryKey, fut: BoxFuture<'static, QueryResult>) -> QueryResult {
		let (token, generation) = {
			let mut state = self.state.lock().await;
			let State {
				in_flight,
				generations,
				..
			} = &mut *state;

			let entry = in_flight.entry(key.clone()).or_insert_with(|| {
				*generations += 1;
				InFlight {
					token: CancellationToken::new(),
					running: 0,
					generation: *generations,
				}
			});
			entry.running += 1;

			(entry.token.child_token(), entry.generation)
		};

		let res = tokio::select! {
			res = fut => res,
			() = token.cancelled() => {
				debug!(%key, "execution cancelled");
				Err(ProcedureError::Cancelled(key.clone()))
			}
		};

		self.finish_execution(key, generation).await;

		res
	}

	/// Drops the key's in flight entry once its last execution is done. An entry created after
	/// a cancellation belongs to newer executions and is left alone.
	async fn finish_execution(&self, key: &QueryKey, generation: u64) {
		let mut state = self.state.lock().await;

		let finished = state.in_flight.get_mut(key).is_some_and(|entry| {
			if entry.generation != generation {
				return false;
			}
			entry.running = entry.running.saturating_sub(1);
			entry.running == 0
		});

		if finished {
			state.in_flight.remove(key);
		}
	}

	async fn store_query(&self, key: &QueryKey, data: QueryData) {
		if let Some(entry) = self.state.lock().await.queries.get_mut(key) {
			entry.data = Some(data);
			entry.freshness.touch();
		}
	}

	async fn store_pages(&self, key: &QueryKey, pages: Pages, paging: Paging) {
		let mut state = self.state.lock().await;
		let entry = state
			.infinite
			.entry(key.clone())
			.or_insert_with(|| InfiniteEntry {
				pages: Pages::default(),
				freshness: Freshness::default(),
				paging: paging.clone(),
			});

		entry.pages = pages;
		entry.paging = paging;
		entry.freshness.touch();
	}

	/// Adds one page to whatever the entry holds by now, so concurrent next and previous page
	/// fetches on the same key both land.
	async fn merge_page(
		&self,
		key: &QueryKey,
		page: QueryData,
		param: QueryData,
		forward: bool,
		paging: Paging,
	) -> Pages {
		let mut state = self.state.lock().await;
		let entry = state
			.infinite
			.entry(key.clone())
			.or_insert_with(|| InfiniteEntry {
				pages: Pages::default(),
				freshness: Freshness::default(),
				paging: paging.clone(),
			});

		if forward {
			entry.pages.pages.push(page);
			entry.pages.page_params.push(param);
		} else {
			entry.pages.pages.insert(0, page);
			entry.pages.page_params.insert(0, param);
		}
		entry.paging = paging;
		entry.freshness.touch();

		entry.pages.clone()
	}

	async fn fetch_pages(
		&self,
		key: &QueryKey,
		paging: &Paging,
		page_params: Vec<QueryData>,
	) -> Result<Pages, ProcedureError> {
		let mut pages = Vec::with_capacity(page_params.len());
		for param in &page_params {
			pages.push(
				self.execute(key, (paging.fetch_page)(Arc::clone(param)))
					.await?,
			);
		}

		Ok(Pages { pages, page_params })
	}
}

#[async_trait]
impl QueryEngine for QueryClient {
	#[instrument(skip_all, fields(%key))]
	async fn run_query(&self, key: QueryKey, fetch: QueryFn, options: QueryOptions) -> QueryResult {
		let stale_time = options.stale_time.unwrap_or(self.config.stale_time);

		{
			let mut state = self.state.lock().await;
			let entry = state
				.queries
				.entry(key.clone())
				.or_insert_with(|| QueryEntry {
					data: None,
					freshness: Freshness::default(),
					fetch: Arc::clone(&fetch),
				});
			entry.fetch = Arc::clone(&fetch);

			if let Some(data) = entry
				.data
				.as_ref()
				.filter(|_| entry.freshness.is_fresh(stale_time))
			{
				trace!("serving cached data");
				return Ok(Arc::clone(data));
			}
		}

		let data = self.execute(&key, fetch()).await?;
		self.store_query(&key, Arc::clone(&data)).await;

		Ok(data)
	}

	#[instrument(skip_all, fields(%key))]
	async fn run_mutation(
		&self,
		key: QueryKey,
		mutation: BoxFuture<'static, QueryResult>,
	) -> QueryResult {
		*self
			.state
			.lock()
			.await
			.mutations
			.entry(key.clone())
			.or_default() += 1;

		let res = mutation.await;

		let mut state = self.state.lock().await;
		if let Some(count) = state.mutations.get_mut(&key) {
			*count = count.saturating_sub(1);
			if *count == 0 {
				state.mutations.remove(&key);
			}
		}

		res
	}

	#[instrument(skip_all, fields(%key))]
	async fn run_infinite_query(
		&self,
		key: QueryKey,
		paging: Paging,
		request: PageRequest,
	) -> Result<Pages, ProcedureError> {
		let stale_time = paging.stale_time.unwrap_or(self.config.stale_time);
		let initial = matches!(request, PageRequest::Initial(_));
		let forward = !matches!(request, PageRequest::Previous);

		let (cached, param) = {
			let mut state = self.state.lock().await;

			match request {
				PageRequest::Initial(param) => {
					if let Some(entry) = state.infinite.get_mut(&key) {
						entry.paging = paging.clone();
						if entry.freshness.is_fresh(stale_time) {
							trace!("serving cached pages");
							return Ok(entry.pages.clone());
						}
					} else if let Some(pages) = paging.initial_pages.clone() {
						trace!("seeding cache with initial pages");
						let mut freshness = Freshness::default();
						freshness.touch();
						state.infinite.insert(
							key.clone(),
							InfiniteEntry {
								pages: pages.clone(),
								freshness,
								paging: paging.clone(),
							},
						);
						return Ok(pages);
					}

					(Pages::default(), Some(param))
				}

				PageRequest::Next | PageRequest::Previous => {
					let entry = state
						.infinite
						.get_mut(&key)
						.ok_or_else(|| ProcedureError::MissingPages(key.clone()))?;
					entry.paging = paging.clone();

					let edge = if forward {
						entry.pages.pages.last()
					} else {
						entry.pages.pages.first()
					};
					let derive = if forward {
						Some(&paging.next_page_param)
					} else {
						paging.previous_page_param.as_ref()
					};

					let param = edge
						.zip(derive)
						.and_then(|(edge, derive)| derive(edge, entry.pages.pages.as_slice()));

					(entry.pages.clone(), param)
				}
			}
		};

		let Some(param) = param else {
			trace!("no further page to fetch");
			return Ok(cached);
		};

		let page = self
			.execute(&key, (paging.fetch_page)(Arc::clone(&param)))
			.await?;

		if initial {
			let pages = Pages {
				pages: vec![page],
				page_params: vec![param],
			};
			self.store_pages(&key, pages.clone(), paging).await;

			return Ok(pages);
		}

		Ok(self.merge_page(&key, page, param, forward, paging).await)
	}

	#[instrument(skip_all, fields(%filter))]
	async fn invalidate_by_key(&self, filter: &QueryKey) -> usize {
		let mut state = self.state.lock().await;
		let State {
			queries, infinite, ..
		} = &mut *state;

		let freshness = queries
			.iter_mut()
			.filter(|(key, _)| key.matches(filter))
			.map(|(_, entry)| &mut entry.freshness)
			.chain(
				infinite
					.iter_mut()
					.filter(|(key, _)| key.matches(filter))
					.map(|(_, entry)| &mut entry.freshness),
			);

		let mut count = 0;
		for freshness in freshness {
			freshness.invalidated = true;
			count += 1;
		}

		debug!(count, "invalidated cache entries");

		count
	}

	#[instrument(skip_all, fields(%filter))]
	async fn refetch_by_key(&self, filter: &QueryKey) -> usize {
		let (queries, infinite) = {
			let state = self.state.lock().await;

			let queries = state
				.queries
				.iter()
				.filter(|(key, _)| key.matches(filter))
				.map(|(key, entry)| (key.clone(), Arc::clone(&entry.fetch)))
				.collect::<Vec<_>>();

			let infinite = state
				.infinite
				.iter()
				.filter(|(key, _)| key.matches(filter))
				.map(|(key, entry)| {
					(
						key.clone(),
						entry.paging.clone(),
						entry.pages.page_params.clone(),
					)
				})
				.collect::<Vec<_>>();

			(queries, infinite)
		};

		let count = queries.len() + infinite.len();

		for (key, fetch) in queries {
			match self.execute(&key, fetch()).await {
				Ok(data) => self.store_query(&key, data).await,
				Err(e) => warn!(%key, "failed to refetch query: {e:#}"),
			}
		}

		for (key, paging, page_params) in infinite {
			match self.fetch_pages(&key, &paging, page_params).await {
				Ok(pages) => self.store_pages(&key, pages, paging).await,
				Err(e) => warn!(%key, "failed to refetch infinite query: {e:#}"),
			}
		}

		debug!(count, "refetched cache entries");

		count
	}

	#[instrument(skip_all, fields(%filter))]
	async fn cancel_by_key(&self, filter: &QueryKey) -> usize {
		let mut state = self.state.lock().await;

		let keys = state
			.in_flight
			.keys()
			.filter(|key| key.matches(filter))
			.cloned()
			.collect::<Vec<_>>();

		for key in &keys {
			if let Some(in_flight) = state.in_flight.remove(key) {
				in_flight.token.cancel();
			}
		}

		debug!(count = keys.len(), "cancelled in flight executions");

		keys.len()
	}

	async fn get_query_data(&self, key: &QueryKey) -> Option<QueryData> {
		let state = self.state.lock().await;

		state
			.queries
			.get(key)
			.and_then(|entry| entry.data.clone())
			.or_else(|| {
				state
					.infinite
					.get(key)
					.map(|entry| Arc::new(entry.pages.clone()) as QueryData)
			})
	}

	async fn is_mutating(&self, filter: &QueryKey) -> usize {
		self.state
			.lock()
			.await
			.mutations
			.iter()
			.filter(|(key, _)| key.matches(filter))
			.map(|(_, count)| *count)
			.sum()
	}
}
