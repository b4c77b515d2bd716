#![allow(dead_code)]

use sd_flow::{
	schema::{self, Issue},
	Flow, PageRequest, Pages, Paging, ProcedureError, QueryClient, QueryClientConfig, QueryData,
	QueryEngine, QueryFn, QueryKey, QueryOptions, QueryResult, Schema,
};

use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc, Mutex,
};

use async_trait::async_trait;
use futures::future::BoxFuture;

/// Every call that reached the engine, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
	Query(QueryKey),
	Mutation(QueryKey),
	Infinite(QueryKey),
	Invalidate(QueryKey),
	Refetch(QueryKey),
	Cancel(QueryKey),
}

/// A [`QueryClient`] that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingEngine {
	client: QueryClient,
	calls: Mutex<Vec<EngineCall>>,
}

impl RecordingEngine {
	pub fn new(config: QueryClientConfig) -> Self {
		Self {
			client: QueryClient::new(config),
			calls: Mutex::default(),
		}
	}

	pub fn calls(&self) -> Vec<EngineCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn last_call(&self) -> Option<EngineCall> {
		self.calls.lock().unwrap().last().cloned()
	}

	fn record(&self, call: EngineCall) {
		self.calls.lock().unwrap().push(call);
	}
}

#[async_trait]
impl QueryEngine for RecordingEngine {
	async fn run_query(&self, key: QueryKey, fetch: QueryFn, options: QueryOptions) -> QueryResult {
		self.record(EngineCall::Query(key.clone()));
		self.client.run_query(key, fetch, options).await
	}

	async fn run_mutation(
		&self,
		key: QueryKey,
		mutation: BoxFuture<'static, QueryResult>,
	) -> QueryResult {
		self.record(EngineCall::Mutation(key.clone()));
		self.client.run_mutation(key, mutation).await
	}

	async fn run_infinite_query(
		&self,
		key: QueryKey,
		paging: Paging,
		request: PageRequest,
	) -> Result<Pages, ProcedureError> {
		self.record(EngineCall::Infinite(key.clone()));
		self.client.run_infinite_query(key, paging, request).await
	}

	async fn invalidate_by_key(&self, filter: &QueryKey) -> usize {
		self.record(EngineCall::Invalidate(filter.clone()));
		self.client.invalidate_by_key(filter).await
	}

	async fn refetch_by_key(&self, filter: &QueryKey) -> usize {
		self.record(EngineCall::Refetch(filter.clone()));
		self.client.refetch_by_key(filter).await
	}

	async fn cancel_by_key(&self, filter: &QueryKey) -> usize {
		self.record(EngineCall::Cancel(filter.clone()));
		self.client.cancel_by_key(filter).await
	}

	async fn get_query_data(&self, key: &QueryKey) -> Option<QueryData> {
		self.client.get_query_data(key).await
	}

	async fn is_mutating(&self, filter: &QueryKey) -> usize {
		self.client.is_mutating(filter).await
	}
}

pub fn setup() -> (Arc<RecordingEngine>, Flow) {
	let engine = Arc::new(RecordingEngine::default());
	let flow = Flow::new(Arc::clone(&engine));

	(engine, flow)
}

pub fn key(segments: &[&str]) -> QueryKey {
	let (base, rest) = segments.split_first().expect("keys have a base segment");

	rest.iter().fold(QueryKey::new(*base).unwrap(), |key, segment| {
		key.with_fragment(*segment)
	})
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
	pub id: u32,
	pub name: String,
}

/// Nameable schema type, for declaring absent schemas.
pub type IdSchema = schema::FnSchema<u32, &'static str, fn(&u32) -> Result<(), &'static str>>;

pub fn positive_id() -> impl Schema<Value = u32> {
	schema::from_fn(|id: &u32| {
		if *id > 0 {
			Ok(())
		} else {
			Err(Issue::at(["id"], "must be positive"))
		}
	})
}

pub fn named_profile() -> impl Schema<Value = Profile> {
	schema::from_fn(|profile: &Profile| {
		if profile.name.is_empty() {
			Err(Issue::at(["name"], "must not be empty"))
		} else {
			Ok(())
		}
	})
}

/// Counts how many times a resolver ran.
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
	pub fn hit(&self) -> usize {
		self.0.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn count(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}
