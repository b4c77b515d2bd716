use sd_flow::{
	Flow, PageParams, ProcedureError, QueryClient, QueryClientConfig, QueryEngine, ResolverArgs,
	UseInfiniteQueryOptions, UseMutationOptions, UseQueryOptions,
};

use std::{sync::Arc, time::Duration};

use tokio::{
	sync::{Barrier, Notify},
	time,
};
use tracing_test::traced_test;

mod common;

use common::{key, Calls};

const STALE_TIME: Duration = Duration::from_secs(60);

fn setup(config: QueryClientConfig) -> (Arc<QueryClient>, Flow) {
	let client = Arc::new(QueryClient::new(config));
	let flow = Flow::for_client(Arc::clone(&client));

	(client, flow)
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn fresh_data_is_served_from_cache() {
	let (_client, flow) = setup(QueryClientConfig::default().with_stale_time(STALE_TIME));
	let calls = Calls::default();

	let profile = flow
		.procedure()
		.query("user.profile", {
			let calls = calls.clone();
			move |args: ResolverArgs<u32>| {
				let call = calls.hit();
				async move { anyhow::Ok(args.input * 10 + u32::try_from(call)?) }
			}
		})
		.unwrap();

	assert_eq!(profile.use_query(1, UseQueryOptions::default()).await.unwrap(), 11);
	assert_eq!(profile.use_query(1, UseQueryOptions::default()).await.unwrap(), 11);
	assert_eq!(calls.count(), 1);

	time::advance(STALE_TIME + Duration::from_secs(1)).await;

	assert_eq!(profile.use_query(1, UseQueryOptions::default()).await.unwrap(), 12);
	assert_eq!(calls.count(), 2);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn call_site_stale_time_overrides_engine_default() {
	let (_client, flow) = setup(QueryClientConfig::default());
	let calls = Calls::default();

	let profile = flow
		.procedure()
		.query("user.profile", {
			let calls = calls.clone();
			move |args: ResolverArgs<u32>| {
				calls.hit();
				async move { anyhow::Ok(args.input) }
			}
		})
		.unwrap();

	// Zero stale time by default, every call executes.
	profile.use_query(1, UseQueryOptions::default()).await.unwrap();
	profile.use_query(1, UseQueryOptions::default()).await.unwrap();
	assert_eq!(calls.count(), 2);

	// Data stored by the last call counts as fresh under a longer stale time.
	let options = UseQueryOptions::default().with_stale_time(STALE_TIME);
	profile.use_query(1, options.clone()).await.unwrap();
	profile.use_query(1, options).await.unwrap();
	assert_eq!(calls.count(), 2);

	time::advance(STALE_TIME).await;

	profile
		.use_query(1, UseQueryOptions::default().with_stale_time(STALE_TIME))
		.await
		.unwrap();
	assert_eq!(calls.count(), 3);
}

#[tokio::test]
#[traced_test]
async fn invalidated_data_is_fetched_again() {
	let (client, flow) = setup(QueryClientConfig::default().with_stale_time(STALE_TIME));
	let calls = Calls::default();

	let profile = flow
		.procedure()
		.query("user.profile", {
			let calls = calls.clone();
			move |args: ResolverArgs<u32>| {
				calls.hit();
				async move { anyhow::Ok(args.input) }
			}
		})
		.unwrap();

	profile
		.use_query(1, UseQueryOptions::default().with_key("v2"))
		.await
		.unwrap();
	assert_eq!(calls.count(), 1);

	// The base key prefixes the overridden one.
	assert_eq!(client.invalidate_by_key(&key(&["user.profile"])).await, 1);

	profile
		.use_query(1, UseQueryOptions::default().with_key("v2"))
		.await
		.unwrap();
	assert_eq!(calls.count(), 2);

	assert_eq!(client.invalidate_by_key(&key(&["files.list"])).await, 0);
}

#[tokio::test]
#[traced_test]
async fn refetch_reruns_last_execution() {
	let (client, flow) = setup(QueryClientConfig::default().with_stale_time(STALE_TIME));
	let calls = Calls::default();

	let profile = flow
		.procedure()
		.query("user.profile", {
			let calls = calls.clone();
			move |args: ResolverArgs<u32>| {
				let call = calls.hit();
				async move { anyhow::Ok(args.input * 10 + u32::try_from(call)?) }
			}
		})
		.unwrap();

	assert_eq!(profile.use_query(4, UseQueryOptions::default()).await.unwrap(), 41);

	assert_eq!(client.refetch_by_key(&key(&["user.profile"])).await, 1);
	assert_eq!(calls.count(), 2);

	let cached = client
		.get_query_data(&key(&["user.profile"]))
		.await
		.unwrap();
	assert_eq!(cached.downcast_ref::<u32>(), Some(&42));

	// Refetched data is fresh again.
	assert_eq!(profile.use_query(4, UseQueryOptions::default()).await.unwrap(), 42);
	assert_eq!(calls.count(), 2);
}

#[tokio::test]
#[traced_test]
async fn failed_refetch_keeps_previous_data() {
	let (client, flow) = setup(QueryClientConfig::default().with_stale_time(STALE_TIME));
	let calls = Calls::default();

	let profile = flow
		.procedure()
		.query("user.profile", {
			let calls = calls.clone();
			move |args: ResolverArgs<u32>| {
				let call = calls.hit();
				async move {
					anyhow::ensure!(call == 1, "backend unavailable");
					anyhow::Ok(args.input)
				}
			}
		})
		.unwrap();

	profile.use_query(4, UseQueryOptions::default()).await.unwrap();

	assert_eq!(client.refetch_by_key(&key(&["user.profile"])).await, 1);
	assert!(logs_contain("failed to refetch query"));

	let cached = client
		.get_query_data(&key(&["user.profile"]))
		.await
		.unwrap();
	assert_eq!(cached.downcast_ref::<u32>(), Some(&4));
}

#[tokio::test]
#[traced_test]
async fn cancel_resolves_in_flight_query() {
	let (client, flow) = setup(QueryClientConfig::default());
	let started = Arc::new(Notify::new());

	let profile = flow
		.procedure()
		.query("user.profile", {
			let started = Arc::clone(&started);
			move |args: ResolverArgs<u32>| {
				let started = Arc::clone(&started);
				async move {
					started.notify_one();
					futures::future::pending::<()>().await;
					anyhow::Ok(args.input)
				}
			}
		})
		.unwrap();

	let handle = tokio::spawn({
		let profile = profile.clone();
		async move { profile.use_query(1, UseQueryOptions::default()).await }
	});

	started.notified().await;
	assert_eq!(client.cancel_by_key(&key(&["user.profile"])).await, 1);

	let res = handle.await.unwrap();
	assert!(matches!(res, Err(ProcedureError::Cancelled(k)) if k == key(&["user.profile"])));
	assert!(logs_contain("execution cancelled"));
}

#[tokio::test]
#[traced_test]
async fn mutations_are_counted_while_in_flight() {
	let (client, flow) = setup(QueryClientConfig::default());
	let started = Arc::new(Notify::new());
	let release = Arc::new(Notify::new());

	let rename = flow
		.procedure()
		.mutation("user.rename", {
			let started = Arc::clone(&started);
			let release = Arc::clone(&release);
			move |args: ResolverArgs<String>| {
				let started = Arc::clone(&started);
				let release = Arc::clone(&release);
				async move {
					started.notify_one();
					release.notified().await;
					anyhow::Ok(args.input)
				}
			}
		})
		.unwrap();

	let handle = tokio::spawn({
		let rename = rename.clone();
		async move {
			rename
				.use_mutation(UseMutationOptions::default())
				.mutate("ada".into())
				.await
		}
	});

	started.notified().await;
	assert_eq!(client.is_mutating(&key(&["user.rename"])).await, 1);
	assert_eq!(client.is_mutating(&key(&["user.profile"])).await, 0);

	release.notify_one();
	assert_eq!(handle.await.unwrap().unwrap(), "ada");
	assert_eq!(client.is_mutating(&key(&["user.rename"])).await, 0);
}

#[tokio::test]
#[traced_test]
async fn infinite_pages_are_cached_and_refetched() {
	let (client, flow) = setup(QueryClientConfig::default().with_stale_time(STALE_TIME));
	let calls = Calls::default();

	let files = flow
		.procedure()
		.infinite_query(
			"files.list",
			{
				let calls = calls.clone();
				move |args: ResolverArgs<u32>| {
					calls.hit();
					async move { anyhow::Ok(vec![args.input, args.input + 1]) }
				}
			},
			PageParams::new(|last: &Vec<u32>, _pages: &[Vec<u32>]| last.last().map(|n| n + 1)),
		)
		.unwrap();

	files
		.use_infinite_query(0, UseInfiniteQueryOptions::default())
		.await
		.unwrap();
	files
		.fetch_next_page(UseInfiniteQueryOptions::default())
		.await
		.unwrap();
	assert_eq!(calls.count(), 2);

	// Fresh pages are served as they are.
	let data = files
		.use_infinite_query(0, UseInfiniteQueryOptions::default())
		.await
		.unwrap();
	assert_eq!(data.pages, [vec![0, 1], vec![2, 3]]);
	assert_eq!(calls.count(), 2);

	// Every page is fetched again with the parameter it was first fetched with.
	assert_eq!(client.refetch_by_key(&key(&["files.list"])).await, 1);
	assert_eq!(calls.count(), 4);

	let data = files
		.use_infinite_query(0, UseInfiniteQueryOptions::default())
		.await
		.unwrap();
	assert_eq!(data.page_params, [0, 2]);
}

#[tokio::test]
#[traced_test]
async fn payload_logging_follows_client_config() {
	let config = QueryClientConfig::from_json(r#"{ "log_payloads": false }"#).unwrap();
	let (client, flow) = setup(config);

	assert!(!client.config().log_payloads);
	assert_eq!(client.config().stale_time, Duration::ZERO);

	let profile = flow
		.procedure()
		.input(common::positive_id())
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();

	assert!(profile.use_query(0, UseQueryOptions::default()).await.is_err());
	assert!(logs_contain("Error validating input"));
	assert!(!logs_contain("value=0"));
}

#[tokio::test]
#[traced_test]
async fn finished_executions_leave_nothing_to_abort() {
	let (client, flow) = setup(QueryClientConfig::default());

	let profile = flow
		.procedure()
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::ensure!(args.input % 2 == 0, "odd profile ids are gone");
			anyhow::Ok(args.input)
		})
		.unwrap();

	for i in 0..20 {
		let res = profile
			.use_query(i, UseQueryOptions::default().with_key(format!("v{i}")))
			.await;
		assert_eq!(res.is_ok(), i % 2 == 0);
	}

	// Neither successful nor failed executions stay registered.
	assert_eq!(client.cancel_by_key(&key(&["user.profile"])).await, 0);
}

#[tokio::test]
#[traced_test]
async fn finishing_one_execution_keeps_another_cancellable() {
	let (client, flow) = setup(QueryClientConfig::default());
	let started = Arc::new(Notify::new());

	let profile = flow
		.procedure()
		.query("user.profile", {
			let started = Arc::clone(&started);
			move |args: ResolverArgs<u32>| {
				let started = Arc::clone(&started);
				async move {
					if args.input > 0 {
						started.notify_one();
						futures::future::pending::<()>().await;
					}
					anyhow::Ok(args.input)
				}
			}
		})
		.unwrap();

	let slow = tokio::spawn({
		let profile = profile.clone();
		async move { profile.use_query(1, UseQueryOptions::default()).await }
	});
	started.notified().await;

	// Same key, done right away.
	assert_eq!(profile.use_query(0, UseQueryOptions::default()).await.unwrap(), 0);

	assert_eq!(client.cancel_by_key(&key(&["user.profile"])).await, 1);
	assert!(matches!(
		slow.await.unwrap(),
		Err(ProcedureError::Cancelled(_))
	));
	assert_eq!(client.cancel_by_key(&key(&["user.profile"])).await, 0);
}

#[tokio::test]
#[traced_test]
async fn concurrent_next_and_previous_pages_both_land() {
	let (_client, flow) = setup(QueryClientConfig::default().with_stale_time(STALE_TIME));
	let barrier = Arc::new(Barrier::new(3));

	let files = flow
		.procedure()
		.infinite_query(
			"files.list",
			{
				let barrier = Arc::clone(&barrier);
				move |args: ResolverArgs<u32>| {
					let barrier = Arc::clone(&barrier);
					async move {
						// Both neighbour fetches are in flight before either stores its page.
						if args.input != 3 {
							barrier.wait().await;
						}
						anyhow::Ok(vec![args.input])
					}
				}
			},
			PageParams::new(|last: &Vec<u32>, _pages: &[Vec<u32>]| last.last().map(|n| n + 1))
				.with_previous(|first: &Vec<u32>, _pages: &[Vec<u32>]| {
					first.first().and_then(|n| n.checked_sub(1))
				}),
		)
		.unwrap();

	files
		.use_infinite_query(3, UseInfiniteQueryOptions::default())
		.await
		.unwrap();

	let next = tokio::spawn({
		let files = files.clone();
		async move { files.fetch_next_page(UseInfiniteQueryOptions::default()).await }
	});
	let previous = tokio::spawn({
		let files = files.clone();
		async move {
			files
				.fetch_previous_page(UseInfiniteQueryOptions::default())
				.await
		}
	});

	barrier.wait().await;
	next.await.unwrap().unwrap();
	previous.await.unwrap().unwrap();

	let data = files
		.use_infinite_query(3, UseInfiniteQueryOptions::default())
		.await
		.unwrap();
	assert_eq!(data.pages, [vec![2], vec![3], vec![4]]);
	assert_eq!(data.page_params, [2, 3, 4]);
}
