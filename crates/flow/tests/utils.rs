use sd_flow::{
	api_builder, registry, Group, MutationBinding, PageParams, ProcedureKind, QueryBinding,
	Registry, ResolverArgs, UseInfiniteQueryOptions, UseQueryOptions,
};

use tracing_test::traced_test;

mod common;

use common::{key, setup, EngineCall};

#[tokio::test]
#[traced_test]
async fn invalidate_targets_base_key() {
	let (engine, flow) = setup();

	let profile = flow
		.procedure()
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();

	let api = api_builder(registry! {
		user { profile: profile },
	});

	let utils = api.utils().use_utils();
	let handle = utils.get("user", "profile").unwrap();
	assert_eq!(handle.kind(), ProcedureKind::Query);

	let invalidated = handle.invalidate().await;

	assert_eq!(invalidated, key(&["user.profile"]));
	assert_eq!(
		engine.calls(),
		[EngineCall::Invalidate(key(&["user.profile"]))]
	);
}

#[tokio::test]
#[traced_test]
async fn refetch_follows_key_override() {
	let (engine, flow) = setup();

	let profile = flow
		.procedure()
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();

	let api = api_builder(registry! {
		user { profile: profile.clone() },
	});

	// Obtained before the override, still sees it.
	let utils = api.utils().use_utils();

	profile
		.use_query(1, UseQueryOptions::default().with_key("v2"))
		.await
		.unwrap();

	let refetched = utils.get("user", "profile").unwrap().refetch().await;

	assert_eq!(refetched, key(&["user.profile", "v2"]));
	assert_eq!(
		engine.last_call(),
		Some(EngineCall::Refetch(key(&["user.profile", "v2"])))
	);
}

#[tokio::test]
#[traced_test]
async fn abort_targets_current_key() {
	let (engine, flow) = setup();

	let files = flow
		.procedure()
		.infinite_query(
			"files.list",
			|args: ResolverArgs<u32>| async move { anyhow::Ok(vec![args.input]) },
			PageParams::new(|_last: &Vec<u32>, _pages: &[Vec<u32>]| None),
		)
		.unwrap();

	let api = api_builder(registry! {
		files { list: files.clone() },
	});

	files
		.use_infinite_query(0, UseInfiniteQueryOptions::default().with_key("photos"))
		.await
		.unwrap();

	let utils = api.utils().use_utils();
	let handle = utils.get("files", "list").unwrap();
	assert_eq!(handle.kind(), ProcedureKind::Infinite);

	let aborted = handle.abort().await;

	assert_eq!(aborted, key(&["files.list", "photos"]));
	assert_eq!(
		engine.last_call(),
		Some(EngineCall::Cancel(key(&["files.list", "photos"])))
	);
}

#[tokio::test]
#[traced_test]
async fn mutations_get_no_handle() {
	let (engine, flow) = setup();

	let profile = flow
		.procedure()
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();
	let rename = flow
		.procedure()
		.mutation("user.rename", |args: ResolverArgs<String>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();

	let api = api_builder(registry! {
		user {
			profile: profile,
			rename: rename,
		},
	});

	let utils = api.utils().use_utils();

	assert!(utils.get("user", "rename").is_none());
	assert!(utils.get("user", "profile").is_some());
	assert_eq!(utils.len(), 1);
	assert!(engine.calls().is_empty());
}

#[tokio::test]
#[traced_test]
async fn unfinished_leaves_get_no_handle() {
	let (_engine, flow) = setup();

	let api = api_builder(registry! {
		user { draft: flow.procedure() },
	});

	let utils = api.utils().use_utils();

	assert!(utils.get("user", "draft").is_none());
	assert!(utils.group("user").is_some_and(indexmap::IndexMap::is_empty));
	assert!(utils.is_empty());
}

#[tokio::test]
#[traced_test]
async fn utils_keep_registry_shape() {
	let (_engine, flow) = setup();

	let profile = flow
		.procedure()
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();
	let rename = flow
		.procedure()
		.mutation("user.rename", |args: ResolverArgs<String>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();
	let files = flow
		.procedure()
		.infinite_query(
			"files.list",
			|args: ResolverArgs<u32>| async move { anyhow::Ok(vec![args.input]) },
			PageParams::new(|_last: &Vec<u32>, _pages: &[Vec<u32>]| None),
		)
		.unwrap();

	let api = api_builder(registry! {
		user {
			rename: rename,
			profile: profile,
		},
		files { list: files },
		settings {},
	});

	let utils = api.utils().use_utils();

	let groups = utils.groups().map(|(name, _)| name).collect::<Vec<_>>();
	assert_eq!(groups, ["user", "files", "settings"]);

	let user = utils
		.group("user")
		.unwrap()
		.keys()
		.map(String::as_str)
		.collect::<Vec<_>>();
	assert_eq!(user, ["profile"]);

	assert_eq!(
		utils.get("files", "list").map(|handle| handle.key()),
		Some(key(&["files.list"]))
	);
	assert_eq!(utils.len(), 2);
}

#[tokio::test]
#[traced_test]
async fn api_exposes_registry_untouched() {
	let (_engine, flow) = setup();

	let profile = flow
		.procedure()
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();
	let rename = flow
		.procedure()
		.mutation("user.rename", |args: ResolverArgs<String>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();

	let api = api_builder(
		Registry::new().group(
			"user",
			Group::new()
				.leaf("profile", profile.clone())
				.leaf("rename", rename),
		),
	);

	let stored = api
		.binding::<QueryBinding<u32, u32>>("user", "profile")
		.unwrap();
	assert!(stored.ctx().ptr_eq(profile.ctx()));

	assert!(api
		.binding::<MutationBinding<String, String>>("user", "rename")
		.is_some());
	assert!(api
		.binding::<QueryBinding<u32, u32>>("user", "rename")
		.is_none());
	assert!(api.leaf("user", "missing").is_none());
	assert_eq!(api.registry().get("user").map(Group::len), Some(2));

	// Registry lookups go through to procedures that still work.
	assert_eq!(
		stored.use_query(5, UseQueryOptions::default()).await.unwrap(),
		5
	);
}

#[tokio::test]
#[traced_test]
async fn each_use_utils_call_is_fresh() {
	let (_engine, flow) = setup();

	let profile = flow
		.procedure()
		.query("user.profile", |args: ResolverArgs<u32>| async move {
			anyhow::Ok(args.input)
		})
		.unwrap();

	let api = api_builder(registry! {
		user { profile: profile.clone() },
	});

	let before = api.utils().use_utils();
	profile
		.use_query(1, UseQueryOptions::default().with_key("v2"))
		.await
		.unwrap();
	let after = api.utils().use_utils();

	assert_eq!(
		before.get("user", "profile").map(|handle| handle.key()),
		Some(key(&["user.profile", "v2"]))
	);
	assert_eq!(
		after.get("user", "profile").map(|handle| handle.key()),
		Some(key(&["user.profile", "v2"]))
	);
}
