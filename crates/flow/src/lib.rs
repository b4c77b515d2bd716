//!
//! # Flow
//!
//! Typed procedures for remote data operations on top of a cache/query engine.
//!
//! A procedure is declared once, with optional input and output schemas, and finished as a
//! query, a mutation or an infinite (paginated) query. The resulting binding runs the operation
//! through the engine, validating on the way, and caches reads under a key derived from the
//! procedure. Bindings are grouped in a [`Registry`], and [`api_builder`] pairs it with
//! [`Utils`], which hands out invalidate, refetch and abort handles for every readable leaf.
//!
//! ## Basic example
//!
//! ```
//! use sd_flow::{api_builder, registry, schema, Flow, QueryClient, ResolverArgs, UseQueryOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let flow = Flow::for_client(Arc::new(QueryClient::default()));
//!
//!     let profile = flow
//!         .procedure()
//!         .input(schema::from_fn(|id: &u32| {
//!             if *id > 0 { Ok(()) } else { Err("id must be positive") }
//!         }))
//!         .query("user.profile", |args: ResolverArgs<u32>| async move {
//!             anyhow::Ok(format!("user #{}", args.input))
//!         })
//!         .unwrap();
//!
//!     let api = api_builder(registry! {
//!         user { profile: profile.clone() },
//!     });
//!
//!     let name = profile.use_query(7, UseQueryOptions::default()).await.unwrap();
//!     assert_eq!(name, "user #7");
//!
//!     let utils = api.utils().use_utils();
//!     let key = utils.get("user", "profile").unwrap().invalidate().await;
//!     assert_eq!(key.segments(), ["user.profile"]);
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod api;
mod engine;
mod error;
mod key;
mod procedure;
mod registry;
pub mod schema;
mod utils;

pub use api::{api_builder, Api};
pub use engine::{
	AnyQueryData, PageFn, PageParamFn, PageRequest, Pages, Paging, QueryClient, QueryClientConfig,
	QueryData, QueryEngine, QueryFn, QueryOptions, QueryResult,
};
pub use error::{BuildError, ProcedureError, SchemaError};
pub use key::{KeySegment, KeyWatch, QueryKey};
pub use procedure::{
	Flow, InfiniteData, InfiniteQueryBinding, Mutation, MutationBinding, OutputOptions, PageParams,
	Procedure, ProcedureBuilder, ProcedureKind, ProcedureValue, QueryBinding, ResolverArgs,
	UseInfiniteQueryOptions, UseMutationOptions, UseQueryOptions,
};
pub use registry::{Group, Leaf, Registry};
pub use schema::{Schema, ValidationMode};
pub use utils::{CacheControlHandle, Utils, UtilsTree};
