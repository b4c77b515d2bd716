use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine wide defaults for a [`QueryClient`](super::QueryClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryClientConfig {
	/// How long fetched data is served from cache before a query refetches it. Zero means every
	/// `run_query` executes.
	#[serde(with = "millis")]
	pub stale_time: Duration,
	/// Attach offending payloads to validation failure logs.
	pub log_payloads: bool,
}

impl Default for QueryClientConfig {
	fn default() -> Self {
		Self {
			stale_time: Duration::ZERO,
			log_payloads: true,
		}
	}
}

impl QueryClientConfig {
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}

	#[must_use]
	pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
		self.stale_time = stale_time;
		self
	}
}

mod millis {
	use std::time::Duration;

	use serde::{ser, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		let millis = u64::try_from(value.as_millis()).map_err(<S::Error as ser::Error>::custom)?;
		serializer.serialize_u64(millis)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
