use thiserror::Error;

use super::{
	key::QueryKey,
	schema::{ValidationIssues, ValidationMode},
};

/// A value did not satisfy a [`Schema`](crate::Schema).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema validation failed: {issues}")]
pub struct SchemaError {
	pub issues: ValidationIssues,
}

impl From<ValidationIssues> for SchemaError {
	fn from(issues: ValidationIssues) -> Self {
		Self { issues }
	}
}

/// Errors raised while finishing a procedure with one of the terminal builder methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
	#[error("procedure key must not be empty")]
	EmptyKey,
}

/// Every way a procedure execution can fail.
#[derive(Debug, Error)]
pub enum ProcedureError {
	#[error("input validation failed <key='{key}', mode='{mode}'>: {source}")]
	InputValidation {
		key: QueryKey,
		mode: ValidationMode,
		#[source]
		source: SchemaError,
	},
	#[error("output validation failed <key='{key}'>: {source}")]
	OutputValidation {
		key: QueryKey,
		#[source]
		source: SchemaError,
	},
	/// The resolver's own error, carried unchanged.
	#[error(transparent)]
	Resolver(anyhow::Error),
	#[error("execution cancelled <key='{0}'>")]
	Cancelled(QueryKey),
	#[error("query is disabled <key='{0}'>")]
	Disabled(QueryKey),
	#[error("cached data has an unexpected type <key='{0}'>")]
	DataTypeMismatch(QueryKey),
	#[error("no pages were fetched yet <key='{0}'>")]
	MissingPages(QueryKey),
}

impl ProcedureError {
	#[must_use]
	pub const fn is_validation(&self) -> bool {
		matches!(
			self,
			Self::InputValidation { .. } | Self::OutputValidation { .. }
		)
	}

	/// The cache key this error was raised for, resolver errors carry none.
	#[must_use]
	pub const fn key(&self) -> Option<&QueryKey> {
		match self {
			Self::InputValidation { key, .. }
			| Self::OutputValidation { key, .. }
			| Self::Cancelled(key)
			| Self::Disabled(key)
			| Self::DataTypeMismatch(key)
			| Self::MissingPages(key) => Some(key),
			Self::Resolver(_) => None,
		}
	}
}
