//! Schema contract used to validate procedure inputs and outputs.
//!
//! Any validation engine can be plugged in by implementing [`Schema`]. The crate bundles a
//! closure based schema ([`from_fn`]) and all-of composition ([`Schema::and`]).

use std::{fmt, marker::PhantomData, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::SchemaError;

/// Which of the two validator entry points ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
	/// Parse or fail, the value is given back only on success.
	Parse,
	/// Always gives the value back, together with the error on failure.
	SafeParse,
}

impl fmt::Display for ValidationMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Parse => write!(f, "parse"),
			Self::SafeParse => write!(f, "safe-parse"),
		}
	}
}

/// One reason a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
	/// Path to the offending field, empty for the value itself.
	pub path: Vec<String>,
	pub message: String,
}

impl Issue {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			path: Vec::new(),
			message: message.into(),
		}
	}

	pub fn at<P, S>(path: P, message: impl Into<String>) -> Self
	where
		P: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			path: path.into_iter().map(Into::into).collect(),
			message: message.into(),
		}
	}
}

impl fmt::Display for Issue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.path.is_empty() {
			write!(f, "{}", self.message)
		} else {
			write!(f, "{}: {}", self.path.join("."), self.message)
		}
	}
}

/// Non empty list of [`Issue`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Issue>", into = "Vec<Issue>")]
pub struct ValidationIssues(Vec<Issue>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("validation issues must not be empty")]
pub struct EmptyIssues;

impl TryFrom<Vec<Issue>> for ValidationIssues {
	type Error = EmptyIssues;

	fn try_from(issues: Vec<Issue>) -> Result<Self, Self::Error> {
		if issues.is_empty() {
			Err(EmptyIssues)
		} else {
			Ok(Self(issues))
		}
	}
}

impl From<ValidationIssues> for Vec<Issue> {
	fn from(issues: ValidationIssues) -> Self {
		issues.0
	}
}

impl ValidationIssues {
	pub fn push(&mut self, issue: Issue) {
		self.0.push(issue);
	}

	pub fn extend(&mut self, other: Self) {
		self.0.extend(other.0);
	}

	pub fn iter(&self) -> impl Iterator<Item = &Issue> {
		self.0.iter()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Issue> for ValidationIssues {
	fn from(issue: Issue) -> Self {
		Self(vec![issue])
	}
}

impl From<String> for ValidationIssues {
	fn from(message: String) -> Self {
		Issue::new(message).into()
	}
}

impl From<&str> for ValidationIssues {
	fn from(message: &str) -> Self {
		Issue::new(message).into()
	}
}

impl fmt::Display for ValidationIssues {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (idx, issue) in self.0.iter().enumerate() {
			if idx > 0 {
				write!(f, "; ")?;
			}
			write!(f, "{issue}")?;
		}
		Ok(())
	}
}

/// Outcome of [`Schema::safe_parse`], the value is handed back either way.
#[derive(Debug)]
pub enum SafeParse<T> {
	Success(T),
	Failure { value: T, error: SchemaError },
}

impl<T> SafeParse<T> {
	pub const fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	pub fn into_result(self) -> Result<T, SchemaError> {
		match self {
			Self::Success(value) => Ok(value),
			Self::Failure { error, .. } => Err(error),
		}
	}
}

/// A validator for values of type [`Schema::Value`].
pub trait Schema: Send + Sync + 'static {
	type Value;

	fn validate(&self, value: &Self::Value) -> Result<(), ValidationIssues>;

	/// Parse or fail.
	fn parse(&self, value: Self::Value) -> Result<Self::Value, SchemaError> {
		self.validate(&value).map(|()| value).map_err(Into::into)
	}

	fn safe_parse(&self, value: Self::Value) -> SafeParse<Self::Value> {
		match self.validate(&value) {
			Ok(()) => SafeParse::Success(value),
			Err(issues) => SafeParse::Failure {
				value,
				error: issues.into(),
			},
		}
	}

	/// All-of composition, issues from both sides are reported.
	fn and<S>(self, other: S) -> And<Self, S>
	where
		Self: Sized,
		S: Schema<Value = Self::Value>,
	{
		And(self, other)
	}
}

impl<S: Schema> Schema for Arc<S> {
	type Value = S::Value;

	fn validate(&self, value: &Self::Value) -> Result<(), ValidationIssues> {
		S::validate(self, value)
	}

	fn parse(&self, value: Self::Value) -> Result<Self::Value, SchemaError> {
		S::parse(self, value)
	}

	fn safe_parse(&self, value: Self::Value) -> SafeParse<Self::Value> {
		S::safe_parse(self, value)
	}
}

/// See [`from_fn`].
pub struct FnSchema<T, E, F> {
	check: F,
	_marker: PhantomData<fn(&T) -> E>,
}

impl<T, E, F> fmt::Debug for FnSchema<T, E, F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnSchema").finish_non_exhaustive()
	}
}

/// Builds a [`Schema`] out of a check function.
///
/// ```
/// use sd_flow::{schema, Schema};
///
/// let non_empty = schema::from_fn(|name: &String| {
/// 	if name.is_empty() {
/// 		Err("name must not be empty")
/// 	} else {
/// 		Ok(())
/// 	}
/// });
///
/// assert!(non_empty.parse(String::from("Spacedrive")).is_ok());
/// assert!(non_empty.parse(String::new()).is_err());
/// ```
pub fn from_fn<T, E, F>(check: F) -> FnSchema<T, E, F>
where
	F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
	E: Into<ValidationIssues>,
{
	FnSchema {
		check,
		_marker: PhantomData,
	}
}

impl<T, E, F> Schema for FnSchema<T, E, F>
where
	T: 'static,
	E: Into<ValidationIssues> + 'static,
	F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
{
	type Value = T;

	fn validate(&self, value: &T) -> Result<(), ValidationIssues> {
		(self.check)(value).map_err(Into::into)
	}
}

/// See [`Schema::and`].
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

impl<A, B> Schema for And<A, B>
where
	A: Schema,
	B: Schema<Value = A::Value>,
{
	type Value = A::Value;

	fn validate(&self, value: &Self::Value) -> Result<(), ValidationIssues> {
		match (self.0.validate(value), self.1.validate(value)) {
			(Ok(()), Ok(())) => Ok(()),
			(Err(issues), Ok(())) | (Ok(()), Err(issues)) => Err(issues),
			(Err(mut issues), Err(more)) => {
				issues.extend(more);
				Err(issues)
			}
		}
	}
}

/// Holds the schema for one side (input or output) of a procedure.
///
/// The slot type a builder carries decides which value type that side accepts: [`Unvalidated`]
/// accepts anything, [`Declared<S>`] narrows it to `S::Value`.
pub trait SchemaSlot<T>: Send + Sync + 'static {
	fn is_declared(&self) -> bool;

	fn parse(&self, value: T) -> Result<T, SchemaError>;

	fn safe_parse(&self, value: T) -> SafeParse<T>;
}

/// No schema was declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unvalidated;

impl<T> SchemaSlot<T> for Unvalidated {
	fn is_declared(&self) -> bool {
		false
	}

	fn parse(&self, value: T) -> Result<T, SchemaError> {
		Ok(value)
	}

	fn safe_parse(&self, value: T) -> SafeParse<T> {
		SafeParse::Success(value)
	}
}

/// A schema was declared, though possibly empty (see `input_maybe` and `output_maybe` on the
/// builder), in which case the type is still narrowed but nothing is checked.
#[derive(Debug)]
pub struct Declared<S> {
	schema: Option<S>,
}

impl<S> Declared<S> {
	pub(crate) const fn new(schema: Option<S>) -> Self {
		Self { schema }
	}
}

impl<S: Schema> SchemaSlot<S::Value> for Declared<S> {
	fn is_declared(&self) -> bool {
		self.schema.is_some()
	}

	fn parse(&self, value: S::Value) -> Result<S::Value, SchemaError> {
		match &self.schema {
			Some(schema) => schema.parse(value),
			None => Ok(value),
		}
	}

	fn safe_parse(&self, value: S::Value) -> SafeParse<S::Value> {
		match &self.schema {
			Some(schema) => schema.safe_parse(value),
			None => SafeParse::Success(value),
		}
	}
}
