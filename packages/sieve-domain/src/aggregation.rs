use regex::Regex;
use serde_json::{Map, Value};

use crate::{Error, Result};

pub const TERMS_AGGREGATION_NAME: &str = "agg";
pub const NESTED_AGGREGATION_NAME: &str = "nested";

/// Bucket aggregation requested through `aggregate_by`.
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregation {
	Terms { field: String, size: u32 },
	Nested { path: String, inner: Box<Aggregation> },
}
impl Aggregation {
	/// Renders the `aggs` section of the engine request.
	pub fn to_value(&self) -> Value {
		let mut aggs = Map::new();

		match self {
			Self::Terms { field, size } => {
				aggs.insert(
					TERMS_AGGREGATION_NAME.to_string(),
					serde_json::json!({ "terms": { "field": field, "size": size } }),
				);
			},
			Self::Nested { path, inner } => {
				aggs.insert(
					NESTED_AGGREGATION_NAME.to_string(),
					serde_json::json!({ "nested": { "path": path }, "aggs": inner.to_value() }),
				);
			},
		}

		Value::Object(aggs)
	}
}

/// Parses `aggregate_by` expressions.
pub struct AggregationParser {
	nested: Regex,
}
impl AggregationParser {
	pub fn new() -> Result<Self> {
		Ok(Self { nested: Regex::new(r"^nested\s?\((?P<path>[^,]+),\s?(?P<rest>.+)\)$")? })
	}

	/// Accepts a plain field or `nested(path, field)`, where `field` may itself be a
	/// `nested(...)` expression.
	pub fn parse(&self, raw: &str, size: u32) -> Result<Aggregation> {
		let raw = raw.trim();

		if raw.is_empty() {
			return Err(Error::bad_request("aggregate_by must be non-empty."));
		}

		let mut paths = Vec::new();
		let mut current = raw.to_string();

		while let Some(caps) = self.nested.captures(&current) {
			let path = caps["path"].trim().to_string();
			let rest = caps["rest"].trim().to_string();

			paths.push(path);

			current = rest;
		}

		if current.contains('(') || current.contains(')') || current.contains(',') {
			return Err(Error::bad_request(format!("Malformed nested aggregation : {raw}")));
		}

		let field = match paths.last() {
			Some(path) => format!("{path}.{current}"),
			None => current,
		};
		let mut aggregation = Aggregation::Terms { field, size };

		for path in paths.into_iter().rev() {
			aggregation = Aggregation::Nested { path, inner: Box::new(aggregation) };
		}

		Ok(aggregation)
	}
}
