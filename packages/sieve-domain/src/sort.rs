use std::{fmt, str::FromStr};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
	Error, Result,
	query::{EngineQuery, QueryNode},
	query_parser::QueryParser,
};

pub const SCORE_FIELD: &str = "_score";

const BAD_SORT_MESSAGE: &str = "Must be in format: nested(<path>, <field>, <mode>) OR nested(<parent_path>, .....nested(<child_path>, <field>, <mode>))";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SortOrder {
	Asc,
	Desc,
}
impl SortOrder {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Asc => "asc",
			Self::Desc => "desc",
		}
	}
}
impl FromStr for SortOrder {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"asc" => Ok(Self::Asc),
			"desc" => Ok(Self::Desc),
			_ => Err(Error::bad_request(format!("Unsupported sort order '{raw}'."))),
		}
	}
}
impl TryFrom<String> for SortOrder {
	type Error = Error;

	fn try_from(raw: String) -> Result<Self> {
		raw.parse()
	}
}
impl From<SortOrder> for String {
	fn from(order: SortOrder) -> Self {
		order.as_str().to_ascii_uppercase()
	}
}
impl fmt::Display for SortOrder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
	pub field: String,
	pub order: SortOrder,
	/// Query string restricting a nested sort, e.g. `nested(data.Markers, (Name:top))`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filter: Option<String>,
}
impl SortField {
	pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
		Self { field: field.into(), order, filter: None }
	}
}

/// Ordered sort keys; the first entry is the primary key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortQuery {
	pub fields: Vec<SortField>,
}
impl SortQuery {
	pub fn score_desc() -> Self {
		Self { fields: vec![SortField::new(SCORE_FIELD, SortOrder::Desc)] }
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortMode {
	Min,
	Max,
	Sum,
	Avg,
	Median,
}
impl SortMode {
	fn parse(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"min" => Ok(Self::Min),
			"max" => Ok(Self::Max),
			"sum" => Ok(Self::Sum),
			"avg" => Ok(Self::Avg),
			"median" => Ok(Self::Median),
			_ => Err(Error::bad_request(format!(
				"Unsupported nested sort mode '{}'. {BAD_SORT_MESSAGE}",
				raw.trim()
			))),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Min => "min",
			Self::Max => "max",
			Self::Sum => "sum",
			Self::Avg => "avg",
			Self::Median => "median",
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct NestedSort {
	pub path: String,
	pub filter: Option<EngineQuery>,
	pub nested: Option<Box<NestedSort>>,
}
impl NestedSort {
	fn to_value(&self) -> Value {
		let mut body = Map::new();

		body.insert("path".to_string(), Value::from(self.path.clone()));

		if let Some(filter) = &self.filter {
			body.insert("filter".to_string(), filter.to_value());
		}
		if let Some(nested) = &self.nested {
			body.insert("nested".to_string(), nested.to_value());
		}

		Value::Object(body)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum SortClause {
	Score { order: SortOrder },
	Field { field: String, order: SortOrder },
	Nested { field: String, order: SortOrder, mode: SortMode, nested: NestedSort },
}
impl SortClause {
	pub fn to_value(&self) -> Value {
		let (field, body) = match self {
			Self::Score { order } =>
				(SCORE_FIELD, serde_json::json!({ "order": order.as_str() })),
			Self::Field { field, order } => (
				field.as_str(),
				serde_json::json!({
					"order": order.as_str(),
					"missing": "_last",
					"unmapped_type": "keyword",
				}),
			),
			Self::Nested { field, order, mode, nested } => (
				field.as_str(),
				serde_json::json!({
					"order": order.as_str(),
					"mode": mode.as_str(),
					"nested": nested.to_value(),
					"missing": "_last",
					"unmapped_type": "keyword",
				}),
			),
		};
		let mut root = Map::new();

		root.insert(field.to_string(), body);

		Value::Object(root)
	}
}

/// Builds engine sort clauses, one per requested field, in request order.
pub struct SortBuilder {
	parser: QueryParser,
	one_level: Regex,
	multilevel: Regex,
}
impl SortBuilder {
	pub fn new() -> Result<Self> {
		Ok(Self {
			parser: QueryParser::new()?,
			one_level: Regex::new(
				r"(nested\s?\()(?P<path>.+?),\s?(?P<field>.+?),\s?(?P<mode>[^)]+)",
			)?,
			multilevel: Regex::new(
				r"(nested\s?\()(?P<parentpath>.+?),\s?(?P<innergroup>nested\s?\(.+)",
			)?,
		})
	}

	pub fn build(&self, sort: &SortQuery) -> Result<Vec<SortClause>> {
		sort.fields.iter().map(|field| self.clause(field)).collect()
	}

	fn clause(&self, sort_field: &SortField) -> Result<SortClause> {
		let field = sort_field.field.trim();

		if field.contains("nested(") || field.contains("nested (") {
			return self.nested_clause(field, sort_field.order, sort_field.filter.as_deref());
		}
		if field.eq_ignore_ascii_case(SCORE_FIELD) {
			return Ok(SortClause::Score { order: sort_field.order });
		}

		Ok(SortClause::Field { field: field.to_string(), order: sort_field.order })
	}

	fn nested_clause(
		&self,
		raw: &str,
		order: SortOrder,
		filter: Option<&str>,
	) -> Result<SortClause> {
		let filter = filter.map(|filter| self.nested_filter(filter)).transpose()?;
		let mut innermost = raw.to_string();

		while let Some(caps) = self.multilevel.captures(&innermost) {
			innermost = caps["innergroup"].to_string();
		}

		let Some(caps) = self.one_level.captures(&innermost) else {
			return Err(Error::bad_request(format!(
				"Malformed nested sort : {raw}. {BAD_SORT_MESSAGE}"
			)));
		};
		let path = caps["path"].trim();
		let field = caps["field"].trim();
		let mode = SortMode::parse(&caps["mode"])?;
		let mut nested = self.nested_path(raw)?;

		nested.filter = filter;

		Ok(SortClause::Nested { field: format!("{path}.{field}"), order, mode, nested })
	}

	fn nested_path(&self, group: &str) -> Result<NestedSort> {
		if let Some(caps) = self.multilevel.captures(group) {
			return Ok(NestedSort {
				path: caps["parentpath"].trim().to_string(),
				filter: None,
				nested: Some(Box::new(self.nested_path(&caps["innergroup"])?)),
			});
		}
		if let Some(caps) = self.one_level.captures(group) {
			return Ok(NestedSort {
				path: caps["path"].trim().to_string(),
				filter: None,
				nested: None,
			});
		}

		Err(Error::bad_request(format!("Malformed nested sort : {group}. {BAD_SORT_MESSAGE}")))
	}

	/// The filter must be a single `nested(...)` expression; its inner query is kept.
	fn nested_filter(&self, filter: &str) -> Result<EngineQuery> {
		let nodes = self.parser.parse(filter)?;

		if let [node @ QueryNode::Nested { .. }] = nodes.as_slice()
			&& let EngineQuery::Nested { query, .. } = node.compile()
		{
			return Ok(*query);
		}

		Err(Error::bad_request(format!(
			"Top level sort filter must be in nested context : {filter}. {BAD_SORT_MESSAGE}"
		)))
	}
}
