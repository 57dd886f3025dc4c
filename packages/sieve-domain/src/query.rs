use serde_json::{Map, Value};

use crate::spatial::GeoQuery;

pub const MATCH_ALL_QUERY: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
	And,
	Or,
	Not,
}
impl Operator {
	/// Case-insensitive; anything other than AND, OR or NOT yields `None`.
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"AND" => Some(Self::And),
			"OR" => Some(Self::Or),
			"NOT" => Some(Self::Not),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::And => "AND",
			Self::Or => "OR",
			Self::Not => "NOT",
		}
	}
}

/// A node of the query tree built from a free-text query.
///
/// The operator of a node decides which bucket of the parent boolean it lands in. The operator
/// of the root node is ignored.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryNode {
	Leaf { query: String, operator: Option<Operator> },
	Boolean { query: String, operator: Option<Operator>, children: Vec<QueryNode> },
	Nested { path: String, query: String, operator: Option<Operator>, children: Vec<QueryNode> },
}
impl QueryNode {
	/// Leading whitespace is dropped.
	pub fn leaf(query: &str, operator: Option<Operator>) -> Self {
		Self::Leaf { query: query.trim_start().to_string(), operator }
	}

	pub fn boolean(operator: Option<Operator>, children: Vec<QueryNode>) -> Self {
		Self::Boolean { query: String::new(), operator, children }
	}

	pub fn nested(
		path: impl Into<String>,
		query: impl Into<String>,
		operator: Option<Operator>,
		children: Vec<QueryNode>,
	) -> Self {
		Self::Nested { path: path.into(), query: query.into(), operator, children }
	}

	pub fn operator(&self) -> Option<Operator> {
		match self {
			Self::Leaf { operator, .. }
			| Self::Boolean { operator, .. }
			| Self::Nested { operator, .. } => *operator,
		}
	}

	pub fn children(&self) -> &[QueryNode] {
		match self {
			Self::Leaf { .. } => &[],
			Self::Boolean { children, .. } | Self::Nested { children, .. } => children,
		}
	}

	pub fn compile(&self) -> EngineQuery {
		match self {
			Self::Leaf { query, .. } => EngineQuery::query_string(query),
			Self::Boolean { query, children, .. } => compose_or_leaf(query, children),
			Self::Nested { path, query, children, .. } => EngineQuery::Nested {
				path: path.clone(),
				query: Box::new(compose_or_leaf(query, children)),
			},
		}
	}
}

/// Places every node's compiled clause into the bucket selected by its operator.
pub fn compose(nodes: &[QueryNode]) -> BoolQuery {
	let mut bool_query = BoolQuery::default();

	for node in nodes {
		bool_query.place(node.operator(), node.compile());
	}

	bool_query
}

fn compose_or_leaf(query: &str, children: &[QueryNode]) -> EngineQuery {
	if children.is_empty() {
		EngineQuery::query_string(query)
	} else {
		EngineQuery::Bool(compose(children))
	}
}

/// Engine-agnostic query clause. Rendered to the engine's JSON DSL with [`EngineQuery::to_value`].
#[derive(Clone, Debug, PartialEq)]
pub enum EngineQuery {
	QueryString(String),
	Bool(BoolQuery),
	Nested { path: String, query: Box<EngineQuery> },
	Terms { field: String, values: Vec<String> },
	Geo(GeoQuery),
	/// A clause produced outside this crate, such as a compiled access policy.
	Compiled(Value),
}
impl EngineQuery {
	/// Blank input becomes the match-all wildcard.
	pub fn query_string(query: &str) -> Self {
		let trimmed = query.trim();

		if trimmed.is_empty() {
			Self::QueryString(MATCH_ALL_QUERY.to_string())
		} else {
			Self::QueryString(trimmed.to_string())
		}
	}

	pub fn to_value(&self) -> Value {
		match self {
			Self::QueryString(query) => serde_json::json!({
				"query_string": {
					"query": query,
					"allow_leading_wildcard": false,
					"default_operator": "or",
					"fuzziness": "AUTO",
					"fuzzy_prefix_length": 0,
					"fuzzy_max_expansions": 50,
					"fuzzy_transpositions": true,
					"max_determinized_states": 10000,
					"type": "best_fields",
					"phrase_slop": 0,
					"escape": false,
					"auto_generate_synonyms_phrase_query": true,
					"boost": 1.0,
				}
			}),
			Self::Bool(bool_query) => bool_query.to_value(),
			Self::Nested { path, query } => serde_json::json!({
				"nested": {
					"path": path,
					"query": query.to_value(),
					"score_mode": "avg",
					"ignore_unmapped": true,
					"boost": 1.0,
				}
			}),
			Self::Terms { field, values } => {
				let mut terms = Map::new();

				terms.insert(field.clone(), Value::from(values.clone()));
				terms.insert("boost".to_string(), Value::from(1.0));

				serde_json::json!({ "terms": terms })
			},
			Self::Geo(geo) => geo.to_value(),
			Self::Compiled(value) => value.clone(),
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoolQuery {
	pub must: Vec<EngineQuery>,
	pub should: Vec<EngineQuery>,
	pub must_not: Vec<EngineQuery>,
	pub filter: Vec<EngineQuery>,
}
impl BoolQuery {
	/// AND and an unset operator go to `must`, OR to `should`, NOT to `must_not`.
	pub fn place(&mut self, operator: Option<Operator>, clause: EngineQuery) {
		match operator {
			None | Some(Operator::And) => self.must.push(clause),
			Some(Operator::Or) => self.should.push(clause),
			Some(Operator::Not) => self.must_not.push(clause),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.must.is_empty()
			&& self.should.is_empty()
			&& self.must_not.is_empty()
			&& self.filter.is_empty()
	}

	pub fn to_value(&self) -> Value {
		let mut body = Map::new();

		for (bucket, clauses) in [
			("must", &self.must),
			("filter", &self.filter),
			("must_not", &self.must_not),
			("should", &self.should),
		] {
			if !clauses.is_empty() {
				body.insert(
					bucket.to_string(),
					Value::Array(clauses.iter().map(EngineQuery::to_value).collect()),
				);
			}
		}

		body.insert("boost".to_string(), Value::from(1.0));

		serde_json::json!({ "bool": body })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn query_of(value: &Value) -> &str {
		value["query_string"]["query"].as_str().expect("query_string.query must be a string.")
	}

	#[test]
	fn blank_leaf_compiles_to_wildcard() {
		for raw in ["", "   ", "\t"] {
			let value = QueryNode::leaf(raw, None).compile().to_value();

			assert_eq!(query_of(&value), "*");
		}
	}

	#[test]
	fn leaf_is_trimmed_and_never_allows_leading_wildcards() {
		let value = QueryNode::leaf("  *well ", None).compile().to_value();

		assert_eq!(query_of(&value), "*well");
		assert_eq!(value["query_string"]["allow_leading_wildcard"], Value::Bool(false));
	}

	#[test]
	fn bucket_sizes_follow_child_operators() {
		let node = QueryNode::boolean(
			None,
			vec![
				QueryNode::leaf("a", None),
				QueryNode::leaf("b", Some(Operator::And)),
				QueryNode::leaf("c", Some(Operator::Or)),
				QueryNode::leaf("d", Some(Operator::Not)),
				QueryNode::leaf("e", Some(Operator::Not)),
			],
		);
		let EngineQuery::Bool(bool_query) = node.compile() else {
			panic!("Expected a boolean clause.");
		};

		assert_eq!(bool_query.must.len(), 2);
		assert_eq!(bool_query.should.len(), 1);
		assert_eq!(bool_query.must_not.len(), 2);
	}

	#[test]
	fn lone_not_child_keeps_boolean_wrapper() {
		let value =
			QueryNode::boolean(None, vec![QueryNode::leaf("x", Some(Operator::Not))]).compile();
		let rendered = value.to_value();

		assert!(matches!(value, EngineQuery::Bool(_)));
		assert_eq!(rendered["bool"]["must_not"].as_array().map(Vec::len), Some(1));
		assert!(rendered["bool"].get("must").is_none());
	}

	#[test]
	fn childless_boolean_falls_back_to_leaf() {
		let value = QueryNode::boolean(Some(Operator::Or), Vec::new()).compile().to_value();

		assert_eq!(query_of(&value), "*");
	}

	#[test]
	fn nested_wraps_with_average_scoring() {
		let node = QueryNode::nested(
			"data.Markers",
			"",
			None,
			vec![QueryNode::leaf("data.Markers.Depth:10", None)],
		);
		let value = node.compile().to_value();

		assert_eq!(value["nested"]["path"], "data.Markers");
		assert_eq!(value["nested"]["score_mode"], "avg");
		assert_eq!(value["nested"]["ignore_unmapped"], Value::Bool(true));
		assert!(value["nested"]["query"]["bool"]["must"].is_array());
	}

	#[test]
	fn operators_parse_case_insensitively() {
		assert_eq!(Operator::parse("and"), Some(Operator::And));
		assert_eq!(Operator::parse(" Or "), Some(Operator::Or));
		assert_eq!(Operator::parse("NOT"), Some(Operator::Not));
		assert_eq!(Operator::parse("XOR"), None);
	}
}
