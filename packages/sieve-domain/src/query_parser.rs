//! Free-text query parsing with `nested(path, query)` support.
//!
//! Queries without a `nested(` marker are passed through as a single query-string leaf. Queries
//! with one are split into top-level tokens on `AND`/`OR` boundaries and every token is turned
//! into a [`QueryNode`].

use regex::Regex;

use crate::{
	Error, Result,
	query::{BoolQuery, Operator, QueryNode, compose},
};

const OPERATOR_GROUP: &str = "operator";

pub struct QueryParser {
	inner_node: Regex,
	multilevel_pattern: Regex,
	multilevel_nested: Regex,
	one_level_nested: Regex,
	leading_field: Regex,
	following_field: Regex,
	leading_operator: Regex,
}
impl QueryParser {
	pub fn new() -> Result<Self> {
		Ok(Self {
			// `(a OR b)` or `AND (a OR b)`.
			inner_node: Regex::new(
				r"(?s)^(?:\(|(?P<operator>AND|OR|NOT)\s*\()(?P<innernodes>.+?)\)$",
			)?,
			multilevel_pattern: Regex::new(r"(?s)(nested\s?\()((.+?)nested\s?\()+")?,
			// `AND nested(data.Parent, nested(data.Parent.Child, (Field:1)))`.
			multilevel_nested: Regex::new(
				r"(?s)((?P<operator>AND|OR|NOT)(\s|\s\())*(nested\s?\()(?P<parentpath>.+?),\s?(?P<innernodes>.+?\)\)\)+)",
			)?,
			// `OR nested(data.Parent, (Field:"value"))`.
			one_level_nested: Regex::new(
				r"(?s)((?P<operator>AND|OR|NOT)(\s|\s\())*(nested\s?\()(?P<path>.+?),\s?(?P<query>\s?\(.+)",
			)?,
			leading_field: Regex::new(r"\((?P<field>\S+?):")?,
			following_field: Regex::new(r"(AND|OR|NOT)\s(?P<field>\S+?):")?,
			leading_operator: Regex::new(r"(?s)\A(?P<operator>AND|OR|NOT)(?P<query>[\s(].*)")?,
		})
	}

	/// Builds the root boolean clause for a free-text query.
	pub fn build(&self, query: &str) -> Result<BoolQuery> {
		Ok(compose(&self.query_nodes(query)?))
	}

	pub fn query_nodes(&self, query: &str) -> Result<Vec<QueryNode>> {
		if query.contains("nested(") || query.contains("nested (") {
			self.parse(query)
		} else {
			Ok(vec![QueryNode::leaf(query, None)])
		}
	}

	/// Splits `query` into top-level tokens and parses each one.
	pub fn parse(&self, query: &str) -> Result<Vec<QueryNode>> {
		let mut tokens = split_top_level(query)?;

		if tokens.len() > 1 {
			let prefix = if tokens[1].starts_with(Operator::Or.as_str()) { "OR " } else { "AND " };

			tokens[0] = format!("{prefix}{}", tokens[0]);
		}

		tokens.iter().map(|token| self.parse_token(token)).collect()
	}

	fn parse_token(&self, token: &str) -> Result<QueryNode> {
		if let Some(caps) = self.inner_node.captures(token) {
			let operator = caps.name(OPERATOR_GROUP).and_then(|m| Operator::parse(m.as_str()));
			let children = self.parse(&caps["innernodes"])?;

			return Ok(QueryNode::boolean(operator, children));
		}
		if self.multilevel_pattern.is_match(token)
			&& let Some(caps) = self.multilevel_nested.captures(token)
		{
			let operator = caps.name(OPERATOR_GROUP).and_then(|m| Operator::parse(m.as_str()));
			let inner = trim_unbalanced_closing(&caps["innernodes"]);
			let children = self.parse(&inner)?;

			return Ok(QueryNode::nested(&caps["parentpath"], "", operator, children));
		}
		if let Some(caps) = self.one_level_nested.captures(token) {
			let operator = caps.name(OPERATOR_GROUP).and_then(|m| Operator::parse(m.as_str()));
			let path = &caps["path"];
			let query = self.qualify_fields(path, &caps["query"]);

			return Ok(QueryNode::nested(path, trim_unbalanced_closing(&query), operator, Vec::new()));
		}
		if let Some(caps) = self.leading_operator.captures(token) {
			let operator = caps.name(OPERATOR_GROUP).and_then(|m| Operator::parse(m.as_str()));

			return Ok(QueryNode::leaf(&caps["query"], operator));
		}

		Ok(QueryNode::leaf(token, None))
	}

	/// Prefixes the field names of a nested query with the nested path.
	fn qualify_fields(&self, path: &str, query: &str) -> String {
		let mut qualified = query.to_string();

		if let Some(caps) = self.leading_field.captures(query) {
			let field = &caps["field"];

			qualified = qualified.replacen(field, &format!("{path}.{field}"), 1);
		}

		let following: Vec<String> = self
			.following_field
			.captures_iter(&qualified)
			.map(|caps| caps["field"].to_string())
			.collect();

		for field in following {
			qualified = qualified.replacen(&format!(" {field}"), &format!(" {path}.{field}"), 1);
		}

		qualified
	}
}

/// Splits a query into tokens at parenthesis depth zero.
///
/// A token ends after a closing parenthesis that returns to depth zero, or right before an
/// `AND`/`OR` keyword that sits at depth zero. Parentheses inside a closed double-quoted span
/// are ignored.
fn split_top_level(query: &str) -> Result<Vec<String>> {
	let chars: Vec<char> = query.chars().collect();
	let mut tokens = Vec::new();
	let mut token = String::new();
	let mut height: i32 = 0;
	let mut in_quotes = false;

	for (position, &c) in chars.iter().enumerate() {
		if !token.is_empty() || c != ' ' {
			token.push(c);
		}
		if c == '"' {
			if in_quotes {
				in_quotes = false;
			} else if chars[position + 1..].contains(&'"') {
				in_quotes = true;
			}
		}
		if in_quotes {
			continue;
		}

		match c {
			'(' => height += 1,
			')' => {
				if height == 1 && !token.is_empty() {
					tokens.push(std::mem::take(&mut token));
				}

				height -= 1;

				if height < 0 {
					return Err(Error::bad_request(format!(
						"Malformed closing parentheses in query part: \"{query}\", at position: {position}"
					)));
				}
			},
			_ =>
				if height == 0 && !token.is_empty() && keyword_boundary_at(&chars, position + 1) {
					tokens.push(std::mem::take(&mut token));
				},
		}
	}

	if !token.is_empty() {
		tokens.push(token);
	}
	if height > 0 {
		return Err(Error::bad_request(format!(
			"Malformed parentheses in query part: \"{query}\", {height} of closing brackets missing"
		)));
	}

	Ok(tokens)
}

/// True when `chars[start..]` opens a ` AND `/` OR ` style boundary.
fn keyword_boundary_at(chars: &[char], start: usize) -> bool {
	let opens = |c: char| c.is_whitespace() || c == ')';
	let closes = |c: char| c.is_whitespace() || c == '(';
	let Some(&first) = chars.get(start) else {
		return false;
	};

	if !opens(first) {
		return false;
	}

	["AND", "OR"].iter().any(|keyword| {
		let end = start + 1 + keyword.len();

		chars.len() > end
			&& chars[start + 1..end].iter().copied().eq(keyword.chars())
			&& closes(chars[end])
	})
}

/// Drops every closing parenthesis that has no matching opening one.
fn trim_unbalanced_closing(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	let mut depth = 0_usize;

	for c in raw.chars() {
		match c {
			'(' => depth += 1,
			')' if depth == 0 => continue,
			')' => depth -= 1,
			_ => {},
		}

		out.push(c);
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::query::EngineQuery;

	fn parser() -> QueryParser {
		QueryParser::new().expect("Query patterns must compile.")
	}

	#[test]
	fn plain_query_is_a_single_leaf() {
		let nodes = parser().query_nodes("well AND (ash OR oak)").expect("Query must parse.");

		assert_eq!(nodes, vec![QueryNode::leaf("well AND (ash OR oak)", None)]);
	}

	#[test]
	fn splits_top_level_tokens_and_inherits_leading_operator() {
		let tokens =
			split_top_level("data.Name:ash OR nested(data.Markers, (Depth:10))").expect("split");

		assert_eq!(tokens, vec!["data.Name:ash", "OR nested(data.Markers, (Depth:10))"]);

		let nodes = parser()
			.parse("data.Name:ash OR nested(data.Markers, (Depth:10))")
			.expect("Query must parse.");

		assert_eq!(nodes[0], QueryNode::leaf("data.Name:ash", Some(Operator::Or)));
		assert_eq!(nodes[1].operator(), Some(Operator::Or));
	}

	#[test]
	fn one_level_nested_prefixes_relative_fields() {
		let nodes = parser()
			.parse("nested(data.Markers, (Name:\"top\" AND Depth:(>10)))")
			.expect("Query must parse.");

		assert_eq!(
			nodes,
			vec![QueryNode::nested(
				"data.Markers",
				"(data.Markers.Name:\"top\" AND data.Markers.Depth:(>10))",
				None,
				Vec::new(),
			)]
		);
	}

	#[test]
	fn multilevel_nested_builds_nested_children() {
		let nodes = parser()
			.parse("AND nested(data.Parent, nested(data.Parent.Child, (Value:(>14))))")
			.expect("Query must parse.");
		let QueryNode::Nested { path, children, operator, .. } = &nodes[0] else {
			panic!("Expected a nested node.");
		};

		assert_eq!(path, "data.Parent");
		assert_eq!(*operator, Some(Operator::And));
		assert_eq!(children.len(), 1);
		assert!(matches!(
			&children[0],
			QueryNode::Nested { path, .. } if path == "data.Parent.Child"
		));
	}

	#[test]
	fn grouped_tokens_become_boolean_nodes() {
		let nodes = parser()
			.parse("(nested(data.A, (X:1)) OR nested(data.B, (Y:2))) AND NOT kind:tmp")
			.expect("Query must parse.");

		assert_eq!(nodes.len(), 2);
		assert!(matches!(&nodes[0], QueryNode::Boolean { children, .. } if children.len() == 2));
		assert_eq!(nodes[1], QueryNode::leaf("NOT kind:tmp", Some(Operator::And)));
	}

	#[test]
	fn quoted_parentheses_are_ignored() {
		let tokens = split_top_level("nested(data.A, (X:\"a (b\")) AND y").expect("split");

		assert_eq!(tokens, vec!["nested(data.A, (X:\"a (b\"))", "AND y"]);
	}

	#[test]
	fn rejects_unbalanced_parentheses() {
		let err = split_top_level("nested(data.A, (X:1)").expect_err("Expected missing bracket.");

		assert_eq!(
			err,
			Error::bad_request(
				"Malformed parentheses in query part: \"nested(data.A, (X:1)\", 1 of closing brackets missing"
			)
		);

		let err = split_top_level("a) AND b").expect_err("Expected stray bracket.");

		assert!(err.to_string().contains("Malformed closing parentheses"));
	}

	#[test]
	fn operator_prefix_requires_separator() {
		let nodes = parser().parse("ORACLE:1").expect("Query must parse.");

		assert_eq!(nodes, vec![QueryNode::leaf("ORACLE:1", None)]);

		let nodes = parser().parse("NOT x").expect("Query must parse.");

		assert_eq!(nodes, vec![QueryNode::leaf("x", Some(Operator::Not))]);

		let nodes = parser().parse("NOT(x)").expect("Query must parse.");

		assert!(matches!(
			&nodes[0],
			QueryNode::Boolean { operator: Some(Operator::Not), children, .. } if children.len() == 1
		));
	}

	#[test]
	fn trims_only_unmatched_closing_brackets() {
		assert_eq!(trim_unbalanced_closing("(a:(>1)))"), "(a:(>1))");
		assert_eq!(trim_unbalanced_closing("a))"), "a");
	}

	#[test]
	fn build_composes_root_boolean() {
		let bool_query = parser()
			.build("nested(data.A, (X:1)) NOT nested(data.B, (Y:2))")
			.expect("Query must build.");

		assert_eq!(bool_query.must.len(), 1);
		assert_eq!(bool_query.must_not.len(), 1);
		assert!(matches!(bool_query.must[0], EngineQuery::Nested { .. }));
	}
}
