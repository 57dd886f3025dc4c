//! Named "smart" filters turned into a kind pattern and a query string.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use sieve_config::Attribute;

use crate::{Error, Result, request::QueryRequest};

pub const KIND_TEMPLATE: &str = "*:%s:%t:*";
pub const TEXT_FILTER: &str = "Text";

const SOURCE_TOKEN: &str = "%s";
const TYPE_TOKEN: &str = "%t";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
	pub name: String,
	#[serde(default)]
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub operator: Option<String>,
}
impl Filter {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into(), operator: None }
	}

	fn is_text(&self) -> bool {
		self.name.eq_ignore_ascii_case(TEXT_FILTER)
	}
}

/// Filters of one collection are AND-ed together.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCollection {
	pub filters: Vec<Filter>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FilterLink {
	Type,
	Source,
	Attribute,
	Text,
}
impl FilterLink {
	const PRIORITY: [Self; 4] = [Self::Type, Self::Source, Self::Attribute, Self::Text];

	fn select(filter: &Filter, attributes: &[Attribute]) -> Self {
		Self::PRIORITY
			.into_iter()
			.find(|link| link.can_handle(filter, attributes))
			.unwrap_or(Self::Text)
	}

	fn can_handle(self, filter: &Filter, attributes: &[Attribute]) -> bool {
		match self {
			Self::Type => filter.name.eq_ignore_ascii_case("type"),
			Self::Source => filter.name.eq_ignore_ascii_case("source"),
			Self::Attribute => find_attribute(attributes, &filter.name).is_some(),
			Self::Text => true,
		}
	}

	fn apply(self, filter: &Filter, attributes: &[Attribute], request: &mut QueryRequest) {
		match self {
			Self::Type => request.kind = request.kind.replacen(TYPE_TOKEN, &filter.value, 1),
			Self::Source => request.kind = request.kind.replacen(SOURCE_TOKEN, &filter.value, 1),
			Self::Attribute => {
				let Some(attribute) = find_attribute(attributes, &filter.name) else {
					return;
				};
				let clause = attribute
					.schema_mapping
					.iter()
					.map(|field| format!("{field}:\"{}\"", filter.value))
					.collect::<Vec<_>>()
					.join(" OR ");

				and_query(request, format!("({clause})"));
			},
			Self::Text => and_query(request, format!("\"{}\"", filter.value)),
		}
	}
}

/// Runs filter collections through the Type, Source, Attribute and Text links in that order
/// of priority.
pub struct SmartFilterChain<'a> {
	attributes: &'a [Attribute],
	max_result_window: u32,
}
impl<'a> SmartFilterChain<'a> {
	pub fn new(attributes: &'a [Attribute], max_result_window: u32) -> Self {
		Self { attributes, max_result_window }
	}

	pub fn parse(
		&self,
		collections: &[FilterCollection],
		offset: u32,
		limit: u32,
	) -> Result<QueryRequest> {
		let mut request = QueryRequest { kind: KIND_TEMPLATE.to_string(), ..Default::default() };
		let mut used = HashSet::new();

		for filter in collections.iter().flat_map(|collection| collection.filters.iter()) {
			if !filter.is_text() && !used.insert(filter.name.as_str()) {
				return Err(Error::bad_request(format!(
					"Cannot use '{}' filter more than once.",
					filter.name
				)));
			}

			FilterLink::select(filter, self.attributes).apply(
				filter,
				self.attributes,
				&mut request,
			);
		}

		request.kind = request.kind.replace(SOURCE_TOKEN, "*").replace(TYPE_TOKEN, "*");
		request.limit = Some(limit);
		request.offset = offset;

		crate::request::validate_window(offset, limit, self.max_result_window)?;

		Ok(request)
	}
}

fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
	attributes
		.iter()
		.find(|attribute| attribute.name == name && !attribute.schema_mapping.is_empty())
}

fn and_query(request: &mut QueryRequest, clause: String) {
	if request.query.is_empty() {
		request.query = clause;
	} else {
		request.query = format!("{} AND {clause}", request.query);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn well_attribute() -> Attribute {
		Attribute {
			name: "Well".to_string(),
			description: None,
			schema_mapping: vec!["data.WellName".to_string(), "data.UWI".to_string()],
		}
	}

	#[test]
	fn link_priority_prefers_type_and_source_over_attributes() {
		let attributes = vec![Attribute { name: "type".to_string(), ..well_attribute() }];

		assert_eq!(FilterLink::select(&Filter::new("type", "well"), &attributes), FilterLink::Type);
		assert_eq!(FilterLink::select(&Filter::new("well", "x"), &attributes), FilterLink::Text);
		assert_eq!(
			FilterLink::select(&Filter::new("Well", "x"), &[well_attribute()]),
			FilterLink::Attribute
		);
	}

	#[test]
	fn attribute_filter_ors_every_mapped_field() {
		let attributes = vec![well_attribute()];
		let chain = SmartFilterChain::new(&attributes, 10_000);
		let collections = vec![FilterCollection {
			filters: vec![Filter::new("Text", "ash"), Filter::new("Well", "A-1")],
		}];
		let request = chain.parse(&collections, 0, 10).expect("Filters must parse.");

		assert_eq!(request.query, "\"ash\" AND (data.WellName:\"A-1\" OR data.UWI:\"A-1\")");
		assert_eq!(request.kind, "*:*:*:*");
	}

	#[test]
	fn attribute_names_match_exactly() {
		let attributes = vec![well_attribute()];
		let chain = SmartFilterChain::new(&attributes, 10_000);
		let collections = vec![FilterCollection { filters: vec![Filter::new("WELL", "A-1")] }];
		let request = chain.parse(&collections, 0, 10).expect("Filters must parse.");

		assert_eq!(request.query, "\"A-1\"");
	}
}
