use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sieve_domain::{
	aggregation::Aggregation,
	query::{BoolQuery, EngineQuery},
	request::QueryRequest,
	smart::{FilterCollection, SmartFilterChain},
	sort::{SortClause, SortQuery},
};

use crate::{CallerContext, Result, SieveService};

/// Index status field kept out of returned documents unless asked for.
const INDEX_STATUS_FIELD: &str = "index";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointInTime {
	pub id: String,
	pub keep_alive: String,
}

/// Everything the search backend needs to execute one page.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchPlan {
	pub index: String,
	pub query: EngineQuery,
	pub sort: Vec<SortClause>,
	pub from: u32,
	pub size: u32,
	pub track_total_hits: bool,
	pub aggregation: Option<Aggregation>,
	pub source_includes: Vec<String>,
	pub source_excludes: Vec<String>,
	pub point_in_time: Option<PointInTime>,
	pub search_after: Vec<Value>,
}
impl SearchPlan {
	/// Request body in the engine's search DSL. Point-in-time searches omit `from`.
	pub fn to_value(&self) -> Value {
		let mut body = Map::new();

		body.insert("query".to_string(), self.query.to_value());
		body.insert("size".to_string(), Value::from(self.size));

		if self.point_in_time.is_none() {
			body.insert("from".to_string(), Value::from(self.from));
		}
		if !self.sort.is_empty() {
			body.insert(
				"sort".to_string(),
				Value::Array(self.sort.iter().map(SortClause::to_value).collect()),
			);
		}
		if self.track_total_hits {
			body.insert("track_total_hits".to_string(), Value::Bool(true));
		}
		if let Some(aggregation) = &self.aggregation {
			body.insert("aggs".to_string(), aggregation.to_value());
		}

		body.insert(
			"_source".to_string(),
			serde_json::json!({
				"includes": self.source_includes,
				"excludes": self.source_excludes,
			}),
		);

		if let Some(pit) = &self.point_in_time {
			body.insert(
				"pit".to_string(),
				serde_json::json!({ "id": pit.id, "keep_alive": pit.keep_alive }),
			);
		}
		if !self.search_after.is_empty() {
			body.insert("search_after".to_string(), Value::Array(self.search_after.clone()));
		}

		Value::Object(body)
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
	pub source: Value,
	/// Sort values of the hit, used as the next search-after marker.
	#[serde(default)]
	pub sort: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
	pub hits: Vec<SearchHit>,
	pub total: u64,
	#[serde(default)]
	pub aggregations: Option<Value>,
	/// Refreshed point-in-time id, when the engine hands out a new one.
	#[serde(default)]
	pub pit_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
	pub results: Vec<Value>,
	pub total_count: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub aggregations: Option<Value>,
}

impl SieveService {
	/// Turns smart filters into a query request.
	pub fn smart_search_request(
		&self,
		collections: &[FilterCollection],
		offset: u32,
		limit: u32,
	) -> Result<QueryRequest> {
		let chain = SmartFilterChain::new(&self.attributes, self.cfg.search.max_result_window);

		Ok(chain.parse(collections, offset, limit)?)
	}

	/// Compiles an offset-paged request without executing it.
	pub async fn plan(&self, caller: &CallerContext, request: &QueryRequest) -> Result<SearchPlan> {
		let mut sort = request.sort.clone().unwrap_or_default();

		self.compile(caller, request, &mut sort).await
	}

	pub async fn query(
		&self,
		caller: &CallerContext,
		request: &QueryRequest,
	) -> Result<QueryResponse> {
		let plan = self.plan(caller, request).await?;

		tracing::debug!(
			index = %plan.index,
			from = plan.from,
			size = plan.size,
			"Executing search."
		);

		let page = self.collaborators.backend.search(&plan).await?;

		Ok(QueryResponse {
			results: page.hits.into_iter().map(|hit| hit.source).collect(),
			total_count: page.total,
			aggregations: page.aggregations,
		})
	}

	/// Shared by offset and cursor paging. `sort` is rewritten with resolved field names.
	pub(crate) async fn compile(
		&self,
		caller: &CallerContext,
		request: &QueryRequest,
		sort: &mut SortQuery,
	) -> Result<SearchPlan> {
		let search = &self.cfg.search;

		request.validate(search.default_limit, search.max_result_window)?;

		let index = self.collaborators.index.index_pattern(&request.kind);
		let query = self.build_query(caller, request).await?;
		let sort = if sort.is_empty() {
			Vec::new()
		} else {
			self.sort_resolver.resolve(sort, &index, &caller.partition_id).await?
		};
		let aggregation = request
			.aggregate_by
			.as_deref()
			.filter(|field| !field.trim().is_empty())
			.map(|field| self.aggregations.parse(field, search.aggregation_size))
			.transpose()?;

		Ok(SearchPlan {
			index,
			query,
			sort,
			from: request.offset,
			size: request.resolved_limit(search.default_limit),
			track_total_hits: request.track_total_count,
			aggregation,
			source_includes: request.returned_fields.clone(),
			source_excludes: self.source_excludes(&request.returned_fields),
			point_in_time: None,
			search_after: Vec::new(),
		})
	}

	async fn build_query(
		&self,
		caller: &CallerContext,
		request: &QueryRequest,
	) -> Result<EngineQuery> {
		let mut root = BoolQuery::default();

		if !request.query.trim().is_empty() {
			root.must.push(EngineQuery::Bool(self.parser.build(&request.query)?));
		}
		if let Some(spatial) = &request.spatial_filter {
			root.filter.push(spatial.to_query()?);
		}

		self.access.filter(caller, request.query_as_owner).await?.apply(&mut root);

		Ok(EngineQuery::Bool(root))
	}

	fn source_excludes(&self, returned_fields: &[String]) -> Vec<String> {
		[self.access.viewers_field(), INDEX_STATUS_FIELD]
			.into_iter()
			.filter(|field| !returned_fields.iter().any(|returned| returned == field))
			.map(str::to_string)
			.collect()
	}
}
