use serde::{Deserialize, Serialize};

use crate::{Error, Result, sort::SortQuery, spatial::SpatialFilter};

/// Client-facing search request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
	/// Kind pattern `authority:source:type:version`; `*` wildcards are allowed.
	pub kind: String,
	#[serde(default)]
	pub query: String,
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub offset: u32,
	#[serde(default)]
	pub sort: Option<SortQuery>,
	#[serde(default)]
	pub spatial_filter: Option<SpatialFilter>,
	#[serde(default)]
	pub query_as_owner: bool,
	#[serde(default)]
	pub aggregate_by: Option<String>,
	#[serde(default)]
	pub returned_fields: Vec<String>,
	#[serde(default)]
	pub track_total_count: bool,
}
impl QueryRequest {
	pub fn resolved_limit(&self, default_limit: u32) -> u32 {
		match self.limit {
			Some(limit) if limit > 0 => limit,
			_ => default_limit,
		}
	}

	pub fn validate(&self, default_limit: u32, max_result_window: u32) -> Result<()> {
		if self.kind.trim().is_empty() {
			return Err(Error::bad_request("kind must be non-empty."));
		}

		validate_window(self.offset, self.resolved_limit(default_limit), max_result_window)
	}
}

pub fn validate_window(offset: u32, limit: u32, max_result_window: u32) -> Result<()> {
	if u64::from(offset) + u64::from(limit) > u64::from(max_result_window) {
		return Err(Error::bad_request(format!(
			"Invalid combination of limit and offset values, offset + limit cannot be greater than {max_result_window}"
		)));
	}

	Ok(())
}
