use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub search: Search,
	pub sort: Sort,
	pub cursor: Cursor,
	pub policy: Policy,
	pub engine: Engine,
	pub access: Access,
	#[serde(default)]
	pub smart_search: SmartSearch,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	/// Upper bound for `offset + limit` on offset-based paging.
	#[serde(default = "default_max_result_window")]
	pub max_result_window: u32,
	#[serde(default = "default_limit")]
	pub default_limit: u32,
	/// Bucket count for terms aggregations.
	#[serde(default = "default_aggregation_size")]
	pub aggregation_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct Sort {
	/// Fields under this prefix are checked for a keyword sub-field before sorting.
	pub dynamic_namespace: String,
	pub keyword_suffix: String,
	pub field_type_cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Cursor {
	/// Point-in-time keep-alive handed to the engine on every page.
	pub keep_alive_secs: u64,
	pub cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Policy {
	pub enabled: bool,
	/// Policy package identifier; `%s` is replaced with the data partition id.
	pub id_template: String,
	pub provider: PolicyProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolicyProviderConfig {
	pub api_base: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Engine {
	pub api_base: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Access {
	pub owners_field: String,
	pub viewers_field: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SmartSearch {
	pub attribute_mapping: Option<PathBuf>,
}

/// One entry of the attribute mapping file used by the smart filter chain.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Attribute {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(rename = "schemaMapping", default)]
	pub schema_mapping: Vec<String>,
}

fn default_max_result_window() -> u32 {
	10_000
}

fn default_limit() -> u32 {
	10
}

fn default_aggregation_size() -> u32 {
	1_000
}
