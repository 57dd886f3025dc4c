// std
use std::{collections::HashMap, time::Duration as StdDuration};

// crates.io
use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Asks the engine which of `fields` exist in indices matching `index_pattern`.
///
/// `fields` is a comma-joined list of full field names carrying `keyword_suffix`. The result maps
/// each existing field with the suffix removed to its full name.
pub async fn sortable_keyword_fields(
	cfg: &sieve_config::Engine,
	keyword_suffix: &str,
	fields: &str,
	index_pattern: &str,
) -> Result<HashMap<String, String>> {
	let client = Client::builder().timeout(StdDuration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}/{}/_mapping/field/{}", cfg.api_base, index_pattern, fields);
	let res = client
		.get(url)
		.headers(crate::default_headers(&cfg.default_headers)?)
		.query(&[
			("allow_no_indices", "true"),
			("ignore_unavailable", "true"),
			("expand_wildcards", "open,closed"),
		])
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_field_mapping_response(&json, keyword_suffix)
}

/// Response shape: `{ "<index>": { "mappings": { "<field>": { "full_name": "...", "mapping": {..} } } } }`.
fn parse_field_mapping_response(
	json: &Value,
	keyword_suffix: &str,
) -> Result<HashMap<String, String>> {
	let indices = json.as_object().ok_or_else(|| Error::InvalidResponse {
		message: "Field mapping response must be an object.".to_string(),
	})?;
	let mut out = HashMap::new();

	for index in indices.values() {
		let Some(mappings) = index.get("mappings").and_then(Value::as_object) else {
			continue;
		};

		for mapping in mappings.values() {
			let has_mapping =
				mapping.get("mapping").and_then(Value::as_object).is_some_and(|m| !m.is_empty());
			let Some(full_name) = mapping.get("full_name").and_then(Value::as_str) else {
				continue;
			};

			if !has_mapping {
				continue;
			}

			let requested = full_name.strip_suffix(keyword_suffix).unwrap_or(full_name);

			out.insert(requested.to_string(), full_name.to_string());
		}
	}

	Ok(out)
}
