// std
use std::time::Duration as StdDuration;

// crates.io
use reqwest::Client;
use serde_json::Value;

use crate::Result;

/// Asks the policy engine to partially evaluate `rule` into an engine query envelope.
///
/// Returns the raw response body; interpreting the envelope is left to the caller.
pub async fn translate(
	cfg: &sieve_config::PolicyProviderConfig,
	rule: &str,
	unknowns: &[String],
	input: &Value,
) -> Result<String> {
	let client = Client::builder().timeout(StdDuration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = translate_body(rule, unknowns, input);
	let res = client
		.post(url)
		.headers(crate::default_headers(&cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;

	Ok(res.error_for_status()?.text().await?)
}

fn translate_body(rule: &str, unknowns: &[String], input: &Value) -> Value {
	serde_json::json!({ "query": rule, "input": input, "unknowns": unknowns })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn body_carries_rule_input_and_unknowns() {
		let input = serde_json::json!({ "groups": ["g1"], "operation": "view" });
		let body = translate_body(
			"data.osdu.search.allow == true",
			&["input.record".to_string()],
			&input,
		);

		assert_eq!(body["query"], "data.osdu.search.allow == true");
		assert_eq!(body["unknowns"], serde_json::json!(["input.record"]));
		assert_eq!(body["input"]["operation"], "view");
	}
}
