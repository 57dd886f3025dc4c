use serde_json::{Map, Value};

use sieve_providers::Error;

#[test]
fn builds_configured_headers() {
	let mut configured = Map::new();

	configured.insert("x-data-partition-id".to_string(), Value::from("tenant1"));

	let headers = sieve_providers::default_headers(&configured).expect("Failed to build headers.");
	let value = headers.get("x-data-partition-id").expect("Missing partition header.");

	assert_eq!(value, "tenant1");
}

#[test]
fn rejects_non_string_header_values() {
	let mut configured = Map::new();

	configured.insert("x-retries".to_string(), Value::from(3));

	let err = sieve_providers::default_headers(&configured).expect_err("Expected header error.");

	assert!(matches!(err, Error::InvalidConfig { .. }));
}
