use std::sync::Arc;

use serde_json::Value;

use sieve_domain::query::{BoolQuery, EngineQuery};

use crate::{CallerContext, Error, PolicyProvider, Result};

pub const VIEW_OPERATION: &str = "view";
pub const RECORD_UNKNOWN: &str = "input.record";

const PARTITION_PLACEHOLDER: &str = "%s";

/// Filter body produced by the policy engine for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledPolicyFilter(Value);
impl CompiledPolicyFilter {
	pub fn as_value(&self) -> &Value {
		&self.0
	}

	pub fn into_query(self) -> EngineQuery {
		EngineQuery::Compiled(self.0)
	}
}

/// Turns caller groups into an engine filter through an external policy engine.
pub struct PolicyCompiler {
	provider: Arc<dyn PolicyProvider>,
	id_template: String,
}
impl PolicyCompiler {
	pub fn new(provider: Arc<dyn PolicyProvider>, id_template: String) -> Self {
		Self { provider, id_template }
	}

	pub fn rule_for(&self, partition_id: &str) -> String {
		let policy_id = self.id_template.replace(PARTITION_PLACEHOLDER, partition_id);

		format!("data.{policy_id}.allow == true")
	}

	pub async fn compile(
		&self,
		groups: &[String],
		partition_id: &str,
		operation: &str,
	) -> Result<CompiledPolicyFilter> {
		let rule = self.rule_for(partition_id);
		let unknowns = vec![RECORD_UNKNOWN.to_string()];
		let input = serde_json::json!({ "groups": groups, "operation": operation });
		let raw = self.provider.compiled_policy(&rule, &unknowns, &input).await.map_err(|err| {
			tracing::error!(error = %err, partition_id, "Policy compilation failed.");

			match err {
				Error::Unavailable { .. } => err,
				other => Error::Unavailable { message: other.to_string() },
			}
		})?;

		extract_filter_body(&raw).map(CompiledPolicyFilter)
	}
}

/// Reads the `query` member of the policy engine's envelope.
pub fn extract_filter_body(raw: &str) -> Result<Value> {
	let envelope: Value = serde_json::from_str(raw).map_err(|err| Error::Unavailable {
		message: format!("Policy service returned a malformed envelope: {err}"),
	})?;

	match envelope.get("query") {
		Some(query) if query.is_object() => Ok(query.clone()),
		_ => Err(Error::Unavailable {
			message: "Policy service envelope is missing the query object.".to_string(),
		}),
	}
}

/// Access restriction folded into the root boolean query.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessFilter {
	Policy(CompiledPolicyFilter),
	Groups { field: String, groups: Vec<String> },
	Unrestricted,
}
impl AccessFilter {
	/// Policy clauses must match; group clauses only filter.
	pub fn apply(self, root: &mut BoolQuery) {
		match self {
			Self::Policy(policy) => root.must.push(policy.into_query()),
			Self::Groups { field, groups } =>
				root.filter.push(EngineQuery::Terms { field, values: groups }),
			Self::Unrestricted => {},
		}
	}
}

/// Chooses between policy evaluation and plain ACL group matching.
pub struct AccessControl {
	compiler: Option<PolicyCompiler>,
	owners_field: String,
	viewers_field: String,
}
impl AccessControl {
	pub fn new(compiler: Option<PolicyCompiler>, cfg: &sieve_config::Access) -> Self {
		Self {
			compiler,
			owners_field: cfg.owners_field.clone(),
			viewers_field: cfg.viewers_field.clone(),
		}
	}

	pub fn viewers_field(&self) -> &str {
		&self.viewers_field
	}

	pub async fn filter(&self, caller: &CallerContext, as_owner: bool) -> Result<AccessFilter> {
		if let Some(compiler) = &self.compiler {
			let policy =
				compiler.compile(&caller.groups, &caller.partition_id, VIEW_OPERATION).await?;

			return Ok(AccessFilter::Policy(policy));
		}
		if caller.root {
			return Ok(AccessFilter::Unrestricted);
		}

		let field = if as_owner { &self.owners_field } else { &self.viewers_field };

		// An empty group list matches no document.
		Ok(AccessFilter::Groups { field: field.clone(), groups: caller.groups.clone() })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_query_member_structurally() {
		let raw = r#"{ "query": { "bool": { "filter": [{ "terms": { "acl.viewers": ["g1"] } }] } } }"#;
		let body = extract_filter_body(raw).expect("Envelope must parse.");

		assert_eq!(body["bool"]["filter"][0]["terms"]["acl.viewers"][0], "g1");
	}

	#[test]
	fn rejects_unexpected_envelopes() {
		for raw in ["not json", r#"{ "result": {} }"#, r#"{ "query": "x" }"#] {
			let err = extract_filter_body(raw).expect_err("Expected envelope error.");

			assert!(matches!(err, Error::Unavailable { .. }), "Unexpected error: {err}");
		}
	}

	#[test]
	fn group_filters_land_in_filter_bucket() {
		let mut root = BoolQuery::default();

		AccessFilter::Groups { field: "x-acl".to_string(), groups: vec!["g1".to_string()] }
			.apply(&mut root);

		assert_eq!(root.filter.len(), 1);
		assert!(root.must.is_empty());
	}
}
