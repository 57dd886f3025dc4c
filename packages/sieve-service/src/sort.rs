use std::{collections::HashMap, sync::Arc};

use sieve_domain::sort::{SortBuilder, SortClause, SortQuery};

use crate::{Cache, FieldTypeLookup, Result, cache};

const FIELD_TYPE_CACHE_KIND: &str = "sortable_text_fields";

/// Swaps full-text sort fields for their keyword sub-fields before building sort clauses.
pub struct SortResolver {
	lookup: Arc<dyn FieldTypeLookup>,
	cache: Arc<dyn Cache<HashMap<String, String>>>,
	builder: SortBuilder,
	dynamic_namespace: String,
	keyword_suffix: String,
}
impl SortResolver {
	pub fn new(
		lookup: Arc<dyn FieldTypeLookup>,
		cache: Arc<dyn Cache<HashMap<String, String>>>,
		builder: SortBuilder,
		cfg: &sieve_config::Sort,
	) -> Self {
		Self {
			lookup,
			cache,
			builder,
			dynamic_namespace: cfg.dynamic_namespace.clone(),
			keyword_suffix: cfg.keyword_suffix.clone(),
		}
	}

	/// Rewrites `sort` in place with resolved field names and returns its clauses.
	///
	/// Lookup failures are returned as errors; cache failures only cost a live lookup.
	pub async fn resolve(
		&self,
		sort: &mut SortQuery,
		index_pattern: &str,
		partition_id: &str,
	) -> Result<Vec<SortClause>> {
		let keyword_candidates: Vec<String> = sort
			.fields
			.iter()
			.map(|field| field.field.trim())
			.filter(|field| self.needs_keyword_lookup(field))
			.map(|field| format!("{field}{}", self.keyword_suffix))
			.collect();

		if !keyword_candidates.is_empty() {
			let resolved = self
				.sortable_fields(&keyword_candidates.join(","), index_pattern, partition_id)
				.await?;

			for field in &mut sort.fields {
				if let Some(keyword) = resolved.get(field.field.trim()) {
					field.field = keyword.clone();
				}
			}
		}

		Ok(self.builder.build(sort)?)
	}

	fn needs_keyword_lookup(&self, field: &str) -> bool {
		field.starts_with(&self.dynamic_namespace)
			&& !field.ends_with(&self.keyword_suffix)
			&& !field.contains("nested(")
			&& !field.contains("nested (")
	}

	async fn sortable_fields(
		&self,
		fields: &str,
		index_pattern: &str,
		partition_id: &str,
	) -> Result<HashMap<String, String>> {
		let key = format!("{partition_id}-sortable-text-{index_pattern}-{fields}");

		if let Some(cached) =
			cache::read_or_miss(self.cache.as_ref(), &key, FIELD_TYPE_CACHE_KIND).await
			&& !cached.is_empty()
		{
			tracing::debug!(index = index_pattern, "Sortable field cache hit.");

			return Ok(cached);
		}

		let resolved = self.lookup.sortable_keyword_fields(fields, index_pattern).await?;

		if !resolved.is_empty() {
			cache::write_best_effort(
				self.cache.as_ref(),
				&key,
				resolved.clone(),
				FIELD_TYPE_CACHE_KIND,
			)
			.await;
		}

		Ok(resolved)
	}
}
