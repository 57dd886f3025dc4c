pub mod cache;
pub mod cursor;
pub mod policy;
pub mod search;
pub mod sort;

mod error;

pub use cache::{Cache, CacheError, MemoryCache};
pub use cursor::{CursorQueryRequest, CursorQueryResponse, CursorStateManager, SearchAfterSettings};
pub use error::{Error, Result};
pub use policy::{AccessControl, AccessFilter, CompiledPolicyFilter, PolicyCompiler};
pub use search::{PointInTime, QueryResponse, SearchHit, SearchPage, SearchPlan};
pub use sort::SortResolver;

use std::{collections::HashMap, future::Future, path::Path, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;

use sieve_config::{Attribute, Config, Engine, PolicyProviderConfig};
use sieve_domain::{aggregation::AggregationParser, query_parser::QueryParser, sort::SortBuilder};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait FieldTypeLookup
where
	Self: Send + Sync,
{
	/// Maps each requested field (without the keyword suffix) to its sortable keyword field.
	///
	/// `fields` is a comma-joined list of candidate keyword fields.
	fn sortable_keyword_fields<'a>(
		&'a self,
		fields: &'a str,
		index_pattern: &'a str,
	) -> BoxFuture<'a, Result<HashMap<String, String>>>;
}

pub trait PolicyProvider
where
	Self: Send + Sync,
{
	/// Returns the raw query envelope produced for `rule`.
	fn compiled_policy<'a>(
		&'a self,
		rule: &'a str,
		unknowns: &'a [String],
		input: &'a Value,
	) -> BoxFuture<'a, Result<String>>;
}

pub trait SearchBackend
where
	Self: Send + Sync,
{
	fn open_point_in_time<'a>(
		&'a self,
		index: &'a str,
		keep_alive: &'a str,
	) -> BoxFuture<'a, Result<String>>;

	fn close_point_in_time<'a>(&'a self, pit_id: &'a str) -> BoxFuture<'a, Result<()>>;

	fn search<'a>(&'a self, plan: &'a SearchPlan) -> BoxFuture<'a, Result<SearchPage>>;
}

pub trait IndexResolver
where
	Self: Send + Sync,
{
	fn index_pattern(&self, kind: &str) -> String;
}

/// Identity and group membership of the caller, resolved upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerContext {
	pub user_id: String,
	pub partition_id: String,
	pub groups: Vec<String>,
	/// Root callers bypass group filtering when policy evaluation is disabled.
	pub root: bool,
}
impl CallerContext {
	/// `groups_header` is a comma-separated group list.
	pub fn from_groups_header(
		user_id: impl Into<String>,
		partition_id: impl Into<String>,
		groups_header: &str,
	) -> Self {
		let groups = groups_header
			.split(',')
			.map(str::trim)
			.filter(|group| !group.is_empty())
			.map(str::to_string)
			.collect();

		Self { user_id: user_id.into(), partition_id: partition_id.into(), groups, root: false }
	}
}

#[derive(Clone)]
pub struct Collaborators {
	pub field_types: Arc<dyn FieldTypeLookup>,
	pub policy: Arc<dyn PolicyProvider>,
	pub backend: Arc<dyn SearchBackend>,
	pub index: Arc<dyn IndexResolver>,
	pub cursor_cache: Arc<dyn Cache<SearchAfterSettings>>,
	pub field_type_cache: Arc<dyn Cache<HashMap<String, String>>>,
}
impl Collaborators {
	/// HTTP-backed lookups and in-memory caches sized from `cfg`.
	pub fn new(cfg: &Config, backend: Arc<dyn SearchBackend>) -> Self {
		Self {
			field_types: Arc::new(EngineFieldTypeLookup {
				cfg: cfg.engine.clone(),
				keyword_suffix: cfg.sort.keyword_suffix.clone(),
			}),
			policy: Arc::new(HttpPolicyProvider { cfg: cfg.policy.provider.clone() }),
			backend,
			index: Arc::new(KindIndexResolver),
			cursor_cache: Arc::new(MemoryCache::new(Duration::from_secs(
				cfg.cursor.cache_ttl_secs,
			))),
			field_type_cache: Arc::new(MemoryCache::new(Duration::from_secs(
				cfg.sort.field_type_cache_ttl_secs,
			))),
		}
	}
}

pub struct SieveService {
	pub cfg: Config,
	pub collaborators: Collaborators,
	pub attributes: Vec<Attribute>,
	pub(crate) parser: QueryParser,
	pub(crate) aggregations: AggregationParser,
	pub(crate) sort_resolver: SortResolver,
	pub(crate) access: AccessControl,
	pub(crate) cursors: CursorStateManager,
}
impl SieveService {
	pub fn new(cfg: Config, collaborators: Collaborators, attributes: Vec<Attribute>) -> Result<Self> {
		let sort_resolver = SortResolver::new(
			collaborators.field_types.clone(),
			collaborators.field_type_cache.clone(),
			SortBuilder::new()?,
			&cfg.sort,
		);
		let compiler = cfg.policy.enabled.then(|| {
			PolicyCompiler::new(collaborators.policy.clone(), cfg.policy.id_template.clone())
		});
		let access = AccessControl::new(compiler, &cfg.access);
		let cursors = CursorStateManager::new(collaborators.cursor_cache.clone());

		Ok(Self {
			parser: QueryParser::new()?,
			aggregations: AggregationParser::new()?,
			sort_resolver,
			access,
			cursors,
			cfg,
			collaborators,
			attributes,
		})
	}

	/// Builds the service, loading the attribute mapping named in the config, if any.
	pub fn from_config(cfg: Config, collaborators: Collaborators) -> Result<Self> {
		let attributes = match cfg.smart_search.attribute_mapping.as_deref() {
			Some(path) => load_attributes(path)?,
			None => Vec::new(),
		};

		Self::new(cfg, collaborators, attributes)
	}
}

/// Field-mapping lookup against the search engine's HTTP API.
pub struct EngineFieldTypeLookup {
	cfg: Engine,
	keyword_suffix: String,
}
impl FieldTypeLookup for EngineFieldTypeLookup {
	fn sortable_keyword_fields<'a>(
		&'a self,
		fields: &'a str,
		index_pattern: &'a str,
	) -> BoxFuture<'a, Result<HashMap<String, String>>> {
		Box::pin(async move {
			sieve_providers::field_mapping::sortable_keyword_fields(
				&self.cfg,
				&self.keyword_suffix,
				fields,
				index_pattern,
			)
			.await
			.map_err(|err| Error::Unavailable {
				message: format!("Field mapping lookup failed: {err}"),
			})
		})
	}
}

pub struct HttpPolicyProvider {
	cfg: PolicyProviderConfig,
}
impl PolicyProvider for HttpPolicyProvider {
	fn compiled_policy<'a>(
		&'a self,
		rule: &'a str,
		unknowns: &'a [String],
		input: &'a Value,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			sieve_providers::policy::translate(&self.cfg, rule, unknowns, input).await.map_err(
				|err| Error::Unavailable { message: format!("Policy translation failed: {err}") },
			)
		})
	}
}

/// Derives an index pattern from a kind: `osdu:wks:well:1.0.0` becomes
/// `osdu-wks-well-1.0.0,-.*`, excluding system indices.
pub struct KindIndexResolver;
impl IndexResolver for KindIndexResolver {
	fn index_pattern(&self, kind: &str) -> String {
		let indices: Vec<String> = kind
			.split(',')
			.map(str::trim)
			.filter(|kind| !kind.is_empty())
			.map(|kind| kind.replace(':', "-").to_lowercase())
			.collect();

		format!("{},-.*", indices.join(","))
	}
}

fn load_attributes(path: &Path) -> Result<Vec<Attribute>> {
	sieve_config::load_attribute_mapping(path)
		.map_err(|err| Error::Internal { message: format!("{err}") })
}
