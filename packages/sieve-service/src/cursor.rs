use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sieve_domain::{request::QueryRequest, sort::SortQuery};

use crate::{
	Cache, CallerContext, Error, Result, SieveService,
	cache::{self, cache_key_prefix},
	search::{PointInTime, SearchPage, SearchPlan},
};

const CURSOR_CACHE_KIND: &str = "cursor";
const CURSOR_TOKEN_LEN: usize = 64;
const INVALID_CURSOR_MESSAGE: &str =
	"Can't find the given cursor: The given cursor is invalid or expired";

/// Scan state persisted under a cursor token between pages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchAfterSettings {
	pub pit_id: String,
	pub owner_id: String,
	pub sort: SortQuery,
	pub search_after: Vec<Value>,
	pub closed: bool,
	pub total_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorQueryRequest {
	#[serde(flatten)]
	pub query: QueryRequest,
	#[serde(default)]
	pub cursor: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorQueryResponse {
	/// Absent when there is nothing left to fetch or the session could not be persisted.
	pub cursor: Option<String>,
	pub results: Vec<Value>,
	pub total_count: u64,
}

/// Owns the cursor token to scan state mapping.
pub struct CursorStateManager {
	cache: Arc<dyn Cache<SearchAfterSettings>>,
}
impl CursorStateManager {
	pub fn new(cache: Arc<dyn Cache<SearchAfterSettings>>) -> Self {
		Self { cache }
	}

	/// Persists a session under a fresh token. Returns `None` when the cache rejected the write.
	pub async fn open(&self, settings: SearchAfterSettings) -> Option<String> {
		let token = new_cursor_token(&settings.pit_id);

		cache::write_best_effort(self.cache.as_ref(), &token, settings, CURSOR_CACHE_KIND)
			.await
			.then_some(token)
	}

	/// Loads the session behind `token` for `owner_id`.
	///
	/// Cache failures are hard errors here: the scan cannot be resumed without its state.
	pub async fn resolve(&self, token: &str, owner_id: &str) -> Result<SearchAfterSettings> {
		if !is_well_formed(token) {
			return Err(Error::InvalidCursor { message: INVALID_CURSOR_MESSAGE.to_string() });
		}

		let settings = self.cache.get(token).await.map_err(|err| {
			tracing::error!(
				error = %err,
				cursor_prefix = cache_key_prefix(token),
				"Cursor cache read failed."
			);

			Error::CursorCache { message: err.to_string() }
		})?;
		let Some(settings) = settings else {
			return Err(Error::InvalidCursor { message: INVALID_CURSOR_MESSAGE.to_string() });
		};

		if settings.owner_id != owner_id {
			tracing::warn!(cursor_prefix = cache_key_prefix(token), "Cursor owner mismatch.");

			return Err(Error::Forbidden {
				message: "cursor issuer doesn't match the cursor consumer".to_string(),
			});
		}

		Ok(settings)
	}

	/// Replaces the stored session wholesale.
	pub async fn advance(&self, token: &str, settings: SearchAfterSettings) -> Result<()> {
		self.cache.put(token, settings).await.map_err(|err| {
			tracing::error!(
				error = %err,
				cursor_prefix = cache_key_prefix(token),
				"Cursor cache write failed."
			);

			Error::CursorCache { message: err.to_string() }
		})
	}

	pub async fn evict(&self, token: &str) {
		cache::delete_best_effort(self.cache.as_ref(), token, CURSOR_CACHE_KIND).await;
	}
}

fn new_cursor_token(pit_id: &str) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(pit_id.as_bytes());
	hasher.update(Uuid::new_v4().as_bytes());

	hasher.finalize().to_hex().to_string()
}

fn is_well_formed(token: &str) -> bool {
	token.len() == CURSOR_TOKEN_LEN && token.bytes().all(|byte| byte.is_ascii_hexdigit())
}

impl SieveService {
	/// Starts a scan when `request.cursor` is empty, otherwise continues the named one.
	pub async fn query_with_cursor(
		&self,
		caller: &CallerContext,
		request: &CursorQueryRequest,
	) -> Result<CursorQueryResponse> {
		match request.cursor.as_deref().map(str::trim).filter(|token| !token.is_empty()) {
			Some(token) => self.next_page(caller, token, &request.query).await,
			None => self.first_page(caller, &request.query).await,
		}
	}

	/// Evicts the session and releases its point-in-time handle.
	pub async fn close_cursor(&self, caller: &CallerContext, token: &str) -> Result<()> {
		let settings = self.cursors.resolve(token, &caller.user_id).await?;

		self.cursors.evict(token).await;

		if !settings.closed {
			self.release_point_in_time(&settings.pit_id).await;
		}

		Ok(())
	}

	async fn first_page(
		&self,
		caller: &CallerContext,
		request: &QueryRequest,
	) -> Result<CursorQueryResponse> {
		let mut sort = request
			.sort
			.clone()
			.filter(|sort| !sort.is_empty())
			.unwrap_or_else(SortQuery::score_desc);
		let mut plan = self.compile(caller, request, &mut sort).await?;
		let keep_alive = self.keep_alive();
		let pit_id =
			self.collaborators.backend.open_point_in_time(&plan.index, &keep_alive).await?;

		plan.from = 0;
		plan.point_in_time = Some(PointInTime { id: pit_id.clone(), keep_alive });
		// The session total is captured from this page only.
		plan.track_total_hits = true;

		let page = self.search_or_release(&plan, &pit_id).await?;
		let pit_id = page.pit_id.clone().unwrap_or(pit_id);

		if page.hits.is_empty() {
			self.release_point_in_time(&pit_id).await;

			return Ok(response(None, page));
		}

		let exhausted = page.hits.len() < plan.size as usize;

		if exhausted {
			self.release_point_in_time(&pit_id).await;
		}

		let settings = SearchAfterSettings {
			pit_id: pit_id.clone(),
			owner_id: caller.user_id.clone(),
			sort,
			search_after: last_sort_values(&page),
			closed: exhausted,
			total_count: page.total,
		};
		let Some(token) = self.cursors.open(settings).await else {
			tracing::warn!(
				index = %plan.index,
				"Cursor session could not be persisted. Returning results without a cursor."
			);

			if !exhausted {
				self.release_point_in_time(&pit_id).await;
			}

			return Ok(response(None, page));
		};

		tracing::debug!(
			cursor_prefix = cache_key_prefix(&token),
			total = page.total,
			"Cursor opened."
		);

		Ok(response(Some(token), page))
	}

	async fn next_page(
		&self,
		caller: &CallerContext,
		token: &str,
		request: &QueryRequest,
	) -> Result<CursorQueryResponse> {
		let settings = self.cursors.resolve(token, &caller.user_id).await?;

		if settings.closed {
			self.cursors.evict(token).await;

			tracing::debug!(cursor_prefix = cache_key_prefix(token), "Closed cursor drained.");

			return Ok(CursorQueryResponse {
				cursor: None,
				results: Vec::new(),
				total_count: settings.total_count,
			});
		}

		let mut sort = settings.sort.clone();
		let mut plan = self.compile(caller, request, &mut sort).await?;

		plan.from = 0;
		plan.point_in_time =
			Some(PointInTime { id: settings.pit_id.clone(), keep_alive: self.keep_alive() });
		plan.search_after = settings.search_after.clone();

		let page = self.search_or_release(&plan, &settings.pit_id).await?;
		let pit_id = page.pit_id.clone().unwrap_or_else(|| settings.pit_id.clone());

		if page.hits.is_empty() {
			self.cursors.evict(token).await;
			self.release_point_in_time(&pit_id).await;

			return Ok(CursorQueryResponse {
				cursor: None,
				results: Vec::new(),
				total_count: settings.total_count,
			});
		}

		let exhausted = page.hits.len() < plan.size as usize;

		if exhausted {
			self.release_point_in_time(&pit_id).await;
		}

		let total_count = settings.total_count;
		let advanced = SearchAfterSettings {
			pit_id: pit_id.clone(),
			search_after: last_sort_values(&page),
			closed: exhausted,
			..settings
		};

		if let Err(err) = self.cursors.advance(token, advanced).await {
			self.cursors.evict(token).await;

			if !exhausted {
				self.release_point_in_time(&pit_id).await;
			}

			return Err(err);
		}

		Ok(CursorQueryResponse {
			cursor: Some(token.to_string()),
			results: page.hits.into_iter().map(|hit| hit.source).collect(),
			total_count,
		})
	}

	async fn search_or_release(&self, plan: &SearchPlan, pit_id: &str) -> Result<SearchPage> {
		match self.collaborators.backend.search(plan).await {
			Ok(page) => Ok(page),
			Err(err) => {
				self.release_point_in_time(pit_id).await;

				Err(err)
			},
		}
	}

	async fn release_point_in_time(&self, pit_id: &str) {
		if let Err(err) = self.collaborators.backend.close_point_in_time(pit_id).await {
			tracing::warn!(error = %err, "Failed to close point in time.");
		}
	}

	fn keep_alive(&self) -> String {
		format!("{}s", self.cfg.cursor.keep_alive_secs)
	}
}

fn last_sort_values(page: &SearchPage) -> Vec<Value> {
	page.hits.last().map(|hit| hit.sort.clone()).unwrap_or_default()
}

fn response(cursor: Option<String>, page: SearchPage) -> CursorQueryResponse {
	CursorQueryResponse {
		cursor,
		results: page.hits.into_iter().map(|hit| hit.source).collect(),
		total_count: page.total,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MemoryCache;

	fn manager() -> CursorStateManager {
		CursorStateManager::new(Arc::new(MemoryCache::new(std::time::Duration::from_secs(60))))
	}

	fn settings(owner: &str) -> SearchAfterSettings {
		SearchAfterSettings {
			pit_id: "pit-1".to_string(),
			owner_id: owner.to_string(),
			sort: SortQuery::score_desc(),
			search_after: Vec::new(),
			closed: false,
			total_count: 42,
		}
	}

	#[tokio::test]
	async fn fresh_cursor_resolves_to_empty_search_after() {
		let manager = manager();
		let token = manager.open(settings("u1")).await.expect("Open must persist.");
		let resolved = manager.resolve(&token, "u1").await.expect("Cursor must resolve.");

		assert_eq!(resolved.pit_id, "pit-1");
		assert!(resolved.search_after.is_empty());
	}

	#[tokio::test]
	async fn advance_replaces_search_after_values() {
		let manager = manager();
		let token = manager.open(settings("u1")).await.expect("Open must persist.");
		let first = SearchAfterSettings {
			search_after: vec![serde_json::json!(1.5), serde_json::json!("a")],
			..settings("u1")
		};

		manager.advance(&token, first).await.expect("Advance must succeed.");

		let second =
			SearchAfterSettings { search_after: vec![serde_json::json!(0.2)], ..settings("u1") };

		manager.advance(&token, second).await.expect("Advance must succeed.");

		let resolved = manager.resolve(&token, "u1").await.expect("Cursor must resolve.");

		assert_eq!(resolved.search_after, vec![serde_json::json!(0.2)]);
	}

	#[tokio::test]
	async fn foreign_and_malformed_tokens_are_rejected() {
		let manager = manager();
		let token = manager.open(settings("u1")).await.expect("Open must persist.");

		assert!(matches!(manager.resolve(&token, "u2").await, Err(Error::Forbidden { .. })));
		assert!(matches!(
			manager.resolve("not-a-token", "u1").await,
			Err(Error::InvalidCursor { .. })
		));

		manager.evict(&token).await;

		assert!(matches!(manager.resolve(&token, "u1").await, Err(Error::InvalidCursor { .. })));
	}

	#[test]
	fn tokens_are_unique_hex_digests() {
		let a = new_cursor_token("pit");
		let b = new_cursor_token("pit");

		assert_ne!(a, b);
		assert!(is_well_formed(&a));
	}
}
