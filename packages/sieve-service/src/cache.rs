use std::time::Duration;

use crate::BoxFuture;

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CacheError {
	pub message: String,
}

/// Key/value store shared between requests.
///
/// Implementations report storage failures as [`CacheError`]; callers decide whether a failure
/// is fatal.
pub trait Cache<V>
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<V>, CacheError>>;

	fn put<'a>(&'a self, key: &'a str, value: V) -> BoxFuture<'a, Result<(), CacheError>>;

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), CacheError>>;

	fn clear_all(&self) -> BoxFuture<'_, Result<(), CacheError>>;
}

/// Process-local cache with a fixed time-to-live per entry. Expired entries are reclaimed by the
/// cache's own housekeeping, not only when their key is read again.
pub struct MemoryCache<V> {
	entries: moka::sync::Cache<String, V>,
}
impl<V> MemoryCache<V>
where
	V: Clone + Send + Sync + 'static,
{
	pub fn new(ttl: Duration) -> Self {
		Self::with_capacity(ttl, DEFAULT_MAX_CAPACITY)
	}

	pub fn with_capacity(ttl: Duration, max_capacity: u64) -> Self {
		let entries = moka::sync::Cache::builder()
			.max_capacity(max_capacity.max(1))
			.time_to_live(ttl)
			.build();

		Self { entries }
	}
}
impl<V> Cache<V> for MemoryCache<V>
where
	V: Clone + Send + Sync + 'static,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<V>, CacheError>> {
		Box::pin(async move { Ok(self.entries.get(key)) })
	}

	fn put<'a>(&'a self, key: &'a str, value: V) -> BoxFuture<'a, Result<(), CacheError>> {
		Box::pin(async move {
			self.entries.insert(key.to_string(), value);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), CacheError>> {
		Box::pin(async move {
			self.entries.invalidate(key);

			Ok(())
		})
	}

	fn clear_all(&self) -> BoxFuture<'_, Result<(), CacheError>> {
		Box::pin(async move {
			self.entries.invalidate_all();

			Ok(())
		})
	}
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	key.get(..len).unwrap_or(key)
}

/// Reads `key`, treating any cache failure as a miss.
pub(crate) async fn read_or_miss<V>(
	cache: &dyn Cache<V>,
	key: &str,
	cache_kind: &str,
) -> Option<V> {
	match cache.get(key).await {
		Ok(value) => value,
		Err(err) => {
			tracing::warn!(
				error = %err,
				cache_kind,
				cache_key_prefix = cache_key_prefix(key),
				"Cache read failed."
			);

			None
		},
	}
}

/// Writes `key`, logging failures. Returns whether the write landed.
pub(crate) async fn write_best_effort<V>(
	cache: &dyn Cache<V>,
	key: &str,
	value: V,
	cache_kind: &str,
) -> bool {
	match cache.put(key, value).await {
		Ok(()) => true,
		Err(err) => {
			tracing::warn!(
				error = %err,
				cache_kind,
				cache_key_prefix = cache_key_prefix(key),
				"Cache write failed."
			);

			false
		},
	}
}

pub(crate) async fn delete_best_effort<V>(cache: &dyn Cache<V>, key: &str, cache_kind: &str) {
	if let Err(err) = cache.delete(key).await {
		tracing::warn!(
			error = %err,
			cache_kind,
			cache_key_prefix = cache_key_prefix(key),
			"Cache delete failed."
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn entries_expire_after_ttl() {
		let cache = MemoryCache::new(Duration::from_millis(20));

		cache.put("k", 1_u32).await.expect("Put must succeed.");

		assert_eq!(cache.get("k").await.expect("Get must succeed."), Some(1));

		tokio::time::sleep(Duration::from_millis(40)).await;

		assert_eq!(cache.get("k").await.expect("Get must succeed."), None);
	}

	#[tokio::test]
	async fn delete_and_clear_remove_entries() {
		let cache = MemoryCache::new(Duration::from_secs(60));

		cache.put("a", "x".to_string()).await.expect("Put must succeed.");
		cache.put("b", "y".to_string()).await.expect("Put must succeed.");
		cache.delete("a").await.expect("Delete must succeed.");

		assert_eq!(cache.get("a").await.expect("Get must succeed."), None);

		cache.clear_all().await.expect("Clear must succeed.");

		assert_eq!(cache.get("b").await.expect("Get must succeed."), None);
	}

	#[tokio::test]
	async fn expired_entries_are_reclaimed() {
		let cache = MemoryCache::new(Duration::from_millis(5));

		for n in 0..1_000_u32 {
			cache.put(&format!("cursor-{n}"), n).await.expect("Put must succeed.");
		}

		tokio::time::sleep(Duration::from_millis(20)).await;

		cache.put("fresh", 0).await.expect("Put must succeed.");
		cache.entries.run_pending_tasks();

		assert!(cache.entries.entry_count() <= 1, "{} entries held", cache.entries.entry_count());
	}

	#[test]
	fn capacity_bounds_live_entries() {
		let cache = MemoryCache::with_capacity(Duration::from_secs(60), 2);

		for key in ["one", "two", "three", "four"] {
			cache.entries.insert(key.to_string(), key.len());
		}

		cache.entries.run_pending_tasks();

		assert!(cache.entries.entry_count() <= 2);
	}

	#[test]
	fn key_prefix_is_bounded() {
		assert_eq!(cache_key_prefix("0123456789abcdef"), "0123456789ab");
		assert_eq!(cache_key_prefix("short"), "short");
	}
}
