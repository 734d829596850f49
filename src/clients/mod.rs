pub mod cache;
pub mod pg;
pub mod service;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::ratelimit::TokenBucket;

/// A known client as stored in the registry. `id` is the storage surrogate
/// key; the primary identity is the IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<i64>,
	pub ip_address: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	pub capacity: i32,
	pub rate_per_second: i32,
}

/// A client resident in the cache: the stored record plus its live bucket.
///
/// The registry is the source of truth for limits; the cache entry is the
/// source of truth for the current token level. Entries always enter the
/// cache with a full bucket unless a level is explicitly carried over.
#[derive(Debug)]
pub struct CachedClient {
	record: Client,
	bucket: TokenBucket,
}

impl CachedClient {
	pub fn new(record: Client) -> Self {
		let bucket = TokenBucket::new(record.capacity, record.rate_per_second);
		CachedClient { record, bucket }
	}

	/// Rebuilds an entry around refreshed limits, carrying over an existing
	/// token level (clamped to the new capacity).
	pub fn with_tokens(record: Client, tokens: i32) -> Self {
		let bucket = TokenBucket::with_tokens(record.capacity, record.rate_per_second, tokens);
		CachedClient { record, bucket }
	}

	pub fn record(&self) -> &Client {
		&self.record
	}

	pub fn ip_address(&self) -> &str {
		&self.record.ip_address
	}

	pub fn allow(&self) -> bool {
		self.bucket.allow()
	}

	pub fn refill(&self) {
		self.bucket.refill()
	}

	pub fn tokens(&self) -> i32 {
		self.bucket.tokens()
	}
}
