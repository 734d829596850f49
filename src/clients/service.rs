use std::sync::Arc;

use tracing::{debug, info};

use super::cache::ClientCache;
use super::store::{ClientStore, StoreError};
use super::{CachedClient, Client};

/// Limits given to clients materialized by `auto_create_clients`.
pub const AUTO_CREATE_CAPACITY: i32 = 1000;
pub const AUTO_CREATE_RATE_PER_SECOND: i32 = 100;

/// Coordinates the registry and the cache.
///
/// Reads go cache-first with a storage read-through; every mutation keeps the
/// cache coherent (create and the read-through populate a full bucket, update
/// carries the live token level over, delete evicts).
pub struct ClientService {
	store: Arc<dyn ClientStore>,
	cache: Arc<ClientCache>,
	auto_create: bool,
}

impl ClientService {
	pub fn new(store: Arc<dyn ClientStore>, cache: Arc<ClientCache>, auto_create: bool) -> Self {
		ClientService {
			store,
			cache,
			auto_create,
		}
	}

	pub fn cache(&self) -> &Arc<ClientCache> {
		&self.cache
	}

	/// Resolves the live entry for a client IP on the admission path.
	///
	/// Returns `Ok(None)` for an unknown client when auto-creation is
	/// disabled; storage failures propagate and must not admit the request.
	pub async fn resolve(&self, ip_address: &str) -> Result<Option<Arc<CachedClient>>, StoreError> {
		if let Some(entry) = self.cache.get(ip_address) {
			debug!(ip_address, "client cache hit");
			return Ok(Some(entry));
		}
		debug!(ip_address, "client cache miss, consulting storage");

		if let Some(record) = self.store.find_by_ip(ip_address).await? {
			let entry = Arc::new(CachedClient::new(record));
			self.cache.upsert(entry.clone());
			return Ok(Some(entry));
		}

		if !self.auto_create {
			return Ok(None);
		}

		let candidate = Client {
			id: None,
			ip_address: ip_address.to_string(),
			name: None,
			capacity: AUTO_CREATE_CAPACITY,
			rate_per_second: AUTO_CREATE_RATE_PER_SECOND,
		};
		let record = match self.store.create(&candidate).await {
			Ok(record) => record,
			// Lost a create race; the row is there now.
			Err(StoreError::AlreadyExists) => self
				.store
				.find_by_ip(ip_address)
				.await?
				.ok_or(StoreError::NotFound)?,
			Err(err) => return Err(err),
		};
		info!(ip_address, "auto-created client with default limits");
		let entry = Arc::new(CachedClient::new(record));
		self.cache.upsert(entry.clone());
		Ok(Some(entry))
	}

	/// All stored clients. Live token levels are cache state and are not
	/// part of the answer.
	pub async fn list(&self) -> Result<Vec<Client>, StoreError> {
		self.store.list().await
	}

	pub async fn create(&self, client: Client) -> Result<Client, StoreError> {
		let created = self.store.create(&client).await?;
		self.cache.upsert(Arc::new(CachedClient::new(created.clone())));
		info!(ip_address = %created.ip_address, "client created");
		Ok(created)
	}

	/// Persists new limits and refreshes the cache entry. The live token
	/// level survives the update, clamped to the new capacity.
	pub async fn update(&self, client: Client) -> Result<(), StoreError> {
		self.store.update(&client).await?;
		let entry = match self.cache.get(&client.ip_address) {
			Some(existing) => CachedClient::with_tokens(client.clone(), existing.tokens()),
			None => CachedClient::new(client.clone()),
		};
		self.cache.upsert(Arc::new(entry));
		info!(ip_address = %client.ip_address, "client updated");
		Ok(())
	}

	pub async fn delete(&self, ip_address: &str) -> Result<(), StoreError> {
		self.store.delete(ip_address).await?;
		self.cache.remove(ip_address);
		info!(ip_address, "client deleted");
		Ok(())
	}
}
