use async_trait::async_trait;

use super::Client;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("client was not found")]
	NotFound,
	#[error("client already exists")]
	AlreadyExists,
	#[error("database failure: {0}")]
	Database(#[from] sqlx::Error),
}

/// The durable client registry. Limits live here; token levels never do.
#[async_trait]
pub trait ClientStore: Send + Sync {
	async fn list(&self) -> Result<Vec<Client>, StoreError>;

	async fn find_by_ip(&self, ip_address: &str) -> Result<Option<Client>, StoreError>;

	/// Inserts a new client and returns it with its assigned id. Fails with
	/// `AlreadyExists` when the IP is already registered.
	async fn create(&self, client: &Client) -> Result<Client, StoreError>;

	/// Updates the limits of an existing client, keyed by IP.
	async fn update(&self, client: &Client) -> Result<(), StoreError>;

	async fn delete(&self, ip_address: &str) -> Result<(), StoreError>;
}

#[cfg(any(test, feature = "testing"))]
pub mod memory {
	use std::collections::BTreeMap;
	use std::sync::Mutex;

	use super::*;

	/// In-memory registry used by tests and local development.
	#[derive(Debug, Default)]
	pub struct MemoryStore {
		inner: Mutex<State>,
	}

	#[derive(Debug, Default)]
	struct State {
		clients: BTreeMap<String, Client>,
		next_id: i64,
	}

	impl MemoryStore {
		pub fn new() -> Self {
			Self::default()
		}

		pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
			let store = Self::new();
			{
				let mut state = store.inner.lock().unwrap();
				for mut client in clients {
					state.next_id += 1;
					client.id = Some(state.next_id);
					state.clients.insert(client.ip_address.clone(), client);
				}
			}
			store
		}
	}

	#[async_trait]
	impl ClientStore for MemoryStore {
		async fn list(&self) -> Result<Vec<Client>, StoreError> {
			Ok(self.inner.lock().unwrap().clients.values().cloned().collect())
		}

		async fn find_by_ip(&self, ip_address: &str) -> Result<Option<Client>, StoreError> {
			Ok(self.inner.lock().unwrap().clients.get(ip_address).cloned())
		}

		async fn create(&self, client: &Client) -> Result<Client, StoreError> {
			let mut state = self.inner.lock().unwrap();
			if state.clients.contains_key(&client.ip_address) {
				return Err(StoreError::AlreadyExists);
			}
			state.next_id += 1;
			let created = Client {
				id: Some(state.next_id),
				..client.clone()
			};
			state
				.clients
				.insert(created.ip_address.clone(), created.clone());
			Ok(created)
		}

		async fn update(&self, client: &Client) -> Result<(), StoreError> {
			let mut state = self.inner.lock().unwrap();
			match state.clients.get_mut(&client.ip_address) {
				Some(existing) => {
					existing.capacity = client.capacity;
					existing.rate_per_second = client.rate_per_second;
					if client.name.is_some() {
						existing.name = client.name.clone();
					}
					Ok(())
				},
				None => Err(StoreError::NotFound),
			}
		}

		async fn delete(&self, ip_address: &str) -> Result<(), StoreError> {
			let mut state = self.inner.lock().unwrap();
			match state.clients.remove(ip_address) {
				Some(_) => Ok(()),
				None => Err(StoreError::NotFound),
			}
		}
	}
}
