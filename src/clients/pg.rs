use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, warn};

use super::Client;
use super::store::{ClientStore, StoreError};
use crate::config::StorageConfig;

/// Postgres-backed client registry.
#[derive(Debug, Clone)]
pub struct PgClientStore {
	pool: PgPool,
}

impl PgClientStore {
	/// Connects to Postgres, retrying per the configured attempts/delay, and
	/// applies pending migrations.
	pub async fn connect(cfg: &StorageConfig) -> Result<Self, StoreError> {
		let options = PgConnectOptions::new()
			.host(&cfg.host)
			.port(cfg.port)
			.username(&cfg.user)
			.password(&cfg.password)
			.database(&cfg.database);

		let mut attempt = 0;
		let pool = loop {
			attempt += 1;
			match PgPoolOptions::new()
				.max_connections(cfg.max_connections)
				.connect_with(options.clone())
				.await
			{
				Ok(pool) => break pool,
				Err(err) if attempt < cfg.connect_attempts => {
					warn!(
						attempt,
						attempts = cfg.connect_attempts,
						error = %err,
						"failed to connect to storage, retrying",
					);
					tokio::time::sleep(cfg.connect_delay).await;
				},
				Err(err) => return Err(err.into()),
			}
		};

		sqlx::migrate!("./migrations")
			.run(&pool)
			.await
			.map_err(|e| StoreError::Database(e.into()))?;
		info!(host = %cfg.host, database = %cfg.database, "connected to storage");

		Ok(PgClientStore { pool })
	}
}

#[async_trait]
impl ClientStore for PgClientStore {
	async fn list(&self) -> Result<Vec<Client>, StoreError> {
		let clients = sqlx::query_as::<_, Client>(
			"SELECT id, ip_address, name, capacity, rate_per_second FROM clients ORDER BY id",
		)
		.fetch_all(&self.pool)
		.await?;
		Ok(clients)
	}

	async fn find_by_ip(&self, ip_address: &str) -> Result<Option<Client>, StoreError> {
		let client = sqlx::query_as::<_, Client>(
			"SELECT id, ip_address, name, capacity, rate_per_second FROM clients WHERE ip_address = $1",
		)
		.bind(ip_address)
		.fetch_optional(&self.pool)
		.await?;
		Ok(client)
	}

	async fn create(&self, client: &Client) -> Result<Client, StoreError> {
		let created = sqlx::query_as::<_, Client>(
			"INSERT INTO clients (ip_address, name, capacity, rate_per_second) \
			 VALUES ($1, $2, $3, $4) \
			 ON CONFLICT (ip_address) DO NOTHING \
			 RETURNING id, ip_address, name, capacity, rate_per_second",
		)
		.bind(&client.ip_address)
		.bind(&client.name)
		.bind(client.capacity)
		.bind(client.rate_per_second)
		.fetch_optional(&self.pool)
		.await?;
		created.ok_or(StoreError::AlreadyExists)
	}

	async fn update(&self, client: &Client) -> Result<(), StoreError> {
		let result = sqlx::query(
			"UPDATE clients SET capacity = $2, rate_per_second = $3 WHERE ip_address = $1",
		)
		.bind(&client.ip_address)
		.bind(client.capacity)
		.bind(client.rate_per_second)
		.execute(&self.pool)
		.await?;
		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound);
		}
		Ok(())
	}

	async fn delete(&self, ip_address: &str) -> Result<(), StoreError> {
		let result = sqlx::query("DELETE FROM clients WHERE ip_address = $1")
			.bind(ip_address)
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound);
		}
		Ok(())
	}
}
