use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::clients::cache::ClientCache;

/// The refill unit is `rate_per_second`, so the tick period is fixed at one
/// second rather than configured.
const REFILL_PERIOD: Duration = Duration::from_secs(1);

/// Restores tokens for every cached client once per second.
///
/// Only cache residents have live buckets: a client without an entry gets a
/// fresh, full bucket on its next cache-miss populate, which also brings it
/// back under this loop.
pub async fn run(cache: Arc<ClientCache>, mut shutdown: watch::Receiver<bool>) {
	let mut ticker = tokio::time::interval(REFILL_PERIOD);
	// Skip the immediate first tick; buckets start full.
	ticker.tick().await;

	loop {
		tokio::select! {
			_ = ticker.tick() => cache.for_each(|client| client.refill()),
			_ = shutdown.changed() => {
				info!("token refiller stopped");
				return;
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clients::{CachedClient, Client};

	fn entry(ip: &str, capacity: i32, rate: i32) -> Arc<CachedClient> {
		Arc::new(CachedClient::new(Client {
			id: None,
			ip_address: ip.to_string(),
			name: None,
			capacity,
			rate_per_second: rate,
		}))
	}

	#[tokio::test(start_paused = true)]
	async fn refills_every_cached_client_each_second() {
		let cache = Arc::new(ClientCache::new(4));
		let a = entry("10.0.0.1", 10, 2);
		let b = entry("10.0.0.2", 10, 5);
		for _ in 0..10 {
			a.allow();
			b.allow();
		}
		cache.upsert(a.clone());
		cache.upsert(b.clone());

		let (tx, rx) = watch::channel(false);
		let task = tokio::spawn(run(cache.clone(), rx));

		tokio::time::sleep(Duration::from_millis(1100)).await;
		assert_eq!(a.tokens(), 2);
		assert_eq!(b.tokens(), 5);

		tokio::time::sleep(Duration::from_secs(1)).await;
		assert_eq!(a.tokens(), 4);
		assert_eq!(b.tokens(), 10);

		tx.send(true).unwrap();
		task.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn stops_on_shutdown() {
		let cache = Arc::new(ClientCache::new(4));
		let (tx, rx) = watch::channel(false);
		let task = tokio::spawn(run(cache, rx));
		tx.send(true).unwrap();
		tokio::time::timeout(Duration::from_secs(1), task)
			.await
			.expect("refiller exits on shutdown")
			.unwrap();
	}
}
