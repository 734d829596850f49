use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http::{Method, Request, StatusCode, Uri};
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use super::backend::Backend;
use super::forward::UpstreamClient;
use super::is_connection_refused;

/// Upper bound on a single probe so a wedged backend cannot pin a worker
/// permit for a whole sweep.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Periodically probes every backend's `/health` endpoint and flips
/// availability from the answers.
///
/// A sweep runs immediately at startup (before the first tick) and then once
/// per interval. Probes within a sweep run concurrently, bounded by a
/// counting semaphore of `workers` permits. Probe results are
/// fire-and-forget: no retries, state converges at sweep granularity.
pub struct HealthChecker {
	backends: Vec<Arc<Backend>>,
	client: UpstreamClient,
	interval: Duration,
	workers: usize,
}

impl HealthChecker {
	pub fn new(
		backends: Vec<Arc<Backend>>,
		client: UpstreamClient,
		interval: Duration,
		workers: usize,
	) -> Self {
		HealthChecker {
			backends,
			client,
			interval,
			workers: workers.max(1),
		}
	}

	pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
		let permits = Arc::new(Semaphore::new(self.workers));
		let mut ticker = tokio::time::interval(self.interval);
		// The first tick completes immediately; it drives the initial sweep
		// so traffic is not balanced against assumed-healthy state for a
		// whole interval.
		ticker.tick().await;

		info!("starting initial health check");
		self.sweep(&permits).await;
		info!("initial health check completed");

		loop {
			tokio::select! {
				_ = ticker.tick() => self.sweep(&permits).await,
				_ = shutdown.changed() => {
					info!("health checks stopped");
					return;
				},
			}
		}
	}

	/// Dispatches one probe per backend; each probe holds a permit for its
	/// full duration. Dispatch blocks once `workers` probes are in flight.
	async fn sweep(&self, permits: &Arc<Semaphore>) {
		debug!("starting health check for all backends");
		for backend in &self.backends {
			let permit = permits
				.clone()
				.acquire_owned()
				.await
				.expect("health semaphore is never closed");
			let client = self.client.clone();
			let backend = backend.clone();
			tokio::spawn(async move {
				probe(client, backend).await;
				drop(permit);
			});
		}
	}
}

async fn probe(client: UpstreamClient, backend: Arc<Backend>) {
	let uri: Uri = match format!("{}health", backend.url()).parse() {
		Ok(uri) => uri,
		Err(err) => {
			warn!(backend = %backend.authority(), error = %err, "invalid health check url");
			backend.set_available(false);
			return;
		},
	};
	let req = Request::builder()
		.method(Method::GET)
		.uri(uri)
		.body(Body::empty())
		.expect("health check request is valid");

	let response = tokio::time::timeout(PROBE_TIMEOUT, client.request(req)).await;
	match response {
		Err(_) => {
			warn!(backend = %backend.authority(), "health check timed out");
			backend.set_available(false);
		},
		Ok(Err(err)) if is_connection_refused(&err) => {
			warn!(
				backend = %backend.authority(),
				"backend is unhealthy: refused connection",
			);
			backend.set_available(false);
		},
		Ok(Err(err)) => {
			warn!(
				backend = %backend.authority(),
				error = %err,
				"error while checking backend health",
			);
			backend.set_available(false);
		},
		Ok(Ok(resp)) if resp.status() == StatusCode::OK => {
			debug!(backend = %backend.authority(), "backend is healthy");
			backend.set_available(true);
		},
		Ok(Ok(resp)) => {
			warn!(
				backend = %backend.authority(),
				status = resp.status().as_u16(),
				"backend is unhealthy",
			);
			backend.set_available(false);
		},
	}
}
