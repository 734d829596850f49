use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

use crate::clients::cache::ClientCache;
use crate::clients::pg::PgClientStore;
use crate::clients::service::ClientService;
use crate::clients::store::ClientStore;
use crate::config::Config;
use crate::http::server::Server;
use crate::http::{AppState, router};
use crate::proxy::{Backend, HealthChecker, Proxy, RoundRobin, forward};
use crate::{ratelimit, signal};

/// How long graceful shutdown waits for in-flight requests.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Connects to storage and starts the listener plus the background tasks.
/// The returned [`Bound`] owns them until termination.
pub async fn run(config: Config) -> anyhow::Result<Bound> {
	let store: Arc<dyn ClientStore> = Arc::new(
		PgClientStore::connect(&config.storage)
			.await
			.context("storage connection")?,
	);
	bind(config, store).await
}

/// Same as [`run`] but with the registry supplied by the caller; tests use
/// this with the in-memory store.
pub async fn bind(config: Config, store: Arc<dyn ClientStore>) -> anyhow::Result<Bound> {
	let backends: Vec<Arc<Backend>> = config
		.backends
		.iter()
		.map(|url| Arc::new(Backend::new(url.clone())))
		.collect();
	let upstream = forward::upstream_client();

	let cache = Arc::new(ClientCache::new(config.cache_capacity()));
	let clients = Arc::new(ClientService::new(
		store,
		cache.clone(),
		config.rate_limit.auto_create_clients,
	));

	let proxy = Arc::new(Proxy::new(RoundRobin::new(backends.clone()), upstream.clone()));
	let state = AppState {
		clients,
		proxy,
		write_timeout: config.proxy.write_timeout,
	};
	let app = router(state);

	let listener = TcpListener::bind((config.proxy.host.as_str(), config.proxy.port))
		.await
		.with_context(|| {
			format!(
				"failed to bind {}:{}",
				config.proxy.host, config.proxy.port
			)
		})?;
	let server = Server::new(
		listener,
		app,
		config.proxy.read_timeout,
		config.proxy.idle_timeout,
		DRAIN_DEADLINE,
	);
	let addr = server.local_addr().context("listener address")?;

	let health = HealthChecker::new(
		backends,
		upstream,
		config.proxy.health_check.interval,
		config.proxy.health_check.workers_count,
	);

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let mut tasks = JoinSet::new();
	tasks.spawn(health.run(shutdown_rx.clone()));
	tasks.spawn(ratelimit::refiller::run(cache, shutdown_rx.clone()));
	tasks.spawn(server.serve(shutdown_rx));

	info!(%addr, "flowgate is listening");

	Ok(Bound {
		addr,
		shutdown_tx,
		tasks,
	})
}

pub struct Bound {
	addr: std::net::SocketAddr,
	shutdown_tx: watch::Sender<bool>,
	tasks: JoinSet<()>,
}

impl Bound {
	pub fn local_addr(&self) -> std::net::SocketAddr {
		self.addr
	}

	/// Blocks until SIGINT/SIGTERM, then stops the background loops and
	/// drains the server.
	pub async fn wait_termination(mut self) -> anyhow::Result<()> {
		signal::shutdown().await;
		let _ = self.shutdown_tx.send(true);
		while let Some(result) = self.tasks.join_next().await {
			result.context("task panicked during shutdown")?;
		}
		info!("shutdown complete");
		Ok(())
	}
}
