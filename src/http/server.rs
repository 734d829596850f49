use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tracing::{debug, info, warn};

pub struct Server {
	listener: TcpListener,
	app: Router,
	read_timeout: Duration,
	idle_timeout: Duration,
	drain_deadline: Duration,
}

impl Server {
	pub fn new(
		listener: TcpListener,
		app: Router,
		read_timeout: Duration,
		idle_timeout: Duration,
		drain_deadline: Duration,
	) -> Self {
		Server {
			listener,
			app,
			read_timeout,
			idle_timeout,
			drain_deadline,
		}
	}

	pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	/// Accepts connections until shutdown is signalled, then drains in-flight
	/// connections within the drain deadline.
	pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
		let mut connections: JoinSet<()> = JoinSet::new();

		loop {
			tokio::select! {
				accepted = self.listener.accept() => {
					let (stream, remote) = match accepted {
						Ok(pair) => pair,
						Err(err) => {
							warn!(error = %err, "failed to accept connection");
							continue;
						},
					};
					connections.spawn(serve_connection(
						stream,
						remote,
						self.app.clone(),
						self.read_timeout,
						self.idle_timeout,
						shutdown.clone(),
					));
				},
				_ = shutdown.changed() => break,
			}
		}

		info!("draining in-flight connections");
		let drain = async {
			while connections.join_next().await.is_some() {}
		};
		if tokio::time::timeout(self.drain_deadline, drain).await.is_err() {
			warn!("drain deadline exceeded, dropping remaining connections");
		}
	}
}

async fn serve_connection(
	stream: tokio::net::TcpStream,
	remote: SocketAddr,
	app: Router,
	read_timeout: Duration,
	idle_timeout: Duration,
	mut shutdown: watch::Receiver<bool>,
) {
	let svc = service_fn(move |mut req: hyper::Request<Incoming>| {
		req.extensions_mut().insert(ConnectInfo(remote));
		let app = app.clone();
		async move {
			let resp = app
				.oneshot(req.map(Body::new))
				.await
				.expect("router is infallible");
			Ok::<_, Infallible>(resp)
		}
	});

	let mut builder = auto::Builder::new(TokioExecutor::new());
	// The timer is required for the header read timeout to take effect.
	builder
		.http1()
		.timer(TokioTimer::new())
		.header_read_timeout(read_timeout);
	builder
		.http2()
		.timer(TokioTimer::new())
		.keep_alive_interval(Some(idle_timeout))
		.keep_alive_timeout(idle_timeout);

	let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
	tokio::pin!(conn);

	tokio::select! {
		result = conn.as_mut() => {
			if let Err(err) = result {
				debug!(error = %err, "connection closed with error");
			}
		},
		_ = shutdown.changed() => {
			// Stop taking new requests on this connection and let the
			// in-flight ones finish; the drain deadline bounds the wait.
			conn.as_mut().graceful_shutdown();
			if let Err(err) = conn.as_mut().await {
				debug!(error = %err, "connection closed with error during drain");
			}
		},
	}
}
