use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

use super::{ADMIN_PREFIX, AppState};
use crate::proxy::ProxyError;

/// Whole-request deadline, from the configured write timeout.
pub async fn deadline(
	State(state): State<AppState>,
	req: Request,
	next: Next,
) -> Result<Response, ProxyError> {
	match tokio::time::timeout(state.write_timeout, next.run(req)).await {
		Ok(resp) => Ok(resp),
		Err(_) => Err(ProxyError::RequestTimeout),
	}
}

/// Logs every request completion with client, path, status and duration.
pub async fn log_requests(req: Request, next: Next) -> Response {
	let start = Instant::now();
	let method = req.method().clone();
	let path = req.uri().path().to_string();
	let client = req
		.extensions()
		.get::<ConnectInfo<SocketAddr>>()
		.map(|ConnectInfo(addr)| addr.to_string())
		.unwrap_or_else(|| "unknown".to_string());

	let resp = next.run(req).await;

	let status = resp.status().as_u16();
	let duration = start.elapsed();
	if resp.status().is_success() {
		info!(%client, %method, %path, status, ?duration, "request completed");
	} else {
		warn!(%client, %method, %path, status, ?duration, "request completed");
	}
	resp
}

/// The admission filter: resolves the caller's rate-limit bucket and spends
/// one token, ahead of the forwarder. Admin traffic passes untouched.
pub async fn admission(
	State(state): State<AppState>,
	req: Request,
	next: Next,
) -> Result<Response, ProxyError> {
	if req.uri().path().starts_with(ADMIN_PREFIX) {
		return Ok(next.run(req).await);
	}

	let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied()
	else {
		return Err(ProxyError::InvalidClientAddress);
	};
	let ip_address = addr.ip().to_string();

	// Storage failures must not admit the request.
	let Some(client) = state.clients.resolve(&ip_address).await? else {
		warn!(%ip_address, "rejecting client with no configured rate limit");
		return Err(ProxyError::UnknownClient);
	};

	if !client.allow() {
		info!(%ip_address, "rate limit exceeded");
		return Err(ProxyError::RateLimitExceeded);
	}

	Ok(next.run(req).await)
}
