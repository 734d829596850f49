pub mod middleware;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::Response;

use crate::clients::service::ClientService;
use crate::proxy::{Proxy, ProxyError};

/// Everything under this prefix is the admin API and bypasses admission.
pub const ADMIN_PREFIX: &str = "/v1/api/clients";

#[derive(Clone)]
pub struct AppState {
	pub clients: Arc<ClientService>,
	pub proxy: Arc<Proxy>,
	pub write_timeout: Duration,
}

/// Builds the full request pipeline: deadline, then logging, then admission,
/// then either the admin API or the forwarder.
pub fn router(state: AppState) -> Router {
	Router::new()
		.nest(ADMIN_PREFIX, crate::api::clients::router())
		.fallback(forward)
		.layer(from_fn_with_state(state.clone(), middleware::admission))
		.layer(from_fn(middleware::log_requests))
		.layer(from_fn_with_state(state.clone(), middleware::deadline))
		.with_state(state)
}

async fn forward(State(state): State<AppState>, req: Request) -> Result<Response, ProxyError> {
	state.proxy.handle(req).await
}
