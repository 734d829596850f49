use std::net::IpAddr;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::routing::{get, put};
use http::StatusCode;
use serde::Deserialize;

use crate::clients::Client;
use crate::http::AppState;
use crate::proxy::ProxyError;

/// CRUD over registered clients, mounted under the admin prefix. Every
/// mutation keeps the live cache coherent via the client service.
pub fn router() -> Router<AppState> {
	Router::new()
		.route("/", get(list).post(create))
		.route("/{ip_address}", put(update).delete(remove))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Client>>, ProxyError> {
	let clients = state.clients.list().await?;
	Ok(Json(clients))
}

#[derive(Debug, Deserialize)]
struct CreateClientRequest {
	ip_address: String,
	capacity: i32,
	rate_per_second: i32,
	#[serde(default)]
	name: Option<String>,
}

async fn create(
	State(state): State<AppState>,
	payload: Result<Json<CreateClientRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Client>), ProxyError> {
	let Json(req) = payload.map_err(|e| ProxyError::InvalidBody(e.body_text()))?;
	if req.ip_address.parse::<IpAddr>().is_err() {
		return Err(ProxyError::InvalidBody(
			"ip_address must be a valid IP address".to_string(),
		));
	}
	validate_limits(req.capacity, req.rate_per_second)?;

	let created = state
		.clients
		.create(Client {
			id: None,
			ip_address: req.ip_address,
			name: req.name,
			capacity: req.capacity,
			rate_per_second: req.rate_per_second,
		})
		.await?;
	Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct UpdateClientRequest {
	capacity: i32,
	rate_per_second: i32,
}

async fn update(
	State(state): State<AppState>,
	Path(ip_address): Path<String>,
	payload: Result<Json<UpdateClientRequest>, JsonRejection>,
) -> Result<StatusCode, ProxyError> {
	let Json(req) = payload.map_err(|e| ProxyError::InvalidBody(e.body_text()))?;
	validate_limits(req.capacity, req.rate_per_second)?;

	state
		.clients
		.update(Client {
			id: None,
			ip_address,
			name: None,
			capacity: req.capacity,
			rate_per_second: req.rate_per_second,
		})
		.await?;
	Ok(StatusCode::OK)
}

async fn remove(
	State(state): State<AppState>,
	Path(ip_address): Path<String>,
) -> Result<StatusCode, ProxyError> {
	state.clients.delete(&ip_address).await?;
	Ok(StatusCode::NO_CONTENT)
}

fn validate_limits(capacity: i32, rate_per_second: i32) -> Result<(), ProxyError> {
	if capacity < 0 || rate_per_second < 0 {
		return Err(ProxyError::InvalidBody(
			"capacity and rate_per_second must not be negative".to_string(),
		));
	}
	Ok(())
}
