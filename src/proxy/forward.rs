use std::sync::Arc;

use axum::body::Body;
use http::header::HOST;
use http::uri::Scheme;
use http::{HeaderValue, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as UpstreamError};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tracing::{debug, warn};

use super::backend::Backend;
use super::balancer::RoundRobin;
use super::replay::ReplayBody;
use super::{ProxyError, is_connection_refused};

pub type UpstreamClient = Client<HttpConnector, Body>;

/// Shared upstream HTTP client: plain-HTTP connector, pooled connections.
/// Used for both forwarded requests and health probes.
pub fn upstream_client() -> UpstreamClient {
	Client::builder(TokioExecutor::new())
		.pool_timer(TokioTimer::new())
		.build_http()
}

/// The forwarder behind the admission filter.
///
/// Picks a backend, rewrites the request to point at it, and streams the
/// exchange. A refused connection takes the backend out of rotation and the
/// request gets one more selection pass; every other transport failure is a
/// plain 502.
pub struct Proxy {
	balancer: RoundRobin,
	client: UpstreamClient,
}

enum AttemptFailure {
	NoBackends,
	Upstream {
		backend: Arc<Backend>,
		error: UpstreamError,
	},
}

impl Proxy {
	pub fn new(balancer: RoundRobin, client: UpstreamClient) -> Self {
		Proxy { balancer, client }
	}

	pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
		let (parts, body) = req.into_parts();
		let body = ReplayBody::new(body);
		let retry_body = body.clone();

		let (backend, error) = match self.attempt(&parts, body).await {
			Ok(resp) => return Ok(resp),
			Err(AttemptFailure::NoBackends) => return Err(ProxyError::NoBackendsAvailable),
			Err(AttemptFailure::Upstream { backend, error }) => (backend, error),
		};

		if !is_connection_refused(&error) {
			warn!(backend = %backend.authority(), error = %error, "upstream call failed");
			return Err(ProxyError::UpstreamCallFailed(error));
		}

		warn!(
			backend = %backend.authority(),
			"backend refused connection, taking it out of rotation",
		);
		backend.set_available(false);

		if retry_body.is_capped() {
			debug!("request body outgrew the replay buffer, not retrying");
			return Err(ProxyError::UpstreamCallFailed(error));
		}

		match self.attempt(&parts, retry_body).await {
			Ok(resp) => Ok(resp),
			Err(AttemptFailure::NoBackends) => Err(ProxyError::NoBackendsAvailable),
			Err(AttemptFailure::Upstream { backend, error }) => {
				if is_connection_refused(&error) {
					warn!(
						backend = %backend.authority(),
						"backend refused connection, taking it out of rotation",
					);
					backend.set_available(false);
				} else {
					warn!(backend = %backend.authority(), error = %error, "upstream call failed");
				}
				Err(ProxyError::UpstreamCallFailed(error))
			},
		}
	}

	async fn attempt(
		&self,
		parts: &http::request::Parts,
		body: ReplayBody,
	) -> Result<Response<Body>, AttemptFailure> {
		let Some(backend) = self.balancer.next() else {
			return Err(AttemptFailure::NoBackends);
		};

		let path_and_query = parts
			.uri
			.path_and_query()
			.map(|pq| pq.as_str())
			.unwrap_or("/");
		let uri = Uri::builder()
			.scheme(Scheme::HTTP)
			.authority(backend.authority())
			.path_and_query(path_and_query)
			.build()
			.expect("backend authority and inbound path are valid URI parts");

		let mut outbound = parts.clone();
		outbound.uri = uri;
		let mut req = Request::from_parts(outbound, Body::new(body));
		req.headers_mut().insert(
			HOST,
			HeaderValue::try_from(backend.authority())
				.expect("backend authority is a valid header value"),
		);

		debug!(
			backend = %backend.authority(),
			method = %req.method(),
			path = %path_and_query,
			"forwarding request",
		);

		match self.client.request(req).await {
			Ok(resp) => Ok(resp.map(Body::new)),
			Err(error) => Err(AttemptFailure::Upstream { backend, error }),
		}
	}
}
