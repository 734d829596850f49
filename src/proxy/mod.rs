pub mod backend;
pub mod balancer;
pub mod forward;
pub mod health;
mod replay;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use hyper_util::client::legacy::Error as UpstreamError;
use serde::Serialize;

pub use backend::Backend;
pub use balancer::RoundRobin;
pub use forward::Proxy;
pub use health::HealthChecker;

use crate::clients::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
	#[error("rate limit exceeded")]
	RateLimitExceeded,
	#[error("unknown client")]
	UnknownClient,
	#[error("there are no servers to process the request, try again later")]
	NoBackendsAvailable,
	#[error("upstream call failed")]
	UpstreamCallFailed(#[source] UpstreamError),
	#[error("request timed out")]
	RequestTimeout,
	#[error("failed to determine client address")]
	InvalidClientAddress,
	#[error("failed to deserialize data: {0}")]
	InvalidBody(String),
	#[error("client was not found")]
	ClientNotFound,
	#[error("client already exists")]
	ClientExists,
	#[error("internal server error: {0}")]
	Internal(#[source] anyhow::Error),
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
	code: u16,
	message: String,
}

impl ProxyError {
	pub fn status(&self) -> StatusCode {
		match self {
			ProxyError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
			ProxyError::UnknownClient => StatusCode::FORBIDDEN,
			ProxyError::NoBackendsAvailable => StatusCode::SERVICE_UNAVAILABLE,
			ProxyError::UpstreamCallFailed(_) => StatusCode::BAD_GATEWAY,
			ProxyError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
			ProxyError::InvalidClientAddress => StatusCode::BAD_REQUEST,
			ProxyError::InvalidBody(_) => StatusCode::BAD_REQUEST,
			ProxyError::ClientNotFound => StatusCode::NOT_FOUND,
			ProxyError::ClientExists => StatusCode::CONFLICT,
			ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl From<StoreError> for ProxyError {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::NotFound => ProxyError::ClientNotFound,
			StoreError::AlreadyExists => ProxyError::ClientExists,
			StoreError::Database(e) => ProxyError::Internal(e.into()),
		}
	}
}

impl IntoResponse for ProxyError {
	fn into_response(self) -> Response {
		let status = self.status();
		let body = ErrorBody {
			code: status.as_u16(),
			message: self.to_string(),
		};
		(status, axum::Json(body)).into_response()
	}
}

/// Walks an error's source chain looking for a refused TCP connect. This is
/// the one transport failure that flips backend availability on the request
/// path and triggers the single retry.
pub(crate) fn is_connection_refused(err: &(dyn std::error::Error + 'static)) -> bool {
	let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
	while let Some(err) = current {
		if let Some(io) = err.downcast_ref::<std::io::Error>() {
			if io.kind() == std::io::ErrorKind::ConnectionRefused {
				return true;
			}
		}
		current = err.source();
	}
	false
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_mapping() {
		assert_eq!(ProxyError::RateLimitExceeded.status(), StatusCode::TOO_MANY_REQUESTS);
		assert_eq!(ProxyError::UnknownClient.status(), StatusCode::FORBIDDEN);
		assert_eq!(
			ProxyError::NoBackendsAvailable.status(),
			StatusCode::SERVICE_UNAVAILABLE
		);
		assert_eq!(ProxyError::ClientNotFound.status(), StatusCode::NOT_FOUND);
		assert_eq!(ProxyError::ClientExists.status(), StatusCode::CONFLICT);
	}

	#[derive(Debug)]
	struct Wrapped(std::io::Error);

	impl std::fmt::Display for Wrapped {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "transport error")
		}
	}

	impl std::error::Error for Wrapped {
		fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
			Some(&self.0)
		}
	}

	#[test]
	fn refused_detected_through_source_chain() {
		let refused = Wrapped(std::io::Error::new(
			std::io::ErrorKind::ConnectionRefused,
			"refused",
		));
		assert!(is_connection_refused(&refused));

		let other = Wrapped(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
		assert!(!is_connection_refused(&other));
	}

	#[test]
	fn no_backends_message_is_stable() {
		// Clients key off this body; see the 503 contract.
		assert_eq!(
			ProxyError::NoBackendsAvailable.to_string(),
			"there are no servers to process the request, try again later"
		);
	}
}
