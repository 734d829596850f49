use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

/// An upstream origin the proxy can forward to.
///
/// The set of backends is fixed at startup; only the availability flag
/// changes at runtime. It is flipped by the health checker and by the
/// forwarder's connection-refused path, and read by the selector on every
/// request, so it is a plain atomic rather than anything lock-based.
#[derive(Debug)]
pub struct Backend {
	url: Url,
	authority: String,
	available: AtomicBool,
}

impl Backend {
	pub fn new(url: Url) -> Self {
		let authority = match url.port() {
			Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
			None => url.host_str().unwrap_or_default().to_string(),
		};
		Backend {
			url,
			authority,
			available: AtomicBool::new(true),
		}
	}

	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Host/port pair used for the outbound `Host` header and URI authority.
	pub fn authority(&self) -> &str {
		&self.authority
	}

	pub fn is_available(&self) -> bool {
		self.available.load(Ordering::Acquire)
	}

	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::Release);
	}
}
