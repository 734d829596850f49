use tracing_subscriber::EnvFilter;

use crate::config::Env;

/// Installs the global tracing subscriber. `local` gets compact
/// human-readable lines, `prod` gets JSON. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init(env: Env) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let base = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr);
	let result = match env {
		Env::Local => base.compact().try_init(),
		Env::Prod => base.json().try_init(),
	};
	// A second init (tests, embedding) keeps the first subscriber.
	let _ = result;
}
