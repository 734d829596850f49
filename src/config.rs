use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config at {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("invalid config: {0}")]
	Invalid(String),
}

/// Frozen process configuration, loaded once at startup from the YAML file
/// named by `--path`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub env: Env,
	pub proxy: ProxyConfig,
	#[serde(default)]
	pub rate_limit: RateLimitConfig,
	#[serde(default)]
	pub cache: CacheConfig,
	pub backends: Vec<Url>,
	pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
	Local,
	Prod,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
	pub host: String,
	pub port: u16,
	#[serde(default = "default_timeout", deserialize_with = "serde_dur::deserialize")]
	pub read_timeout: Duration,
	#[serde(default = "default_timeout", deserialize_with = "serde_dur::deserialize")]
	pub write_timeout: Duration,
	#[serde(default = "default_timeout", deserialize_with = "serde_dur::deserialize")]
	pub idle_timeout: Duration,
	#[serde(default)]
	pub health_check: HealthCheckConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckConfig {
	#[serde(
		default = "default_health_interval",
		deserialize_with = "serde_dur::deserialize"
	)]
	pub interval: Duration,
	#[serde(default = "default_health_workers")]
	pub workers_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
	/// When true, a request from an unregistered IP materializes a client
	/// with default limits instead of being rejected with 403.
	#[serde(default)]
	pub auto_create_clients: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
	/// Maximum resident clients; zero (or negative) disables the cache.
	#[serde(default = "default_cache_elements")]
	pub max_elements: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
	pub host: String,
	pub port: u16,
	pub user: String,
	pub password: String,
	pub database: String,
	#[serde(default = "default_max_connections")]
	pub max_connections: u32,
	#[serde(default = "default_connect_attempts")]
	pub connect_attempts: u32,
	#[serde(
		default = "default_connect_delay",
		deserialize_with = "serde_dur::deserialize"
	)]
	pub connect_delay: Duration,
}

impl Default for HealthCheckConfig {
	fn default() -> Self {
		HealthCheckConfig {
			interval: default_health_interval(),
			workers_count: default_health_workers(),
		}
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		CacheConfig {
			max_elements: default_cache_elements(),
		}
	}
}

impl Config {
	pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let path = path.as_ref();
		let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.display().to_string(),
			source,
		})?;
		let config: Config = serde_yaml::from_str(&contents)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.backends.is_empty() {
			return Err(ConfigError::Invalid(
				"at least one backend is required".to_string(),
			));
		}
		for backend in &self.backends {
			if backend.scheme() != "http" {
				return Err(ConfigError::Invalid(format!(
					"backend {backend} must use the http scheme"
				)));
			}
			if backend.host_str().is_none() {
				return Err(ConfigError::Invalid(format!(
					"backend {backend} has no host"
				)));
			}
			if backend.path() != "/" || backend.query().is_some() {
				return Err(ConfigError::Invalid(format!(
					"backend {backend} must be an origin url without path or query"
				)));
			}
		}
		Ok(())
	}

	/// Cache capacity with the disabled case normalized to zero.
	pub fn cache_capacity(&self) -> usize {
		self.cache.max_elements.max(0) as usize
	}
}

fn default_timeout() -> Duration {
	Duration::from_secs(5)
}

fn default_health_interval() -> Duration {
	Duration::from_secs(30)
}

fn default_health_workers() -> usize {
	10
}

fn default_cache_elements() -> i64 {
	50
}

fn default_max_connections() -> u32 {
	5
}

fn default_connect_attempts() -> u32 {
	5
}

fn default_connect_delay() -> Duration {
	Duration::from_secs(2)
}

mod serde_dur {
	pub use duration_str::deserialize_duration as deserialize;
}
