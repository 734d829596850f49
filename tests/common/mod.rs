#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use flowgate::app::{self, Bound};
use flowgate::clients::Client;
use flowgate::clients::store::memory::MemoryStore;
use flowgate::config::{
	CacheConfig, Config, Env, HealthCheckConfig, ProxyConfig, RateLimitConfig, StorageConfig,
};
use flowgate::proxy::forward::{UpstreamClient, upstream_client};
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestApp {
	pub addr: SocketAddr,
	pub store: Arc<MemoryStore>,
	client: UpstreamClient,
	// Dropped with the app; aborts the background tasks.
	_bound: Bound,
}

pub struct TestAppBuilder {
	backends: Vec<String>,
	clients: Vec<Client>,
	auto_create: bool,
	health_interval: Duration,
	write_timeout: Duration,
	cache_elements: i64,
}

pub fn test_app() -> TestAppBuilder {
	TestAppBuilder {
		backends: Vec::new(),
		clients: Vec::new(),
		auto_create: false,
		health_interval: Duration::from_secs(60),
		write_timeout: Duration::from_secs(5),
		cache_elements: 50,
	}
}

impl TestAppBuilder {
	pub fn backend(mut self, addr: impl std::fmt::Display) -> Self {
		self.backends.push(format!("http://{addr}"));
		self
	}

	pub fn client(mut self, ip: &str, capacity: i32, rate_per_second: i32) -> Self {
		self.clients.push(Client {
			id: None,
			ip_address: ip.to_string(),
			name: None,
			capacity,
			rate_per_second,
		});
		self
	}

	pub fn auto_create(mut self) -> Self {
		self.auto_create = true;
		self
	}

	pub fn health_interval(mut self, interval: Duration) -> Self {
		self.health_interval = interval;
		self
	}

	pub async fn spawn(self) -> TestApp {
		let config = Config {
			env: Env::Local,
			proxy: ProxyConfig {
				host: "127.0.0.1".to_string(),
				port: 0,
				read_timeout: Duration::from_secs(5),
				write_timeout: self.write_timeout,
				idle_timeout: Duration::from_secs(5),
				health_check: HealthCheckConfig {
					interval: self.health_interval,
					workers_count: 4,
				},
			},
			rate_limit: RateLimitConfig {
				auto_create_clients: self.auto_create,
			},
			cache: CacheConfig {
				max_elements: self.cache_elements,
			},
			backends: self
				.backends
				.iter()
				.map(|b| b.parse().expect("test backend url"))
				.collect(),
			// Unused: the store is injected below.
			storage: StorageConfig {
				host: "127.0.0.1".to_string(),
				port: 5432,
				user: "unused".to_string(),
				password: "unused".to_string(),
				database: "unused".to_string(),
				max_connections: 1,
				connect_attempts: 1,
				connect_delay: Duration::from_millis(10),
			},
		};

		let store = Arc::new(MemoryStore::with_clients(self.clients));
		let bound = app::bind(config, store.clone())
			.await
			.expect("test app binds");
		TestApp {
			addr: bound.local_addr(),
			store,
			client: upstream_client(),
			_bound: bound,
		}
	}
}

impl TestApp {
	pub async fn get(&self, path: &str) -> Response<hyper::body::Incoming> {
		self.request(Method::GET, path, None).await
	}

	pub async fn request(
		&self,
		method: Method,
		path: &str,
		json: Option<&str>,
	) -> Response<hyper::body::Incoming> {
		let mut builder = Request::builder()
			.method(method)
			.uri(format!("http://{}{path}", self.addr));
		let body = match json {
			Some(json) => {
				builder = builder.header(http::header::CONTENT_TYPE, "application/json");
				Body::from(json.to_string())
			},
			None => Body::empty(),
		};
		let req = builder.body(body).expect("test request");
		self.client.request(req).await.expect("request reaches app")
	}
}

pub async fn read_body(resp: Response<hyper::body::Incoming>) -> String {
	let bytes = resp
		.into_body()
		.collect()
		.await
		.expect("response body")
		.to_bytes();
	String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn assert_json_error(resp: Response<hyper::body::Incoming>, code: u16) {
	assert_eq!(resp.status().as_u16(), code);
	let body = read_body(resp).await;
	let value: serde_json::Value = serde_json::from_str(&body).expect("json error body");
	assert_eq!(value["code"], code);
	assert!(value["message"].is_string());
}

/// A wiremock upstream answering its health endpoint with `health_status`
/// and any other GET with `label`.
pub async fn backend_server(label: &str, health_status: u16) -> MockServer {
	let server = MockServer::start().await;
	mount_backend(&server, label, health_status).await;
	server
}

pub async fn mount_backend(server: &MockServer, label: &str, health_status: u16) {
	Mock::given(method("GET"))
		.and(path("/health"))
		.respond_with(ResponseTemplate::new(health_status))
		.mount(server)
		.await;
	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(200).set_body_string(label.to_string()))
		.mount(server)
		.await;
}

/// An address that refuses TCP connections.
pub async fn refused_addr() -> SocketAddr {
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);
	addr
}

pub async fn settle() {
	tokio::time::sleep(Duration::from_millis(300)).await;
}

#[allow(dead_code)]
pub fn status_of(resp: &Response<hyper::body::Incoming>) -> StatusCode {
	resp.status()
}
