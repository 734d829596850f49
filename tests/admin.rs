mod common;

use common::{assert_json_error, backend_server, read_body, test_app};
use http::Method;

const CLIENTS: &str = "/v1/api/clients/";

#[tokio::test]
async fn create_then_list_round_trip() {
	let live = backend_server("b", 200).await;
	let app = test_app().backend(live.address()).spawn().await;

	let resp = app
		.request(
			Method::POST,
			CLIENTS,
			Some(r#"{"ip_address":"10.1.2.3","capacity":50,"rate_per_second":5,"name":"edge"}"#),
		)
		.await;
	assert_eq!(resp.status(), 201);
	let created: serde_json::Value = serde_json::from_str(&read_body(resp).await).unwrap();
	assert_eq!(created["ip_address"], "10.1.2.3");
	assert!(created["id"].is_i64());

	let resp = app.get(CLIENTS).await;
	assert_eq!(resp.status(), 200);
	let list: serde_json::Value = serde_json::from_str(&read_body(resp).await).unwrap();
	let list = list.as_array().unwrap();
	assert_eq!(list.len(), 1);
	assert_eq!(list[0]["name"], "edge");
	assert_eq!(list[0]["capacity"], 50);
	// Live token state never leaks through the admin surface.
	assert!(list[0].get("tokens").is_none());
}

#[tokio::test]
async fn duplicate_create_conflicts() {
	let live = backend_server("b", 200).await;
	let app = test_app()
		.backend(live.address())
		.client("10.1.2.3", 10, 1)
		.spawn()
		.await;

	let resp = app
		.request(
			Method::POST,
			CLIENTS,
			Some(r#"{"ip_address":"10.1.2.3","capacity":50,"rate_per_second":5}"#),
		)
		.await;
	assert_json_error(resp, 409).await;
}

#[tokio::test]
async fn malformed_bodies_are_rejected() {
	let live = backend_server("b", 200).await;
	let app = test_app().backend(live.address()).spawn().await;

	let resp = app.request(Method::POST, CLIENTS, Some("{not json")).await;
	assert_json_error(resp, 400).await;

	let resp = app
		.request(
			Method::POST,
			CLIENTS,
			Some(r#"{"ip_address":"not-an-ip","capacity":1,"rate_per_second":1}"#),
		)
		.await;
	assert_json_error(resp, 400).await;

	let resp = app
		.request(
			Method::POST,
			CLIENTS,
			Some(r#"{"ip_address":"10.0.0.1","capacity":-2,"rate_per_second":1}"#),
		)
		.await;
	assert_json_error(resp, 400).await;
}

#[tokio::test]
async fn update_and_delete_unknown_clients_are_not_found() {
	let live = backend_server("b", 200).await;
	let app = test_app().backend(live.address()).spawn().await;

	let resp = app
		.request(
			Method::PUT,
			"/v1/api/clients/10.9.9.9",
			Some(r#"{"capacity":5,"rate_per_second":1}"#),
		)
		.await;
	assert_json_error(resp, 404).await;

	let resp = app
		.request(Method::DELETE, "/v1/api/clients/10.9.9.9", None)
		.await;
	assert_json_error(resp, 404).await;
}

#[tokio::test]
async fn update_persists_new_limits() {
	let live = backend_server("b", 200).await;
	let app = test_app()
		.backend(live.address())
		.client("10.1.2.3", 10, 1)
		.spawn()
		.await;

	let resp = app
		.request(
			Method::PUT,
			"/v1/api/clients/10.1.2.3",
			Some(r#"{"capacity":77,"rate_per_second":7}"#),
		)
		.await;
	assert_eq!(resp.status(), 200);

	let resp = app.get(CLIENTS).await;
	let list: serde_json::Value = serde_json::from_str(&read_body(resp).await).unwrap();
	assert_eq!(list[0]["capacity"], 77);
	assert_eq!(list[0]["rate_per_second"], 7);
}

#[tokio::test]
async fn delete_then_recreate_starts_a_fresh_bucket() {
	let live = backend_server("b", 200).await;
	let app = test_app()
		.backend(live.address())
		.client("127.0.0.1", 2, 0)
		.spawn()
		.await;

	// Exhaust the bucket.
	assert_eq!(app.get("/anything").await.status(), 200);
	assert_eq!(app.get("/anything").await.status(), 200);
	assert_eq!(app.get("/anything").await.status(), 429);

	let resp = app
		.request(Method::DELETE, "/v1/api/clients/127.0.0.1", None)
		.await;
	assert_eq!(resp.status(), 204);

	let resp = app
		.request(
			Method::POST,
			CLIENTS,
			Some(r#"{"ip_address":"127.0.0.1","capacity":2,"rate_per_second":0}"#),
		)
		.await;
	assert_eq!(resp.status(), 201);

	// The recreated client has a full bucket again.
	assert_eq!(app.get("/anything").await.status(), 200);
}
