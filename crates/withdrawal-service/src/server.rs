//! HTTP server for the withdrawal API.
//!
//! Routes are nested under `/api` and delegate to the engine's intake
//! handler. Request timeout and body size come from the `[api]` section.

use crate::apis;
use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Json},
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use withdrawal_config::ApiConfig;
use withdrawal_core::WithdrawalEngine;
use withdrawal_types::{
	APIError, NewRawBroadcast, NewWithdrawal, RawTransactionBroadcast, WithdrawalRequest,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<WithdrawalEngine>,
}

/// Builds the API router with its middleware stack.
#[allow(deprecated)]
pub fn router(api_config: &ApiConfig, engine: Arc<WithdrawalEngine>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route(
					"/withdrawals",
					post(handle_submit_withdrawal).get(handle_list_withdrawals),
				)
				.route("/withdrawals/{id}", get(handle_get_withdrawal))
				.route("/withdrawals/{id}/cancel", post(handle_cancel_withdrawal))
				.route("/broadcasts", post(handle_submit_broadcast))
				.route("/broadcasts/{id}", get(handle_get_broadcast))
				.route("/health", get(handle_health)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(RequestBodyLimitLayer::new(api_config.max_request_size))
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(CorsLayer::permissive()),
		)
		.with_state(AppState { engine })
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<WithdrawalEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Withdrawal API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles POST /api/withdrawals requests.
async fn handle_submit_withdrawal(
	State(state): State<AppState>,
	Json(new): Json<NewWithdrawal>,
) -> Result<impl IntoResponse, APIError> {
	let request = apis::withdrawal::submit(&state.engine, new).await?;
	Ok((StatusCode::CREATED, Json(request)))
}

/// Handles GET /api/withdrawals requests.
async fn handle_list_withdrawals(
	State(state): State<AppState>,
	Query(query): Query<apis::withdrawal::ListQuery>,
) -> Result<Json<Vec<WithdrawalRequest>>, APIError> {
	apis::withdrawal::list(&state.engine, query).await.map(Json)
}

/// Handles GET /api/withdrawals/{id} requests.
async fn handle_get_withdrawal(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<WithdrawalRequest>, APIError> {
	apis::withdrawal::get(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/withdrawals/{id}/cancel requests.
async fn handle_cancel_withdrawal(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<WithdrawalRequest>, APIError> {
	apis::withdrawal::cancel(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/broadcasts requests.
async fn handle_submit_broadcast(
	State(state): State<AppState>,
	Json(new): Json<NewRawBroadcast>,
) -> Result<impl IntoResponse, APIError> {
	let broadcast = apis::broadcast::submit(&state.engine, new).await?;
	Ok((StatusCode::CREATED, Json(broadcast)))
}

/// Handles GET /api/broadcasts/{id} requests.
async fn handle_get_broadcast(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<RawTransactionBroadcast>, APIError> {
	apis::broadcast::get(&state.engine, &id).await.map(Json)
}

/// Handles GET /api/health requests.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
	let health = apis::health::check(&state.engine).await;
	let status = if health.is_healthy() {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};
	(status, Json(health))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::factory_registry::build_engine_from_config;
	use axum::body::{to_bytes, Body};
	use axum::http::{
		header::{CONTENT_LENGTH, CONTENT_TYPE},
		Method, Request,
	};
	use serde_json::{json, Value};
	use tower::ServiceExt;
	use withdrawal_config::ConfigBuilder;

	fn test_app() -> Router {
		app_with(ApiConfig::default())
	}

	fn app_with(api_config: ApiConfig) -> Router {
		let config = ConfigBuilder::new().build();
		let engine = build_engine_from_config(config).unwrap();
		router(&api_config, Arc::new(engine))
	}

	async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let mut request = Request::builder().method(method).uri(uri);
		let body = match body {
			Some(value) => {
				request = request.header(CONTENT_TYPE, "application/json");
				Body::from(value.to_string())
			},
			None => Body::empty(),
		};
		let response = app
			.clone()
			.oneshot(request.body(body).unwrap())
			.await
			.unwrap();

		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
		(status, value)
	}

	fn withdrawal_body(request_id: &str) -> Value {
		json!({
			"requestId": request_id,
			"treasuryAddress": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
			"destinationAddress": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
			"tokenAddress": "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
			"amount": "1500.00",
			"signedPayload": "0xdeadbeef"
		})
	}

	#[tokio::test]
	async fn test_submit_and_fetch_withdrawal() {
		let app = test_app();

		let (status, created) = send(
			&app,
			Method::POST,
			"/api/withdrawals",
			Some(withdrawal_body("bank-100")),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(created["status"], "PENDING_SIGNATURE");
		assert_eq!(created["history"].as_array().unwrap().len(), 1);
		assert_eq!(created["history"][0]["id"], 1);

		let id = created["id"].as_str().unwrap();
		let (status, fetched) = send(&app, Method::GET, &format!("/api/withdrawals/{}", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(fetched["requestId"], "bank-100");
	}

	#[tokio::test]
	async fn test_duplicate_and_invalid_submissions() {
		let app = test_app();

		let (status, _) = send(&app, Method::POST, "/api/withdrawals", Some(withdrawal_body("bank-101"))).await;
		assert_eq!(status, StatusCode::CREATED);

		let (status, body) = send(&app, Method::POST, "/api/withdrawals", Some(withdrawal_body("bank-101"))).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["error"], "DUPLICATE_REQUEST");

		let mut invalid = withdrawal_body("bank-102");
		invalid["amount"] = json!("-5");
		let (status, body) = send(&app, Method::POST, "/api/withdrawals", Some(invalid)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");
	}

	#[tokio::test]
	async fn test_cancel_flow() {
		let app = test_app();

		let (_, created) = send(&app, Method::POST, "/api/withdrawals", Some(withdrawal_body("bank-103"))).await;
		let id = created["id"].as_str().unwrap().to_string();
		let cancel_uri = format!("/api/withdrawals/{}/cancel", id);

		let (status, cancelled) = send(&app, Method::POST, &cancel_uri, None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(cancelled["status"], "CANCELLED");

		let (status, body) = send(&app, Method::POST, &cancel_uri, None).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["error"], "INVALID_STATUS");

		let (status, _) = send(&app, Method::POST, "/api/withdrawals/unknown/cancel", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		let (status, listed) = send(&app, Method::GET, "/api/withdrawals?status=CANCELLED", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(listed.as_array().unwrap().len(), 1);

		let (status, _) = send(&app, Method::GET, "/api/withdrawals?status=NOPE", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_raw_broadcast_endpoints() {
		let app = test_app();

		let (status, created) = send(
			&app,
			Method::POST,
			"/api/broadcasts",
			Some(json!({ "clientId": "client-9", "rawTransaction": "0x02f86b01" })),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(created["status"], "PENDING");

		let id = created["id"].as_str().unwrap();
		let (status, fetched) = send(&app, Method::GET, &format!("/api/broadcasts/{}", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(fetched["clientId"], "client-9");

		let (status, _) = send(
			&app,
			Method::POST,
			"/api/broadcasts",
			Some(json!({ "rawTransaction": "not-hex" })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);

		let (status, _) = send(&app, Method::GET, "/api/broadcasts/missing", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_health_reports_queue_depths() {
		let app = test_app();
		send(&app, Method::POST, "/api/withdrawals", Some(withdrawal_body("bank-104"))).await;

		let (status, health) = send(&app, Method::GET, "/api/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(health["status"], "ok");
		assert_eq!(health["storage"]["healthy"], true);
		assert_eq!(health["queueDepths"]["withdrawals"], 1);
		assert_eq!(health["queueDepths"]["raw_broadcasts"], 0);
	}

	#[tokio::test]
	async fn test_oversized_body_is_rejected() {
		let app = app_with(ApiConfig {
			max_request_size: 64,
			..ApiConfig::default()
		});

		let body = withdrawal_body("bank-105").to_string();
		assert!(body.len() > 64);
		let request = Request::builder()
			.method(Method::POST)
			.uri("/api/withdrawals")
			.header(CONTENT_TYPE, "application/json")
			.header(CONTENT_LENGTH, body.len())
			.body(Body::from(body))
			.unwrap();
		let response = app.oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
	}

	#[tokio::test]
	#[tracing_test::traced_test]
	async fn test_accept_and_cancel_are_logged_once() {
		let app = test_app();

		let (_, created) = send(&app, Method::POST, "/api/withdrawals", Some(withdrawal_body("bank-106"))).await;
		let id = created["id"].as_str().unwrap().to_string();
		let (status, _) = send(&app, Method::POST, &format!("/api/withdrawals/{}/cancel", id), None).await;
		assert_eq!(status, StatusCode::OK);

		logs_assert(|lines: &[&str]| {
			let count = |message: &str| lines.iter().filter(|line| line.contains(message)).count();
			match (count("Withdrawal accepted"), count("Withdrawal cancelled")) {
				(1, 1) => Ok(()),
				counts => Err(format!("expected each event once, got {:?}", counts)),
			}
		});
	}
}
