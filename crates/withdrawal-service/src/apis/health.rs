//! Health endpoint.
//!
//! Reports the reachability of the request store and the job broker along
//! with the depth of every queue. The service is healthy only when both
//! components are reachable.

use serde::Serialize;
use std::collections::BTreeMap;
use withdrawal_core::WithdrawalEngine;
use withdrawal_types::QueueName;

/// Reachability of one component.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
	pub healthy: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl ComponentHealth {
	fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
		match result {
			Ok(()) => Self {
				healthy: true,
				error: None,
			},
			Err(e) => Self {
				healthy: false,
				error: Some(e.to_string()),
			},
		}
	}
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	/// `"ok"` or `"degraded"`.
	pub status: String,
	pub service_id: String,
	pub storage: ComponentHealth,
	pub queue: ComponentHealth,
	/// Jobs waiting per queue. Queues whose depth could not be read are omitted.
	pub queue_depths: BTreeMap<String, usize>,
	pub running_jobs: usize,
}

impl HealthResponse {
	pub fn is_healthy(&self) -> bool {
		self.storage.healthy && self.queue.healthy
	}
}

pub async fn check(engine: &WithdrawalEngine) -> HealthResponse {
	let storage = ComponentHealth::from_result(engine.storage().health_check().await);
	let queue = ComponentHealth::from_result(engine.queue().health_check().await);

	let mut queue_depths = BTreeMap::new();
	for name in QueueName::all() {
		match engine.queue().len(name).await {
			Ok(depth) => {
				queue_depths.insert(name.to_string(), depth);
			},
			Err(e) => {
				tracing::warn!(queue = %name, error = %e, "Failed to read queue depth");
			},
		}
	}

	let mut response = HealthResponse {
		status: String::new(),
		service_id: engine.config().service.id.clone(),
		storage,
		queue,
		queue_depths,
		running_jobs: engine.running_jobs(),
	};
	response.status = if response.is_healthy() {
		"ok".to_string()
	} else {
		tracing::warn!(
			storage = response.storage.healthy,
			queue = response.queue.healthy,
			"Health check failed"
		);
		"degraded".to_string()
	};
	response
}
