//! Alert payloads.

use crate::QueueName;
use serde::{Deserialize, Serialize};

/// Notification sent when a job exhausts its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAlert {
	/// Queue the job belonged to.
	pub queue: QueueName,
	/// Broker job identifier.
	pub job_id: String,
	/// Identifier of the stored entity the job referenced.
	pub db_id: String,
	/// Total attempts made, including the last one.
	pub attempts: u32,
	/// Error raised by the last attempt.
	pub error: String,
	/// Unix timestamp at which the alert was raised.
	pub occurred_at: u64,
}
