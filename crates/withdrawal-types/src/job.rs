//! Broker job types.
//!
//! Jobs are owned by the broker. They reference a persisted entity by id and
//! carry the number of attempts already made, but are never part of durable
//! domain state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Queues served by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
	/// Multi-sig withdrawal processing.
	Withdrawals,
	/// Raw signed transaction relay.
	RawBroadcasts,
}

impl QueueName {
	pub fn as_str(&self) -> &'static str {
		match self {
			QueueName::Withdrawals => "withdrawals",
			QueueName::RawBroadcasts => "raw_broadcasts",
		}
	}

	/// Returns an iterator over all queues.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Withdrawals, Self::RawBroadcasts].into_iter()
	}
}

impl fmt::Display for QueueName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for QueueName {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"withdrawals" => Ok(Self::Withdrawals),
			"raw_broadcasts" => Ok(Self::RawBroadcasts),
			_ => Err(()),
		}
	}
}

/// Payload carried by every job: a reference to one stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
	#[serde(rename = "dbId")]
	pub db_id: String,
}

impl JobPayload {
	pub fn new(db_id: impl Into<String>) -> Self {
		Self {
			db_id: db_id.into(),
		}
	}
}

/// A job as handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
	/// Broker-assigned identifier, stable across redeliveries.
	pub id: String,
	pub queue: QueueName,
	pub payload: JobPayload,
	/// Number of failed attempts before this delivery. Zero on first delivery.
	pub attempts_made: u32,
	/// Unix timestamp of the original enqueue.
	pub enqueued_at: u64,
}

impl Job {
	/// True when this delivery is the first attempt of the job.
	pub fn is_first_attempt(&self) -> bool {
		self.attempts_made == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_payload_wire_format() {
		let payload = JobPayload::new("abc");
		let json = serde_json::to_value(&payload).unwrap();
		assert_eq!(json, serde_json::json!({ "dbId": "abc" }));
	}

	#[test]
	fn test_queue_name_round_trip() {
		for queue in QueueName::all() {
			assert_eq!(queue.as_str().parse::<QueueName>(), Ok(queue));
		}
	}
}
