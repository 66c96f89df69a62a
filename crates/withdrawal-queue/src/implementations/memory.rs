//! In-memory queue backend.
//!
//! Jobs are ordered by ready time with `priority-queue`. Jobs that share a
//! ready time come out in push order. Nothing survives a restart.

use crate::{QueueError, QueueInterface};
use async_trait::async_trait;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use withdrawal_types::{
	ConfigSchema, ImplementationRegistry, Job, QueueName, Schema, ValidationError,
};

/// Ready time plus a push sequence number, reversed so the earliest pops first.
type ReadyAt = Reverse<(Instant, u64)>;

#[derive(Default)]
struct QueueState {
	/// Job ids waiting for their ready time.
	waiting: PriorityQueue<String, ReadyAt>,
	/// Every job the queue still owns. Those missing from `waiting` are in
	/// flight.
	jobs: HashMap<String, Job>,
}

/// In-memory queue implementation.
pub struct MemoryQueue {
	state: Mutex<HashMap<QueueName, QueueState>>,
	sequence: Mutex<u64>,
}

impl MemoryQueue {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(HashMap::new()),
			sequence: Mutex::new(0),
		}
	}

	async fn next_sequence(&self) -> u64 {
		let mut sequence = self.sequence.lock().await;
		*sequence += 1;
		*sequence
	}
}

impl Default for MemoryQueue {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn push(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
		let ready_at = Instant::now() + delay;
		let sequence = self.next_sequence().await;

		let mut state = self.state.lock().await;
		let queue = state.entry(job.queue).or_default();
		queue
			.waiting
			.push(job.id.clone(), Reverse((ready_at, sequence)));
		queue.jobs.insert(job.id.clone(), job);
		Ok(())
	}

	async fn pop(&self, queue: QueueName) -> Result<Option<Job>, QueueError> {
		let mut state = self.state.lock().await;
		let Some(queue) = state.get_mut(&queue) else {
			return Ok(None);
		};

		let now = Instant::now();
		match queue.waiting.peek() {
			Some((_, Reverse((ready_at, _)))) if *ready_at <= now => {},
			_ => return Ok(None),
		}

		let Some((job_id, _)) = queue.waiting.pop() else {
			return Ok(None);
		};
		let job = queue
			.jobs
			.get(&job_id)
			.cloned()
			.ok_or_else(|| QueueError::Backend(format!("Job {} has no record", job_id)))?;
		Ok(Some(job))
	}

	async fn ack(&self, queue: QueueName, job_id: &str) -> Result<(), QueueError> {
		let mut state = self.state.lock().await;
		if let Some(queue) = state.get_mut(&queue) {
			queue.waiting.remove(job_id);
			queue.jobs.remove(job_id);
		}
		Ok(())
	}

	async fn len(&self, queue: QueueName) -> Result<usize, QueueError> {
		let state = self.state.lock().await;
		Ok(state.get(&queue).map(|q| q.waiting.len()).unwrap_or(0))
	}

	async fn health_check(&self) -> Result<(), QueueError> {
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryQueueSchema)
	}
}

/// Configuration schema for MemoryQueue.
pub struct MemoryQueueSchema;

impl ConfigSchema for MemoryQueueSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory queue from configuration.
///
/// No configuration parameters.
pub fn create_queue(config: &toml::Value) -> Result<Box<dyn QueueInterface>, QueueError> {
	MemoryQueueSchema
		.validate(config)
		.map_err(|e| QueueError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryQueue::new()))
}

/// Registry for the memory queue implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::QueueFactory;

	fn factory() -> Self::Factory {
		create_queue
	}
}

impl crate::QueueRegistry for Registry {}
