//! Job broker for the withdrawal processor.
//!
//! Backends implement [`QueueInterface`]: a delayed, at-least-once job queue
//! per [`QueueName`]. [`QueueService`] layers the fixed retry policy on top
//! and reports each settlement as a [`JobOutcome`] for the engine to act on.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use withdrawal_types::{
	current_timestamp, ConfigSchema, ImplementationRegistry, Job, JobPayload, QueueName,
};

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// Error that occurs in the queue backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for queue backends.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Adds a job that becomes ready after `delay`.
	///
	/// Pushing a job id that is already known replaces it and clears its
	/// in-flight mark.
	async fn push(&self, job: Job, delay: Duration) -> Result<(), QueueError>;

	/// Takes the next ready job, marking it in flight.
	///
	/// A job is never handed to two consumers at the same time.
	async fn pop(&self, queue: QueueName) -> Result<Option<Job>, QueueError>;

	/// Removes a job for good.
	async fn ack(&self, queue: QueueName, job_id: &str) -> Result<(), QueueError>;

	/// Number of jobs waiting or delayed, excluding those in flight.
	async fn len(&self, queue: QueueName) -> Result<usize, QueueError>;

	/// Checks that the backend answers requests.
	async fn health_check(&self) -> Result<(), QueueError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for queue factory functions.
pub type QueueFactory = fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>;

/// Registry trait for queue implementations.
pub trait QueueRegistry: ImplementationRegistry<Factory = QueueFactory> {}

/// Get all registered queue implementations.
pub fn get_all_implementations() -> Vec<(&'static str, QueueFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// Retry policy for one queue.
///
/// Policies are fixed per queue and not read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, including the first.
	pub max_attempts: u32,
	/// Delay before the first retry. Doubles on every further retry.
	pub base_delay: Duration,
}

impl RetryPolicy {
	/// 5 attempts, backing off 10s, 20s, 40s, 80s.
	pub const fn withdrawals() -> Self {
		Self {
			max_attempts: 5,
			base_delay: Duration::from_secs(10),
		}
	}

	/// 3 attempts, backing off 5s, 10s.
	pub const fn raw_broadcasts() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_secs(5),
		}
	}

	pub const fn for_queue(queue: QueueName) -> Self {
		match queue {
			QueueName::Withdrawals => Self::withdrawals(),
			QueueName::RawBroadcasts => Self::raw_broadcasts(),
		}
	}

	/// Delay before redelivering a job that has failed `attempts_made + 1`
	/// times: `base_delay * 2^attempts_made`.
	pub fn delay_for(&self, attempts_made: u32) -> Duration {
		self.base_delay
			.saturating_mul(2u32.saturating_pow(attempts_made))
	}
}

/// Result of settling a job with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
	/// The job succeeded and was removed.
	Completed,
	/// The job failed and was scheduled again.
	Retry {
		delay: Duration,
		/// Failed attempts so far.
		attempts: u32,
	},
	/// The job failed its last allowed attempt and was removed.
	///
	/// Reported once per job; the job no longer exists afterwards.
	Exhausted { attempts: u32, error: String },
}

/// Queue service applying the retry policy to a backend.
pub struct QueueService {
	backend: Box<dyn QueueInterface>,
}

impl QueueService {
	pub fn new(backend: Box<dyn QueueInterface>) -> Self {
		Self { backend }
	}

	/// Creates and pushes a new job that is ready immediately.
	pub async fn enqueue(&self, queue: QueueName, payload: JobPayload) -> Result<Job, QueueError> {
		let job = Job {
			id: uuid::Uuid::new_v4().to_string(),
			queue,
			payload,
			attempts_made: 0,
			enqueued_at: current_timestamp(),
		};
		self.backend.push(job.clone(), Duration::ZERO).await?;

		tracing::debug!(queue = %queue, job_id = %job.id, db_id = %job.payload.db_id, "Enqueued job");
		Ok(job)
	}

	/// Takes the next ready job from `queue`.
	pub async fn dequeue(&self, queue: QueueName) -> Result<Option<Job>, QueueError> {
		self.backend.pop(queue).await
	}

	/// Records the result of one attempt.
	///
	/// Success removes the job. A failure schedules a retry while attempts
	/// remain under the queue's policy, and otherwise removes the job and
	/// reports exhaustion.
	pub async fn settle(
		&self,
		job: &Job,
		result: Result<(), String>,
	) -> Result<JobOutcome, QueueError> {
		let error = match result {
			Ok(()) => {
				self.backend.ack(job.queue, &job.id).await?;
				return Ok(JobOutcome::Completed);
			},
			Err(error) => error,
		};

		let policy = RetryPolicy::for_queue(job.queue);
		let attempts = job.attempts_made.saturating_add(1);

		if attempts < policy.max_attempts {
			let delay = policy.delay_for(job.attempts_made);
			let retry = Job {
				attempts_made: attempts,
				..job.clone()
			};
			self.backend.push(retry, delay).await?;

			tracing::warn!(
				queue = %job.queue,
				job_id = %job.id,
				attempt = attempts,
				retry_in_secs = delay.as_secs(),
				error = %error,
				"Job attempt failed, scheduling retry"
			);
			return Ok(JobOutcome::Retry { delay, attempts });
		}

		self.backend.ack(job.queue, &job.id).await?;
		tracing::error!(
			queue = %job.queue,
			job_id = %job.id,
			attempts,
			error = %error,
			"Job exhausted its retries"
		);
		Ok(JobOutcome::Exhausted { attempts, error })
	}

	pub async fn len(&self, queue: QueueName) -> Result<usize, QueueError> {
		self.backend.len(queue).await
	}

	pub async fn health_check(&self) -> Result<(), QueueError> {
		self.backend.health_check().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryQueue;

	fn service() -> QueueService {
		QueueService::new(Box::new(MemoryQueue::new()))
	}

	#[test]
	fn test_backoff_schedules() {
		let withdrawals = RetryPolicy::withdrawals();
		let delays: Vec<u64> = (0..4).map(|n| withdrawals.delay_for(n).as_secs()).collect();
		assert_eq!(delays, vec![10, 20, 40, 80]);

		let broadcasts = RetryPolicy::raw_broadcasts();
		let delays: Vec<u64> = (0..2).map(|n| broadcasts.delay_for(n).as_secs()).collect();
		assert_eq!(delays, vec![5, 10]);

		assert!(withdrawals.delay_for(u32::MAX) > withdrawals.delay_for(3));
	}

	#[tokio::test(start_paused = true)]
	async fn test_withdrawal_job_exhausts_after_five_attempts() {
		let queue = service();
		queue
			.enqueue(QueueName::Withdrawals, JobPayload::new("row-1"))
			.await
			.unwrap();

		let mut outcomes = Vec::new();
		loop {
			let Some(job) = queue.dequeue(QueueName::Withdrawals).await.unwrap() else {
				tokio::time::advance(Duration::from_secs(1)).await;
				continue;
			};
			let outcome = queue.settle(&job, Err("rpc down".into())).await.unwrap();
			let done = matches!(outcome, JobOutcome::Exhausted { .. });
			outcomes.push(outcome);
			if done {
				break;
			}
		}

		let retry_delays: Vec<u64> = outcomes
			.iter()
			.filter_map(|o| match o {
				JobOutcome::Retry { delay, .. } => Some(delay.as_secs()),
				_ => None,
			})
			.collect();
		assert_eq!(retry_delays, vec![10, 20, 40, 80]);
		assert_eq!(
			outcomes.last(),
			Some(&JobOutcome::Exhausted {
				attempts: 5,
				error: "rpc down".into()
			})
		);

		tokio::time::advance(Duration::from_secs(600)).await;
		assert!(queue.dequeue(QueueName::Withdrawals).await.unwrap().is_none());
		assert_eq!(queue.len(QueueName::Withdrawals).await.unwrap(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_raw_broadcast_job_exhausts_after_three_attempts() {
		let queue = service();
		let job = queue
			.enqueue(QueueName::RawBroadcasts, JobPayload::new("bc-1"))
			.await
			.unwrap();

		let first = queue.dequeue(QueueName::RawBroadcasts).await.unwrap().unwrap();
		assert_eq!(first.id, job.id);
		assert_eq!(
			queue.settle(&first, Err("x".into())).await.unwrap(),
			JobOutcome::Retry {
				delay: Duration::from_secs(5),
				attempts: 1
			}
		);

		tokio::time::advance(Duration::from_secs(5)).await;
		let second = queue.dequeue(QueueName::RawBroadcasts).await.unwrap().unwrap();
		assert_eq!(second.attempts_made, 1);
		assert_eq!(
			queue.settle(&second, Err("x".into())).await.unwrap(),
			JobOutcome::Retry {
				delay: Duration::from_secs(10),
				attempts: 2
			}
		);

		tokio::time::advance(Duration::from_secs(10)).await;
		let third = queue.dequeue(QueueName::RawBroadcasts).await.unwrap().unwrap();
		assert!(matches!(
			queue.settle(&third, Err("x".into())).await.unwrap(),
			JobOutcome::Exhausted { attempts: 3, .. }
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_retry_is_not_ready_before_its_delay() {
		let queue = service();
		queue
			.enqueue(QueueName::Withdrawals, JobPayload::new("row-1"))
			.await
			.unwrap();
		let job = queue.dequeue(QueueName::Withdrawals).await.unwrap().unwrap();
		queue.settle(&job, Err("x".into())).await.unwrap();

		tokio::time::advance(Duration::from_secs(9)).await;
		assert!(queue.dequeue(QueueName::Withdrawals).await.unwrap().is_none());
		assert_eq!(queue.len(QueueName::Withdrawals).await.unwrap(), 1);

		tokio::time::advance(Duration::from_secs(1)).await;
		assert!(queue.dequeue(QueueName::Withdrawals).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_success_removes_job() {
		let queue = service();
		queue
			.enqueue(QueueName::Withdrawals, JobPayload::new("row-1"))
			.await
			.unwrap();
		let job = queue.dequeue(QueueName::Withdrawals).await.unwrap().unwrap();
		assert!(job.is_first_attempt());

		assert_eq!(queue.settle(&job, Ok(())).await.unwrap(), JobOutcome::Completed);
		assert_eq!(queue.len(QueueName::Withdrawals).await.unwrap(), 0);
		assert!(queue.health_check().await.is_ok());
	}
}
