//! Withdrawal engine that drives queued jobs through the processors.
//!
//! The engine owns a single dispatch loop. It polls the broker for ready
//! jobs and runs each one on a worker bounded by a semaphore. The worker
//! settles its result with the broker and acts on the typed outcome, so
//! exhausted jobs reach the matching processor's failure handler without
//! holding up the loop.

pub mod lifecycle;

use crate::handlers::{
	BroadcastProcessor, IntakeHandler, ProcessingError, WithdrawalProcessor,
};
use crate::lock::RequestLocks;
use crate::state::{BroadcastStateMachine, WithdrawalStateMachine};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::MissedTickBehavior;
use withdrawal_alert::AlertService;
use withdrawal_config::Config;
use withdrawal_delivery::DeliveryService;
use withdrawal_queue::{JobOutcome, QueueService};
use withdrawal_storage::StorageService;
use withdrawal_types::{truncate_id, Job, QueueName};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Handler error: {0}")]
	Handler(String),
}

/// Settled outcome of one worker, sent back to the dispatch loop.
type WorkerResult = (Job, Result<JobOutcome, EngineError>);

fn report(job: &Job, settled: Result<JobOutcome, EngineError>) {
	match settled {
		Ok(outcome) => {
			tracing::debug!(job_id = %truncate_id(&job.id), outcome = ?outcome, "Job settled")
		},
		Err(e) => {
			tracing::error!(job_id = %truncate_id(&job.id), error = %e, "Failed to settle job")
		},
	}
}

/// Main engine coordinating intake, processing and settlement.
#[derive(Clone)]
pub struct WithdrawalEngine {
	/// Service configuration.
	pub(crate) config: Config,
	/// Request store.
	pub(crate) storage: Arc<StorageService>,
	/// Chain client.
	pub(crate) delivery: Arc<DeliveryService>,
	/// Job broker.
	pub(crate) queue: Arc<QueueService>,
	/// Alert sinks.
	pub(crate) alerts: Arc<AlertService>,
	/// Intake, cancel and read operations.
	pub(crate) intake: Arc<IntakeHandler>,
	pub(crate) withdrawal_processor: Arc<WithdrawalProcessor>,
	pub(crate) broadcast_processor: Arc<BroadcastProcessor>,
	/// Per-request exclusivity, when enabled.
	pub(crate) request_locks: Option<Arc<RequestLocks>>,
	/// Bounds the number of jobs in flight.
	pub(crate) workers: Arc<Semaphore>,
	/// Flips to true when the engine should stop.
	pub(crate) stop: Arc<watch::Sender<bool>>,
}

impl WithdrawalEngine {
	/// Creates a new engine over already constructed services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		delivery: Arc<DeliveryService>,
		queue: Arc<QueueService>,
		alerts: Arc<AlertService>,
	) -> Self {
		let withdrawal_state = Arc::new(WithdrawalStateMachine::new(storage.clone()));
		let broadcast_state = Arc::new(BroadcastStateMachine::new(storage.clone()));

		let intake = Arc::new(IntakeHandler::new(
			storage.clone(),
			queue.clone(),
			withdrawal_state.clone(),
		));

		let withdrawal_processor = Arc::new(WithdrawalProcessor::new(
			delivery.clone(),
			alerts.clone(),
			withdrawal_state,
		));

		let broadcast_processor = Arc::new(BroadcastProcessor::new(
			storage.clone(),
			delivery.clone(),
			alerts.clone(),
			broadcast_state,
		));

		let request_locks = config
			.engine
			.exclusive_processing
			.then(|| Arc::new(RequestLocks::new()));
		let workers = Arc::new(Semaphore::new(config.engine.max_concurrent_jobs));
		let (stop, _) = watch::channel(false);

		Self {
			config,
			storage,
			delivery,
			queue,
			alerts,
			intake,
			withdrawal_processor,
			broadcast_processor,
			request_locks,
			workers,
			stop: Arc::new(stop),
		}
	}

	/// Main dispatch loop.
	///
	/// Runs until Ctrl-C or [`WithdrawalEngine::shutdown`], then drains the
	/// workers still running for up to the configured grace period.
	pub async fn run(&self) -> Result<(), EngineError> {
		let (result_tx, mut result_rx) = mpsc::unbounded_channel::<WorkerResult>();
		let mut stop = self.stop.subscribe();

		let mut poll = tokio::time::interval(Duration::from_millis(
			self.config.engine.poll_interval_ms,
		));
		poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

		tracing::info!(
			max_concurrent_jobs = self.config.engine.max_concurrent_jobs,
			exclusive_processing = self.request_locks.is_some(),
			"Engine started"
		);

		while !*stop.borrow() {
			tokio::select! {
				_ = poll.tick() => {
					self.dispatch_ready(&result_tx).await;
				}

				Some((job, settled)) = result_rx.recv() => {
					report(&job, settled);
				}

				_ = stop.changed() => {}

				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
					break;
				}
			}
		}

		self.stop.send_replace(true);
		drop(result_tx);
		self.drain(&mut result_rx).await;
		Ok(())
	}

	/// Waits for the workers still running, until they are all done or the
	/// grace period runs out.
	async fn drain(&self, results: &mut mpsc::UnboundedReceiver<WorkerResult>) {
		let grace = tokio::time::sleep(self.shutdown_grace());
		tokio::pin!(grace);

		loop {
			tokio::select! {
				received = results.recv() => match received {
					Some((job, settled)) => report(&job, settled),
					None => break,
				},
				_ = &mut grace => {
					tracing::warn!(
						running = self.running_jobs(),
						"Shutdown grace period elapsed with jobs still running"
					);
					break;
				}
			}
		}
	}

	/// Starts a worker for every ready job while permits are available.
	async fn dispatch_ready(&self, results: &mpsc::UnboundedSender<WorkerResult>) {
		for queue in QueueName::all() {
			loop {
				let Ok(permit) = self.workers.clone().try_acquire_owned() else {
					return;
				};

				let job = match self.queue.dequeue(queue).await {
					Ok(Some(job)) => job,
					Ok(None) => break,
					Err(e) => {
						tracing::warn!(queue = %queue, error = %e, "Failed to dequeue");
						break;
					},
				};

				let engine = self.clone();
				let results = results.clone();
				tokio::spawn(async move {
					let _permit = permit;
					let result = engine.run_isolated(&job).await;
					let settled = engine.settle(&job, result).await;
					results.send((job, settled)).ok();
				});
			}
		}
	}

	/// Processes a job on its own task so a panic becomes a failed attempt.
	async fn run_isolated(&self, job: &Job) -> Result<(), String> {
		let engine = self.clone();
		let task_job = job.clone();
		match tokio::spawn(async move { engine.process(&task_job).await }).await {
			Ok(result) => result.map_err(|e| e.to_string()),
			Err(e) => {
				tracing::error!(job_id = %truncate_id(&job.id), error = %e, "Worker panicked");
				Err(format!("Worker panicked: {}", e))
			},
		}
	}

	/// Runs one delivery of `job`, holding the request's lock when enabled.
	async fn process(&self, job: &Job) -> Result<(), ProcessingError> {
		let key = format!("{}:{}", job.queue, job.payload.db_id);
		let _guard = match &self.request_locks {
			Some(locks) => Some(locks.acquire(&key).await),
			None => None,
		};

		match job.queue {
			QueueName::Withdrawals => self.withdrawal_processor.process(job).await,
			QueueName::RawBroadcasts => self.broadcast_processor.process(job).await,
		}
	}

	/// Settles a result with the broker and runs the failure handler when the
	/// job is exhausted.
	async fn settle(&self, job: &Job, result: Result<(), String>) -> Result<JobOutcome, EngineError> {
		let outcome = self
			.queue
			.settle(job, result)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		if let JobOutcome::Exhausted { attempts, error } = &outcome {
			let handled = match job.queue {
				QueueName::Withdrawals => {
					self.withdrawal_processor
						.handle_exhausted(job, *attempts, error)
						.await
				},
				QueueName::RawBroadcasts => {
					self.broadcast_processor
						.handle_exhausted(job, *attempts, error)
						.await
				},
			};
			handled.map_err(|e| EngineError::Handler(e.to_string()))?;
		}

		Ok(outcome)
	}

	/// Runs one job through processing and settlement inline.
	pub async fn execute(&self, job: Job) -> Result<JobOutcome, EngineError> {
		let result = self.process(&job).await.map_err(|e| e.to_string());
		self.settle(&job, result).await
	}

	/// Dequeues and executes the next ready job of `queue`, if any.
	pub async fn execute_next(&self, queue: QueueName) -> Result<Option<JobOutcome>, EngineError> {
		let job = self
			.queue
			.dequeue(queue)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		match job {
			Some(job) => self.execute(job).await.map(Some),
			None => Ok(None),
		}
	}

	/// Number of workers currently running.
	pub fn running_jobs(&self) -> usize {
		self.config
			.engine
			.max_concurrent_jobs
			.saturating_sub(self.workers.available_permits())
	}

	fn shutdown_grace(&self) -> Duration {
		Duration::from_secs(self.config.engine.shutdown_grace_seconds)
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn delivery(&self) -> &Arc<DeliveryService> {
		&self.delivery
	}

	pub fn queue(&self) -> &Arc<QueueService> {
		&self.queue
	}

	pub fn alerts(&self) -> &Arc<AlertService> {
		&self.alerts
	}

	/// Returns the handler for intake, cancel and read operations.
	pub fn intake(&self) -> &Arc<IntakeHandler> {
		&self.intake
	}
}
