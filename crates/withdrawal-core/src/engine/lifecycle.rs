//! Lifecycle management for the withdrawal engine.
//!
//! Handles the checks run before the dispatch loop starts and the graceful
//! stop that lets in-flight jobs finish.

use super::{EngineError, WithdrawalEngine};

impl WithdrawalEngine {
	/// Performs any initialization required before running
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(service_id = %self.config.service.id, "Initializing withdrawal engine");

		self.storage
			.health_check()
			.await
			.map_err(|e| EngineError::Service(format!("Storage is not reachable: {}", e)))?;
		self.queue
			.health_check()
			.await
			.map_err(|e| EngineError::Service(format!("Queue is not reachable: {}", e)))?;

		if self.alerts.sink_count() == 0 {
			return Err(EngineError::Config("No alert sink configured".into()));
		}
		Ok(())
	}

	/// Stops polling and waits for in-flight jobs.
	///
	/// Waits at most `engine.shutdown_grace_seconds` by re-acquiring every
	/// worker permit. Jobs still running after that are logged and left to
	/// the broker's redelivery.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down withdrawal engine");
		self.stop.send_replace(true);

		let permits = u32::try_from(self.config.engine.max_concurrent_jobs)
			.map_err(|e| EngineError::Config(e.to_string()))?;
		match tokio::time::timeout(self.shutdown_grace(), self.workers.acquire_many(permits)).await {
			Ok(Ok(_all)) => {
				tracing::info!("All jobs finished");
			},
			Ok(Err(e)) => {
				return Err(EngineError::Service(format!("Worker pool closed: {}", e)));
			},
			Err(_) => {
				tracing::warn!(
					running = self.running_jobs(),
					"Jobs still running after the shutdown grace period"
				);
			},
		}
		Ok(())
	}
}
