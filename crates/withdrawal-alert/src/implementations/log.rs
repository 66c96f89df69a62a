//! Alert sink that writes to the application log.

use crate::{AlertError, AlertInterface};
use async_trait::async_trait;
use withdrawal_types::{ConfigSchema, FailureAlert, ImplementationRegistry, Schema, ValidationError};

/// Logs each alert as a structured `error` event.
pub struct LogAlert;

#[async_trait]
impl AlertInterface for LogAlert {
	async fn send(&self, alert: &FailureAlert) -> Result<(), AlertError> {
		tracing::error!(
			queue = %alert.queue,
			job_id = %alert.job_id,
			db_id = %alert.db_id,
			attempts = alert.attempts,
			error = %alert.error,
			occurred_at = alert.occurred_at,
			"Job failed permanently"
		);
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogAlertSchema)
	}
}

/// Configuration schema for LogAlert.
pub struct LogAlertSchema;

impl ConfigSchema for LogAlertSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create the log sink. No configuration parameters.
pub fn create_alert(config: &toml::Value) -> Result<Box<dyn AlertInterface>, AlertError> {
	LogAlertSchema
		.validate(config)
		.map_err(|e| AlertError::Configuration(e.to_string()))?;
	Ok(Box::new(LogAlert))
}

/// Registry for the log alert implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = crate::AlertFactory;

	fn factory() -> Self::Factory {
		create_alert
	}
}

impl crate::AlertRegistry for Registry {}
