//! Alert sinks for terminal job failures.
//!
//! Alerts are best effort. [`AlertService::notify`] delivers to every
//! configured sink and logs sink failures instead of returning them, so an
//! unreachable alert channel never affects job processing.

use async_trait::async_trait;
use thiserror::Error;
use withdrawal_types::{truncate_id, ConfigSchema, FailureAlert, ImplementationRegistry};

/// Re-export implementations
pub mod implementations {
	pub mod log;
	pub mod webhook;
}

/// Errors that can occur while sending an alert.
#[derive(Debug, Error)]
pub enum AlertError {
	/// Error that occurs when the sink could not be reached or rejected the alert.
	#[error("Delivery error: {0}")]
	Delivery(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for alert sinks.
#[async_trait]
pub trait AlertInterface: Send + Sync {
	/// Sends one alert.
	async fn send(&self, alert: &FailureAlert) -> Result<(), AlertError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for alert factory functions.
pub type AlertFactory = fn(&toml::Value) -> Result<Box<dyn AlertInterface>, AlertError>;

/// Registry trait for alert implementations.
pub trait AlertRegistry: ImplementationRegistry<Factory = AlertFactory> {}

/// Get all registered alert implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AlertFactory)> {
	use implementations::{log, webhook};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(webhook::Registry::NAME, webhook::Registry::factory()),
	]
}

/// Fans alerts out to every configured sink.
pub struct AlertService {
	sinks: Vec<(String, Box<dyn AlertInterface>)>,
}

impl AlertService {
	/// Creates a service over named sinks.
	pub fn new(sinks: Vec<(String, Box<dyn AlertInterface>)>) -> Self {
		Self { sinks }
	}

	pub fn sink_count(&self) -> usize {
		self.sinks.len()
	}

	/// Sends `alert` to every sink concurrently.
	///
	/// Never fails. Sink errors are logged at warn level.
	pub async fn notify(&self, alert: &FailureAlert) {
		let deliveries = self.sinks.iter().map(|(name, sink)| async move {
			if let Err(e) = sink.send(alert).await {
				tracing::warn!(
					sink = %name,
					job_id = %truncate_id(&alert.job_id),
					error = %e,
					"Failed to deliver alert"
				);
			}
		});
		futures::future::join_all(deliveries).await;
	}
}
