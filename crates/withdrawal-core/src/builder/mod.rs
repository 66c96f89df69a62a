//! Builder for constructing withdrawal engines.
//!
//! Composes a WithdrawalEngine from the backend implementations named in the
//! configuration, using factory functions looked up by name. Storage,
//! delivery and queue use their configured primary; every configured alert
//! sink is loaded.

use crate::engine::WithdrawalEngine;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use withdrawal_alert::{AlertError, AlertInterface, AlertService};
use withdrawal_config::Config;
use withdrawal_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use withdrawal_queue::{QueueError, QueueInterface, QueueService};
use withdrawal_storage::{StorageError, StorageInterface, StorageService};
use withdrawal_types::NetworkConfig;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a WithdrawalEngine.
///
/// Each map goes from implementation name, as used in the configuration, to
/// the factory building it.
pub struct WithdrawalFactories<SF, DF, QF, AF> {
	pub storage_factories: HashMap<String, SF>,
	pub delivery_factories: HashMap<String, DF>,
	pub queue_factories: HashMap<String, QF>,
	pub alert_factories: HashMap<String, AF>,
}

/// Builder for constructing a WithdrawalEngine with pluggable implementations.
pub struct WithdrawalBuilder {
	config: Config,
}

impl WithdrawalBuilder {
	/// Creates a new WithdrawalBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the WithdrawalEngine using factories for each component type.
	pub fn build<SF, DF, QF, AF>(
		self,
		factories: WithdrawalFactories<SF, DF, QF, AF>,
	) -> Result<WithdrawalEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		DF: Fn(&toml::Value, &NetworkConfig) -> Result<Box<dyn DeliveryInterface>, DeliveryError>,
		QF: Fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AlertInterface>, AlertError>,
	{
		let storage_backend = build_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
			|factory, config| factory(config),
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// The network is resolved once here and never re-read.
		let network = self
			.config
			.active_network()
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		tracing::info!(
			component = "network",
			network = %self.config.network.active,
			chain_id = network.chain_id,
			"Selected"
		);
		let chain = build_primary(
			"delivery",
			&self.config.delivery.primary,
			&self.config.delivery.implementations,
			&factories.delivery_factories,
			|factory, config| factory(config, network),
		)?;
		let delivery = Arc::new(DeliveryService::new(
			chain,
			self.config.delivery.confirmations,
		));

		let queue_backend = build_primary(
			"queue",
			&self.config.queue.primary,
			&self.config.queue.implementations,
			&factories.queue_factories,
			|factory, config| factory(config),
		)?;
		let queue = Arc::new(QueueService::new(queue_backend));

		let mut sinks = Vec::new();
		for (name, config) in &self.config.alert.implementations {
			let factory = factories.alert_factories.get(name).ok_or_else(|| {
				BuilderError::MissingComponent(format!("Unknown alert implementation '{}'", name))
			})?;
			match factory(config) {
				Ok(sink) => {
					tracing::info!(component = "alert", implementation = %name, "Loaded");
					sinks.push((name.clone(), sink));
				},
				Err(e) => {
					tracing::error!(
						component = "alert",
						implementation = %name,
						error = %e,
						"Failed to create alert implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create alert implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		if sinks.is_empty() {
			return Err(BuilderError::Config(
				"No alert implementations available".to_string(),
			));
		}
		let alerts = Arc::new(AlertService::new(sinks));

		Ok(WithdrawalEngine::new(
			self.config,
			storage,
			delivery,
			queue,
			alerts,
		))
	}
}

/// Builds the primary implementation of one component.
///
/// The primary must be both configured and registered.
fn build_primary<F, T, E>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
	create: impl Fn(&F, &toml::Value) -> Result<T, E>,
) -> Result<T, BuilderError>
where
	E: Display,
{
	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' has no configuration",
			component, primary
		))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"Unknown {} implementation '{}'",
			component, primary
		))
	})?;

	match create(factory, config) {
		Ok(implementation) => {
			tracing::info!(component = %component, implementation = %primary, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component = %component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}
