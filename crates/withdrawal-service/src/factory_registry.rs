//! Dynamic factory registry for backend implementations.
//!
//! Every backend crate exposes its implementations through
//! `get_all_implementations()`. They are collected once into a global
//! registry, and the engine is built from the subset named in the
//! configuration.

use std::collections::HashMap;
use std::sync::OnceLock;
use withdrawal_alert::AlertFactory;
use withdrawal_config::Config;
use withdrawal_core::{WithdrawalBuilder, WithdrawalEngine, WithdrawalFactories};
use withdrawal_delivery::DeliveryFactory;
use withdrawal_queue::QueueFactory;
use withdrawal_storage::StorageFactory;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub delivery: HashMap<String, DeliveryFactory>,
	pub queue: HashMap<String, QueueFactory>,
	pub alert: HashMap<String, AlertFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			delivery: HashMap::new(),
			queue: HashMap::new(),
			alert: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_delivery(&mut self, name: impl Into<String>, factory: DeliveryFactory) {
		self.delivery.insert(name.into(), factory);
	}

	pub fn register_queue(&mut self, name: impl Into<String>, factory: QueueFactory) {
		self.queue.insert(name.into(), factory);
	}

	pub fn register_alert(&mut self, name: impl Into<String>, factory: AlertFactory) {
		self.alert.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Get the global factory registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in withdrawal_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in withdrawal_delivery::get_all_implementations() {
			tracing::debug!("Registering delivery implementation: {}", name);
			registry.register_delivery(name, factory);
		}

		for (name, factory) in withdrawal_queue::get_all_implementations() {
			tracing::debug!("Registering queue implementation: {}", name);
			registry.register_queue(name, factory);
		}

		for (name, factory) in withdrawal_alert::get_all_implementations() {
			tracing::debug!("Registering alert implementation: {}", name);
			registry.register_alert(name, factory);
		}

		registry
	})
}

/// Picks the registered factory for every implementation named in a config
/// section, failing on the first unknown name.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the engine from the implementations named in `config`.
pub fn build_engine_from_config(
	config: Config,
) -> Result<WithdrawalEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let delivery_factories = build_factories!(
		registry,
		config.delivery.implementations,
		delivery,
		"delivery"
	);
	let queue_factories = build_factories!(registry, config.queue.implementations, queue, "queue");
	let alert_factories = build_factories!(registry, config.alert.implementations, alert, "alert");

	let factories = WithdrawalFactories {
		storage_factories,
		delivery_factories,
		queue_factories,
		alert_factories,
	};

	Ok(WithdrawalBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use withdrawal_config::ConfigBuilder;

	#[test]
	fn test_registry_contains_builtin_implementations() {
		let registry = get_registry();

		assert!(registry.storage.contains_key("memory"));
		assert!(registry.storage.contains_key("file"));
		assert!(registry.queue.contains_key("memory"));
		assert!(registry.alert.contains_key("log"));
		assert!(registry.alert.contains_key("webhook"));
		assert!(!registry.delivery.is_empty());
	}

	#[test]
	fn test_build_engine_from_config() {
		let config = ConfigBuilder::new().build();
		let engine = build_engine_from_config(config).unwrap();

		assert_eq!(engine.alerts().sink_count(), 1);
	}

	#[test]
	fn test_unknown_implementation_is_reported() {
		let mut config = ConfigBuilder::new().build();
		config
			.alert
			.implementations
			.insert("pager".to_string(), toml::Value::Table(Default::default()));

		let err = build_engine_from_config(config).err().unwrap();
		let message = err.to_string();
		assert!(message.contains("Unknown alert implementation 'pager'"), "{}", message);
		assert!(message.contains("log, webhook"), "{}", message);
	}
}
