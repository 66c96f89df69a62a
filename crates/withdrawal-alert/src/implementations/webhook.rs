//! Alert sink that POSTs alerts as JSON to an HTTP endpoint.

use crate::{AlertError, AlertInterface};
use async_trait::async_trait;
use std::time::Duration;
use withdrawal_types::{
	ConfigSchema, FailureAlert, Field, FieldType, ImplementationRegistry, Schema, SecretString,
	ValidationError,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Webhook alert sink.
pub struct WebhookAlert {
	client: reqwest::Client,
	url: String,
	auth_token: Option<SecretString>,
}

impl WebhookAlert {
	pub fn new(
		url: String,
		timeout: Duration,
		auth_token: Option<SecretString>,
	) -> Result<Self, AlertError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| AlertError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			url,
			auth_token,
		})
	}
}

#[async_trait]
impl AlertInterface for WebhookAlert {
	async fn send(&self, alert: &FailureAlert) -> Result<(), AlertError> {
		let mut request = self.client.post(&self.url).json(alert);
		if let Some(token) = &self.auth_token {
			request = token.with_exposed(|token| request.bearer_auth(token));
		}

		request
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(|e| AlertError::Delivery(format!("Webhook request failed: {}", e)))?;

		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WebhookAlertSchema)
	}
}

/// Configuration schema for WebhookAlert.
pub struct WebhookAlertSchema;

impl ConfigSchema for WebhookAlertSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
						Ok(())
					},
					_ => Err("url must start with http:// or https://".to_string()),
				}
			})],
			vec![
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(60),
					},
				),
				Field::new("auth_token", FieldType::String),
			],
		);

		schema.validate(config)
	}
}

/// Factory function to create a webhook sink from configuration.
///
/// Configuration parameters:
/// - `url`: endpoint receiving the JSON alert (required)
/// - `timeout_seconds`: request timeout (default: 10)
/// - `auth_token`: sent as a bearer token when present
pub fn create_alert(config: &toml::Value) -> Result<Box<dyn AlertInterface>, AlertError> {
	WebhookAlertSchema
		.validate(config)
		.map_err(|e| AlertError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AlertError::Configuration("url is required".to_string()))?
		.to_string();

	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	let auth_token = config
		.get("auth_token")
		.and_then(|v| v.as_str())
		.map(SecretString::from);

	Ok(Box::new(WebhookAlert::new(
		url,
		Duration::from_secs(timeout),
		auth_token,
	)?))
}

/// Registry for the webhook alert implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "webhook";
	type Factory = crate::AlertFactory;

	fn factory() -> Self::Factory {
		create_alert
	}
}

impl crate::AlertRegistry for Registry {}
