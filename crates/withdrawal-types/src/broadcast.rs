//! Raw transaction broadcast types.
//!
//! A raw broadcast relays a transaction the client has already signed. It has
//! a simpler lifecycle than a withdrawal and no audit log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a raw broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawBroadcastStatus {
	Pending,
	Broadcasted,
	Confirmed,
	Failed,
}

impl RawBroadcastStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "PENDING",
			Self::Broadcasted => "BROADCASTED",
			Self::Confirmed => "CONFIRMED",
			Self::Failed => "FAILED",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Confirmed | Self::Failed)
	}
}

impl fmt::Display for RawBroadcastStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A persisted raw broadcast request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransactionBroadcast {
	pub id: String,
	/// Optional caller-side correlation id.
	pub client_id: Option<String>,
	/// Signed transaction bytes, hex encoded.
	pub raw_transaction: String,
	pub status: RawBroadcastStatus,
	pub tx_hash: Option<String>,
	pub error_message: Option<String>,
	pub created_at: u64,
	pub updated_at: u64,
}

/// Intake payload for a new raw broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRawBroadcast {
	pub client_id: Option<String>,
	pub raw_transaction: String,
}
