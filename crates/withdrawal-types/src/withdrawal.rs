//! Withdrawal request types.
//!
//! A withdrawal request is a bank-authorized intent to move tokens out of a
//! treasury contract. The request row carries its own append-only audit log so
//! that a status change and the history entry describing it are always
//! persisted together.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
	/// Created by intake, no chain interaction yet.
	PendingSignature,
	/// A worker has picked the request up.
	Processing,
	/// The withdrawal transaction was accepted by the node.
	Broadcasted,
	/// The withdrawal transaction is confirmed on chain.
	Completed,
	/// Cancelled before processing started.
	Cancelled,
	/// Retries were exhausted.
	Failed,
}

impl WithdrawalStatus {
	/// Returns the wire representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::PendingSignature => "PENDING_SIGNATURE",
			Self::Processing => "PROCESSING",
			Self::Broadcasted => "BROADCASTED",
			Self::Completed => "COMPLETED",
			Self::Cancelled => "CANCELLED",
			Self::Failed => "FAILED",
		}
	}

	/// Returns true for statuses no processing-driven transition leaves.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
	}
}

impl fmt::Display for WithdrawalStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for WithdrawalStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"PENDING_SIGNATURE" => Ok(Self::PendingSignature),
			"PROCESSING" => Ok(Self::Processing),
			"BROADCASTED" => Ok(Self::Broadcasted),
			"COMPLETED" => Ok(Self::Completed),
			"CANCELLED" => Ok(Self::Cancelled),
			"FAILED" => Ok(Self::Failed),
			other => Err(format!("Unknown withdrawal status: {}", other)),
		}
	}
}

/// Immutable audit record of one status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
	/// Entry identifier, its position within the request's log starting at 1.
	pub id: u32,
	/// Back-reference to the owning request.
	pub withdrawal_id: String,
	/// Status before the transition. `None` for the creation entry.
	pub from_status: Option<WithdrawalStatus>,
	/// Status after the transition.
	pub to_status: WithdrawalStatus,
	/// Free-form detail such as a transaction hash or error.
	pub note: Option<String>,
	/// Unix timestamp of the transition.
	pub created_at: u64,
}

/// A persisted withdrawal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
	/// Internal identifier.
	pub id: String,
	/// Externally supplied identifier, unique across all requests.
	pub request_id: String,
	/// Current lifecycle status.
	pub status: WithdrawalStatus,
	/// Treasury multi-sig contract holding the funds.
	pub treasury_address: Address,
	/// Recipient of the withdrawal.
	pub destination_address: Address,
	/// ERC-20 token being withdrawn.
	pub token_address: Address,
	/// Human-readable decimal amount. Scaled to minimal units at processing time.
	pub amount: String,
	/// Bank signature over the withdrawal, hex encoded.
	pub signed_payload: String,
	/// Hash of the submitted withdrawal transaction.
	pub tx_hash: Option<String>,
	/// Last recorded processing error.
	pub error_message: Option<String>,
	/// Unix timestamp of creation.
	pub created_at: u64,
	/// Unix timestamp of the last write.
	pub updated_at: u64,
	/// Append-only audit log.
	#[serde(default)]
	pub history: Vec<HistoryEntry>,
}

impl WithdrawalRequest {
	/// Appends a history entry for a transition and moves the request to `to`.
	///
	/// Callers are responsible for checking that the transition is allowed.
	pub fn record_transition(&mut self, to: WithdrawalStatus, note: Option<String>, now: u64) {
		let from = if self.history.is_empty() {
			None
		} else {
			Some(self.status)
		};
		self.history.push(HistoryEntry {
			id: self.history.len() as u32 + 1,
			withdrawal_id: self.id.clone(),
			from_status: from,
			to_status: to,
			note,
			created_at: now,
		});
		self.status = to;
		self.updated_at = now;
	}

	/// Number of entries in the audit log that moved the request into `status`.
	pub fn history_count(&self, status: WithdrawalStatus) -> usize {
		self.history
			.iter()
			.filter(|entry| entry.to_status == status)
			.count()
	}
}

/// Intake payload for a new withdrawal, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWithdrawal {
	pub request_id: String,
	pub treasury_address: String,
	pub destination_address: String,
	pub token_address: String,
	pub amount: String,
	pub signed_payload: String,
}

/// Filter for listing withdrawal requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalFilter {
	/// Only return requests in this status.
	pub status: Option<WithdrawalStatus>,
	/// Maximum number of results. Defaults to 50.
	pub limit: Option<usize>,
	/// Number of results to skip.
	pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request() -> WithdrawalRequest {
		WithdrawalRequest {
			id: "w-1".to_string(),
			request_id: "bank-1".to_string(),
			status: WithdrawalStatus::PendingSignature,
			treasury_address: Address::ZERO,
			destination_address: Address::ZERO,
			token_address: Address::ZERO,
			amount: "1.5".to_string(),
			signed_payload: "0xabcd".to_string(),
			tx_hash: None,
			error_message: None,
			created_at: 1,
			updated_at: 1,
			history: Vec::new(),
		}
	}

	#[test]
	fn test_record_transition_builds_history() {
		let mut req = request();
		req.record_transition(WithdrawalStatus::PendingSignature, None, 1);
		req.record_transition(WithdrawalStatus::Processing, None, 2);

		assert_eq!(req.status, WithdrawalStatus::Processing);
		assert_eq!(req.updated_at, 2);
		assert_eq!(req.history.len(), 2);
		assert_eq!(req.history[0].from_status, None);
		assert_eq!(
			req.history[1].from_status,
			Some(WithdrawalStatus::PendingSignature)
		);
		assert_eq!(req.history[1].id, 2);
		assert_eq!(req.history_count(WithdrawalStatus::Processing), 1);

		let entry = serde_json::to_value(&req.history[1]).unwrap();
		assert_eq!(entry["id"], 2);
		assert_eq!(entry["withdrawalId"], req.id.as_str());
		assert_eq!(entry["toStatus"], "PROCESSING");
	}

	#[test]
	fn test_status_wire_format() {
		let json = serde_json::to_string(&WithdrawalStatus::PendingSignature).unwrap();
		assert_eq!(json, "\"PENDING_SIGNATURE\"");
		assert_eq!(
			"broadcasted".parse::<WithdrawalStatus>().unwrap(),
			WithdrawalStatus::Broadcasted
		);
		assert!("unknown".parse::<WithdrawalStatus>().is_err());
	}

	#[test]
	fn test_terminal_statuses() {
		assert!(WithdrawalStatus::Completed.is_terminal());
		assert!(WithdrawalStatus::Cancelled.is_terminal());
		assert!(WithdrawalStatus::Failed.is_terminal());
		assert!(!WithdrawalStatus::Broadcasted.is_terminal());
	}
}
