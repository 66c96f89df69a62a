//! Common types for the withdrawal processor.
//!
//! This crate defines the data model shared by every other crate in the
//! workspace: withdrawal requests and their audit history, raw broadcast
//! relay requests, broker jobs, alert payloads, chain-facing types and the
//! configuration validation primitives used by pluggable backends.

/// Alert payloads emitted on terminal job failures.
pub mod alert;
/// API error responses shared by the HTTP layer.
pub mod api;
/// Raw transaction broadcast requests.
pub mod broadcast;
/// Chain delivery types such as transaction hashes, receipts and fee estimates.
pub mod delivery;
/// Broker job types.
pub mod job;
/// Network selection types.
pub mod networks;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Redacting wrapper for signing keys and other secrets.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Utility functions for amounts, formatting and timestamps.
pub mod utils;
/// Configuration validation types for backend-specific tables.
pub mod validation;
/// Withdrawal request types and their status graph.
pub mod withdrawal;

pub use alert::FailureAlert;
pub use api::{APIError, ErrorResponse};
pub use broadcast::{NewRawBroadcast, RawBroadcastStatus, RawTransactionBroadcast};
pub use delivery::{FeeEstimate, TransactionHash, TransactionReceipt, WithdrawalCall};
pub use job::{Job, JobPayload, QueueName};
pub use networks::{NetworkConfig, NetworkName};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::StorageKey;
pub use utils::{
	current_timestamp, format_token_amount, parse_token_amount, truncate_id, with_0x_prefix,
	without_0x_prefix, AmountError,
};
pub use validation::*;
pub use withdrawal::{
	HistoryEntry, NewWithdrawal, WithdrawalFilter, WithdrawalRequest, WithdrawalStatus,
};
