//! Chain delivery types.
//!
//! Types exchanged with the chain client: transaction hashes, receipts, fee
//! estimates and the treasury withdrawal call.

use crate::utils::{with_0x_prefix, without_0x_prefix};
use alloy_primitives::{Address, U256};
use std::fmt;

/// Blockchain transaction hash representation.
///
/// Stores transaction hashes as raw bytes. Displayed as 0x-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// Parses a hex string, with or without 0x prefix.
	pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
		hex::decode(without_0x_prefix(value)).map(Self)
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&with_0x_prefix(&hex::encode(&self.0)))
	}
}

/// Transaction receipt containing execution details.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
}

/// EIP-1559 fee parameters, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeeEstimate {
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
}

/// A treasury withdrawal ready for submission.
///
/// `bank_signature` is the externally contributed half of the multi-sig. The
/// service completes it by signing the outer transaction with its own key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalCall {
	pub treasury: Address,
	pub token: Address,
	pub recipient: Address,
	/// Amount in the token's minimal unit.
	pub amount: U256,
	pub bank_signature: Vec<u8>,
}
