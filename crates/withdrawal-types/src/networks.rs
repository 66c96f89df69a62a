//! Network selection types.
//!
//! The service targets exactly one network per process. The selector is
//! resolved once at startup into an immutable [`NetworkConfig`] that is handed
//! to every component needing an RPC endpoint or the signing key.

use crate::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkName {
	Mainnet,
	Testnet,
}

impl NetworkName {
	pub fn as_str(&self) -> &'static str {
		match self {
			NetworkName::Mainnet => "mainnet",
			NetworkName::Testnet => "testnet",
		}
	}
}

impl fmt::Display for NetworkName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Connection parameters for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
	/// EVM chain id, applied to every signed transaction.
	pub chain_id: u64,
	/// HTTP JSON-RPC endpoint.
	pub rpc_url: String,
	/// Private key of the service wallet.
	pub signer_key: SecretString,
}
