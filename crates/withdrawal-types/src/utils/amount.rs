//! Decimal amount scaling.
//!
//! Withdrawal amounts arrive as human-readable decimal strings. They are
//! scaled into the token's minimal unit only at processing time, once the
//! token's decimals have been read from the chain.

use alloy_primitives::U256;
use thiserror::Error;

/// Largest decimals value for which `10^decimals` fits in a U256.
const MAX_DECIMALS: u8 = 77;

/// Errors raised while scaling a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
	#[error("Amount is empty")]
	Empty,
	#[error("Invalid amount format: {0}")]
	InvalidFormat(String),
	#[error("Amount {amount} has more than {decimals} significant fractional digits")]
	PrecisionLoss { amount: String, decimals: u8 },
	#[error("Amount {0} does not fit in 256 bits")]
	Overflow(String),
}

/// Scales a decimal string into a minimal-unit integer.
///
/// Accepts plain decimal notation (`"1500"`, `"1500.25"`) with surrounding
/// whitespace. Signs, exponents and separators are rejected. Fractional
/// digits beyond `decimals` are accepted only when they are all zero; any
/// other excess precision is an error rather than being rounded away.
pub fn parse_token_amount(amount: &str, decimals: u8) -> Result<U256, AmountError> {
	let amount = amount.trim();
	if amount.is_empty() {
		return Err(AmountError::Empty);
	}
	if decimals > MAX_DECIMALS {
		return Err(AmountError::Overflow(amount.to_string()));
	}

	let (integer, fraction) = match amount.split_once('.') {
		Some((integer, fraction)) if !fraction.is_empty() => (integer, fraction),
		Some(_) => return Err(AmountError::InvalidFormat(amount.to_string())),
		None => (amount, ""),
	};

	let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
	if integer.is_empty() || !all_digits(integer) || !all_digits(fraction) {
		return Err(AmountError::InvalidFormat(amount.to_string()));
	}

	let width = decimals as usize;
	let fraction = if fraction.len() > width {
		let (kept, excess) = fraction.split_at(width);
		if excess.bytes().any(|b| b != b'0') {
			return Err(AmountError::PrecisionLoss {
				amount: amount.to_string(),
				decimals,
			});
		}
		kept
	} else {
		fraction
	};

	let digits = format!("{}{:0<width$}", integer, fraction, width = width);
	U256::from_str_radix(&digits, 10).map_err(|_| AmountError::Overflow(amount.to_string()))
}
