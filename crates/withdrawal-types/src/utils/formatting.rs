//! String formatting helpers for logs and hex values.

/// Shortens an identifier for log fields.
///
/// Keeps the first 8 characters and appends ".." when anything was cut.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((cut, _)) => format!("{}..", &id[..cut]),
		None => id.to_string(),
	}
}

/// Adds a "0x" prefix unless one (of either case) is already present.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Strips a leading "0x" or "0X".
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Renders a minimal-unit integer amount as a decimal token amount.
///
/// Trailing fractional zeros are dropped: `("1500000", 6)` gives `"1.5"`.
pub fn format_token_amount(amount: &str, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}

	let width = decimals as usize;
	let padded = format!("{:0>width$}", amount, width = width + 1);
	let (integer, fraction) = padded.split_at(padded.len() - width);
	let fraction = fraction.trim_end_matches('0');

	if fraction.is_empty() {
		integer.to_string()
	} else {
		format!("{}.{}", integer, fraction)
	}
}
