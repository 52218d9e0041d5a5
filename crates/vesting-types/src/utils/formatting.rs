//! String formatting utilities for logs and CLI output.

use alloy_primitives::U256;

/// Decimals of the native currency and the designated token.
pub const TOKEN_DECIMALS: u8 = 18;

/// Shortens a hex string for log lines: the first 10 characters then "..".
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

/// Adds a "0x" prefix unless one is already present.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes a "0x"/"0X" prefix if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Formats a raw amount with `decimals` decimal places, trimming trailing zeros.
///
/// `format_token_amount(U256::from(1_500_000u64), 6)` is `"1.5"`.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
	let raw = amount.to_string();
	if decimals == 0 {
		return raw;
	}

	let decimal_places = decimals as usize;
	let (integer_part, decimal_part) = if raw.len() <= decimal_places {
		("0".to_string(), format!("{:0>width$}", raw, width = decimal_places))
	} else {
		let split_pos = raw.len() - decimal_places;
		(raw[..split_pos].to_string(), raw[split_pos..].to_string())
	};

	let decimal_trimmed = decimal_part.trim_end_matches('0');
	if decimal_trimmed.is_empty() {
		integer_part
	} else {
		format!("{}.{}", integer_part, decimal_trimmed)
	}
}

/// Formats a wei amount in whole 18-decimal units.
pub fn format_ether(amount: U256) -> String {
	format_token_amount(amount, TOKEN_DECIMALS)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("0x12345678"), "0x12345678");
		assert_eq!(truncate_id("0x1234567890abcdef"), "0x12345678..");
	}

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("abcd"), "0xabcd");
		assert_eq!(with_0x_prefix("0Xabcd"), "0Xabcd");
		assert_eq!(without_0x_prefix("0xabcd"), "abcd");
		assert_eq!(without_0x_prefix("0Xabcd"), "abcd");
		assert_eq!(without_0x_prefix("abcd"), "abcd");
	}

	#[test]
	fn test_format_token_amount() {
		assert_eq!(format_token_amount(U256::from(1_500_000u64), 6), "1.5");
		assert_eq!(format_token_amount(U256::from(1000u64), 0), "1000");
		assert_eq!(
			format_ether(U256::from(1_000_000_000_000_000_000u128)),
			"1"
		);
		// 1 ether / 24, the first installment of a 24-payment schedule.
		assert_eq!(
			format_ether(U256::from(41_666_666_666_666_666u128)),
			"0.041666666666666666"
		);
		assert_eq!(
			format_ether(U256::from(1_916_666_666_666_666_668u128)),
			"1.916666666666666668"
		);
	}
}
