//! Raw amount helpers. Amounts are unsigned 256-bit integers carried as
//! decimal strings; nothing here goes through floating point.

use ethers::types::U256;

/// Convert a JSON-RPC hex quantity (`0x1bc16d674ec80000`) to a decimal string.
///
/// Returns `None` for anything that is not `0x` followed by hex digits, or
/// that does not fit in 256 bits.
pub fn hex_quantity_to_decimal(quantity: &str) -> Option<String> {
    let hex = quantity
        .strip_prefix("0x")
        .or_else(|| quantity.strip_prefix("0X"))?;
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let hex = hex.trim_start_matches('0');
    if hex.is_empty() {
        return Some("0".to_string());
    }
    U256::from_str_radix(hex, 16).ok().map(|v| v.to_string())
}

/// Validate an unsigned decimal integer string and strip leading zeros.
pub fn normalize_decimal(raw: &str) -> Option<String> {
    parse_decimal(raw).map(|v| v.to_string())
}

fn parse_decimal(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = raw.trim_start_matches('0');
    if digits.is_empty() {
        return Some(U256::zero());
    }
    U256::from_dec_str(digits).ok()
}

/// Render a raw integer amount in whole units: `format_units("1500000000000000000", 18)`
/// is `"1.5"`. Trailing fractional zeros are dropped. Invalid input yields `None`.
pub fn format_units(raw: &str, decimals: u8) -> Option<String> {
    let amount = parse_decimal(raw)?;
    let formatted = ethers::utils::format_units(amount, u32::from(decimals)).ok()?;
    Some(match formatted.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{frac}")
            }
        }
        None => formatted,
    })
}

/// Truncate a formatted amount to at most `max_fraction_digits` fractional
/// digits. Non-zero amounts that would truncate to zero render as `< 0.0…1`.
pub fn truncate_fraction(formatted: &str, max_fraction_digits: usize) -> String {
    let Some((whole, frac)) = formatted.split_once('.') else {
        return formatted.to_string();
    };
    let kept = &frac[..frac.len().min(max_fraction_digits)];
    let kept = kept.trim_end_matches('0');

    if whole == "0" && kept.is_empty() {
        if max_fraction_digits == 0 {
            return "< 1".to_string();
        }
        return format!("< 0.{}1", "0".repeat(max_fraction_digits - 1));
    }
    if kept.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{kept}")
    }
}
