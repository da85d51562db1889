use rust_decimal::Decimal;

/// Format a 0-1 ratio as a percentage
pub fn format_percentage(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Human-readable duration from milliseconds
pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1_000.0 {
        format!("{:.0}ms", ms)
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1_000.0)
    } else {
        format!("{:.1}min", ms / 60_000.0)
    }
}

/// Fee with its asset symbol, trailing zeros trimmed
pub fn format_fee(fee: Decimal, asset: &str) -> String {
    format!("{} {}", fee.normalize(), asset)
}

/// Shorten a long address or hash for logs (`0x742d…f44e`)
pub fn short_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 12 {
        return id.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(250.0), "250ms");
        assert_eq!(format_duration_ms(5_000.0), "5.0s");
        assert_eq!(format_duration_ms(900_000.0), "15.0min");
    }

    #[test]
    fn test_format_fee_and_ids() {
        assert_eq!(format_fee(Decimal::from_str("0.2500").unwrap(), "USDC"), "0.25 USDC");
        assert_eq!(short_id("0x742d35Cc6634C0532925a3b844Bc454e4438f44e"), "0x742d…f44e");
        assert_eq!(short_id("alice.near"), "alice.near");
        assert_eq!(format_percentage(0.9), "90.00%");
    }
}
