use std::str::FromStr;

use rust_decimal::Decimal;

use crate::types::{ChainFamily, ChainId};

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const C32_ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const BECH32_ALPHABET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Validate EVM address format (`0x` + 40 hex)
pub fn is_valid_evm_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex_part) => hex_part.len() == 40 && hex::decode(hex_part).is_ok(),
        None => false,
    }
}

fn is_base58(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| BASE58_ALPHABET.contains(c))
}

/// Solana public key: base58, 32-44 chars
pub fn is_valid_solana_address(address: &str) -> bool {
    (32..=44).contains(&address.len()) && is_base58(address)
}

/// NEAR named account or 64-hex implicit account
pub fn is_valid_near_account(account: &str) -> bool {
    if account.len() == 64 && account.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
        return true;
    }
    if !(2..=64).contains(&account.len()) {
        return false;
    }

    // 구분자(-, _, .)는 연속되거나 양 끝에 올 수 없음
    let mut previous_separator = true;
    for c in account.chars() {
        let separator = matches!(c, '-' | '_' | '.');
        if separator {
            if previous_separator {
                return false;
            }
        } else if !(c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return false;
        }
        previous_separator = separator;
    }
    !previous_separator
}

/// Stacks principal: SP/ST/SM/SN prefix, c32 alphabet, 39-41 chars
pub fn is_valid_stacks_address(address: &str) -> bool {
    let prefixed = ["SP", "ST", "SM", "SN"].iter().any(|p| address.starts_with(p));
    // 컨트랙트 주소(SP...contract-name)는 principal 부분만 확인
    let principal = address.split('.').next().unwrap_or_default();
    prefixed
        && (39..=41).contains(&principal.len())
        && principal[1..].chars().all(|c| C32_ALPHABET.contains(c))
}

/// Bitcoin: bech32 (`bc1`/`tb1`) or base58 legacy (`1`/`3`/`m`/`n`/`2`)
pub fn is_valid_bitcoin_address(address: &str) -> bool {
    let lowered = address.to_ascii_lowercase();
    if let Some(data) = lowered.strip_prefix("bc1").or_else(|| lowered.strip_prefix("tb1")) {
        // 대소문자 혼용 불가
        let uniform = address == lowered || address == address.to_ascii_uppercase();
        return uniform && (39..=59).contains(&address.len()) && data.chars().all(|c| BECH32_ALPHABET.contains(c));
    }

    let legacy_prefix = ['1', '3', 'm', 'n', '2'].iter().any(|p| address.starts_with(*p));
    legacy_prefix && (26..=35).contains(&address.len()) && is_base58(address)
}

/// Validate an address for the chain it lives on
pub fn is_valid_address_for(chain: ChainId, address: &str) -> bool {
    match chain.family() {
        ChainFamily::Evm => is_valid_evm_address(address),
        ChainFamily::Solana => is_valid_solana_address(address),
        ChainFamily::Near => is_valid_near_account(address),
        ChainFamily::Stacks => is_valid_stacks_address(address),
        ChainFamily::Bitcoin => is_valid_bitcoin_address(address),
    }
}

/// Parse a positive decimal amount
pub fn parse_positive_amount(amount: &str) -> Option<Decimal> {
    Decimal::from_str(amount.trim())
        .ok()
        .filter(|value| *value > Decimal::ZERO)
}

/// Validate transaction hash format
pub fn is_valid_tx_hash(hash: &str) -> bool {
    hash.len() == 66 && is_valid_hex_prefixed(hash)
}

fn is_valid_hex_prefixed(s: &str) -> bool {
    s.strip_prefix("0x").map_or(false, |h| h.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evm_addresses() {
        assert!(is_valid_evm_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e"));
        assert!(!is_valid_evm_address("742d35Cc6634C0532925a3b844Bc454e4438f44e"));
        assert!(!is_valid_evm_address("0x742d35"));
        assert!(!is_valid_evm_address("0xZZ2d35Cc6634C0532925a3b844Bc454e4438f44e"));
    }

    #[test]
    fn test_solana_addresses() {
        assert!(is_valid_solana_address("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"));
        // base58에는 0, O, I, l이 없음
        assert!(!is_valid_solana_address("0WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"));
        assert!(!is_valid_solana_address("short"));
    }

    #[test]
    fn test_near_accounts() {
        assert!(is_valid_near_account("alice.near"));
        assert!(is_valid_near_account("bridge-vault_01.testnet"));
        assert!(is_valid_near_account(&"ab".repeat(32)));
        assert!(!is_valid_near_account("Alice.near"));
        assert!(!is_valid_near_account("alice..near"));
        assert!(!is_valid_near_account(".alice"));
        assert!(!is_valid_near_account("a"));
    }

    #[test]
    fn test_stacks_addresses() {
        assert!(is_valid_stacks_address("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7"));
        assert!(is_valid_stacks_address("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7.sbtc-token"));
        assert!(!is_valid_stacks_address("SX2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7"));
        assert!(!is_valid_stacks_address("SP2J6ZY48"));
    }

    #[test]
    fn test_bitcoin_addresses() {
        assert!(is_valid_bitcoin_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
        assert!(is_valid_bitcoin_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"));
        assert!(is_valid_bitcoin_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"));
        assert!(!is_valid_bitcoin_address("bc1qAr0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
        assert!(!is_valid_bitcoin_address("4BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"));
    }

    #[test]
    fn test_address_for_chain() {
        assert!(is_valid_address_for(ChainId::Base, "0x742d35Cc6634C0532925a3b844Bc454e4438f44e"));
        assert!(!is_valid_address_for(ChainId::Solana, "0x742d35Cc6634C0532925a3b844Bc454e4438f44e"));
        assert!(is_valid_address_for(ChainId::Near, "alice.near"));
    }

    #[test]
    fn test_parse_positive_amount() {
        assert_eq!(parse_positive_amount(" 12.5 "), Decimal::from_str("12.5").ok());
        assert!(parse_positive_amount("0").is_none());
        assert!(parse_positive_amount("-3").is_none());
        assert!(parse_positive_amount("abc").is_none());
        assert!(parse_positive_amount("").is_none());
    }
}
