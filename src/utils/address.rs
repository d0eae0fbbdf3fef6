//! 地址验证模块
//!
//! 统一的 EVM 地址验证逻辑：格式校验、EIP-55 Checksum 校验与编码。
//! 地址比较始终大小写不敏感；对外返回的地址统一为 checksum 格式。

use sha3::{Digest, Keccak256};

use crate::error::{EngineError, EngineResult};

/// 验证 EVM 地址格式（支持 EIP-55 Checksum）
///
/// 全小写/全大写地址视为无 checksum，直接通过；
/// 混合大小写地址必须通过 EIP-55 校验。
pub fn is_valid_address(address: &str) -> bool {
    // 1. 基本格式检查
    if !address.starts_with("0x") {
        return false;
    }

    if address.len() != 42 {
        return false;
    }

    // 2. 验证hex字符
    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }

    // 3. EIP-55 Checksum验证（仅当地址混合大小写时）
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        return verify_eip55_checksum(address);
    }

    true
}

/// 验证并转换为 EIP-55 Checksum 格式
pub fn to_checksum_address(address: &str) -> EngineResult<String> {
    if !is_valid_address(address) {
        return Err(EngineError::InvalidAddress(address.to_string()));
    }
    Ok(encode_eip55(address))
}

/// 大小写不敏感的地址比较
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// EIP-55 Checksum 编码
/// https://eips.ethereum.org/EIPS/eip-55
fn encode_eip55(address: &str) -> String {
    let addr_lower = address[2..].to_lowercase();
    let mut hasher = Keccak256::new();
    hasher.update(addr_lower.as_bytes());
    let hash = hasher.finalize();

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, ch) in addr_lower.chars().enumerate() {
        if ch.is_ascii_alphabetic() {
            let hash_byte = hash[i / 2];
            let hash_nibble = if i % 2 == 0 {
                hash_byte >> 4
            } else {
                hash_byte & 0x0f
            };
            if hash_nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// 验证 EIP-55 Checksum
fn verify_eip55_checksum(address: &str) -> bool {
    encode_eip55(address) == format!("0x{}", &address[2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lowercase_address() {
        assert!(is_valid_address("0x742d35cc6634c0532925a3b844bc9e7595f0beb6"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!is_valid_address("0x123"));
        assert!(!is_valid_address("742d35cc6634c0532925a3b844bc9e7595f0beb6"));
        assert!(!is_valid_address("0xGGGG35cc6634c0532925a3b844bc9e7595f0beb6"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_eip55_reference_vectors() {
        // EIP-55 规范中的参考地址
        let vectors = [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ];
        for addr in vectors {
            assert!(is_valid_address(addr), "{addr} should verify");
            assert_eq!(to_checksum_address(&addr.to_lowercase()).unwrap(), addr);
        }
    }

    #[test]
    fn test_bad_checksum_rejected() {
        // 正确地址：0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed（首字母大小写翻转）
        assert!(!is_valid_address("0x5Aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    }

    #[test]
    fn test_checksum_roundtrip_case_insensitive() {
        let addr = "0x742d35cc6634c0532925a3b844bc9e7595f0beb6";
        let checksummed = to_checksum_address(addr).unwrap();
        // checksum 输出再次通过验证，且与原地址大小写不敏感相等
        assert!(is_valid_address(&checksummed));
        assert!(same_address(addr, &checksummed));
        assert_eq!(to_checksum_address(&checksummed).unwrap(), checksummed);
    }

    #[test]
    fn test_to_checksum_rejects_invalid() {
        assert!(matches!(
            to_checksum_address("0x123"),
            Err(crate::error::EngineError::InvalidAddress(_))
        ));
    }
}
