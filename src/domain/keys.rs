//! 密钥派生模块
//!
//! 私钥/助记词 -> secp256k1 签名密钥 -> EVM 地址。
//! 助记词派生固定使用以太坊标准路径 m/44'/60'/0'/0/0，空 passphrase。

use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};

use crate::error::{EngineError, EngineResult};
use crate::utils::address;

/// BIP-44 以太坊默认派生路径
pub const DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// 归一化私钥字符串：去掉可选 0x 前缀，校验 64 位 hex，统一为小写 0x 格式
pub fn normalize_private_key(private_key: &str) -> EngineResult<String> {
    let stripped = private_key
        .strip_prefix("0x")
        .or_else(|| private_key.strip_prefix("0X"))
        .unwrap_or(private_key);

    if stripped.len() != 64 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EngineError::InvalidKeyFormat(
            "expected 64 hex characters (optional 0x prefix)".into(),
        ));
    }

    Ok(format!("0x{}", stripped.to_lowercase()))
}

/// 私钥字符串 -> 签名密钥
///
/// 零值和超出 secp256k1 曲线阶的标量都会被拒绝。
pub fn signing_key_from_private_key(private_key: &str) -> EngineResult<SigningKey> {
    let normalized = normalize_private_key(private_key)?;
    let bytes = hex::decode(&normalized[2..])
        .map_err(|_| EngineError::InvalidKeyFormat("invalid hex".into()))?;

    SigningKey::from_slice(&bytes)
        .map_err(|_| EngineError::InvalidKeyFormat("scalar out of curve order".into()))
}

/// 校验私钥格式与曲线有效性，返回归一化形式
pub fn validate_private_key(private_key: &str) -> EngineResult<String> {
    signing_key_from_private_key(private_key)?;
    normalize_private_key(private_key)
}

/// 私钥是否有效（不抛错的便捷判断）
pub fn is_valid_private_key(private_key: &str) -> bool {
    signing_key_from_private_key(private_key).is_ok()
}

/// 签名密钥 -> EIP-55 checksum 地址
///
/// Keccak-256(未压缩公钥去掉 0x04 前缀) 的最后 20 字节。
pub fn derive_address(key: &SigningKey) -> String {
    let public = key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&public.as_bytes()[1..]);
    let addr = format!("0x{}", hex::encode(&hash[12..]));
    // 自己生成的地址一定是合法 hex，编码不会失败
    address::to_checksum_address(&addr).unwrap_or(addr)
}

/// 签名密钥 -> 0x 前缀私钥 hex
pub fn private_key_hex(key: &SigningKey) -> String {
    format!("0x{}", hex::encode(key.to_bytes()))
}

/// 生成新的 12 词 BIP-39 助记词（128 位熵）
pub fn generate_mnemonic() -> EngineResult<String> {
    use rand::RngCore;

    let mut entropy = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// 助记词 -> 签名密钥（m/44'/60'/0'/0/0）
pub fn signing_key_from_mnemonic(phrase: &str) -> EngineResult<SigningKey> {
    use coins_bip32::prelude::*;

    let mnemonic = Mnemonic::parse_in(Language::English, phrase.trim())
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))?;
    let seed = mnemonic.to_seed("");

    let derivation_path = DERIVATION_PATH
        .parse::<DerivationPath>()
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))?;
    let root = XPriv::root_from_seed(&seed, None)
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))?;
    let derived = root
        .derive_path(&derivation_path)
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))?;

    // XPriv 实现 AsRef<SigningKey>
    let key: &SigningKey = derived.as_ref();
    Ok(key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-39 全零熵测试助记词
    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_normalize_private_key() {
        let key = "4646464646464646464646464646464646464646464646464646464646464646";
        assert_eq!(
            normalize_private_key(key).unwrap(),
            format!("0x{key}")
        );
        assert_eq!(
            normalize_private_key(&format!("0x{}", key.to_uppercase())).unwrap(),
            format!("0x{key}")
        );
    }

    #[test]
    fn test_invalid_private_keys() {
        assert!(matches!(
            normalize_private_key("0x1234"),
            Err(EngineError::InvalidKeyFormat(_))
        ));
        assert!(normalize_private_key("zz46464646464646464646464646464646464646464646464646464646464646").is_err());
        // 零标量不是合法私钥
        assert!(signing_key_from_private_key(&"0".repeat(64)).is_err());
        assert!(!is_valid_private_key(&"0".repeat(64)));
        // 超出曲线阶
        assert!(signing_key_from_private_key(&"f".repeat(64)).is_err());
        assert!(!is_valid_private_key(&"f".repeat(64)));
    }

    #[test]
    fn test_derive_address_known_key() {
        // EIP-155 规范示例私钥对应的地址
        let key = signing_key_from_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        assert_eq!(
            derive_address(&key),
            "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"
        );
    }

    #[test]
    fn test_mnemonic_derivation_reference_vector() {
        let key = signing_key_from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(
            derive_address(&key),
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        );
    }

    #[test]
    fn test_mnemonic_rejects_garbage() {
        assert!(matches!(
            signing_key_from_mnemonic("not a valid mnemonic phrase at all"),
            Err(EngineError::InvalidMnemonic(_))
        ));
        assert!(signing_key_from_mnemonic("").is_err());
    }

    #[test]
    fn test_generate_mnemonic_is_valid_and_derivable() {
        let phrase = generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        // 生成的助记词必须能直接派生出密钥
        let key = signing_key_from_mnemonic(&phrase).unwrap();
        assert!(derive_address(&key).starts_with("0x"));
    }

    #[test]
    fn test_private_key_roundtrip() {
        let key = signing_key_from_mnemonic(TEST_MNEMONIC).unwrap();
        let hex_key = private_key_hex(&key);
        let restored = signing_key_from_private_key(&hex_key).unwrap();
        assert_eq!(derive_address(&key), derive_address(&restored));
    }
}
