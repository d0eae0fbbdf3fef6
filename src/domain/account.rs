//! 账户领域模型

use std::str::FromStr;

use ethers::types::U256;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

use crate::domain::keys;
use crate::error::{EngineError, EngineResult};

/// 钱包：签名密钥 + 派生出的 checksum 地址
///
/// 私钥只存在于内存，Debug 输出不打印密钥内容。
#[derive(Clone)]
pub struct Wallet {
    key: SigningKey,
    address: String,
}

impl Wallet {
    /// 从私钥字符串构造
    pub fn from_private_key(private_key: &str) -> EngineResult<Self> {
        let key = keys::signing_key_from_private_key(private_key)?;
        let address = keys::derive_address(&key);
        Ok(Self { key, address })
    }

    /// 从助记词派生（m/44'/60'/0'/0/0）
    pub fn from_mnemonic(phrase: &str) -> EngineResult<Self> {
        let key = keys::signing_key_from_mnemonic(phrase)?;
        let address = keys::derive_address(&key);
        Ok(Self { key, address })
    }

    /// EIP-55 checksum 地址
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 0x 前缀私钥 hex
    pub fn private_key(&self) -> String {
        keys::private_key_hex(&self.key)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// 新建账户的完整返回：助记词只在创建时返回一次，
/// 余额和 nonce 为创建时刻的链上快照
#[derive(Debug, Clone, Serialize)]
pub struct CreatedAccount {
    pub address: String,
    pub private_key: String,
    /// 仅通过助记词创建/导入时存在
    pub mnemonic: Option<String>,
    pub balance_wei: U256,
    pub balance: String,
    pub nonce: u64,
}

/// 账户快照：链上可观测状态，不含任何密钥材料
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub address: String,
    /// wei
    pub balance_wei: U256,
    /// 人类可读原生币余额
    pub balance: String,
    /// 已确认交易数（下一个可用 nonce）
    pub nonce: u64,
    /// 地址上是否部署了合约代码
    pub is_contract: bool,
}

/// 单个 ERC-20 代币的余额与元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    /// 代币最小单位
    pub raw_balance: U256,
    /// 按 decimals 换算后的人类可读余额
    pub balance: String,
}

/// 批量代币查询结果：尽力而为，单个失败不拖垮整批
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenBalanceBatch {
    pub balances: Vec<TokenBalance>,
    /// (代币地址, 失败原因)
    pub skipped: Vec<(String, String)>,
}

/// 账户组合视图：原生币 + 一组代币
#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub address: String,
    pub native_balance_wei: U256,
    pub native_balance: String,
    pub nonce: u64,
    pub tokens: Vec<TokenBalance>,
    pub skipped_tokens: Vec<(String, String)>,
}

/// MAX 模式的预算明细
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MaxSendable {
    pub balance_wei: U256,
    pub gas_cost_wei: U256,
    /// balance - gas_cost
    pub sendable_wei: U256,
}

/// 转账金额："MAX"（全额发送）或确切的人类可读数值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAmount {
    /// 发送全部可用余额（原生币扣除 gas，代币为全部余额）
    Max,
    /// 确切金额（人类可读单位的十进制字符串）
    Exact(String),
}

impl FromStr for TransferAmount {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("max") {
            return Ok(Self::Max);
        }
        if trimmed.is_empty() {
            return Err(EngineError::InvalidAmount {
                amount: s.to_string(),
                reason: "empty amount".to_string(),
            });
        }
        Ok(Self::Exact(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_debug_hides_key() {
        let wallet = Wallet::from_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let debug = format!("{wallet:?}");
        assert!(debug.contains("0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"));
        assert!(!debug.contains("4646"));
    }

    #[test]
    fn test_transfer_amount_parsing() {
        assert_eq!("MAX".parse::<TransferAmount>().unwrap(), TransferAmount::Max);
        assert_eq!("max".parse::<TransferAmount>().unwrap(), TransferAmount::Max);
        assert_eq!(" Max ".parse::<TransferAmount>().unwrap(), TransferAmount::Max);
        assert_eq!(
            "1.5".parse::<TransferAmount>().unwrap(),
            TransferAmount::Exact("1.5".into())
        );
        assert!("".parse::<TransferAmount>().is_err());
    }

    #[test]
    fn test_wallet_private_key_roundtrip() {
        let key = "0x4646464646464646464646464646464646464646464646464646464646464646";
        let wallet = Wallet::from_private_key(key).unwrap();
        assert_eq!(wallet.private_key(), key);
        let restored = Wallet::from_private_key(&wallet.private_key()).unwrap();
        assert_eq!(wallet.address(), restored.address());
    }
}
