//! 引擎错误类型
//!
//! 封闭的错误枚举：调用方可以按变体区分「输入校验失败」（网络调用之前抛出、
//! 不可重试）与「网络/节点失败」（是否重试由上层决定）。

use ethers::types::U256;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// 账户与交易引擎的统一错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    /// 私钥格式错误（去掉可选 0x 前缀后必须是 64 个 hex 字符的有效标量）
    #[error("invalid private key format: {0}")]
    InvalidKeyFormat(String),

    /// BIP-39 助记词校验失败
    #[error("invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    /// 地址格式错误（必须是 0x + 40 hex，EIP-55 大小写校验）
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// swap 路径必须包含至少两个代币地址
    #[error("swap path must contain at least 2 addresses, got {0}")]
    InvalidSwapPath(usize),

    /// 金额解析失败（非法数字或小数位超过代币精度）
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    /// 网络层失败（连接/超时），节点本身没有返回错误
    #[error("RPC endpoint unavailable: {0}")]
    RpcUnavailable(String),

    /// 节点返回的 JSON-RPC 错误（保留原始错误码和消息）
    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    /// 单个代币的元数据/余额读取失败
    #[error("token query failed for {token}: {reason}")]
    TokenQueryFailed { token: String, reason: String },

    /// 余额不足以覆盖金额 + gas 费用（wei / 代币最小单位）
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: U256, required: U256 },

    /// 余额不足以覆盖 gas 费用（MAX 模式下可发送金额 <= 0）
    #[error("insufficient funds for gas: balance {balance} wei, gas cost {gas_cost} wei")]
    InsufficientFundsForGas { balance: U256, gas_cost: U256 },

    /// getAmountsOut/getAmountsIn 执行回滚，通常是路径上没有流动性池
    #[error("no liquidity or invalid path: {0}")]
    NoLiquidityOrInvalidPath(String),

    /// 交易已上链但执行失败（回执 status = 0）
    #[error("transaction {tx_hash} reverted on chain (status 0)")]
    TransactionReverted { tx_hash: String },

    /// 在超时时间内没有等到交易回执
    #[error("transaction {tx_hash} not mined within {timeout_secs}s")]
    TransactionTimeout { tx_hash: String, timeout_secs: u64 },
}

impl EngineError {
    /// 输入校验类错误：在任何网络调用之前抛出，重试没有意义
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidKeyFormat(_)
                | Self::InvalidMnemonic(_)
                | Self::InvalidAddress(_)
                | Self::InvalidSwapPath(_)
                | Self::InvalidAmount { .. }
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        Self::RpcUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(EngineError::InvalidAddress("0x123".into()).is_validation());
        assert!(EngineError::InvalidSwapPath(1).is_validation());
        assert!(!EngineError::RpcUnavailable("timeout".into()).is_validation());
        assert!(!EngineError::TransactionReverted {
            tx_hash: "0xabc".into()
        }
        .is_validation());
    }

    #[test]
    fn test_error_messages_carry_detail() {
        let err = EngineError::InsufficientFundsForGas {
            balance: U256::from(1000u64),
            gas_cost: U256::from(2000u64),
        };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("2000"));

        let err = EngineError::RpcError {
            code: -32000,
            message: "transferFrom failed".into(),
        };
        assert!(err.to_string().contains("transferFrom failed"));
    }
}
