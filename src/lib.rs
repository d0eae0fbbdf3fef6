//! ChainGate - EVM 账户与交易所交易引擎
//!
//! 单链、无状态：密钥只存在于内存，引擎不落盘任何密钥材料；
//! 所有定价与执行都委托给链上路由合约。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{EngineError, EngineResult};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::Config,
        domain::account::{
            AccountSnapshot, CreatedAccount, MaxSendable, Portfolio, TokenBalance,
            TokenBalanceBatch, TransferAmount, Wallet,
        },
        error::{EngineError, EngineResult},
        service::{
            account_service::AccountService,
            exchange_service::ExchangeService,
            rpc_client::{RpcClient, TransactionReceipt},
        },
    };
}
