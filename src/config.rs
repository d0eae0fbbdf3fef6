//! 配置管理模块
//! 支持从环境变量和配置文件加载配置
//!
//! 不使用进程级可变单例：配置在启动时加载一次，按值传入各引擎的构造函数。

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 链配置（单条 EVM 兼容链）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC 节点地址
    pub rpc_url: String,
    /// 链 ID（EIP-155 重放保护）
    pub chain_id: u64,
    /// 单次 RPC 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 回执轮询间隔（毫秒）
    pub receipt_poll_interval_ms: u64,
    /// 等待回执的默认超时（秒）
    pub receipt_timeout_secs: u64,
}

/// 交易所（路由合约）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Uniswap-v2 风格路由合约地址
    pub router_address: String,
    /// 路由合约调用的 gas limit
    pub router_gas_limit: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: std::env::var("RPC_URL")
                .unwrap_or_else(|_| "https://rpc.ankr.com/somnia_testnet".into()),
            chain_id: std::env::var("CHAIN_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50312),
            request_timeout_secs: std::env::var("RPC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            receipt_poll_interval_ms: std::env::var("RECEIPT_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            receipt_timeout_secs: std::env::var("RECEIPT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            router_address: std::env::var("ROUTER_ADDRESS")
                .unwrap_or_else(|_| "0xb98c15a0dC1e271132e341250703c7e94c059e8D".into()),
            router_gas_limit: std::env::var("ROUTER_GAS_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300_000),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            exchange: ExchangeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        // .env 文件存在时先加载（不存在时静默忽略）
        let _ = dotenvy::dotenv();
        Ok(Self::default())
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !self.chain.rpc_url.starts_with("http://") && !self.chain.rpc_url.starts_with("https://")
        {
            anyhow::bail!("RPC_URL must start with http:// or https://");
        }

        if self.chain.chain_id == 0 {
            anyhow::bail!("CHAIN_ID must be non-zero");
        }

        if !crate::utils::address::is_valid_address(&self.exchange.router_address) {
            anyhow::bail!(
                "ROUTER_ADDRESS is not a valid EVM address: {}",
                self.exchange.router_address
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
