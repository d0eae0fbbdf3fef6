//! JSON-RPC 客户端
//!
//! 对单个 EVM 节点的薄封装：eth_* 方法 + 回执轮询。
//! 网络层失败映射为 RpcUnavailable，节点返回的错误保留原始 code/message。

use std::time::Duration;

use ethers::types::U256;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use crate::config::ChainConfig;
use crate::error::{EngineError, EngineResult};

/// eth_call / eth_estimateGas 的调用参数
#[derive(Debug, Clone, Default)]
pub struct CallParams {
    pub from: Option<String>,
    pub to: String,
    pub value: U256,
    pub data: Vec<u8>,
}

/// 交易回执（已解析的字段子集）
#[derive(Debug, Clone)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    /// 1 = 成功, 0 = 回滚
    pub status: u64,
    pub gas_used: U256,
    /// 原始事件日志（未解码）
    pub logs: Vec<Value>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == 1
    }
}

/// 最新区块的摘要信息
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    pub number: u64,
    /// unix 秒
    pub timestamp: u64,
}

pub struct RpcClient {
    http: reqwest::Client,
    rpc_url: String,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl RpcClient {
    pub fn new(config: &ChainConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            rpc_url: config.rpc_url.clone(),
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// 发送一次 JSON-RPC 请求并返回 result 字段
    async fn request(&self, method: &str, params: Value) -> EngineResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(EngineError::RpcUnavailable(format!(
                "HTTP {status} from RPC endpoint"
            )));
        }

        let json: Value = serde_json::from_str(&body).map_err(|_| {
            EngineError::RpcUnavailable("RPC endpoint returned non-JSON body".into())
        })?;

        if let Some(error) = json.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error")
                .to_string();
            return Err(EngineError::RpcError { code, message });
        }

        json.get("result").cloned().ok_or_else(|| {
            EngineError::RpcUnavailable("RPC response missing result field".into())
        })
    }

    /// result 应为 0x 开头的 quantity
    async fn request_u256(&self, method: &str, params: Value) -> EngineResult<U256> {
        let result = self.request(method, params).await?;
        parse_quantity(&result)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 只读查询
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 原生币余额（wei）
    pub async fn get_balance(&self, address: &str) -> EngineResult<U256> {
        self.request_u256("eth_getBalance", json!([address, "latest"]))
            .await
    }

    /// 已确认交易数（pending 标签，作为下一个 nonce 使用）
    pub async fn get_transaction_count(&self, address: &str) -> EngineResult<u64> {
        let count = self
            .request_u256("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        quantity_to_u64(count, "transaction count")
    }

    /// 地址上的合约字节码（空串表示外部账户）
    pub async fn get_code(&self, address: &str) -> EngineResult<Vec<u8>> {
        let result = self.request("eth_getCode", json!([address, "latest"])).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| EngineError::RpcUnavailable("eth_getCode returned non-string".into()))?;
        hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|_| EngineError::RpcUnavailable("eth_getCode returned invalid hex".into()))
    }

    /// 当前建议 gas price（wei）
    pub async fn gas_price(&self) -> EngineResult<U256> {
        self.request_u256("eth_gasPrice", json!([])).await
    }

    /// 最新区块号 + 时间戳（swap deadline 以链上时间为基准）
    pub async fn latest_block(&self) -> EngineResult<BlockInfo> {
        let result = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;

        let number = result
            .get("number")
            .map(parse_quantity)
            .transpose()?
            .ok_or_else(|| EngineError::RpcUnavailable("block missing number".into()))?;
        let timestamp = result
            .get("timestamp")
            .map(parse_quantity)
            .transpose()?
            .ok_or_else(|| EngineError::RpcUnavailable("block missing timestamp".into()))?;

        Ok(BlockInfo {
            number: quantity_to_u64(number, "block number")?,
            timestamp: quantity_to_u64(timestamp, "block timestamp")?,
        })
    }

    /// 只读合约调用，返回原始返回数据
    pub async fn call(&self, to: &str, data: &[u8]) -> EngineResult<Vec<u8>> {
        let params = json!([
            {
                "to": to,
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| EngineError::RpcUnavailable("eth_call returned non-string".into()))?;
        hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|_| EngineError::RpcUnavailable("eth_call returned invalid hex".into()))
    }

    /// gas 预估
    pub async fn estimate_gas(&self, params: &CallParams) -> EngineResult<U256> {
        let mut obj = serde_json::Map::new();
        if let Some(from) = &params.from {
            obj.insert("from".into(), json!(from));
        }
        obj.insert("to".into(), json!(params.to));
        if !params.value.is_zero() {
            obj.insert("value".into(), json!(format!("{:#x}", params.value)));
        }
        if !params.data.is_empty() {
            obj.insert("data".into(), json!(format!("0x{}", hex::encode(&params.data))));
        }

        self.request_u256("eth_estimateGas", json!([Value::Object(obj)]))
            .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 交易广播与回执
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 广播已签名交易，返回交易哈希
    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> EngineResult<String> {
        let raw_hex = format!("0x{}", hex::encode(raw_tx));
        let result = self
            .request("eth_sendRawTransaction", json!([raw_hex]))
            .await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                EngineError::RpcUnavailable("eth_sendRawTransaction returned non-string".into())
            })
    }

    /// 单次回执查询；None 表示交易尚未打包
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> EngineResult<Option<TransactionReceipt>> {
        let result = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        parse_receipt(tx_hash, &result).map(Some)
    }

    /// 轮询直到交易上链或超时。timeout_secs 覆盖配置的默认超时。
    pub async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        timeout_secs: Option<u64>,
    ) -> EngineResult<TransactionReceipt> {
        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.receipt_timeout);
        let deadline = Instant::now() + timeout;

        loop {
            match self.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                // 轮询期间的瞬时网络错误不终止等待
                Err(EngineError::RpcUnavailable(reason)) => {
                    tracing::warn!(tx_hash = %tx_hash, reason = %reason, "receipt poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(EngineError::TransactionTimeout {
                    tx_hash: tx_hash.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            sleep(self.receipt_poll_interval).await;
        }
    }
}

/// U256 quantity -> u64；超出 64 位说明节点返回了异常数据
pub(crate) fn quantity_to_u64(value: U256, what: &str) -> EngineResult<u64> {
    if value.bits() > 64 {
        return Err(EngineError::RpcError {
            code: -1,
            message: format!("{what} exceeds 64 bits: {value}"),
        });
    }
    Ok(value.as_u64())
}

/// 解析 0x 开头的 JSON-RPC quantity
fn parse_quantity(value: &Value) -> EngineResult<U256> {
    let s = value
        .as_str()
        .ok_or_else(|| EngineError::RpcUnavailable("expected hex quantity string".into()))?;
    U256::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| EngineError::RpcUnavailable(format!("invalid hex quantity: {s}")))
}

fn parse_receipt(tx_hash: &str, receipt: &Value) -> EngineResult<TransactionReceipt> {
    let block_number = receipt
        .get("blockNumber")
        .map(parse_quantity)
        .transpose()?
        .ok_or_else(|| EngineError::RpcUnavailable("receipt missing blockNumber".into()))?;
    let status = receipt
        .get("status")
        .map(parse_quantity)
        .transpose()?
        .ok_or_else(|| EngineError::RpcUnavailable("receipt missing status".into()))?;
    let gas_used = receipt
        .get("gasUsed")
        .map(parse_quantity)
        .transpose()?
        .unwrap_or_default();
    let logs = receipt
        .get("logs")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(TransactionReceipt {
        tx_hash: tx_hash.to_string(),
        block_number: quantity_to_u64(block_number, "receipt blockNumber")?,
        status: quantity_to_u64(status, "receipt status")?,
        gas_used,
        logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), U256::zero());
        assert_eq!(parse_quantity(&json!("0x1b4")).unwrap(), U256::from(436u64));
        assert!(parse_quantity(&json!("not-hex")).is_err());
        assert!(parse_quantity(&json!(42)).is_err());
    }

    #[test]
    fn test_quantity_to_u64_bounds() {
        assert_eq!(quantity_to_u64(U256::zero(), "n").unwrap(), 0);
        assert_eq!(
            quantity_to_u64(U256::from(u64::MAX), "n").unwrap(),
            u64::MAX
        );
        // u64::MAX + 1 超出 64 位，必须报错而不是截断
        let too_big = U256::from(u64::MAX) + U256::one();
        assert!(matches!(
            quantity_to_u64(too_big, "n"),
            Err(EngineError::RpcError { .. })
        ));
    }

    #[test]
    fn test_parse_successful_receipt() {
        let receipt_json = json!({
            "blockNumber": "0x10",
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": [{
                "address": "0x3535353535353535353535353535353535353535",
                "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
                "data": "0x"
            }]
        });
        let receipt = parse_receipt("0xabc", &receipt_json).unwrap();
        assert_eq!(receipt.block_number, 16);
        assert!(receipt.is_success());
        assert_eq!(receipt.gas_used, U256::from(21_000u64));
        // 事件日志原样保留
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(
            receipt.logs[0]["address"],
            json!("0x3535353535353535353535353535353535353535")
        );
    }

    #[test]
    fn test_receipt_rejects_oversized_block_number() {
        // 超过 64 位的区块号是节点异常数据
        let receipt_json = json!({
            "blockNumber": "0x100000000000000000000",
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": []
        });
        assert!(matches!(
            parse_receipt("0xabc", &receipt_json),
            Err(EngineError::RpcError { .. })
        ));
    }

    #[test]
    fn test_parse_reverted_receipt() {
        let receipt_json = json!({
            "blockNumber": "0x20",
            "status": "0x0",
            "gasUsed": "0x49300"
        });
        let receipt = parse_receipt("0xdef", &receipt_json).unwrap();
        assert!(!receipt.is_success());
    }

    #[test]
    fn test_receipt_missing_fields_rejected() {
        assert!(parse_receipt("0xabc", &json!({"status": "0x1"})).is_err());
    }
}
