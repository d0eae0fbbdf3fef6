//! 账户服务
//!
//! 账户创建/导入、余额与组合查询、原生币与 ERC-20 转账。
//! 所有输入校验在任何网络调用之前完成。
//! 转账默认在广播后立即返回交易哈希，等待上链由调用方通过
//! `wait_for_transaction` 显式选择。

use ethers::types::U256;

use crate::config::Config;
use crate::domain::account::{
    AccountSnapshot, CreatedAccount, MaxSendable, Portfolio, TokenBalance, TokenBalanceBatch,
    TransferAmount, Wallet,
};
use crate::domain::keys;
use crate::error::{EngineError, EngineResult};
use crate::service::rpc_client::{quantity_to_u64, CallParams, RpcClient, TransactionReceipt};
use crate::service::transaction_builder::SignableTransaction;
use crate::utils::{abi, address, units};

/// 原生币转账的默认 gas limit
const NATIVE_TRANSFER_GAS: u64 = 21_000;

pub struct AccountService {
    rpc: RpcClient,
    chain_id: u64,
}

impl AccountService {
    pub fn new(config: &Config) -> Self {
        Self {
            rpc: RpcClient::new(&config.chain),
            chain_id: config.chain.chain_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 账户创建与导入
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 创建新账户：生成助记词并派生密钥，再拉取链上余额/nonce 快照。
    /// 助记词只在这里返回一次。
    pub async fn create_account(&self) -> EngineResult<CreatedAccount> {
        let mnemonic = keys::generate_mnemonic()?;
        let wallet = Wallet::from_mnemonic(&mnemonic)?;

        tracing::info!(address = %wallet.address(), "created new account");
        self.enrich_created(wallet, Some(mnemonic)).await
    }

    /// 从私钥导入
    pub async fn import_from_private_key(&self, private_key: &str) -> EngineResult<CreatedAccount> {
        let wallet = Wallet::from_private_key(private_key)?;
        self.enrich_created(wallet, None).await
    }

    /// 从助记词导入（m/44'/60'/0'/0/0）
    pub async fn import_from_mnemonic(&self, phrase: &str) -> EngineResult<CreatedAccount> {
        let wallet = Wallet::from_mnemonic(phrase)?;
        self.enrich_created(wallet, Some(phrase.trim().to_string()))
            .await
    }

    async fn enrich_created(
        &self,
        wallet: Wallet,
        mnemonic: Option<String>,
    ) -> EngineResult<CreatedAccount> {
        let balance_wei = self.rpc.get_balance(wallet.address()).await?;
        let nonce = self.rpc.get_transaction_count(wallet.address()).await?;

        Ok(CreatedAccount {
            address: wallet.address().to_string(),
            private_key: wallet.private_key(),
            mnemonic,
            balance: units::wei_to_native(balance_wei),
            balance_wei,
            nonce,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 查询
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 原生币余额（wei）
    pub async fn native_balance_wei(&self, addr: &str) -> EngineResult<U256> {
        let checksummed = address::to_checksum_address(addr)?;
        self.rpc.get_balance(&checksummed).await
    }

    /// 原生币余额（人类可读）
    pub async fn native_balance(&self, addr: &str) -> EngineResult<String> {
        Ok(units::wei_to_native(self.native_balance_wei(addr).await?))
    }

    /// 已确认交易数
    pub async fn transaction_count(&self, addr: &str) -> EngineResult<u64> {
        let checksummed = address::to_checksum_address(addr)?;
        self.rpc.get_transaction_count(&checksummed).await
    }

    /// 地址上是否部署了合约。地址非法时报错；RPC 失败时降级为 false。
    pub async fn is_contract(&self, addr: &str) -> EngineResult<bool> {
        let checksummed = address::to_checksum_address(addr)?;
        match self.rpc.get_code(&checksummed).await {
            Ok(code) => Ok(!code.is_empty()),
            Err(e) => {
                tracing::warn!(address = %checksummed, error = %e, "get_code failed, assuming EOA");
                Ok(false)
            }
        }
    }

    /// 账户快照：余额 + nonce + 合约标记
    pub async fn snapshot(&self, addr: &str) -> EngineResult<AccountSnapshot> {
        let checksummed = address::to_checksum_address(addr)?;
        let balance_wei = self.rpc.get_balance(&checksummed).await?;
        let nonce = self.rpc.get_transaction_count(&checksummed).await?;
        let is_contract = self.is_contract(&checksummed).await?;

        Ok(AccountSnapshot {
            address: checksummed,
            balance: units::wei_to_native(balance_wei),
            balance_wei,
            nonce,
            is_contract,
        })
    }

    /// 单个代币的余额与元数据
    pub async fn token_balance(&self, owner: &str, token: &str) -> EngineResult<TokenBalance> {
        let owner = address::to_checksum_address(owner)?;
        let token = address::to_checksum_address(token)?;
        self.query_token(&owner, &token).await
    }

    /// 批量代币查询：单个代币失败只记录原因，不拖垮整批
    pub async fn token_balances(
        &self,
        owner: &str,
        tokens: &[String],
    ) -> EngineResult<TokenBalanceBatch> {
        let owner = address::to_checksum_address(owner)?;
        let mut batch = TokenBalanceBatch::default();

        for token in tokens {
            let checksummed = match address::to_checksum_address(token) {
                Ok(addr) => addr,
                Err(e) => {
                    batch.skipped.push((token.clone(), e.to_string()));
                    continue;
                }
            };
            match self.query_token(&owner, &checksummed).await {
                Ok(balance) => batch.balances.push(balance),
                Err(e) => {
                    tracing::warn!(token = %checksummed, error = %e, "token query skipped");
                    batch.skipped.push((checksummed, e.to_string()));
                }
            }
        }

        Ok(batch)
    }

    /// 组合视图：原生币 + nonce + 指定代币列表
    pub async fn portfolio(&self, owner: &str, tokens: &[String]) -> EngineResult<Portfolio> {
        let checksummed = address::to_checksum_address(owner)?;
        let native_balance_wei = self.rpc.get_balance(&checksummed).await?;
        let nonce = self.rpc.get_transaction_count(&checksummed).await?;
        let batch = self.token_balances(&checksummed, tokens).await?;

        Ok(Portfolio {
            address: checksummed,
            native_balance: units::wei_to_native(native_balance_wei),
            native_balance_wei,
            nonce,
            tokens: batch.balances,
            skipped_tokens: batch.skipped,
        })
    }

    async fn query_token(&self, owner: &str, token: &str) -> EngineResult<TokenBalance> {
        let fail = |reason: String| EngineError::TokenQueryFailed {
            token: token.to_string(),
            reason,
        };

        let owner_parsed = owner
            .parse()
            .map_err(|_| EngineError::InvalidAddress(owner.to_string()))?;

        let raw_balance = self
            .rpc
            .call(token, &abi::erc20::balance_of(owner_parsed))
            .await
            .and_then(|data| abi::decode_uint(&data))
            .map_err(|e| fail(format!("balanceOf: {e}")))?;

        let decimals = self
            .rpc
            .call(token, &abi::erc20::decimals())
            .await
            .and_then(|data| abi::decode_uint(&data))
            .map_err(|e| fail(format!("decimals: {e}")))?;
        if decimals > U256::from(77u64) {
            return Err(fail(format!("unsupported decimals {decimals}")));
        }
        let decimals = decimals.as_u32();

        let symbol = self
            .rpc
            .call(token, &abi::erc20::symbol())
            .await
            .and_then(|data| abi::decode_string(&data))
            .map_err(|e| fail(format!("symbol: {e}")))?;

        let name = self
            .rpc
            .call(token, &abi::erc20::name())
            .await
            .and_then(|data| abi::decode_string(&data))
            .map_err(|e| fail(format!("name: {e}")))?;

        Ok(TokenBalance {
            token_address: token.to_string(),
            symbol,
            name,
            decimals,
            balance: units::format_base_units(raw_balance, decimals),
            raw_balance,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 转账
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// MAX 模式预算：balance - 21000 * gas_price
    pub async fn max_sendable_native(&self, addr: &str) -> EngineResult<MaxSendable> {
        let checksummed = address::to_checksum_address(addr)?;
        let balance_wei = self.rpc.get_balance(&checksummed).await?;
        let gas_price = self.rpc.gas_price().await?;
        let gas_cost_wei = gas_price * U256::from(NATIVE_TRANSFER_GAS);

        if balance_wei <= gas_cost_wei {
            return Err(EngineError::InsufficientFundsForGas {
                balance: balance_wei,
                gas_cost: gas_cost_wei,
            });
        }

        Ok(MaxSendable {
            balance_wei,
            gas_cost_wei,
            sendable_wei: balance_wei - gas_cost_wei,
        })
    }

    /// 原生币转账，广播后立即返回交易哈希。
    ///
    /// amount 为 MAX 时发送扣除 gas 后的全部余额；
    /// gas_limit/gas_price 缺省时分别取 21000 和节点报价。
    pub async fn send_native(
        &self,
        wallet: &Wallet,
        to: &str,
        amount: TransferAmount,
        gas_limit: Option<u64>,
        gas_price: Option<U256>,
    ) -> EngineResult<String> {
        let to = address::to_checksum_address(to)?;

        // 金额解析先于任何网络调用
        let exact_wei = match &amount {
            TransferAmount::Max => None,
            TransferAmount::Exact(s) => Some(units::native_to_wei(s)?),
        };

        let gas_limit = gas_limit.unwrap_or(NATIVE_TRANSFER_GAS);
        let gas_price = match gas_price {
            Some(p) => p,
            None => self.rpc.gas_price().await?,
        };
        let balance = self.rpc.get_balance(wallet.address()).await?;
        let gas_cost = gas_price * U256::from(gas_limit);

        let value = match exact_wei {
            None => {
                if balance <= gas_cost {
                    return Err(EngineError::InsufficientFundsForGas { balance, gas_cost });
                }
                balance - gas_cost
            }
            Some(wei) => {
                let required = wei.saturating_add(gas_cost);
                if balance < required {
                    return Err(EngineError::InsufficientBalance {
                        available: balance,
                        required,
                    });
                }
                wei
            }
        };

        let nonce = self.rpc.get_transaction_count(wallet.address()).await?;
        let tx = SignableTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data: vec![],
            chain_id: self.chain_id,
        };

        self.broadcast(wallet, tx, "native transfer").await
    }

    /// ERC-20 转账，广播后立即返回交易哈希。
    ///
    /// amount 为 MAX 时发送全部代币余额；gas 仍由原生币支付，
    /// 原生币余额不足以覆盖 gas 时拒绝。
    pub async fn send_token(
        &self,
        wallet: &Wallet,
        token: &str,
        to: &str,
        amount: TransferAmount,
        gas_limit: Option<u64>,
        gas_price: Option<U256>,
    ) -> EngineResult<String> {
        let token = address::to_checksum_address(token)?;
        let to = address::to_checksum_address(to)?;
        let to_parsed = to
            .parse()
            .map_err(|_| EngineError::InvalidAddress(to.clone()))?;

        let info = self.token_balance(wallet.address(), &token).await?;

        let raw_amount = match &amount {
            TransferAmount::Max => info.raw_balance,
            TransferAmount::Exact(s) => units::parse_base_units(s, info.decimals)?,
        };

        // MAX 模式下余额为零没有可发送的量；显式的 0 转账是合法的 ERC-20 调用
        if matches!(amount, TransferAmount::Max) && raw_amount.is_zero() {
            return Err(EngineError::InsufficientBalance {
                available: U256::zero(),
                required: U256::one(),
            });
        }
        if info.raw_balance < raw_amount {
            return Err(EngineError::InsufficientBalance {
                available: info.raw_balance,
                required: raw_amount,
            });
        }

        let data = abi::erc20::transfer(to_parsed, raw_amount);
        let gas_price = match gas_price {
            Some(p) => p,
            None => self.rpc.gas_price().await?,
        };
        let gas_limit = match gas_limit {
            Some(limit) => limit,
            None => {
                let estimated = self
                    .rpc
                    .estimate_gas(&CallParams {
                        from: Some(wallet.address().to_string()),
                        to: token.clone(),
                        value: U256::zero(),
                        data: data.clone(),
                    })
                    .await?;
                quantity_to_u64(estimated, "gas estimate")?
            }
        };

        // gas 由原生币支付
        let native_balance = self.rpc.get_balance(wallet.address()).await?;
        let gas_cost = gas_price * U256::from(gas_limit);
        if native_balance < gas_cost {
            return Err(EngineError::InsufficientFundsForGas {
                balance: native_balance,
                gas_cost,
            });
        }

        let nonce = self.rpc.get_transaction_count(wallet.address()).await?;
        let tx = SignableTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: token,
            value: U256::zero(),
            data,
            chain_id: self.chain_id,
        };

        self.broadcast(wallet, tx, "token transfer").await
    }

    /// 原生币转账 gas 预估（与固定 21000 取大者）
    pub async fn estimate_gas_native(&self, from: &str, to: &str, value: U256) -> EngineResult<u64> {
        let from = address::to_checksum_address(from)?;
        let to = address::to_checksum_address(to)?;
        let estimated = self
            .rpc
            .estimate_gas(&CallParams {
                from: Some(from),
                to,
                value,
                data: vec![],
            })
            .await?;
        Ok(quantity_to_u64(estimated, "gas estimate")?.max(NATIVE_TRANSFER_GAS))
    }

    /// ERC-20 transfer gas 预估
    pub async fn estimate_gas_token_transfer(
        &self,
        from: &str,
        token: &str,
        to: &str,
        raw_amount: U256,
    ) -> EngineResult<u64> {
        let from = address::to_checksum_address(from)?;
        let token = address::to_checksum_address(token)?;
        let to = address::to_checksum_address(to)?;
        let to_parsed = to
            .parse()
            .map_err(|_| EngineError::InvalidAddress(to.clone()))?;

        let estimated = self
            .rpc
            .estimate_gas(&CallParams {
                from: Some(from),
                to: token,
                value: U256::zero(),
                data: abi::erc20::transfer(to_parsed, raw_amount),
            })
            .await?;
        quantity_to_u64(estimated, "gas estimate")
    }

    /// 等待指定交易上链（status=0 时报 TransactionReverted）
    pub async fn wait_for_transaction(
        &self,
        tx_hash: &str,
        timeout_secs: Option<u64>,
    ) -> EngineResult<TransactionReceipt> {
        let receipt = self.rpc.wait_for_receipt(tx_hash, timeout_secs).await?;
        if !receipt.is_success() {
            return Err(EngineError::TransactionReverted {
                tx_hash: receipt.tx_hash,
            });
        }
        Ok(receipt)
    }

    async fn broadcast(
        &self,
        wallet: &Wallet,
        tx: SignableTransaction,
        kind: &str,
    ) -> EngineResult<String> {
        let raw = tx.sign(wallet.signing_key())?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;

        tracing::info!(
            kind = kind,
            tx_hash = %tx_hash,
            from = %wallet.address(),
            to = %tx.to,
            nonce = tx.nonce,
            "transaction broadcast"
        );

        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn offline_service() -> AccountService {
        let mut config = Config::default();
        // 不可路由的地址：所有触网路径立即失败
        config.chain.rpc_url = "http://127.0.0.1:1".into();
        config.chain.request_timeout_secs = 1;
        AccountService::new(&config)
    }

    #[tokio::test]
    async fn test_create_account_needs_live_node() {
        // 快照拉取失败时创建失败（密钥派生本身不触网，见 domain 测试）
        let service = offline_service();
        let err = service.create_account().await.unwrap_err();
        assert!(matches!(err, EngineError::RpcUnavailable(_)));
    }

    #[tokio::test]
    async fn test_import_validates_before_network() {
        let service = offline_service();
        // 非法输入在任何 RPC 调用之前被拒绝
        assert!(matches!(
            service.import_from_mnemonic("nope nope nope").await,
            Err(EngineError::InvalidMnemonic(_))
        ));
        assert!(matches!(
            service.import_from_private_key("0x1234").await,
            Err(EngineError::InvalidKeyFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_rejects_invalid_address_before_network() {
        let service = offline_service();
        let err = service.native_balance("0x123").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidAddress(_)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_send_native_rejects_bad_amount_before_network() {
        let service = offline_service();
        let wallet = Wallet::from_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let err = service
            .send_native(
                &wallet,
                "0x3535353535353535353535353535353535353535",
                TransferAmount::Exact("abc".into()),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
    }

    #[tokio::test]
    async fn test_token_balances_skips_invalid_addresses() {
        let service = offline_service();
        let owner = "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F";
        let tokens = vec!["0x123".to_string(), "not-an-address".to_string()];
        let batch = service.token_balances(owner, &tokens).await.unwrap();
        assert!(batch.balances.is_empty());
        assert_eq!(batch.skipped.len(), 2);
    }
}
