//! 交易所服务
//!
//! Uniswap-v2 风格路由合约的无状态封装：报价视图、授权、swap、流动性管理。
//! 引擎不做任何 AMM 数学，定价全部由链上 getAmountsOut/getAmountsIn 给出。
//! 金额一律使用代币最小单位（U256），精度换算由调用方负责。

use ethers::abi::Token;
use ethers::types::{Address, U256};

use crate::config::Config;
use crate::domain::account::Wallet;
use crate::error::{EngineError, EngineResult};
use crate::service::rpc_client::{RpcClient, TransactionReceipt};
use crate::service::transaction_builder::SignableTransaction;
use crate::utils::{abi, address};

pub struct ExchangeService {
    rpc: RpcClient,
    chain_id: u64,
    router: String,
    router_gas_limit: u64,
}

impl ExchangeService {
    /// 路由地址在构造时校验，非法配置直接拒绝启动
    pub fn new(config: &Config) -> EngineResult<Self> {
        let router = address::to_checksum_address(&config.exchange.router_address)?;

        Ok(Self {
            rpc: RpcClient::new(&config.chain),
            chain_id: config.chain.chain_id,
            router,
            router_gas_limit: config.exchange.router_gas_limit,
        })
    }

    pub fn router_address(&self) -> &str {
        &self.router
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 只读视图
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 路由的 wrapped-native 代币地址
    pub async fn weth_address(&self) -> EngineResult<String> {
        let data = self.router_view(&abi::encode_call("WETH()", &[])).await?;
        let addr = abi::decode_address(&data)?;
        address::to_checksum_address(&format!("0x{}", hex::encode(addr.as_bytes())))
    }

    /// 工厂合约地址
    pub async fn factory_address(&self) -> EngineResult<String> {
        let data = self.router_view(&abi::encode_call("factory()", &[])).await?;
        let addr = abi::decode_address(&data)?;
        address::to_checksum_address(&format!("0x{}", hex::encode(addr.as_bytes())))
    }

    /// quote：按储备比例换算（不含手续费）
    pub async fn quote(&self, amount_a: U256, reserve_a: U256, reserve_b: U256) -> EngineResult<U256> {
        let data = abi::encode_call(
            "quote(uint256,uint256,uint256)",
            &[
                Token::Uint(amount_a),
                Token::Uint(reserve_a),
                Token::Uint(reserve_b),
            ],
        );
        abi::decode_uint(&self.router_view(&data).await?)
    }

    /// getAmountOut：单跳输出金额（含手续费）
    pub async fn amount_out(
        &self,
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> EngineResult<U256> {
        let data = abi::encode_call(
            "getAmountOut(uint256,uint256,uint256)",
            &[
                Token::Uint(amount_in),
                Token::Uint(reserve_in),
                Token::Uint(reserve_out),
            ],
        );
        abi::decode_uint(&self.router_view(&data).await?)
    }

    /// getAmountIn：单跳所需输入金额
    pub async fn amount_in(
        &self,
        amount_out: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> EngineResult<U256> {
        let data = abi::encode_call(
            "getAmountIn(uint256,uint256,uint256)",
            &[
                Token::Uint(amount_out),
                Token::Uint(reserve_in),
                Token::Uint(reserve_out),
            ],
        );
        abi::decode_uint(&self.router_view(&data).await?)
    }

    /// getAmountsOut：给定输入沿路径的逐跳输出
    ///
    /// 路径上没有流动性池时合约回滚，映射为 NoLiquidityOrInvalidPath。
    pub async fn amounts_out(&self, amount_in: U256, path: &[String]) -> EngineResult<Vec<U256>> {
        let path_tokens = parse_path(path)?;
        let data = abi::encode_call(
            "getAmountsOut(uint256,address[])",
            &[Token::Uint(amount_in), Token::Array(path_tokens)],
        );
        let result = self.router_view(&data).await.map_err(map_liquidity_error)?;
        abi::decode_uint_array(&result)
    }

    /// getAmountsIn：给定输出沿路径的逐跳所需输入
    pub async fn amounts_in(&self, amount_out: U256, path: &[String]) -> EngineResult<Vec<U256>> {
        let path_tokens = parse_path(path)?;
        let data = abi::encode_call(
            "getAmountsIn(uint256,address[])",
            &[Token::Uint(amount_out), Token::Array(path_tokens)],
        );
        let result = self.router_view(&data).await.map_err(map_liquidity_error)?;
        abi::decode_uint_array(&result)
    }

    /// owner 对 spender 的当前授权额度
    pub async fn allowance(&self, token: &str, owner: &str, spender: &str) -> EngineResult<U256> {
        let token = address::to_checksum_address(token)?;
        let owner_parsed = parse_address(owner)?;
        let spender_parsed = parse_address(spender)?;

        let data = self
            .rpc
            .call(&token, &abi::erc20::allowance(owner_parsed, spender_parsed))
            .await?;
        abi::decode_uint(&data)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 授权
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 授权任意 spender
    pub async fn approve_token(
        &self,
        wallet: &Wallet,
        token: &str,
        spender: &str,
        amount: U256,
    ) -> EngineResult<TransactionReceipt> {
        let token = address::to_checksum_address(token)?;
        let spender_parsed = parse_address(spender)?;

        let data = abi::erc20::approve(spender_parsed, amount);
        self.send_contract_tx(wallet, &token, U256::zero(), data, "approve")
            .await
    }

    /// 授权路由合约（swap/流动性操作的前置步骤）
    pub async fn approve_router_for_token(
        &self,
        wallet: &Wallet,
        token: &str,
        amount: U256,
    ) -> EngineResult<TransactionReceipt> {
        let router = self.router.clone();
        self.approve_token(wallet, token, &router, amount).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // swap
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// token -> token 精确输入 swap
    pub async fn swap_exact_tokens_for_tokens(
        &self,
        wallet: &Wallet,
        amount_in: U256,
        amount_out_min: U256,
        path: &[String],
        deadline_secs: u64,
    ) -> EngineResult<TransactionReceipt> {
        let path_tokens = parse_path(path)?;
        let recipient = parse_address(wallet.address())?;
        let deadline = self.deadline(deadline_secs).await?;

        let data = abi::encode_call(
            "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)",
            &[
                Token::Uint(amount_in),
                Token::Uint(amount_out_min),
                Token::Array(path_tokens),
                Token::Address(recipient),
                Token::Uint(deadline),
            ],
        );
        self.send_contract_tx(wallet, &self.router, U256::zero(), data, "swap")
            .await
    }

    /// 原生币 -> token swap（输入金额随交易 value 发送，路径首项须为 WETH）
    pub async fn swap_exact_eth_for_tokens(
        &self,
        wallet: &Wallet,
        amount_in_wei: U256,
        amount_out_min: U256,
        path: &[String],
        deadline_secs: u64,
    ) -> EngineResult<TransactionReceipt> {
        let path_tokens = parse_path(path)?;
        let recipient = parse_address(wallet.address())?;
        let deadline = self.deadline(deadline_secs).await?;

        let data = abi::encode_call(
            "swapExactETHForTokens(uint256,address[],address,uint256)",
            &[
                Token::Uint(amount_out_min),
                Token::Array(path_tokens),
                Token::Address(recipient),
                Token::Uint(deadline),
            ],
        );
        self.send_contract_tx(wallet, &self.router, amount_in_wei, data, "swap")
            .await
    }

    /// token -> 原生币 swap（路径末项须为 WETH）
    pub async fn swap_exact_tokens_for_eth(
        &self,
        wallet: &Wallet,
        amount_in: U256,
        amount_out_min: U256,
        path: &[String],
        deadline_secs: u64,
    ) -> EngineResult<TransactionReceipt> {
        let path_tokens = parse_path(path)?;
        let recipient = parse_address(wallet.address())?;
        let deadline = self.deadline(deadline_secs).await?;

        let data = abi::encode_call(
            "swapExactTokensForETH(uint256,uint256,address[],address,uint256)",
            &[
                Token::Uint(amount_in),
                Token::Uint(amount_out_min),
                Token::Array(path_tokens),
                Token::Address(recipient),
                Token::Uint(deadline),
            ],
        );
        self.send_contract_tx(wallet, &self.router, U256::zero(), data, "swap")
            .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 流动性
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    #[allow(clippy::too_many_arguments)]
    pub async fn add_liquidity(
        &self,
        wallet: &Wallet,
        token_a: &str,
        token_b: &str,
        amount_a_desired: U256,
        amount_b_desired: U256,
        amount_a_min: U256,
        amount_b_min: U256,
        deadline_secs: u64,
    ) -> EngineResult<TransactionReceipt> {
        let token_a_parsed = parse_address(token_a)?;
        let token_b_parsed = parse_address(token_b)?;
        let recipient = parse_address(wallet.address())?;
        let deadline = self.deadline(deadline_secs).await?;

        let data = abi::encode_call(
            "addLiquidity(address,address,uint256,uint256,uint256,uint256,address,uint256)",
            &[
                Token::Address(token_a_parsed),
                Token::Address(token_b_parsed),
                Token::Uint(amount_a_desired),
                Token::Uint(amount_b_desired),
                Token::Uint(amount_a_min),
                Token::Uint(amount_b_min),
                Token::Address(recipient),
                Token::Uint(deadline),
            ],
        );
        self.send_contract_tx(wallet, &self.router, U256::zero(), data, "add_liquidity")
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn remove_liquidity(
        &self,
        wallet: &Wallet,
        token_a: &str,
        token_b: &str,
        liquidity: U256,
        amount_a_min: U256,
        amount_b_min: U256,
        deadline_secs: u64,
    ) -> EngineResult<TransactionReceipt> {
        let token_a_parsed = parse_address(token_a)?;
        let token_b_parsed = parse_address(token_b)?;
        let recipient = parse_address(wallet.address())?;
        let deadline = self.deadline(deadline_secs).await?;

        let data = abi::encode_call(
            "removeLiquidity(address,address,uint256,uint256,uint256,address,uint256)",
            &[
                Token::Address(token_a_parsed),
                Token::Address(token_b_parsed),
                Token::Uint(liquidity),
                Token::Uint(amount_a_min),
                Token::Uint(amount_b_min),
                Token::Address(recipient),
                Token::Uint(deadline),
            ],
        );
        self.send_contract_tx(
            wallet,
            &self.router,
            U256::zero(),
            data,
            "remove_liquidity",
        )
        .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 内部工具
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn router_view(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        self.rpc.call(&self.router, data).await
    }

    /// deadline 以链上最新区块时间为基准，不依赖本机时钟
    async fn deadline(&self, deadline_secs: u64) -> EngineResult<U256> {
        let block = self.rpc.latest_block().await?;
        Ok(U256::from(block.timestamp + deadline_secs))
    }

    /// 统一的合约交易流程：nonce + gas price -> 签名 -> 广播 -> 等待回执
    async fn send_contract_tx(
        &self,
        wallet: &Wallet,
        to: &str,
        value: U256,
        data: Vec<u8>,
        kind: &str,
    ) -> EngineResult<TransactionReceipt> {
        let nonce = self.rpc.get_transaction_count(wallet.address()).await?;
        let gas_price = self.rpc.gas_price().await?;

        let tx = SignableTransaction {
            nonce,
            gas_price,
            gas_limit: self.router_gas_limit,
            to: to.to_string(),
            value,
            data,
            chain_id: self.chain_id,
        };

        let raw = tx.sign(wallet.signing_key())?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;

        tracing::info!(
            kind = kind,
            tx_hash = %tx_hash,
            from = %wallet.address(),
            to = %to,
            nonce = nonce,
            "exchange transaction broadcast"
        );

        let receipt = self.rpc.wait_for_receipt(&tx_hash, None).await?;
        if !receipt.is_success() {
            return Err(EngineError::TransactionReverted {
                tx_hash: receipt.tx_hash,
            });
        }
        Ok(receipt)
    }
}

/// swap 路径校验：至少两个合法地址，校验先于任何网络调用
fn parse_path(path: &[String]) -> EngineResult<Vec<Token>> {
    if path.len() < 2 {
        return Err(EngineError::InvalidSwapPath(path.len()));
    }
    path.iter()
        .map(|addr| parse_address(addr).map(Token::Address))
        .collect()
}

fn parse_address(addr: &str) -> EngineResult<Address> {
    if !address::is_valid_address(addr) {
        return Err(EngineError::InvalidAddress(addr.to_string()));
    }
    addr.parse()
        .map_err(|_| EngineError::InvalidAddress(addr.to_string()))
}

/// 报价视图回滚通常意味着路径上没有池子
fn map_liquidity_error(err: EngineError) -> EngineError {
    match err {
        EngineError::RpcError { message, .. } => EngineError::NoLiquidityOrInvalidPath(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn offline_service() -> ExchangeService {
        let mut config = Config::default();
        config.chain.rpc_url = "http://127.0.0.1:1".into();
        config.chain.request_timeout_secs = 1;
        ExchangeService::new(&config).unwrap()
    }

    #[test]
    fn test_constructor_rejects_bad_router() {
        let mut config = Config::default();
        config.exchange.router_address = "0xdeadbeef".into();
        assert!(matches!(
            ExchangeService::new(&config),
            Err(EngineError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_router_address_checksummed() {
        let service = offline_service();
        assert_eq!(
            service.router_address(),
            "0xb98c15a0dC1e271132e341250703c7e94c059e8D"
        );
    }

    #[tokio::test]
    async fn test_short_path_rejected_before_network() {
        let service = offline_service();
        let err = service
            .amounts_out(U256::one(), &["0x3535353535353535353535353535353535353535".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSwapPath(1)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_bad_path_address_rejected_before_network() {
        let service = offline_service();
        let err = service
            .amounts_out(
                U256::one(),
                &[
                    "0x3535353535353535353535353535353535353535".into(),
                    "garbage".into(),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAddress(_)));
    }

    #[test]
    fn test_liquidity_error_mapping() {
        let mapped = map_liquidity_error(EngineError::RpcError {
            code: 3,
            message: "execution reverted".into(),
        });
        assert!(matches!(mapped, EngineError::NoLiquidityOrInvalidPath(_)));

        let passthrough = map_liquidity_error(EngineError::RpcUnavailable("timeout".into()));
        assert!(matches!(passthrough, EngineError::RpcUnavailable(_)));
    }
}
