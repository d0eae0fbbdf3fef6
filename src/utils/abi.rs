//! ABI 编码/解码模块
//!
//! 引擎只负责 ABI 编码与调用，不实现任何 AMM 定价逻辑。
//! 函数选择器 = Keccak-256(签名) 前 4 字节；参数编码交给 ethers-abi。

use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, U256};
use sha3::{Digest, Keccak256};

use crate::error::{EngineError, EngineResult};

/// 计算函数选择器
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// 选择器 + ABI 编码参数 = 完整 calldata
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

fn decode_error(what: &str) -> EngineError {
    EngineError::RpcError {
        code: -1,
        message: format!("failed to decode {what} from contract return data"),
    }
}

/// 解码单个 uint256 返回值
pub fn decode_uint(data: &[u8]) -> EngineResult<U256> {
    let tokens = decode(&[ParamType::Uint(256)], data).map_err(|_| decode_error("uint256"))?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| decode_error("uint256"))
}

/// 解码单个 address 返回值
pub fn decode_address(data: &[u8]) -> EngineResult<Address> {
    let tokens = decode(&[ParamType::Address], data).map_err(|_| decode_error("address"))?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| decode_error("address"))
}

/// 解码单个 string 返回值
pub fn decode_string(data: &[u8]) -> EngineResult<String> {
    let tokens = decode(&[ParamType::String], data).map_err(|_| decode_error("string"))?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_string)
        .ok_or_else(|| decode_error("string"))
}

/// 解码 uint256[] 返回值（getAmountsOut/getAmountsIn）
pub fn decode_uint_array(data: &[u8]) -> EngineResult<Vec<U256>> {
    let tokens = decode(
        &[ParamType::Array(Box::new(ParamType::Uint(256)))],
        data,
    )
    .map_err(|_| decode_error("uint256[]"))?;

    let arr = tokens
        .into_iter()
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| decode_error("uint256[]"))?;

    arr.into_iter()
        .map(|t| t.into_uint().ok_or_else(|| decode_error("uint256[]")))
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ERC-20 标准子集
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod erc20 {
    use super::*;

    pub fn balance_of(owner: Address) -> Vec<u8> {
        encode_call("balanceOf(address)", &[Token::Address(owner)])
    }

    pub fn decimals() -> Vec<u8> {
        encode_call("decimals()", &[])
    }

    pub fn symbol() -> Vec<u8> {
        encode_call("symbol()", &[])
    }

    pub fn name() -> Vec<u8> {
        encode_call("name()", &[])
    }

    pub fn transfer(to: Address, amount: U256) -> Vec<u8> {
        encode_call(
            "transfer(address,uint256)",
            &[Token::Address(to), Token::Uint(amount)],
        )
    }

    pub fn approve(spender: Address, amount: U256) -> Vec<u8> {
        encode_call(
            "approve(address,uint256)",
            &[Token::Address(spender), Token::Uint(amount)],
        )
    }

    pub fn allowance(owner: Address, spender: Address) -> Vec<u8> {
        encode_call(
            "allowance(address,address)",
            &[Token::Address(owner), Token::Address(spender)],
        )
    }
}
