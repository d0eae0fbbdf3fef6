//! 交易构建与签名模块
//!
//! EIP-155 legacy 交易：RLP 编码 9 字段 -> Keccak-256 -> secp256k1 可恢复签名。
//! 签名哈希覆盖 chain_id，跨链重放直接失效。

use ethers::types::U256;
use k256::ecdsa::SigningKey;
use rlp::RlpStream;
use sha3::{Digest, Keccak256};

use crate::error::{EngineError, EngineResult};

/// 待签名的 legacy 交易
#[derive(Debug, Clone)]
pub struct SignableTransaction {
    pub nonce: u64,
    /// wei
    pub gas_price: U256,
    pub gas_limit: u64,
    /// 0x 前缀的收款地址
    pub to: String,
    /// wei
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl SignableTransaction {
    /// 签名并返回可直接广播的原始交易字节
    pub fn sign(&self, key: &SigningKey) -> EngineResult<Vec<u8>> {
        let to_bytes = self.to_address_bytes()?;

        // 1. 未签名 RLP：(nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0)
        let mut stream = RlpStream::new_list(9);
        stream.append(&self.nonce);
        append_u256(&mut stream, self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&to_bytes);
        append_u256(&mut stream, self.value);
        stream.append(&self.data);
        stream.append(&self.chain_id);
        stream.append_empty_data();
        stream.append_empty_data();

        let sighash = Keccak256::digest(stream.out());

        // 2. 可恢复签名
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&sighash)
            .map_err(|e| EngineError::InvalidKeyFormat(format!("signing failed: {e}")))?;

        let v = self.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
        let sig_bytes = signature.to_bytes();
        let r = strip_leading_zeros(&sig_bytes[..32]);
        let s = strip_leading_zeros(&sig_bytes[32..]);

        // 3. 已签名 RLP：(nonce, gasPrice, gasLimit, to, value, data, v, r, s)
        let mut signed = RlpStream::new_list(9);
        signed.append(&self.nonce);
        append_u256(&mut signed, self.gas_price);
        signed.append(&self.gas_limit);
        signed.append(&to_bytes);
        append_u256(&mut signed, self.value);
        signed.append(&self.data);
        signed.append(&v);
        signed.append(&r);
        signed.append(&s);

        Ok(signed.out().to_vec())
    }

    fn to_address_bytes(&self) -> EngineResult<Vec<u8>> {
        let bytes = hex::decode(self.to.trim_start_matches("0x"))
            .map_err(|_| EngineError::InvalidAddress(self.to.clone()))?;
        if bytes.len() != 20 {
            return Err(EngineError::InvalidAddress(self.to.clone()));
        }
        Ok(bytes)
    }
}

/// U256 -> RLP 最小字节表示（零值编码为空字节串）
fn append_u256(stream: &mut RlpStream, value: U256) {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let bytes = strip_leading_zeros(&buf);
    stream.append(&bytes);
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}
