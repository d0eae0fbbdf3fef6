//! 单位换算模块
//!
//! wei / 代币最小单位 ⇄ 人类可读单位的精确换算。
//! 全部以十进制字符串和 U256 运算完成，不经过浮点数，
//! 支持 0–77 位小数精度（decimals 以链上合约返回值为准）。

use ethers::types::U256;

use crate::error::{EngineError, EngineResult};

/// 原生币精度（wei -> ETH）
pub const NATIVE_DECIMALS: u32 = 18;

/// 最小单位 -> 人类可读字符串（精确，去掉无意义的尾随零）
pub fn format_base_units(value: U256, decimals: u32) -> String {
    let s = value.to_string();
    if decimals == 0 {
        return s;
    }

    let d = decimals as usize;
    let padded = if s.len() <= d {
        format!("{}{}", "0".repeat(d - s.len() + 1), s)
    } else {
        s
    };

    let split_at = padded.len() - d;
    let (whole, frac) = padded.split_at(split_at);
    let frac = frac.trim_end_matches('0');

    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

/// 人类可读字符串 -> 最小单位
///
/// 拒绝负数、非数字字符和超过代币精度的小数位。
pub fn parse_base_units(amount: &str, decimals: u32) -> EngineResult<U256> {
    let invalid = |reason: &str| EngineError::InvalidAmount {
        amount: amount.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty amount"));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a non-negative decimal number"));
    }
    if frac.len() > decimals as usize {
        return Err(invalid("more fractional digits than token decimals"));
    }

    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole_part = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| invalid("integer part out of range"))?
    };

    // 小数部分右补零到 decimals 位
    let frac_part = if frac.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{}{}", frac, "0".repeat(decimals as usize - frac.len()));
        U256::from_dec_str(padded.trim_start_matches('0'))
            .unwrap_or_else(|_| U256::zero())
    };

    whole_part
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_part))
        .ok_or_else(|| invalid("amount overflows 256 bits"))
}

/// wei -> 原生币（人类单位）
pub fn wei_to_native(wei: U256) -> String {
    format_base_units(wei, NATIVE_DECIMALS)
}

/// 原生币（人类单位）-> wei
pub fn native_to_wei(amount: &str) -> EngineResult<U256> {
    parse_base_units(amount, NATIVE_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_whole_and_fraction() {
        assert_eq!(
            format_base_units(U256::from(1_500_000_000_000_000_000u64), 18),
            "1.5"
        );
        assert_eq!(format_base_units(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_base_units(U256::zero(), 18), "0");
        assert_eq!(format_base_units(U256::from(42u64), 0), "42");
        assert_eq!(format_base_units(U256::from(123_450u64), 4), "12.345");
    }

    #[test]
    fn test_parse_roundtrip() {
        let wei = native_to_wei("1.5").unwrap();
        assert_eq!(wei, U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(wei_to_native(wei), "1.5");

        assert_eq!(native_to_wei("0").unwrap(), U256::zero());
        assert_eq!(parse_base_units("42", 0).unwrap(), U256::from(42u64));
        assert_eq!(parse_base_units(".5", 1).unwrap(), U256::from(5u64));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(native_to_wei("").is_err());
        assert!(native_to_wei("-1").is_err());
        assert!(native_to_wei("1.2.3").is_err());
        assert!(native_to_wei("abc").is_err());
        assert!(native_to_wei(".").is_err());
        // 18 位精度下 19 位小数非法
        assert!(native_to_wei("0.0000000000000000001").is_err());
        // 0 位精度下不允许小数
        assert!(parse_base_units("1.5", 0).is_err());
    }

    #[test]
    fn test_max_sendable_example() {
        // balance = 1 ETH, gas = 21000 * 50 gwei = 0.00105 ETH
        let balance = native_to_wei("1.0").unwrap();
        let gas_cost = U256::from(21_000u64) * U256::from(50_000_000_000u64);
        let sendable = balance - gas_cost;
        assert_eq!(wei_to_native(sendable), "0.99895");
    }

    #[test]
    fn test_extreme_decimals() {
        // decimals 上限 77：10^77 仍在 U256 范围内
        let one = parse_base_units("1", 77).unwrap();
        assert_eq!(format_base_units(one, 77), "1");
    }
}
