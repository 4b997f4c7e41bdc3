//! 单位换算与费用输入解析
//!
//! 链上金额统一使用 wei（`U256`），展示和用户输入使用 gwei（`Decimal`）。

use ethers::types::U256;
use rust_decimal::{prelude::ToPrimitive, Decimal};

use crate::error::{CoreError, CoreResult};

const GWEI_SCALE: u32 = 9;

/// Wei 转 Gwei（精确，不丢失小数）
pub fn wei_to_gwei(wei: U256) -> CoreResult<Decimal> {
    if wei > U256::from(u64::MAX) * U256::from(1_000_000_000u64) {
        return Err(CoreError::InvalidFeeInput(format!("{} wei is out of range", wei)));
    }
    let mantissa = i128::try_from(wei.as_u128())
        .map_err(|_| CoreError::InvalidFeeInput(format!("{} wei is out of range", wei)))?;
    Decimal::try_from_i128_with_scale(mantissa, GWEI_SCALE)
        .map(|d| d.normalize())
        .map_err(|e| CoreError::InvalidFeeInput(e.to_string()))
}

/// Gwei 转 Wei，截断 1 wei 以下的部分
pub fn gwei_to_wei(gwei: Decimal) -> CoreResult<U256> {
    if gwei.is_sign_negative() && !gwei.is_zero() {
        return Err(CoreError::InvalidFeeInput(format!("negative amount: {}", gwei)));
    }
    let wei = gwei
        .checked_mul(Decimal::from(1_000_000_000u64))
        .ok_or_else(|| CoreError::InvalidFeeInput(format!("{} gwei is out of range", gwei)))?
        .trunc()
        .to_u128()
        .ok_or_else(|| CoreError::InvalidFeeInput(format!("{} gwei is out of range", gwei)))?;
    Ok(U256::from(wei))
}

/// 解析用户输入的 gwei 值，如 "12.5"
pub fn parse_gwei(input: &str) -> CoreResult<U256> {
    let value: Decimal = input
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidFeeInput(format!("not a number: {:?}", input)))?;
    gwei_to_wei(value)
}

/// 解析 gas limit（正整数）
pub fn parse_gas_limit(input: &str) -> CoreResult<U256> {
    let value = U256::from_dec_str(input.trim())
        .map_err(|_| CoreError::InvalidFeeInput(format!("not an integer: {:?}", input)))?;
    if value.is_zero() {
        return Err(CoreError::InvalidFeeInput("gas limit must be greater than zero".into()));
    }
    Ok(value)
}

/// value × percent / 100（向下取整）
pub fn scale_percent(value: U256, percent: u64) -> U256 {
    value.saturating_mul(U256::from(percent)) / U256::from(100u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wei_gwei_conversion() {
        assert_eq!(wei_to_gwei(U256::from(2_500_000_000u64)).unwrap(), Decimal::new(25, 1));
        assert_eq!(gwei_to_wei(Decimal::new(25, 1)).unwrap(), U256::from(2_500_000_000u64));
        assert_eq!(wei_to_gwei(U256::from(1u64)).unwrap(), Decimal::new(1, 9));
    }

    #[test]
    fn test_parse_inputs() {
        assert_eq!(parse_gwei(" 20 ").unwrap(), U256::from(20_000_000_000u64));
        assert!(parse_gwei("abc").is_err());
        assert!(parse_gwei("-1").is_err());

        assert_eq!(parse_gas_limit("21000").unwrap(), U256::from(21_000u64));
        assert!(parse_gas_limit("0").is_err());
        assert!(parse_gas_limit("1.5").is_err());
    }

    #[test]
    fn test_scale_percent() {
        assert_eq!(scale_percent(U256::from(100_000u64), 125), U256::from(125_000u64));
        assert_eq!(scale_percent(U256::from(3u64), 150), U256::from(4u64));
    }
}
