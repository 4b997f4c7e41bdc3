//! 链族与网络配置
//!
//! 定义签名器支持的链族、曲线与派生路径，以及交易所在网络的描述

use ethers::types::{Address, H160};
use serde::{Deserialize, Serialize};

/// 加密曲线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    /// secp256k1 曲线 (Ethereum 系列, Bitcoin)
    Secp256k1,
    /// ed25519 曲线 (Solana)
    Ed25519,
}

/// 链族：签名器按链族区分，创建后不可更改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Evm,
    Solana,
    Btc,
}

impl ChainType {
    pub fn curve_type(&self) -> CurveType {
        match self {
            ChainType::Evm | ChainType::Btc => CurveType::Secp256k1,
            ChainType::Solana => CurveType::Ed25519,
        }
    }

    /// SLIP-44 coin type
    pub fn coin_type(&self) -> u32 {
        match self {
            ChainType::Evm => 60,
            ChainType::Solana => 501,
            ChainType::Btc => 0,
        }
    }

    /// 生成账户索引对应的派生路径
    ///
    /// - EVM: BIP44 `m/44'/60'/0'/0/{index}`
    /// - Solana: SLIP-0010 `m/44'/501'/{index}'/0'`（全部硬化）
    /// - Bitcoin: BIP84 `m/84'/0'/{index}'/0/0`
    pub fn derivation_path(&self, index: u32) -> String {
        match self {
            ChainType::Evm => format!("m/44'/{}'/0'/0/{}", self.coin_type(), index),
            ChainType::Solana => format!("m/44'/{}'/{}'/0'", self.coin_type(), index),
            ChainType::Btc => format!("m/84'/{}'/{}'/0/0", self.coin_type(), index),
        }
    }
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainType::Evm => f.write_str("evm"),
            ChainType::Solana => f.write_str("solana"),
            ChainType::Btc => f.write_str("btc"),
        }
    }
}

/// 聚合器约定的原生币地址 0xEeee...EEeE
pub const NATIVE_TOKEN_ADDRESS: Address = H160([0xee; 20]);

/// 代币描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub chain_id: u64,
}

impl Token {
    pub fn native(symbol: impl Into<String>, chain_id: u64) -> Self {
        Self {
            address: NATIVE_TOKEN_ADDRESS,
            symbol: symbol.into(),
            decimals: 18,
            chain_id,
        }
    }

    pub fn erc20(address: Address, symbol: impl Into<String>, decimals: u8, chain_id: u64) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            chain_id,
        }
    }

    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN_ADDRESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_paths() {
        assert_eq!(ChainType::Evm.derivation_path(3), "m/44'/60'/0'/0/3");
        assert_eq!(ChainType::Solana.derivation_path(1), "m/44'/501'/1'/0'");
        assert_eq!(ChainType::Btc.derivation_path(0), "m/84'/0'/0'/0/0");
    }

    #[test]
    fn test_native_token_detection() {
        let eth = Token::native("ETH", 1);
        assert!(eth.is_native());

        let usdc = Token::erc20(Address::repeat_byte(0x11), "USDC", 6, 1);
        assert!(!usdc.is_native());
    }
}
