//! 账户身份与签名器存储模型

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::chain_config::ChainType;

/// 账户身份：与密钥存储方式无关
///
/// `uuid` 创建后不可变；`address` 只在创建时派生一次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerAccountInfo {
    pub uuid: Uuid,
    pub alias: String,
    pub chain_type: ChainType,
    pub address: String,
    pub hidden: bool,
}

impl SignerAccountInfo {
    pub fn new(alias: impl Into<String>, chain_type: ChainType, address: String) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            alias: alias.into(),
            chain_type,
            address,
            hidden: false,
        }
    }
}

/// 硬件钱包类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareType {
    Ledger,
    Trezor,
}

impl std::fmt::Display for HardwareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareType::Ledger => f.write_str("ledger"),
            HardwareType::Trezor => f.write_str("trezor"),
        }
    }
}

/// 硬件账户引用：不保存任何秘密
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareReference {
    pub hardware_type: HardwareType,
    pub account_number: u32,
    pub derivation_path: String,
}

/// 签名器存储变体（按 uuid 持久化）
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignerStorage {
    PrivateKeyMaterial {
        /// 链相关编码：EVM 为 hex，Solana 为 base58
        private_key: Zeroizing<String>,
    },
    HardwareReference(HardwareReference),
}

impl std::fmt::Debug for SignerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerStorage::PrivateKeyMaterial { .. } => f
                .debug_struct("PrivateKeyMaterial")
                .field("private_key", &"***REDACTED***")
                .finish(),
            SignerStorage::HardwareReference(reference) => {
                f.debug_tuple("HardwareReference").field(reference).finish()
            }
        }
    }
}

/// 持久化记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSigner {
    pub info: SignerAccountInfo,
    pub storage: SignerStorage,
}
