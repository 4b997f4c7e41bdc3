//! Domain 模块
//!
//! 链族、代币、账户身份与密钥派生

pub mod account;
pub mod chain_config;
pub mod derivation;

// 重新导出常用类型
pub use account::{HardwareReference, HardwareType, SignerAccountInfo, SignerStorage, StoredSigner};
pub use chain_config::{ChainType, CurveType, Token, NATIVE_TOKEN_ADDRESS};
pub use derivation::{derive_private_key, generate_mnemonic, DerivedKey};
