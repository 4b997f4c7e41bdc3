//! WalletCore - 多链钱包交易准备核心
//!
//! 签名器、费用估算与兑换编排。核心不广播交易，只产出可签名、已定价的交易。

pub mod config;
pub mod domain;
pub mod error;
pub mod fee;
pub mod infrastructure;
pub mod service;
pub mod signer;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{CoreError, CoreErrorCode, CoreResult, HardwareError};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{ChainType, SignerAccountInfo, Token},
        error::{CoreError, CoreResult},
        fee::{FeeManager, FeePreference, GasLimitSource},
        infrastructure::{KeyValueStore, RpcProvider},
        service::{FeeService, SignerRegistry, SwapDetails, SwapOrchestrator, SwapSettlement},
        signer::{SignMessageOptions, Signable, Signer, TransactionPayload},
    };
}
