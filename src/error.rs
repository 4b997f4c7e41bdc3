//! 统一错误类型
//!
//! 交易准备核心的所有错误都汇总到 [`CoreError`]，每个变体对应一个稳定的
//! 错误码（[`CoreErrorCode`]），方便上层展示给用户。

use ethers::types::U256;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub type CoreResult<T> = Result<T, CoreError>;

/// 硬件钱包错误：原样上抛，永不自动重试（避免重复签名）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("hardware transport is already open")]
    TransportAlreadyOpen,
    #[error("device rejected the request: {0}")]
    DeviceRejected(String),
    #[error("request cancelled on device")]
    UserCancelled,
    #[error("device did not respond within {0}s")]
    Timeout(u64),
    #[error("device address {device} does not match stored address {stored}")]
    AddressMismatch { device: String, stored: String },
    #[error("transport error: {0}")]
    Transport(String),
}

/// 交换方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSide {
    From,
    To,
}

impl std::fmt::Display for SwapSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapSide::From => f.write_str("from"),
            SwapSide::To => f.write_str("to"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    // 构造错误
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("private key cannot be exported from a hardware signer")]
    KeyNotExportable,

    // 链能力错误
    #[error("chain does not report base_fee_per_gas; not EIP-1559 compliant")]
    ChainNotEip1559Compliant,
    #[error("{operation} is not supported for {tx_type} transactions")]
    UnsupportedForTransactionType {
        operation: &'static str,
        tx_type: &'static str,
    },

    // 费用输入与生命周期
    #[error("invalid fee input: {0}")]
    InvalidFeeInput(String),
    #[error("no custom fee has been set")]
    CustomFeeNotSet,
    #[error("fee estimation has not been initialized")]
    NotInitialized,
    #[error("fee refresh loop is already running")]
    AlreadyRunning,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // 兑换前置条件
    #[error("missing {0} token")]
    MissingToken(SwapSide),
    #[error("tokens are on different networks: {from} and {to}")]
    NetworkMismatch { from: u64, to: u64 },
    #[error("{0} amount must be greater than zero")]
    ZeroAmount(SwapSide),
    #[error("no swap contract configured for chain {0}")]
    MissingSwapContract(u64),
    #[error("slippage is required")]
    MissingSlippage,
    #[error("invalid slippage: {0}")]
    InvalidSlippage(Decimal),
    #[error("gasless swaps require a non-native from token")]
    GaslessNativeToken,

    // 校验错误
    #[error("amount is too small to cover the gas refund; minimum is {minimum_amount} {token}")]
    InsufficientAmountForGasRefund { minimum_amount: U256, token: String },
    #[error("exchange rate unavailable for {0}")]
    ExchangeRateUnavailable(String),

    // 外部协作方
    #[error("failed to parse swap quote: {0}")]
    QuoteParse(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("bundle simulation failed: {0}")]
    Simulation(String),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error("account {0} not found")]
    AccountNotFound(Uuid),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    InvalidKeyMaterial,
    InvalidMnemonic,
    NotImplemented,
    KeyNotExportable,
    ChainNotEip1559Compliant,
    UnsupportedForTransactionType,
    InvalidFeeInput,
    CustomFeeNotSet,
    NotInitialized,
    AlreadyRunning,
    InvalidConfig,
    SwapPrecondition,
    InsufficientAmountForGasRefund,
    ExchangeRateUnavailable,
    QuoteParse,
    Rpc,
    Simulation,
    Hardware,
    AccountNotFound,
    Storage,
    Signing,
    InvalidMessage,
}

impl CoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreErrorCode::InvalidKeyMaterial => "invalid_key_material",
            CoreErrorCode::InvalidMnemonic => "invalid_mnemonic",
            CoreErrorCode::NotImplemented => "not_implemented",
            CoreErrorCode::KeyNotExportable => "key_not_exportable",
            CoreErrorCode::ChainNotEip1559Compliant => "chain_not_eip1559_compliant",
            CoreErrorCode::UnsupportedForTransactionType => "unsupported_for_transaction_type",
            CoreErrorCode::InvalidFeeInput => "invalid_fee_input",
            CoreErrorCode::CustomFeeNotSet => "custom_fee_not_set",
            CoreErrorCode::NotInitialized => "not_initialized",
            CoreErrorCode::AlreadyRunning => "already_running",
            CoreErrorCode::InvalidConfig => "invalid_config",
            CoreErrorCode::SwapPrecondition => "swap_precondition",
            CoreErrorCode::InsufficientAmountForGasRefund => "insufficient_amount_for_gas_refund",
            CoreErrorCode::ExchangeRateUnavailable => "exchange_rate_unavailable",
            CoreErrorCode::QuoteParse => "quote_parse",
            CoreErrorCode::Rpc => "rpc_error",
            CoreErrorCode::Simulation => "simulation_failed",
            CoreErrorCode::Hardware => "hardware_error",
            CoreErrorCode::AccountNotFound => "account_not_found",
            CoreErrorCode::Storage => "storage_error",
            CoreErrorCode::Signing => "signing_failed",
            CoreErrorCode::InvalidMessage => "invalid_message",
        }
    }
}

impl CoreError {
    pub fn code(&self) -> CoreErrorCode {
        match self {
            CoreError::InvalidKeyMaterial(_) => CoreErrorCode::InvalidKeyMaterial,
            CoreError::InvalidMnemonic(_) => CoreErrorCode::InvalidMnemonic,
            CoreError::NotImplemented(_) => CoreErrorCode::NotImplemented,
            CoreError::KeyNotExportable => CoreErrorCode::KeyNotExportable,
            CoreError::ChainNotEip1559Compliant => CoreErrorCode::ChainNotEip1559Compliant,
            CoreError::UnsupportedForTransactionType { .. } => {
                CoreErrorCode::UnsupportedForTransactionType
            }
            CoreError::InvalidFeeInput(_) => CoreErrorCode::InvalidFeeInput,
            CoreError::CustomFeeNotSet => CoreErrorCode::CustomFeeNotSet,
            CoreError::NotInitialized => CoreErrorCode::NotInitialized,
            CoreError::AlreadyRunning => CoreErrorCode::AlreadyRunning,
            CoreError::InvalidConfig(_) => CoreErrorCode::InvalidConfig,
            CoreError::MissingToken(_)
            | CoreError::NetworkMismatch { .. }
            | CoreError::ZeroAmount(_)
            | CoreError::MissingSwapContract(_)
            | CoreError::MissingSlippage
            | CoreError::InvalidSlippage(_)
            | CoreError::GaslessNativeToken => CoreErrorCode::SwapPrecondition,
            CoreError::InsufficientAmountForGasRefund { .. } => {
                CoreErrorCode::InsufficientAmountForGasRefund
            }
            CoreError::ExchangeRateUnavailable(_) => CoreErrorCode::ExchangeRateUnavailable,
            CoreError::QuoteParse(_) => CoreErrorCode::QuoteParse,
            CoreError::Rpc(_) => CoreErrorCode::Rpc,
            CoreError::Simulation(_) => CoreErrorCode::Simulation,
            CoreError::Hardware(_) => CoreErrorCode::Hardware,
            CoreError::AccountNotFound(_) => CoreErrorCode::AccountNotFound,
            CoreError::Storage(_) => CoreErrorCode::Storage,
            CoreError::Signing(_) => CoreErrorCode::Signing,
            CoreError::InvalidMessage(_) => CoreErrorCode::InvalidMessage,
        }
    }

    /// 网络类错误：刷新循环吞掉并在下一个 tick 重试
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Rpc(_) | CoreError::Simulation(_))
    }

    pub fn rpc(err: impl std::fmt::Display) -> Self {
        CoreError::Rpc(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        CoreError::Storage(err.to_string())
    }

    pub fn signing(err: impl std::fmt::Display) -> Self {
        CoreError::Signing(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}
