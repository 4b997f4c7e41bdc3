//! 费用引擎
//!
//! 每笔待发送交易持有一个 [`FeeManager`]，按链的费用模型选择变体：
//!
//! - [`LegacyFeeManager`]：gas price × {1, 1.25, 1.5}
//! - [`Eip1559FeeManager`]：base fee + 历史百分位优先费，非标准链降级到
//!   `eth_maxPriorityFeePerGas`
//!
//! 状态机：`Uninitialized → Estimating → Ready ⇄ CustomOverridden`

pub mod eip1559;
pub mod history;
pub mod legacy;

use std::sync::Arc;

use ethers::types::{
    transaction::eip2718::TypedTransaction, Eip1559TransactionRequest, TransactionRequest, U256,
};
use serde::{Deserialize, Serialize};

pub use eip1559::Eip1559FeeManager;
pub use history::FeeHistoryWindow;
pub use legacy::LegacyFeeManager;

use crate::{
    error::{CoreError, CoreResult},
    infrastructure::rpc_provider::RpcProvider,
    utils::units::scale_percent,
};

/// 用户选择的费用档位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeePreference {
    Low,
    #[default]
    Medium,
    High,
    Custom,
}

/// 四档预设；`custom` 只有在用户显式覆盖后才存在，刷新时保留
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSettings<T> {
    pub low: T,
    pub medium: T,
    pub high: T,
    pub custom: Option<T>,
}

impl<T> FeeSettings<T> {
    pub fn get(&self, preference: FeePreference) -> Option<&T> {
        match preference {
            FeePreference::Low => Some(&self.low),
            FeePreference::Medium => Some(&self.medium),
            FeePreference::High => Some(&self.high),
            FeePreference::Custom => self.custom.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyFee {
    pub gas_price: U256,
    pub gas_limit: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip1559Fee {
    pub base_fee: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: U256,
}

impl Eip1559Fee {
    /// max_fee_per_gas = 2 × base_fee + priority_fee
    pub fn new(base_fee: U256, max_priority_fee_per_gas: U256, gas_limit: U256) -> Self {
        Self {
            base_fee,
            max_priority_fee_per_gas,
            max_fee_per_gas: base_fee
                .saturating_mul(U256::from(2u64))
                .saturating_add(max_priority_fee_per_gas),
            gas_limit,
        }
    }
}

/// 费用状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationState {
    Uninitialized,
    Estimating,
    Ready,
    CustomOverridden,
}

/// 余额是否足以支付 (max_fee × gas_limit) + value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundsStatus {
    /// 仍在估算中，尚不可知
    Unknown,
    Sufficient,
    Insufficient,
}

/// gas limit 的来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GasLimitSource {
    /// 调用 eth_estimateGas，再乘以安全系数
    #[default]
    Estimate,
    /// 外部给出的估算值（如捆绑模拟结果），同样乘以安全系数
    Estimated(U256),
    /// 直接使用，不再放大
    Fixed(U256),
}

/// 两种费用模型共享的交易上下文
pub(crate) struct FeeCore {
    pub provider: Arc<dyn RpcProvider>,
    pub transaction: TypedTransaction,
    pub gas_limit_source: GasLimitSource,
    pub last_block: Option<u64>,
    pub balance: Option<U256>,
    pub state: EstimationState,
    pub preference: FeePreference,
}

impl std::fmt::Debug for FeeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeeCore")
            .field("transaction", &self.transaction)
            .field("gas_limit_source", &self.gas_limit_source)
            .field("last_block", &self.last_block)
            .field("balance", &self.balance)
            .field("state", &self.state)
            .field("preference", &self.preference)
            .finish()
    }
}

impl FeeCore {
    pub fn new(
        provider: Arc<dyn RpcProvider>,
        transaction: TypedTransaction,
        gas_limit_source: GasLimitSource,
    ) -> Self {
        Self {
            provider,
            transaction,
            gas_limit_source,
            last_block: None,
            balance: None,
            state: EstimationState::Uninitialized,
            preference: FeePreference::default(),
        }
    }

    /// 同一区块重复调用直接跳过
    pub fn is_current(&self, block_number: u64) -> bool {
        self.last_block == Some(block_number)
    }

    /// 进入 Estimating，返回之前的状态用于失败回滚
    pub fn begin_estimating(&mut self) -> EstimationState {
        std::mem::replace(&mut self.state, EstimationState::Estimating)
    }

    pub fn finish(&mut self, block_number: u64, balance: Option<U256>, has_custom: bool) {
        self.last_block = Some(block_number);
        self.balance = balance;
        if self.preference == FeePreference::Custom && !has_custom {
            self.preference = FeePreference::default();
        }
        self.state = self.state_for_preference();
    }

    pub fn state_for_preference(&self) -> EstimationState {
        if self.preference == FeePreference::Custom {
            EstimationState::CustomOverridden
        } else {
            EstimationState::Ready
        }
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(
            self.state,
            EstimationState::Uninitialized | EstimationState::Estimating
        )
    }

    pub fn value(&self) -> U256 {
        self.transaction.value().copied().unwrap_or_default()
    }

    pub async fn fetch_balance(&self) -> CoreResult<Option<U256>> {
        match self.transaction.from() {
            Some(from) => self.provider.get_balance(*from).await.map(Some),
            None => Ok(None),
        }
    }

    /// 按来源计算 gas limit，`buffer_percent` 为安全系数（150 即 ×1.5）
    pub async fn gas_limit(&self, buffer_percent: u64) -> CoreResult<U256> {
        match self.gas_limit_source {
            GasLimitSource::Estimate => {
                let estimated = self.provider.estimate_gas(&self.transaction).await?;
                Ok(scale_percent(estimated, buffer_percent))
            }
            GasLimitSource::Estimated(units) => Ok(scale_percent(units, buffer_percent)),
            GasLimitSource::Fixed(units) => Ok(units),
        }
    }

    pub fn funds_status(&self, total_cost: U256) -> FundsStatus {
        if !self.is_initialized() {
            return FundsStatus::Unknown;
        }
        match self.balance {
            Some(balance) if balance > total_cost.saturating_add(self.value()) => {
                FundsStatus::Sufficient
            }
            Some(_) => FundsStatus::Insufficient,
            None => FundsStatus::Unknown,
        }
    }

    pub fn replace_transaction(&mut self, transaction: TypedTransaction, source: GasLimitSource) {
        self.transaction = transaction;
        self.gas_limit_source = source;
        // 下一次 update_fees 必须重新计算
        self.last_block = None;
    }
}

/// 保留交易字段，转换为 EIP-1559 信封
pub(crate) fn to_eip1559_request(tx: &TypedTransaction) -> Eip1559TransactionRequest {
    match tx {
        TypedTransaction::Eip1559(request) => request.clone(),
        other => Eip1559TransactionRequest {
            from: other.from().copied(),
            to: other.to().cloned(),
            value: other.value().copied(),
            data: other.data().cloned(),
            nonce: other.nonce().copied(),
            chain_id: other.chain_id(),
            ..Default::default()
        },
    }
}

/// 保留交易字段，转换为 legacy 信封
pub(crate) fn to_legacy_request(tx: &TypedTransaction) -> TransactionRequest {
    match tx {
        TypedTransaction::Legacy(request) => request.clone(),
        other => TransactionRequest {
            from: other.from().copied(),
            to: other.to().cloned(),
            value: other.value().copied(),
            data: other.data().cloned(),
            nonce: other.nonce().copied(),
            chain_id: other.chain_id(),
            ..Default::default()
        },
    }
}

/// 两种费用管理器的统一入口
#[derive(Debug)]
pub enum FeeManager {
    Legacy(LegacyFeeManager),
    Eip1559(Eip1559FeeManager),
}

impl FeeManager {
    pub fn tx_type(&self) -> &'static str {
        match self {
            FeeManager::Legacy(_) => legacy::TX_TYPE,
            FeeManager::Eip1559(_) => eip1559::TX_TYPE,
        }
    }

    /// 返回 true 表示预设已按新区块重新计算
    pub async fn update_fees(&mut self) -> CoreResult<bool> {
        match self {
            FeeManager::Legacy(m) => m.update_fees().await,
            FeeManager::Eip1559(m) => m.update_fees().await,
        }
    }

    pub fn state(&self) -> EstimationState {
        match self {
            FeeManager::Legacy(m) => m.state(),
            FeeManager::Eip1559(m) => m.state(),
        }
    }

    pub fn preference(&self) -> FeePreference {
        match self {
            FeeManager::Legacy(m) => m.preference(),
            FeeManager::Eip1559(m) => m.preference(),
        }
    }

    pub fn set_preference(&mut self, preference: FeePreference) -> CoreResult<()> {
        match self {
            FeeManager::Legacy(m) => m.set_preference(preference),
            FeeManager::Eip1559(m) => m.set_preference(preference),
        }
    }

    pub fn change_base_fee(&mut self, input: &str) -> CoreResult<()> {
        match self {
            FeeManager::Legacy(m) => m.change_base_fee(input),
            FeeManager::Eip1559(m) => m.change_base_fee(input),
        }
    }

    pub fn change_priority_fee(&mut self, input: &str) -> CoreResult<()> {
        match self {
            FeeManager::Legacy(m) => m.change_priority_fee(input),
            FeeManager::Eip1559(m) => m.change_priority_fee(input),
        }
    }

    pub fn change_gas_price(&mut self, input: &str) -> CoreResult<()> {
        match self {
            FeeManager::Legacy(m) => m.change_gas_price(input),
            FeeManager::Eip1559(m) => m.change_gas_price(input),
        }
    }

    pub fn change_gas_limit(&mut self, input: &str) -> CoreResult<()> {
        match self {
            FeeManager::Legacy(m) => m.change_gas_limit(input),
            FeeManager::Eip1559(m) => m.change_gas_limit(input),
        }
    }

    pub fn has_enough_funds(&self) -> FundsStatus {
        match self {
            FeeManager::Legacy(m) => m.has_enough_funds(),
            FeeManager::Eip1559(m) => m.has_enough_funds(),
        }
    }

    /// 单位 gas 的最高出价：legacy 为 gas price，EIP-1559 为 max_fee_per_gas
    pub fn max_fee_per_gas(&self) -> CoreResult<U256> {
        match self {
            FeeManager::Legacy(m) => m.selected_fee().map(|fee| fee.gas_price),
            FeeManager::Eip1559(m) => m.selected_fee().map(|fee| fee.max_fee_per_gas),
        }
    }

    pub fn gas_limit(&self) -> CoreResult<U256> {
        match self {
            FeeManager::Legacy(m) => m.selected_fee().map(|fee| fee.gas_limit),
            FeeManager::Eip1559(m) => m.selected_fee().map(|fee| fee.gas_limit),
        }
    }

    /// 最坏情况下的总费用 = max_fee_per_gas × gas_limit
    pub fn fee_price(&self) -> CoreResult<U256> {
        match self {
            FeeManager::Legacy(m) => m.fee_price(),
            FeeManager::Eip1559(m) => m.fee_price(),
        }
    }

    pub fn transaction(&self) -> &TypedTransaction {
        match self {
            FeeManager::Legacy(m) => m.transaction(),
            FeeManager::Eip1559(m) => m.transaction(),
        }
    }

    /// 替换待定价交易，预设保留，下一次 update_fees 重新计算
    pub fn set_transaction(&mut self, transaction: TypedTransaction, source: GasLimitSource) {
        match self {
            FeeManager::Legacy(m) => m.set_transaction(transaction, source),
            FeeManager::Eip1559(m) => m.set_transaction(transaction, source),
        }
    }

    /// 按当前选中的档位返回已定价的交易
    pub fn priced_transaction(&self) -> CoreResult<TypedTransaction> {
        match self {
            FeeManager::Legacy(m) => m.priced_transaction(),
            FeeManager::Eip1559(m) => m.priced_transaction(),
        }
    }

    /// 把费率（不含 gas limit）同步为 `other` 的值
    pub fn sync_rates_from(&mut self, other: &FeeManager) -> CoreResult<()> {
        match (self, other) {
            (FeeManager::Legacy(m), FeeManager::Legacy(source)) => m.sync_rates_from(source),
            (FeeManager::Eip1559(m), FeeManager::Eip1559(source)) => m.sync_rates_from(source),
            (this, _) => Err(CoreError::UnsupportedForTransactionType {
                operation: "sync_rates_from",
                tx_type: this.tx_type(),
            }),
        }
    }

    pub fn as_eip1559(&self) -> Option<&Eip1559FeeManager> {
        match self {
            FeeManager::Eip1559(m) => Some(m),
            FeeManager::Legacy(_) => None,
        }
    }

    pub fn as_legacy(&self) -> Option<&LegacyFeeManager> {
        match self {
            FeeManager::Legacy(m) => Some(m),
            FeeManager::Eip1559(_) => None,
        }
    }
}
