//! EIP-1559 费用管理器
//!
//! 每个新区块：
//!
//! 1. 读取最新区块的 base fee，没有则链不支持 EIP-1559
//! 2. 并发获取余额、gas 估算、优先费历史
//! 3. 优先费历史追加到窗口后按列取中位数；历史 base fee 恒定的链视为
//!    非标准实现，改用 `eth_maxPriorityFeePerGas × {1, 1.25, 1.5}`
//! 4. max_fee_per_gas = 2 × base_fee + 优先费，gas_limit = 估算值 × 1.5

use std::sync::Arc;

use ethers::types::{transaction::eip2718::TypedTransaction, U256};

use super::{
    history::{FeeHistoryWindow, FeeRow, TIER_COUNT},
    to_eip1559_request, Eip1559Fee, EstimationState, FeeCore, FeePreference, FeeSettings,
    FundsStatus, GasLimitSource,
};
use crate::{
    config::FeeConfig,
    error::{CoreError, CoreResult},
    infrastructure::rpc_provider::RpcProvider,
    utils::units::{gwei_to_wei, parse_gas_limit, parse_gwei, scale_percent, wei_to_gwei},
};

pub(crate) const TX_TYPE: &str = "eip1559";

const GAS_LIMIT_BUFFER_PERCENT: u64 = 150;
/// 非标准链的三档优先费系数（百分比）
const CUSTOM_TIER_PERCENTS: [u64; TIER_COUNT] = [100, 125, 150];

/// 本次刷新得到的优先费样本
#[derive(Debug)]
enum PrioritySample {
    /// 没有新区块需要采样，沿用窗口
    Unchanged,
    Percentiles(Vec<FeeRow>),
    /// 非标准链的 eth_maxPriorityFeePerGas；`detected` 表示本次才识别出来
    MaxPriorityFee { base: U256, detected: bool },
}

#[derive(Debug)]
pub struct Eip1559FeeManager {
    core: FeeCore,
    settings: Option<FeeSettings<Eip1559Fee>>,
    history: FeeHistoryWindow,
    /// 最后一个已采样进窗口的区块
    history_block: Option<u64>,
    percentiles: [f64; TIER_COUNT],
    custom_chain: bool,
}

impl Eip1559FeeManager {
    pub fn new(
        provider: Arc<dyn RpcProvider>,
        transaction: TypedTransaction,
        gas_limit_source: GasLimitSource,
        config: &FeeConfig,
    ) -> Self {
        Self {
            core: FeeCore::new(provider, transaction, gas_limit_source),
            settings: None,
            history: FeeHistoryWindow::new(config.history_window),
            history_block: None,
            percentiles: config.percentiles,
            custom_chain: false,
        }
    }

    pub async fn update_fees(&mut self) -> CoreResult<bool> {
        let block = self.core.provider.get_latest_block().await?;
        if self.core.is_current(block.number) {
            tracing::debug!(block = block.number, "no new block, eip1559 fees unchanged");
            return Ok(false);
        }
        let base_fee = block
            .base_fee_per_gas
            .ok_or(CoreError::ChainNotEip1559Compliant)?;

        let previous = self.core.begin_estimating();
        let block_count = self.new_block_count(block.number);
        // 只有整窗采样才足以判断 base fee 是否恒定
        let full_window = block_count >= self.history.capacity() as u64;

        let fetched = tokio::try_join!(
            self.core.fetch_balance(),
            self.core.gas_limit(GAS_LIMIT_BUFFER_PERCENT),
            sample_priority_fees(
                self.core.provider.as_ref(),
                self.custom_chain,
                block_count,
                full_window,
                &self.percentiles,
            ),
        );
        let (balance, gas_limit, sample) = match fetched {
            Ok(values) => values,
            Err(e) => {
                self.core.state = previous;
                return Err(e);
            }
        };

        let tiers = match self.apply_sample(sample, block.number) {
            Ok(tiers) => tiers,
            Err(e) => {
                self.core.state = previous;
                return Err(e);
            }
        };

        let [low, medium, high] =
            tiers.map(|priority| Eip1559Fee::new(base_fee, priority, gas_limit));
        let custom = self.settings.as_ref().and_then(|s| s.custom);

        self.settings = Some(FeeSettings {
            low,
            medium,
            high,
            custom,
        });
        self.core.finish(block.number, balance, custom.is_some());

        tracing::debug!(
            block = block.number,
            base_fee = %base_fee,
            gas_limit = %gas_limit,
            custom_chain = self.custom_chain,
            "eip1559 fee presets updated"
        );
        Ok(true)
    }

    /// 自上次采样以来的新区块数，不超过窗口大小
    fn new_block_count(&self, latest: u64) -> u64 {
        let capacity = self.history.capacity() as u64;
        match self.history_block {
            Some(sampled) => latest.saturating_sub(sampled).min(capacity),
            None => capacity,
        }
    }

    /// 把样本并入窗口，返回三档优先费（wei）
    fn apply_sample(&mut self, sample: PrioritySample, block_number: u64) -> CoreResult<[U256; TIER_COUNT]> {
        match sample {
            PrioritySample::MaxPriorityFee { base, detected } => {
                if detected {
                    tracing::info!(
                        block = block_number,
                        "constant base fee history, treating chain as custom EIP-1559"
                    );
                    self.custom_chain = true;
                    self.history.clear();
                }
                self.history_block = Some(block_number);
                Ok(CUSTOM_TIER_PERCENTS.map(|percent| scale_percent(base, percent)))
            }
            PrioritySample::Percentiles(rows) => {
                let mut window = self.history.clone();
                window.extend(rows);
                let tiers = median_tiers(&window)?;
                self.history = window;
                self.history_block = Some(block_number);
                Ok(tiers)
            }
            PrioritySample::Unchanged => median_tiers(&self.history),
        }
    }

    pub fn state(&self) -> EstimationState {
        self.core.state
    }

    pub fn preference(&self) -> FeePreference {
        self.core.preference
    }

    pub fn settings(&self) -> Option<&FeeSettings<Eip1559Fee>> {
        self.settings.as_ref()
    }

    pub fn balance(&self) -> Option<U256> {
        self.core.balance
    }

    pub fn transaction(&self) -> &TypedTransaction {
        &self.core.transaction
    }

    pub fn history(&self) -> &FeeHistoryWindow {
        &self.history
    }

    /// 节点声称支持 EIP-1559 但历史数据退化
    pub fn is_custom_chain(&self) -> bool {
        self.custom_chain
    }

    pub fn set_preference(&mut self, preference: FeePreference) -> CoreResult<()> {
        let settings = self.settings.as_ref().ok_or(CoreError::NotInitialized)?;
        if settings.get(preference).is_none() {
            return Err(CoreError::CustomFeeNotSet);
        }
        self.core.preference = preference;
        self.core.state = self.core.state_for_preference();
        Ok(())
    }

    pub fn selected_fee(&self) -> CoreResult<&Eip1559Fee> {
        let settings = self.settings.as_ref().ok_or(CoreError::NotInitialized)?;
        settings
            .get(self.core.preference)
            .ok_or(CoreError::CustomFeeNotSet)
    }

    pub fn fee_price(&self) -> CoreResult<U256> {
        let fee = self.selected_fee()?;
        Ok(fee.max_fee_per_gas.saturating_mul(fee.gas_limit))
    }

    /// 输入单位为 gwei
    pub fn change_base_fee(&mut self, input: &str) -> CoreResult<()> {
        let base_fee = parse_gwei(input)?;
        let current = *self.selected_fee()?;
        self.set_custom(Eip1559Fee::new(
            base_fee,
            current.max_priority_fee_per_gas,
            current.gas_limit,
        ));
        Ok(())
    }

    /// 输入单位为 gwei
    pub fn change_priority_fee(&mut self, input: &str) -> CoreResult<()> {
        let priority_fee = parse_gwei(input)?;
        let current = *self.selected_fee()?;
        self.set_custom(Eip1559Fee::new(current.base_fee, priority_fee, current.gas_limit));
        Ok(())
    }

    pub fn change_gas_price(&mut self, _input: &str) -> CoreResult<()> {
        Err(CoreError::UnsupportedForTransactionType {
            operation: "change_gas_price",
            tx_type: TX_TYPE,
        })
    }

    pub fn change_gas_limit(&mut self, input: &str) -> CoreResult<()> {
        let gas_limit = parse_gas_limit(input)?;
        let current = *self.selected_fee()?;
        self.set_custom(Eip1559Fee::new(
            current.base_fee,
            current.max_priority_fee_per_gas,
            gas_limit,
        ));
        Ok(())
    }

    fn set_custom(&mut self, fee: Eip1559Fee) {
        if let Some(settings) = self.settings.as_mut() {
            settings.custom = Some(fee);
            self.core.preference = FeePreference::Custom;
            self.core.state = EstimationState::CustomOverridden;
        }
    }

    pub fn has_enough_funds(&self) -> FundsStatus {
        match self.fee_price() {
            Ok(cost) => self.core.funds_status(cost),
            Err(_) => FundsStatus::Unknown,
        }
    }

    pub fn set_transaction(&mut self, transaction: TypedTransaction, source: GasLimitSource) {
        self.core.replace_transaction(transaction, source);
    }

    pub fn priced_transaction(&self) -> CoreResult<TypedTransaction> {
        let fee = self.selected_fee()?;
        let request = to_eip1559_request(&self.core.transaction)
            .gas(fee.gas_limit)
            .max_fee_per_gas(fee.max_fee_per_gas)
            .max_priority_fee_per_gas(fee.max_priority_fee_per_gas);
        Ok(TypedTransaction::Eip1559(request))
    }

    /// base fee 与优先费跟随 `source`，gas limit 保持自身
    pub fn sync_rates_from(&mut self, source: &Eip1559FeeManager) -> CoreResult<()> {
        let from = source.settings.as_ref().ok_or(CoreError::NotInitialized)?;
        let own = self.settings.as_ref().ok_or(CoreError::NotInitialized)?;

        let rebase = |src: &Eip1559Fee, limit: U256| {
            Eip1559Fee::new(src.base_fee, src.max_priority_fee_per_gas, limit)
        };
        let custom_limit = own.custom.map(|c| c.gas_limit).unwrap_or(own.medium.gas_limit);

        self.settings = Some(FeeSettings {
            low: rebase(&from.low, own.low.gas_limit),
            medium: rebase(&from.medium, own.medium.gas_limit),
            high: rebase(&from.high, own.high.gas_limit),
            custom: from.custom.map(|c| rebase(&c, custom_limit)),
        });
        self.core.preference = source.core.preference;
        self.core.state = self.core.state_for_preference();
        Ok(())
    }
}

async fn sample_priority_fees(
    provider: &dyn RpcProvider,
    custom_chain: bool,
    block_count: u64,
    full_window: bool,
    percentiles: &[f64; TIER_COUNT],
) -> CoreResult<PrioritySample> {
    if custom_chain {
        let base = max_priority_fee(provider).await?;
        return Ok(PrioritySample::MaxPriorityFee {
            base,
            detected: false,
        });
    }
    if block_count == 0 {
        return Ok(PrioritySample::Unchanged);
    }

    let history = provider.fee_history(block_count, percentiles).await?;
    if full_window && is_constant(&history.base_fee_per_gas) {
        let base = max_priority_fee(provider).await?;
        return Ok(PrioritySample::MaxPriorityFee {
            base,
            detected: true,
        });
    }

    let rows = history
        .reward
        .iter()
        .map(|reward| reward_row(reward))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(PrioritySample::Percentiles(rows))
}

async fn max_priority_fee(provider: &dyn RpcProvider) -> CoreResult<U256> {
    provider
        .get_fee_data()
        .await?
        .max_priority_fee_per_gas
        .ok_or_else(|| CoreError::Rpc("eth_maxPriorityFeePerGas unavailable".into()))
}

/// 至少两个样本且全部相等
fn is_constant(base_fees: &[U256]) -> bool {
    base_fees.len() > 1 && base_fees.iter().all(|fee| *fee == base_fees[0])
}

fn reward_row(reward: &[U256]) -> CoreResult<FeeRow> {
    if reward.len() != TIER_COUNT {
        return Err(CoreError::Rpc(format!(
            "fee history row has {} percentiles, expected {}",
            reward.len(),
            TIER_COUNT
        )));
    }
    Ok([
        wei_to_gwei(reward[0])?,
        wei_to_gwei(reward[1])?,
        wei_to_gwei(reward[2])?,
    ])
}

fn median_tiers(window: &FeeHistoryWindow) -> CoreResult<[U256; TIER_COUNT]> {
    let [low, medium, high] = window
        .medians()
        .ok_or_else(|| CoreError::Rpc("fee history returned no reward data".into()))?;
    Ok([gwei_to_wei(low)?, gwei_to_wei(medium)?, gwei_to_wei(high)?])
}
