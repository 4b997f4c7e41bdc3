//! Legacy gas-price 费用管理器
//!
//! low / medium / high = gas_price × {1, 1.25, 1.5}，gas_limit = 估算值 × 1.25

use std::sync::Arc;

use ethers::types::{transaction::eip2718::TypedTransaction, U256};

use super::{
    to_legacy_request, EstimationState, FeeCore, FeePreference, FeeSettings, FundsStatus,
    GasLimitSource, LegacyFee,
};
use crate::{
    error::{CoreError, CoreResult},
    infrastructure::rpc_provider::RpcProvider,
    utils::units::{parse_gas_limit, parse_gwei, scale_percent},
};

pub(crate) const TX_TYPE: &str = "legacy";

/// gas limit 安全系数（百分比）
const GAS_LIMIT_BUFFER_PERCENT: u64 = 125;
/// 三档 gas price 系数（百分比）
const TIER_PERCENTS: [u64; 3] = [100, 125, 150];

#[derive(Debug)]
pub struct LegacyFeeManager {
    core: FeeCore,
    settings: Option<FeeSettings<LegacyFee>>,
}

impl LegacyFeeManager {
    pub fn new(
        provider: Arc<dyn RpcProvider>,
        transaction: TypedTransaction,
        gas_limit_source: GasLimitSource,
    ) -> Self {
        Self {
            core: FeeCore::new(provider, transaction, gas_limit_source),
            settings: None,
        }
    }

    pub async fn update_fees(&mut self) -> CoreResult<bool> {
        let block = self.core.provider.get_latest_block().await?;
        if self.core.is_current(block.number) {
            tracing::debug!(block = block.number, "no new block, legacy fees unchanged");
            return Ok(false);
        }

        let previous = self.core.begin_estimating();
        let fetched = tokio::try_join!(
            self.core.fetch_balance(),
            self.core.gas_limit(GAS_LIMIT_BUFFER_PERCENT),
            self.core.provider.get_gas_price(),
        );

        let (balance, gas_limit, gas_price) = match fetched {
            Ok(values) => values,
            Err(e) => {
                self.core.state = previous;
                return Err(e);
            }
        };

        let [low, medium, high] =
            TIER_PERCENTS.map(|percent| LegacyFee {
                gas_price: scale_percent(gas_price, percent),
                gas_limit,
            });
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
            gas_price = %gas_price,
            gas_limit = %gas_limit,
            "legacy fee presets updated"
        );
        Ok(true)
    }

    pub fn state(&self) -> EstimationState {
        self.core.state
    }

    pub fn preference(&self) -> FeePreference {
        self.core.preference
    }

    pub fn settings(&self) -> Option<&FeeSettings<LegacyFee>> {
        self.settings.as_ref()
    }

    pub fn balance(&self) -> Option<U256> {
        self.core.balance
    }

    pub fn transaction(&self) -> &TypedTransaction {
        &self.core.transaction
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

    pub fn selected_fee(&self) -> CoreResult<&LegacyFee> {
        let settings = self.settings.as_ref().ok_or(CoreError::NotInitialized)?;
        settings
            .get(self.core.preference)
            .ok_or(CoreError::CustomFeeNotSet)
    }

    pub fn fee_price(&self) -> CoreResult<U256> {
        let fee = self.selected_fee()?;
        Ok(fee.gas_price.saturating_mul(fee.gas_limit))
    }

    pub fn change_base_fee(&mut self, _input: &str) -> CoreResult<()> {
        Err(CoreError::UnsupportedForTransactionType {
            operation: "change_base_fee",
            tx_type: TX_TYPE,
        })
    }

    pub fn change_priority_fee(&mut self, _input: &str) -> CoreResult<()> {
        Err(CoreError::UnsupportedForTransactionType {
            operation: "change_priority_fee",
            tx_type: TX_TYPE,
        })
    }

    /// 输入单位为 gwei
    pub fn change_gas_price(&mut self, input: &str) -> CoreResult<()> {
        let gas_price = parse_gwei(input)?;
        let current = *self.selected_fee()?;
        self.set_custom(LegacyFee {
            gas_price,
            ..current
        });
        Ok(())
    }

    pub fn change_gas_limit(&mut self, input: &str) -> CoreResult<()> {
        let gas_limit = parse_gas_limit(input)?;
        let current = *self.selected_fee()?;
        self.set_custom(LegacyFee {
            gas_limit,
            ..current
        });
        Ok(())
    }

    fn set_custom(&mut self, fee: LegacyFee) {
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
        let request = to_legacy_request(&self.core.transaction)
            .gas(fee.gas_limit)
            .gas_price(fee.gas_price);
        Ok(TypedTransaction::Legacy(request))
    }

    /// gas price 跟随 `source`，gas limit 保持自身
    pub fn sync_rates_from(&mut self, source: &LegacyFeeManager) -> CoreResult<()> {
        let from = source.settings.as_ref().ok_or(CoreError::NotInitialized)?;
        let own = self.settings.as_ref().ok_or(CoreError::NotInitialized)?;

        let rebase = |src: &LegacyFee, limit: U256| LegacyFee {
            gas_price: src.gas_price,
            gas_limit: limit,
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
