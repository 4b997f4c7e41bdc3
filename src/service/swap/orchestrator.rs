//! 兑换编排
//!
//! 报价 → 授权检查 → 构造代理合约调用 → 定价（必要时模拟捆绑交易）。
//! 无 gas 路径额外计算赞助方报销并校验兑换金额足以覆盖，校验通过后才用真实
//! 报销额重建兑换交易。任一步失败整个编排失败，不返回部分结果。

use std::sync::Arc;

use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, TransactionRequest, U256, U512,
};
use rust_decimal::Decimal;

use super::{
    contracts::{allowance_calldata, approve_calldata, decode_uint, ProxySwapParams},
    exchange_rate::ExchangeRateProvider,
    quote::{QuoteRequest, SwapQuote, SwapQuoteApi},
};
use crate::{
    config::{FeeConfig, SwapConfig},
    domain::chain_config::{Token, NATIVE_TOKEN_ADDRESS},
    error::{CoreError, CoreResult, SwapSide},
    fee::{FeeManager, GasLimitSource},
    infrastructure::rpc_provider::RpcProvider,
    service::fee_service::FeeService,
    utils::units::scale_percent,
};

/// 汇率精度
const RATE_PRECISION: u64 = 1_000_000_000_000_000_000;
/// 首次模拟使用的占位报销额
const PLACEHOLDER_GAS_REFUND: u64 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapTokens {
    pub from: Option<Token>,
    pub to: Option<Token>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapAmounts {
    pub from: U256,
    pub to: U256,
}

/// 用户的兑换意图
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapDetails {
    pub tokens: SwapTokens,
    pub amounts: SwapAmounts,
    /// 百分比，如 0.5 表示 0.5%
    pub slippage: Option<Decimal>,
    pub gasless: bool,
}

/// 待签名的交易及其费用管理器，调用方仍可在签名前调整档位
#[derive(Debug)]
pub struct PreparedTransaction {
    pub fee_manager: FeeManager,
}

impl PreparedTransaction {
    pub fn transaction(&self) -> &TypedTransaction {
        self.fee_manager.transaction()
    }

    /// 按当前档位定价后的交易
    pub fn priced(&self) -> CoreResult<TypedTransaction> {
        self.fee_manager.priced_transaction()
    }
}

#[derive(Debug)]
pub struct SwapSettlement {
    /// 只有非原生代币且授权不足时存在，必须先于兑换交易广播
    pub approval: Option<PreparedTransaction>,
    pub swap: PreparedTransaction,
    pub quote: SwapQuote,
    pub minimum_return_amount: U256,
    /// 普通路径为 0
    pub gas_refund: U256,
}

/// 通过前置检查后的参数
struct ValidatedSwap<'a> {
    from: &'a Token,
    to: &'a Token,
    chain_id: u64,
    contract: Address,
    slippage: Decimal,
}

pub struct SwapOrchestrator {
    provider: Arc<dyn RpcProvider>,
    quote_api: Arc<dyn SwapQuoteApi>,
    exchange_rate: Arc<dyn ExchangeRateProvider>,
    fee_config: FeeConfig,
    swap_config: SwapConfig,
}

impl SwapOrchestrator {
    pub fn new(
        provider: Arc<dyn RpcProvider>,
        quote_api: Arc<dyn SwapQuoteApi>,
        exchange_rate: Arc<dyn ExchangeRateProvider>,
        fee_config: FeeConfig,
        swap_config: SwapConfig,
    ) -> Self {
        Self {
            provider,
            quote_api,
            exchange_rate,
            fee_config,
            swap_config,
        }
    }

    /// 前置检查，每种失败各自一个错误，且不发起任何网络请求
    fn validate<'a>(&self, details: &'a SwapDetails) -> CoreResult<ValidatedSwap<'a>> {
        let from = details
            .tokens
            .from
            .as_ref()
            .ok_or(CoreError::MissingToken(SwapSide::From))?;
        let to = details
            .tokens
            .to
            .as_ref()
            .ok_or(CoreError::MissingToken(SwapSide::To))?;

        if from.chain_id != to.chain_id {
            return Err(CoreError::NetworkMismatch {
                from: from.chain_id,
                to: to.chain_id,
            });
        }
        if details.amounts.from.is_zero() {
            return Err(CoreError::ZeroAmount(SwapSide::From));
        }
        if details.amounts.to.is_zero() {
            return Err(CoreError::ZeroAmount(SwapSide::To));
        }

        let contract = self
            .swap_config
            .contract_for(from.chain_id)
            .ok_or(CoreError::MissingSwapContract(from.chain_id))?;

        let slippage = details.slippage.ok_or(CoreError::MissingSlippage)?;
        if slippage.is_sign_negative() && !slippage.is_zero() {
            return Err(CoreError::InvalidSlippage(slippage));
        }
        if details.gasless && from.is_native() {
            return Err(CoreError::GaslessNativeToken);
        }

        Ok(ValidatedSwap {
            from,
            to,
            chain_id: from.chain_id,
            contract,
            slippage,
        })
    }

    pub async fn prepare_swap(&self, owner: Address, details: &SwapDetails) -> CoreResult<SwapSettlement> {
        let swap = self.validate(details)?;
        let amount = details.amounts.from;

        tracing::info!(
            chain_id = swap.chain_id,
            from = %swap.from.symbol,
            to = %swap.to.symbol,
            amount = %amount,
            gasless = details.gasless,
            "preparing swap"
        );

        let quote = self
            .quote_api
            .get_quote(&QuoteRequest {
                chain_id: swap.chain_id,
                from_token: swap.from.address,
                to_token: swap.to.address,
                amount,
                slippage: swap.slippage,
                destination: swap.contract,
            })
            .await?;

        let minimum_return_amount = calculate_minimum_return_amount(quote.to_amount, swap.slippage)?;
        let approval_tx = self.approval_transaction(owner, &swap, amount).await?;

        let proxy_params = ProxySwapParams {
            aggregator: quote.swap_params.to,
            from_token: swap.from.address,
            to_token: swap.to.address,
            amount,
            minimum_return_amount,
            gas_refund: U256::zero(),
            data: quote.swap_params.data.clone(),
        };

        let settlement = if details.gasless {
            self.prepare_gasless(owner, &swap, amount, proxy_params, approval_tx)
                .await?
        } else {
            self.prepare_standard(owner, &swap, amount, proxy_params, approval_tx)
                .await?
        };

        let (approval, swap_tx, gas_refund) = settlement;
        tracing::info!(
            chain_id = swap.chain_id,
            needs_approval = approval.is_some(),
            minimum_return = %minimum_return_amount,
            gas_refund = %gas_refund,
            "swap prepared"
        );

        Ok(SwapSettlement {
            approval,
            swap: swap_tx,
            quote,
            minimum_return_amount,
            gas_refund,
        })
    }

    /// 普通路径：有授权交易时模拟捆绑以获得兑换的真实 gas
    async fn prepare_standard(
        &self,
        owner: Address,
        swap: &ValidatedSwap<'_>,
        amount: U256,
        proxy_params: ProxySwapParams,
        approval_tx: Option<TypedTransaction>,
    ) -> CoreResult<(Option<PreparedTransaction>, PreparedTransaction, U256)> {
        let swap_tx = self.swap_transaction(owner, swap, amount, &proxy_params);

        let (approval, swap_source) = match approval_tx {
            Some(approval_tx) => {
                let simulated = self
                    .simulate(&[approval_tx.clone(), swap_tx.clone()])
                    .await?;
                let approval = self
                    .priced_manager(approval_tx, GasLimitSource::Estimate)
                    .await?;
                (Some(approval), GasLimitSource::Estimated(simulated[1]))
            }
            None => (None, GasLimitSource::Estimate),
        };

        let swap_prepared = self.priced_manager(swap_tx, swap_source).await?;
        Ok((approval, swap_prepared, U256::zero()))
    }

    /// 无 gas 路径
    async fn prepare_gasless(
        &self,
        owner: Address,
        swap: &ValidatedSwap<'_>,
        amount: U256,
        proxy_params: ProxySwapParams,
        approval_tx: Option<TypedTransaction>,
    ) -> CoreResult<(Option<PreparedTransaction>, PreparedTransaction, U256)> {
        let margin = 100 + self.swap_config.gasless_gas_margin_percent;

        // 1. 占位报销额模拟，得到 gas 用量
        let placeholder = proxy_params.with_gas_refund(U256::from(PLACEHOLDER_GAS_REFUND));
        let swap_tx = self.swap_transaction(owner, swap, amount, &placeholder);

        let mut bundle = Vec::with_capacity(2);
        if let Some(approval_tx) = &approval_tx {
            bundle.push(approval_tx.clone());
        }
        bundle.push(swap_tx.clone());
        let simulated = self.simulate(&bundle).await?;

        let swap_limit = scale_percent(simulated[simulated.len() - 1], margin);
        tracing::debug!(simulated = %simulated[simulated.len() - 1], gas_limit = %swap_limit, "gasless bundle simulated");

        // 2. 定价：授权交易搭兑换交易的费率
        let mut swap_manager = self
            .priced_manager(swap_tx, GasLimitSource::Fixed(swap_limit))
            .await?;

        let mut approval = match approval_tx {
            Some(approval_tx) => {
                let approval_limit = scale_percent(simulated[0], margin);
                let mut prepared = self
                    .priced_manager(approval_tx, GasLimitSource::Fixed(approval_limit))
                    .await?;
                prepared.fee_manager.sync_rates_from(&swap_manager.fee_manager)?;
                Some(prepared)
            }
            None => None,
        };

        // 3. 计算并校验报销额
        let gas_refund = self.required_gas_refund(
            swap.chain_id,
            &swap_manager.fee_manager,
            approval.as_ref().map(|a| &a.fee_manager),
        )?;
        self.validate_gas_refund(swap, amount, gas_refund).await?;

        // 4. 校验通过后用真实报销额重建并重新定价
        let final_params = proxy_params.with_gas_refund(gas_refund);
        let final_tx = self.swap_transaction(owner, swap, amount, &final_params);
        swap_manager
            .fee_manager
            .set_transaction(final_tx, GasLimitSource::Fixed(swap_limit));
        swap_manager.fee_manager.update_fees().await?;

        if let Some(approval) = approval.as_mut() {
            approval.fee_manager.sync_rates_from(&swap_manager.fee_manager)?;
        }

        Ok((approval, swap_manager, gas_refund))
    }

    /// max_fee × 基础转账 gas + 兑换费用 + 授权费用 + 1
    fn required_gas_refund(
        &self,
        chain_id: u64,
        swap: &FeeManager,
        approval: Option<&FeeManager>,
    ) -> CoreResult<U256> {
        let base_transfer_gas = U256::from(self.swap_config.base_transfer_gas_for(chain_id));
        let transfer_cost = swap.max_fee_per_gas()?.saturating_mul(base_transfer_gas);
        let approval_cost = match approval {
            Some(manager) => manager.fee_price()?,
            None => U256::zero(),
        };

        Ok(transfer_cost
            .saturating_add(swap.fee_price()?)
            .saturating_add(approval_cost)
            .saturating_add(U256::one()))
    }

    /// 兑换金额折算为原生币后必须严格大于报销额
    async fn validate_gas_refund(
        &self,
        swap: &ValidatedSwap<'_>,
        amount: U256,
        required: U256,
    ) -> CoreResult<()> {
        let rate = self
            .exchange_rate
            .get_exchange_rate(swap.chain_id, swap.from.address, NATIVE_TOKEN_ADDRESS)
            .await?;
        let minimum_amount = minimum_amount_for_refund(required, rate)
            .ok_or_else(|| CoreError::ExchangeRateUnavailable(swap.from.symbol.clone()))?;

        if amount < minimum_amount {
            tracing::info!(
                amount = %amount,
                minimum = %minimum_amount,
                required_refund = %required,
                "swap amount does not cover gas refund"
            );
            return Err(CoreError::InsufficientAmountForGasRefund {
                minimum_amount,
                token: swap.from.symbol.clone(),
            });
        }
        Ok(())
    }

    /// 非原生代币且授权额度不足时构造无限额授权交易
    async fn approval_transaction(
        &self,
        owner: Address,
        swap: &ValidatedSwap<'_>,
        amount: U256,
    ) -> CoreResult<Option<TypedTransaction>> {
        if swap.from.is_native() {
            return Ok(None);
        }

        let call: TypedTransaction = TransactionRequest::new()
            .from(owner)
            .to(swap.from.address)
            .data(allowance_calldata(owner, swap.contract))
            .into();
        let allowance = decode_uint(&self.provider.call(&call).await?)?;

        if allowance >= amount {
            tracing::debug!(allowance = %allowance, "existing allowance is sufficient");
            return Ok(None);
        }

        let tx = TransactionRequest::new()
            .from(owner)
            .to(swap.from.address)
            .data(approve_calldata(swap.contract, U256::MAX))
            .chain_id(swap.chain_id);
        Ok(Some(tx.into()))
    }

    fn swap_transaction(
        &self,
        owner: Address,
        swap: &ValidatedSwap<'_>,
        amount: U256,
        params: &ProxySwapParams,
    ) -> TypedTransaction {
        let value = if swap.from.is_native() { amount } else { U256::zero() };
        TransactionRequest::new()
            .from(owner)
            .to(swap.contract)
            .data(params.encode())
            .value(value)
            .chain_id(swap.chain_id)
            .into()
    }

    async fn simulate(&self, bundle: &[TypedTransaction]) -> CoreResult<Vec<U256>> {
        let results = self.provider.simulate_bundle(bundle).await?;
        if results.len() != bundle.len() {
            return Err(CoreError::Simulation(format!(
                "expected {} results, got {}",
                bundle.len(),
                results.len()
            )));
        }
        Ok(results.into_iter().map(|r| r.gas_used).collect())
    }

    async fn priced_manager(
        &self,
        transaction: TypedTransaction,
        source: GasLimitSource,
    ) -> CoreResult<PreparedTransaction> {
        let mut fee_manager = FeeService::create_manager(
            Arc::clone(&self.provider),
            &self.fee_config,
            transaction,
            source,
        )
        .await?;
        fee_manager.update_fees().await?;
        Ok(PreparedTransaction { fee_manager })
    }
}

/// 最小到账数量 = amount × (1 − slippage / 100)，向下取整
///
/// slippage ≥ 100 时为 0，负数视为非法输入。
pub fn calculate_minimum_return_amount(amount: U256, slippage: Decimal) -> CoreResult<U256> {
    if slippage.is_sign_negative() && !slippage.is_zero() {
        return Err(CoreError::InvalidSlippage(slippage));
    }
    let hundred = Decimal::ONE_HUNDRED;
    if slippage >= hundred {
        return Ok(U256::zero());
    }

    let factor = (hundred - slippage).normalize();
    let mantissa = u128::try_from(factor.mantissa()).map_err(|_| CoreError::InvalidSlippage(slippage))?;
    let denominator = U512::from(100u64) * U512::from(U256::exp10(factor.scale() as usize));

    let scaled = amount.full_mul(U256::from(mantissa)) / denominator;
    U256::try_from(scaled).map_err(|_| CoreError::InvalidSlippage(slippage))
}

/// 满足 `amount × rate / 1e18 > required` 的最小 amount；rate 为 0 时返回 None
pub fn minimum_amount_for_refund(required: U256, rate: U256) -> Option<U256> {
    if rate.is_zero() {
        return None;
    }
    let scaled = required.full_mul(U256::from(RATE_PRECISION)) / U512::from(rate);
    U256::try_from(scaled + U512::one()).ok()
}
