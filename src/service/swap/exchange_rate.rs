//! 链上汇率查询
//!
//! 汇率以 1e18 为精度：`native_value = amount × rate / 1e18`

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest, U256};

use super::contracts::{decode_uint, get_rate_calldata};
use crate::{
    config::SwapConfig,
    error::{CoreError, CoreResult},
    infrastructure::rpc_provider::RpcProvider,
};

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    async fn get_exchange_rate(
        &self,
        chain_id: u64,
        from_token: Address,
        to_token: Address,
    ) -> CoreResult<U256>;
}

/// 通过预言机合约 `getRate(address,address,bool)` 查询
pub struct OnchainExchangeRate {
    provider: Arc<dyn RpcProvider>,
    config: SwapConfig,
}

impl OnchainExchangeRate {
    pub fn new(provider: Arc<dyn RpcProvider>, config: SwapConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl ExchangeRateProvider for OnchainExchangeRate {
    async fn get_exchange_rate(
        &self,
        chain_id: u64,
        from_token: Address,
        to_token: Address,
    ) -> CoreResult<U256> {
        let oracle = self.config.rate_oracle_for(chain_id).ok_or_else(|| {
            CoreError::ExchangeRateUnavailable(format!("no rate oracle for chain {}", chain_id))
        })?;

        let call: TypedTransaction = TransactionRequest::new()
            .to(oracle)
            .data(get_rate_calldata(from_token, to_token, true))
            .into();

        let output = self.provider.call(&call).await?;
        let rate = decode_uint(&output)?;

        tracing::debug!(chain_id, from_token = ?from_token, to_token = ?to_token, rate = %rate, "exchange rate fetched");
        Ok(rate)
    }
}
