//! 链上 RPC 访问层
//!
//! 费用引擎与兑换编排只依赖 [`RpcProvider`] trait，生产实现基于
//! ethers `Provider<Http>`，测试中替换为脚本化的 mock。

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, U256},
};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// 最新区块头中费用引擎关心的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    /// 非 EIP-1559 链为 None
    pub base_fee_per_gas: Option<U256>,
}

/// eth_feeHistory 结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeHistory {
    pub oldest_block: u64,
    pub base_fee_per_gas: Vec<U256>,
    /// 每个区块一行，每列对应一个请求的百分位
    pub reward: Vec<Vec<U256>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// 捆绑模拟中单笔交易的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedTransaction {
    pub gas_used: U256,
}

#[async_trait]
pub trait RpcProvider: Send + Sync {
    async fn get_latest_block(&self) -> CoreResult<BlockHeader>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> CoreResult<U256>;

    async fn get_balance(&self, address: Address) -> CoreResult<U256>;

    async fn get_gas_price(&self) -> CoreResult<U256>;

    async fn fee_history(&self, block_count: u64, percentiles: &[f64]) -> CoreResult<FeeHistory>;

    async fn get_fee_data(&self) -> CoreResult<FeeData>;

    /// 通用 JSON-RPC 调用
    async fn send(&self, method: &str, params: Value) -> CoreResult<Value>;

    /// 只读合约调用（eth_call）
    async fn call(&self, tx: &TypedTransaction) -> CoreResult<Bytes>;

    /// 按顺序模拟一组交易，返回每笔的 gas 消耗
    async fn simulate_bundle(&self, txs: &[TypedTransaction]) -> CoreResult<Vec<SimulatedTransaction>>;
}

/// 基于 ethers HTTP provider 的实现
#[derive(Debug, Clone)]
pub struct EthersRpcProvider {
    provider: Arc<Provider<Http>>,
    simulate_method: String,
}

impl EthersRpcProvider {
    pub fn new(rpc_url: &str, simulate_method: impl Into<String>) -> CoreResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(CoreError::rpc)?;
        Ok(Self {
            provider: Arc::new(provider),
            simulate_method: simulate_method.into(),
        })
    }

    pub fn from_config(config: &crate::config::RpcConfig) -> CoreResult<Self> {
        Self::new(&config.url, config.simulate_method.clone())
    }
}

#[async_trait]
impl RpcProvider for EthersRpcProvider {
    async fn get_latest_block(&self) -> CoreResult<BlockHeader> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(CoreError::rpc)?
            .ok_or_else(|| CoreError::Rpc("latest block not found".into()))?;

        let number = block
            .number
            .ok_or_else(|| CoreError::Rpc("latest block has no number".into()))?
            .as_u64();

        Ok(BlockHeader {
            number,
            base_fee_per_gas: block.base_fee_per_gas,
        })
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> CoreResult<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(CoreError::rpc)
    }

    async fn get_balance(&self, address: Address) -> CoreResult<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(CoreError::rpc)
    }

    async fn get_gas_price(&self) -> CoreResult<U256> {
        self.provider.get_gas_price().await.map_err(CoreError::rpc)
    }

    async fn fee_history(&self, block_count: u64, percentiles: &[f64]) -> CoreResult<FeeHistory> {
        let history = self
            .provider
            .fee_history(block_count, BlockNumber::Latest, percentiles)
            .await
            .map_err(CoreError::rpc)?;

        Ok(FeeHistory {
            oldest_block: history.oldest_block.low_u64(),
            base_fee_per_gas: history.base_fee_per_gas,
            reward: history.reward,
        })
    }

    async fn get_fee_data(&self) -> CoreResult<FeeData> {
        let gas_price = self.provider.get_gas_price().await.ok();
        // 部分节点不支持该方法
        let max_priority_fee_per_gas = self
            .provider
            .request::<_, U256>("eth_maxPriorityFeePerGas", ())
            .await
            .ok();

        Ok(FeeData {
            gas_price,
            max_priority_fee_per_gas,
        })
    }

    async fn send(&self, method: &str, params: Value) -> CoreResult<Value> {
        self.provider
            .request::<_, Value>(method, params)
            .await
            .map_err(CoreError::rpc)
    }

    async fn call(&self, tx: &TypedTransaction) -> CoreResult<Bytes> {
        self.provider.call(tx, None).await.map_err(CoreError::rpc)
    }

    async fn simulate_bundle(&self, txs: &[TypedTransaction]) -> CoreResult<Vec<SimulatedTransaction>> {
        let params = serde_json::json!([txs]);
        let response = self
            .send(&self.simulate_method, params)
            .await
            .map_err(|e| CoreError::Simulation(e.to_string()))?;

        let results = parse_simulation_response(&response)?;
        if results.len() != txs.len() {
            return Err(CoreError::Simulation(format!(
                "expected {} results, got {}",
                txs.len(),
                results.len()
            )));
        }
        Ok(results)
    }
}

/// 兼容 `[{gasUsed}]` 与 `{results: [{gasUsed}]}` 两种返回
pub fn parse_simulation_response(response: &Value) -> CoreResult<Vec<SimulatedTransaction>> {
    let entries = response
        .get("results")
        .unwrap_or(response)
        .as_array()
        .ok_or_else(|| CoreError::Simulation("simulation response is not an array".into()))?;

    entries
        .iter()
        .map(|entry| {
            if let Some(error) = entry.get("error").filter(|e| !e.is_null()) {
                return Err(CoreError::Simulation(error.to_string()));
            }
            let gas_used = entry
                .get("gasUsed")
                .ok_or_else(|| CoreError::Simulation("missing gasUsed".into()))
                .and_then(parse_quantity)?;
            Ok(SimulatedTransaction { gas_used })
        })
        .collect()
}

fn parse_quantity(value: &Value) -> CoreResult<U256> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| CoreError::Simulation(format!("invalid quantity: {}", n))),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).ok(),
                None => U256::from_dec_str(s).ok(),
            };
            parsed.ok_or_else(|| CoreError::Simulation(format!("invalid quantity: {}", s)))
        }
        other => Err(CoreError::Simulation(format!("invalid quantity: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulation_array() {
        let response = serde_json::json!([{ "gasUsed": "0x5208" }, { "gasUsed": 100000 }]);
        let results = parse_simulation_response(&response).unwrap();
        assert_eq!(results[0].gas_used, U256::from(21_000u64));
        assert_eq!(results[1].gas_used, U256::from(100_000u64));
    }

    #[test]
    fn test_parse_simulation_wrapped_results() {
        let response = serde_json::json!({ "results": [{ "gasUsed": "46000" }] });
        let results = parse_simulation_response(&response).unwrap();
        assert_eq!(results[0].gas_used, U256::from(46_000u64));
    }

    #[test]
    fn test_parse_simulation_reverted_entry() {
        let response = serde_json::json!([{ "gasUsed": "0x0", "error": "execution reverted" }]);
        let err = parse_simulation_response(&response).unwrap_err();
        assert!(matches!(err, CoreError::Simulation(_)));
    }
}
