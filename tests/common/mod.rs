//! 测试辅助模块
//! 脚本化的 RPC、报价、汇率与硬件设备替身

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use ethers::{
    abi::{self, Token as AbiToken},
    signers::{LocalWallet, Signer as _},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, Signature, U256},
    utils::{hash_message, to_checksum},
};
use serde_json::Value;
use walletcore::{
    config::FeeConfig,
    domain::account::HardwareType,
    error::{CoreError, CoreResult, HardwareError},
    infrastructure::{
        hardware_transport::HardwareDevice,
        rpc_provider::{BlockHeader, FeeData, FeeHistory, RpcProvider, SimulatedTransaction},
    },
    service::swap::{
        exchange_rate::ExchangeRateProvider,
        quote::{QuoteRequest, SwapParams, SwapQuote, SwapQuoteApi},
    },
};

pub const ANVIL_KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ANVIL_ADDRESS_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const ANVIL_KEY_1: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub fn gwei(value: u64) -> U256 {
    U256::from(value) * U256::exp10(9)
}

pub fn fee_config() -> FeeConfig {
    FeeConfig {
        refresh_interval_ms: 5_000,
        history_window: 4,
        percentiles: [25.0, 50.0, 75.0],
    }
}

/// mock 链的当前状态，测试中可随时修改
#[derive(Debug, Clone)]
pub struct ChainState {
    pub block: BlockHeader,
    pub gas_price: U256,
    pub estimate_gas: U256,
    pub balance: U256,
    pub fee_history: FeeHistory,
    pub max_priority_fee: Option<U256>,
    /// 按合约地址返回的 eth_call 结果
    pub call_results: HashMap<Address, Bytes>,
    pub simulated_gas: Vec<U256>,
    /// 所有方法返回 RPC 错误
    pub fail_rpc: bool,
    /// 只让这些方法返回 RPC 错误
    pub failing: Vec<&'static str>,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            block: BlockHeader {
                number: 100,
                base_fee_per_gas: None,
            },
            gas_price: gwei(20),
            estimate_gas: U256::from(100_000u64),
            balance: U256::exp10(18),
            fee_history: FeeHistory::default(),
            max_priority_fee: None,
            call_results: HashMap::new(),
            simulated_gas: Vec::new(),
            fail_rpc: false,
            failing: Vec::new(),
        }
    }
}

/// 脚本化 RPC，记录每个方法的调用次数
#[derive(Debug, Default)]
pub struct MockRpcProvider {
    state: Mutex<ChainState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    bundles: Mutex<Vec<Vec<TypedTransaction>>>,
}

impl MockRpcProvider {
    pub fn new(state: ChainState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            ..Default::default()
        })
    }

    /// 不带 base fee 的链
    pub fn legacy(gas_price: U256, estimate_gas: u64) -> Arc<Self> {
        Self::new(ChainState {
            gas_price,
            estimate_gas: U256::from(estimate_gas),
            ..Default::default()
        })
    }

    /// 标准 EIP-1559 链：每行 reward 都是 `rewards`，历史 base fee 逐块变化
    pub fn eip1559(base_fee: U256, rewards: [U256; 3]) -> Arc<Self> {
        Self::new(ChainState {
            block: BlockHeader {
                number: 100,
                base_fee_per_gas: Some(base_fee),
            },
            fee_history: varying_history(base_fee, rewards, 4),
            ..Default::default()
        })
    }

    /// 历史 base fee 恒定的非标准链
    pub fn custom_chain(base_fee: U256, max_priority_fee: U256) -> Arc<Self> {
        Self::new(ChainState {
            block: BlockHeader {
                number: 100,
                base_fee_per_gas: Some(base_fee),
            },
            fee_history: FeeHistory {
                oldest_block: 96,
                base_fee_per_gas: vec![base_fee; 5],
                reward: vec![vec![gwei(1), gwei(2), gwei(3)]; 4],
            },
            max_priority_fee: Some(max_priority_fee),
            ..Default::default()
        })
    }

    pub fn update(&self, change: impl FnOnce(&mut ChainState)) {
        change(&mut self.state.lock().unwrap());
    }

    pub fn advance_block(&self) {
        self.update(|state| state.block.number += 1);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn bundles(&self) -> Vec<Vec<TypedTransaction>> {
        self.bundles.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str) -> CoreResult<ChainState> {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
        let state = self.state.lock().unwrap().clone();
        if state.fail_rpc || state.failing.contains(&method) {
            return Err(CoreError::Rpc(format!("{} unavailable", method)));
        }
        Ok(state)
    }
}

pub fn varying_history(base_fee: U256, rewards: [U256; 3], rows: usize) -> FeeHistory {
    FeeHistory {
        oldest_block: 100 - rows as u64,
        base_fee_per_gas: (0..=rows).map(|i| base_fee + U256::from(i)).collect(),
        reward: vec![rewards.to_vec(); rows],
    }
}

#[async_trait]
impl RpcProvider for MockRpcProvider {
    async fn get_latest_block(&self) -> CoreResult<BlockHeader> {
        Ok(self.record("get_latest_block")?.block)
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> CoreResult<U256> {
        Ok(self.record("estimate_gas")?.estimate_gas)
    }

    async fn get_balance(&self, _address: Address) -> CoreResult<U256> {
        Ok(self.record("get_balance")?.balance)
    }

    async fn get_gas_price(&self) -> CoreResult<U256> {
        Ok(self.record("get_gas_price")?.gas_price)
    }

    async fn fee_history(&self, block_count: u64, _percentiles: &[f64]) -> CoreResult<FeeHistory> {
        let mut history = self.record("fee_history")?.fee_history;
        let keep = (block_count as usize).min(history.reward.len());
        let skip = history.reward.len() - keep;
        history.reward.drain(..skip);
        history.base_fee_per_gas.drain(..skip.min(history.base_fee_per_gas.len()));
        history.oldest_block += skip as u64;
        Ok(history)
    }

    async fn get_fee_data(&self) -> CoreResult<FeeData> {
        let state = self.record("get_fee_data")?;
        Ok(FeeData {
            gas_price: Some(state.gas_price),
            max_priority_fee_per_gas: state.max_priority_fee,
        })
    }

    async fn send(&self, method: &str, _params: Value) -> CoreResult<Value> {
        self.record("send")?;
        Err(CoreError::Rpc(format!("unexpected raw call {}", method)))
    }

    async fn call(&self, tx: &TypedTransaction) -> CoreResult<Bytes> {
        let state = self.record("call")?;
        let to = tx
            .to()
            .and_then(|to| to.as_address().copied())
            .ok_or_else(|| CoreError::Rpc("call without target".into()))?;
        state
            .call_results
            .get(&to)
            .cloned()
            .ok_or_else(|| CoreError::Rpc(format!("no scripted result for {:?}", to)))
    }

    async fn simulate_bundle(&self, txs: &[TypedTransaction]) -> CoreResult<Vec<SimulatedTransaction>> {
        let state = self.record("simulate_bundle")?;
        self.bundles.lock().unwrap().push(txs.to_vec());
        if state.simulated_gas.len() < txs.len() {
            return Err(CoreError::Simulation("not enough scripted results".into()));
        }
        let offset = state.simulated_gas.len() - txs.len();
        Ok(state.simulated_gas[offset..]
            .iter()
            .map(|gas_used| SimulatedTransaction { gas_used: *gas_used })
            .collect())
    }
}

/// ABI 编码的单个 uint256 返回值
pub fn encoded_uint(value: U256) -> Bytes {
    Bytes::from(abi::encode(&[AbiToken::Uint(value)]))
}

/// 固定报价，记录收到的请求
#[derive(Debug)]
pub struct MockQuoteApi {
    pub quote: SwapQuote,
    requests: Mutex<Vec<QuoteRequest>>,
}

impl MockQuoteApi {
    pub fn new(to_amount: U256) -> Arc<Self> {
        Arc::new(Self {
            quote: SwapQuote {
                to_amount,
                swap_params: SwapParams {
                    to: Address::repeat_byte(0xa9),
                    data: Bytes::from(vec![0x12, 0x34]),
                    amount: U256::zero(),
                    value: U256::zero(),
                },
            },
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<QuoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwapQuoteApi for MockQuoteApi {
    async fn get_quote(&self, request: &QuoteRequest) -> CoreResult<SwapQuote> {
        self.requests.lock().unwrap().push(request.clone());
        let mut quote = self.quote.clone();
        quote.swap_params.amount = request.amount;
        Ok(quote)
    }
}

/// 固定汇率（1e18 精度）
#[derive(Debug)]
pub struct MockExchangeRate {
    pub rate: U256,
    pub calls: AtomicUsize,
}

impl MockExchangeRate {
    pub fn new(rate: U256) -> Arc<Self> {
        Arc::new(Self {
            rate,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeRateProvider for MockExchangeRate {
    async fn get_exchange_rate(&self, _chain_id: u64, _from: Address, _to: Address) -> CoreResult<U256> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rate)
    }
}

/// 用本地私钥模拟的硬件设备
#[derive(Debug)]
pub struct MockHardwareDevice {
    wallet: LocalWallet,
    hardware_type: HardwareType,
    /// 覆盖设备上报的地址，模拟换了设备
    reported_address: Mutex<Option<String>>,
    /// 每次请求前等待，模拟用户迟迟不确认
    delay: Option<Duration>,
    pub address_requests: AtomicUsize,
}

impl MockHardwareDevice {
    pub fn new(private_key: &str) -> Arc<Self> {
        Self::build(private_key, None)
    }

    pub fn slow(private_key: &str, delay: Duration) -> Arc<Self> {
        Self::build(private_key, Some(delay))
    }

    fn build(private_key: &str, delay: Option<Duration>) -> Arc<Self> {
        let wallet: LocalWallet = private_key.trim_start_matches("0x").parse().unwrap();
        Arc::new(Self {
            wallet,
            hardware_type: HardwareType::Ledger,
            reported_address: Mutex::new(None),
            delay,
            address_requests: AtomicUsize::new(0),
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn report_address(&self, address: &str) {
        *self.reported_address.lock().unwrap() = Some(address.to_string());
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl HardwareDevice for MockHardwareDevice {
    fn hardware_type(&self) -> HardwareType {
        self.hardware_type
    }

    async fn get_address(&self, _derivation_path: &str) -> Result<String, HardwareError> {
        self.address_requests.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let reported = self.reported_address.lock().unwrap().clone();
        Ok(reported.unwrap_or_else(|| to_checksum(&self.wallet.address(), None)))
    }

    async fn sign_transaction(
        &self,
        _derivation_path: &str,
        tx: &TypedTransaction,
    ) -> Result<Signature, HardwareError> {
        self.wait().await;
        self.wallet
            .sign_transaction_sync(tx)
            .map_err(|e| HardwareError::DeviceRejected(e.to_string()))
    }

    async fn sign_message(&self, _derivation_path: &str, message: &[u8]) -> Result<Signature, HardwareError> {
        self.wait().await;
        self.wallet
            .sign_hash(hash_message(message))
            .map_err(|e| HardwareError::DeviceRejected(e.to_string()))
    }
}
