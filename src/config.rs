//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{collections::HashMap, path::Path, str::FromStr};

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub fee: FeeConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 区块链RPC配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub chain_id: u64,
    /// 捆绑交易模拟所用的 RPC 方法名
    pub simulate_method: String,
}

/// 费用引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// 周期刷新间隔（毫秒）
    pub refresh_interval_ms: u64,
    /// 优先费历史窗口行数
    pub history_window: usize,
    /// 依次对应 low/medium/high 的百分位
    pub percentiles: [f64; 3],
}

/// 兑换配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    pub quote_api_url: String,
    #[serde(default)]
    pub quote_api_key: Option<String>,
    /// chain_id -> 代理合约地址
    #[serde(default)]
    pub contracts: HashMap<String, String>,
    /// chain_id -> 汇率预言机地址
    #[serde(default)]
    pub rate_oracles: HashMap<String, String>,
    /// 赞助方报销腿的基础转账 gas
    pub base_transfer_gas: u64,
    /// chain_id -> 覆盖 base_transfer_gas
    #[serde(default)]
    pub base_transfer_gas_overrides: HashMap<String, u64>,
    /// 无 gas 路径中模拟 gas 的安全余量（百分比）
    pub gasless_gas_margin_percent: u64,
}

/// 硬件钱包配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// 等待用户在设备上确认的最长时间（秒）
    pub request_timeout_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 解析 "1=0xabc,56=0xdef" 形式的链映射
fn env_chain_map(key: &str) -> HashMap<String, String> {
    std::env::var(key)
        .ok()
        .map(|raw| {
            raw.split(',')
                .filter_map(|pair| {
                    let (chain, value) = pair.split_once('=')?;
                    Some((chain.trim().to_string(), value.trim().to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("RPC_URL").unwrap_or_else(|_| "http://localhost:8545".into()),
            chain_id: env_or("CHAIN_ID", 1),
            simulate_method: std::env::var("RPC_SIMULATE_METHOD")
                .unwrap_or_else(|_| "eth_simulateBundle".into()),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: env_or("FEE_REFRESH_INTERVAL_MS", 5_000),
            history_window: env_or("FEE_HISTORY_WINDOW", 4),
            percentiles: [25.0, 50.0, 75.0],
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            quote_api_url: std::env::var("SWAP_QUOTE_API_URL")
                .unwrap_or_else(|_| "https://api.1inch.dev/swap/v5.2".into()),
            quote_api_key: std::env::var("SWAP_QUOTE_API_KEY").ok(),
            contracts: env_chain_map("SWAP_CONTRACTS"),
            rate_oracles: env_chain_map("SWAP_RATE_ORACLES"),
            base_transfer_gas: env_or("SWAP_BASE_TRANSFER_GAS", 21_000),
            base_transfer_gas_overrides: HashMap::new(),
            gasless_gas_margin_percent: env_or("SWAP_GASLESS_GAS_MARGIN_PERCENT", 30),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: env_or("HARDWARE_REQUEST_TIMEOUT_SECS", 120),
        }
    }
}

impl SwapConfig {
    /// 解析指定链的代理合约地址
    pub fn contract_for(&self, chain_id: u64) -> Option<Address> {
        self.contracts
            .get(&chain_id.to_string())
            .and_then(|raw| Address::from_str(raw).ok())
    }

    pub fn rate_oracle_for(&self, chain_id: u64) -> Option<Address> {
        self.rate_oracles
            .get(&chain_id.to_string())
            .and_then(|raw| Address::from_str(raw).ok())
    }

    pub fn base_transfer_gas_for(&self, chain_id: u64) -> u64 {
        self.base_transfer_gas_overrides
            .get(&chain_id.to_string())
            .copied()
            .unwrap_or(self.base_transfer_gas)
    }
}

impl Config {
    /// 从环境变量加载配置（先读取 .env）
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            logging: LoggingConfig::default(),
            rpc: RpcConfig::default(),
            fee: FeeConfig::default(),
            swap: SwapConfig::default(),
            hardware: HardwareConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }
        crate::infrastructure::logging::LogFormat::parse(&self.logging.format)
            .context("LOG_FORMAT must be 'json' or 'text'")?;

        if self.fee.refresh_interval_ms == 0 {
            anyhow::bail!("FEE_REFRESH_INTERVAL_MS must be greater than 0");
        }
        if self.fee.history_window == 0 {
            anyhow::bail!("FEE_HISTORY_WINDOW must be greater than 0");
        }
        let [low, medium, high] = self.fee.percentiles;
        if !(0.0..=100.0).contains(&low) || !(low <= medium && medium <= high && high <= 100.0) {
            anyhow::bail!("fee percentiles must be ascending within [0, 100]");
        }

        for (chain_id, raw) in self.swap.contracts.iter().chain(self.swap.rate_oracles.iter()) {
            Address::from_str(raw)
                .with_context(|| format!("Invalid contract address for chain {}: {}", chain_id, raw))?;
        }
        if self.swap.base_transfer_gas == 0 {
            anyhow::bail!("SWAP_BASE_TRANSFER_GAS must be greater than 0");
        }

        if self.hardware.request_timeout_secs == 0 {
            anyhow::bail!("HARDWARE_REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        Ok(())
    }
}
