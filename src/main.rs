//! WalletCore 费用观察工具
//!
//! 对指定地址的零值自转账持续输出三档费用预设，Ctrl-C 退出。
//!
//! 用法：`walletcore <ADDRESS>`，配置来自环境变量与可选的 `CONFIG_PATH`。

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use ethers::types::{Address, TransactionRequest, U256};
use walletcore::{
    config::Config,
    fee::{FeeManager, GasLimitSource},
    infrastructure::{
        logging::{init_default_logging, init_logging},
        EthersRpcProvider, RpcProvider,
    },
    service::FeeService,
    utils::wei_to_gwei,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    // 2. 配置
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // 3. 日志
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to init logging: {}, falling back to defaults", e);
        init_default_logging();
    }

    let address = std::env::args()
        .nth(1)
        .context("usage: walletcore <ADDRESS>")?;
    let address = Address::from_str(&address).context("invalid address")?;

    // 4. 费用服务
    let provider: Arc<dyn RpcProvider> =
        Arc::new(EthersRpcProvider::from_config(&config.rpc).context("Failed to create rpc provider")?);
    let mut service = FeeService::new(provider, config.fee.clone());

    let tx = TransactionRequest::new()
        .from(address)
        .to(address)
        .value(U256::zero())
        .chain_id(config.rpc.chain_id);
    service
        .initialize(tx.into(), GasLimitSource::Estimate)
        .await
        .context("Initial fee estimation failed")?;
    service.start_refresh()?;

    tracing::info!(rpc = %config.rpc.url, chain_id = config.rpc.chain_id, "watching fees");

    let manager = service.manager()?;
    let mut ticker = tokio::time::interval(Duration::from_millis(config.fee.refresh_interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let guard = manager.lock().await;
                report(&guard)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    service.cancel();
    Ok(())
}

fn report(manager: &FeeManager) -> Result<()> {
    if let Some(m) = manager.as_eip1559() {
        if let Some(settings) = m.settings() {
            for (tier, fee) in [("low", &settings.low), ("medium", &settings.medium), ("high", &settings.high)] {
                println!(
                    "{:<6} base {} gwei, priority {} gwei, max {} gwei, limit {}",
                    tier,
                    wei_to_gwei(fee.base_fee)?,
                    wei_to_gwei(fee.max_priority_fee_per_gas)?,
                    wei_to_gwei(fee.max_fee_per_gas)?,
                    fee.gas_limit
                );
            }
        }
    } else if let Some(m) = manager.as_legacy() {
        if let Some(settings) = m.settings() {
            for (tier, fee) in [("low", &settings.low), ("medium", &settings.medium), ("high", &settings.high)] {
                println!(
                    "{:<6} gas price {} gwei, limit {}",
                    tier,
                    wei_to_gwei(fee.gas_price)?,
                    fee.gas_limit
                );
            }
        }
    }
    println!("funds: {:?}", manager.has_enough_funds());
    Ok(())
}
