//! 费用服务
//!
//! 每笔交易探测一次链是否支持 EIP-1559（最新区块是否带 base fee），
//! 构造对应的 [`FeeManager`]，并可选地在后台按固定间隔刷新费用。

use std::{sync::Arc, time::Duration};

use ethers::types::transaction::eip2718::TypedTransaction;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    config::FeeConfig,
    error::{CoreError, CoreResult},
    fee::{Eip1559FeeManager, FeeManager, GasLimitSource, LegacyFeeManager},
    infrastructure::rpc_provider::RpcProvider,
};

pub struct FeeService {
    provider: Arc<dyn RpcProvider>,
    config: FeeConfig,
    manager: Option<Arc<Mutex<FeeManager>>>,
    refresh_task: Option<JoinHandle<()>>,
}

impl FeeService {
    pub fn new(provider: Arc<dyn RpcProvider>, config: FeeConfig) -> Self {
        Self {
            provider,
            config,
            manager: None,
            refresh_task: None,
        }
    }

    /// 按链能力构造费用管理器（未执行首次估算）
    pub async fn create_manager(
        provider: Arc<dyn RpcProvider>,
        config: &FeeConfig,
        transaction: TypedTransaction,
        gas_limit_source: GasLimitSource,
    ) -> CoreResult<FeeManager> {
        let block = provider.get_latest_block().await?;
        let manager = if block.base_fee_per_gas.is_some() {
            FeeManager::Eip1559(Eip1559FeeManager::new(
                provider,
                transaction,
                gas_limit_source,
                config,
            ))
        } else {
            FeeManager::Legacy(LegacyFeeManager::new(provider, transaction, gas_limit_source))
        };

        tracing::debug!(
            block = block.number,
            tx_type = manager.tx_type(),
            "fee manager resolved"
        );
        Ok(manager)
    }

    /// 构造管理器并完成首次估算
    pub async fn initialize(
        &mut self,
        transaction: TypedTransaction,
        gas_limit_source: GasLimitSource,
    ) -> CoreResult<()> {
        self.cancel();

        let mut manager = Self::create_manager(
            Arc::clone(&self.provider),
            &self.config,
            transaction,
            gas_limit_source,
        )
        .await?;
        manager.update_fees().await?;

        self.manager = Some(Arc::new(Mutex::new(manager)));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.manager.is_some()
    }

    /// 共享的管理器句柄，调用方修改预设时加锁
    pub fn manager(&self) -> CoreResult<Arc<Mutex<FeeManager>>> {
        self.manager.clone().ok_or(CoreError::NotInitialized)
    }

    pub async fn update_fees(&self) -> CoreResult<bool> {
        let manager = self.manager()?;
        let mut guard = manager.lock().await;
        guard.update_fees().await
    }

    /// 启动周期刷新
    pub fn start_refresh(&mut self) -> CoreResult<()> {
        let manager = self.manager()?;
        if self.is_running() {
            return Err(CoreError::AlreadyRunning);
        }
        if self.config.refresh_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "refresh_interval_ms must be greater than 0".into(),
            ));
        }

        let period = Duration::from_millis(self.config.refresh_interval_ms);
        tracing::info!(interval_ms = self.config.refresh_interval_ms, "fee refresh started");

        self.refresh_task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 第一个 tick 立即返回，首次估算已在 initialize 中完成
            ticker.tick().await;

            loop {
                ticker.tick().await;

                // 上一次刷新仍在进行或调用方正在修改预设
                let Ok(mut guard) = manager.try_lock() else {
                    tracing::debug!("fee manager busy, skipping refresh tick");
                    continue;
                };

                match guard.update_fees().await {
                    Ok(true) => tracing::debug!("fee presets refreshed"),
                    Ok(false) => {}
                    Err(e) if e.is_transient() => {
                        tracing::warn!(error = %e, "fee refresh failed, keeping last known fees");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, code = e.code().as_str(), "fee refresh failed");
                    }
                }
            }
        }));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.refresh_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// 停止周期刷新；可以再次 start_refresh
    pub fn cancel(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
            tracing::info!("fee refresh cancelled");
        }
    }
}

impl Drop for FeeService {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for FeeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeeService")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("running", &self.is_running())
            .finish()
    }
}
