//! 硬件钱包传输层
//!
//! 整个进程同一时间只允许打开一个传输句柄。[`HardwareTransportManager`]
//! 负责发放句柄，第二次并发打开直接返回 `TransportAlreadyOpen`；
//! 句柄 drop 时自动释放。

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Signature};

use crate::{domain::account::HardwareType, error::HardwareError};

/// 设备请求接口（Ledger / Trezor 驱动实现）
///
/// 所有签名请求都需要用户在设备上确认，可能耗时数十秒。
#[async_trait]
pub trait HardwareDevice: Send + Sync {
    fn hardware_type(&self) -> HardwareType;

    async fn get_address(&self, derivation_path: &str) -> Result<String, HardwareError>;

    async fn sign_transaction(
        &self,
        derivation_path: &str,
        tx: &TypedTransaction,
    ) -> Result<Signature, HardwareError>;

    async fn sign_message(
        &self,
        derivation_path: &str,
        message: &[u8],
    ) -> Result<Signature, HardwareError>;
}

#[derive(Clone)]
pub struct HardwareTransportManager {
    device: Arc<dyn HardwareDevice>,
    open: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl std::fmt::Debug for HardwareTransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareTransportManager")
            .field("hardware_type", &self.device.hardware_type())
            .field("open", &self.is_open())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl HardwareTransportManager {
    pub fn new(device: Arc<dyn HardwareDevice>, request_timeout: Duration) -> Self {
        Self {
            device,
            open: Arc::new(AtomicBool::new(false)),
            request_timeout,
        }
    }

    pub fn from_config(device: Arc<dyn HardwareDevice>, config: &crate::config::HardwareConfig) -> Self {
        Self::new(device, Duration::from_secs(config.request_timeout_secs))
    }

    pub fn hardware_type(&self) -> HardwareType {
        self.device.hardware_type()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// 获取唯一的传输句柄
    pub fn open(&self) -> Result<TransportHandle, HardwareError> {
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HardwareError::TransportAlreadyOpen)?;

        tracing::debug!(hardware_type = %self.device.hardware_type(), "hardware transport opened");

        Ok(TransportHandle {
            device: Arc::clone(&self.device),
            open: Arc::clone(&self.open),
            request_timeout: self.request_timeout,
        })
    }
}

/// 已打开的传输句柄，drop 时释放
pub struct TransportHandle {
    device: Arc<dyn HardwareDevice>,
    open: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl TransportHandle {
    async fn with_timeout<T, F>(&self, request: F) -> Result<T, HardwareError>
    where
        F: std::future::Future<Output = Result<T, HardwareError>>,
    {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| HardwareError::Timeout(self.request_timeout.as_secs()))?
    }

    pub async fn get_address(&self, derivation_path: &str) -> Result<String, HardwareError> {
        self.with_timeout(self.device.get_address(derivation_path)).await
    }

    pub async fn sign_transaction(
        &self,
        derivation_path: &str,
        tx: &TypedTransaction,
    ) -> Result<Signature, HardwareError> {
        self.with_timeout(self.device.sign_transaction(derivation_path, tx))
            .await
    }

    pub async fn sign_message(
        &self,
        derivation_path: &str,
        message: &[u8],
    ) -> Result<Signature, HardwareError> {
        self.with_timeout(self.device.sign_message(derivation_path, message))
            .await
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
        tracing::debug!("hardware transport released");
    }
}
