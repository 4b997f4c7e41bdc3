//! 硬件签名器（Ledger / Trezor）
//!
//! 只保存派生路径等引用信息。每次签名都通过传输句柄请求设备，
//! 设备错误原样上抛，不做自动重试。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ethers::utils::to_checksum;

use super::{message_bytes, payload_mismatch, SignMessageOptions, Signable, SignedPayload, TransactionPayload};
use crate::{
    domain::{
        account::{HardwareReference, HardwareType, SignerAccountInfo},
        chain_config::ChainType,
    },
    error::{CoreError, CoreResult, HardwareError},
    infrastructure::hardware_transport::{HardwareTransportManager, TransportHandle},
};

#[derive(Debug)]
pub struct HardwareSigner {
    info: SignerAccountInfo,
    reference: HardwareReference,
    transport: HardwareTransportManager,
    /// 设备地址已与存储地址核对
    verified: AtomicBool,
}

impl HardwareSigner {
    /// 连接设备并读取地址，地址只在创建时获取一次
    pub async fn connect(
        alias: impl Into<String>,
        account_number: u32,
        transport: HardwareTransportManager,
    ) -> CoreResult<Self> {
        let hardware_type = transport.hardware_type();
        let derivation_path = ChainType::Evm.derivation_path(account_number);

        tracing::info!(
            hardware_type = %hardware_type,
            derivation_path = %derivation_path,
            "requesting address from hardware device"
        );

        let address = {
            let handle = transport.open()?;
            handle.get_address(&derivation_path).await?
        };
        let address = normalize_address(&address)?;

        Ok(Self {
            info: SignerAccountInfo::new(alias, ChainType::Evm, address),
            reference: HardwareReference {
                hardware_type,
                account_number,
                derivation_path,
            },
            transport,
            verified: AtomicBool::new(true),
        })
    }

    /// 从持久化记录恢复，首次签名前会核对设备地址
    pub fn restore(
        info: SignerAccountInfo,
        reference: HardwareReference,
        transport: HardwareTransportManager,
    ) -> Self {
        Self {
            info,
            reference,
            transport,
            verified: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &SignerAccountInfo {
        &self.info
    }

    pub(crate) fn info_mut(&mut self) -> &mut SignerAccountInfo {
        &mut self.info
    }

    pub fn reference(&self) -> &HardwareReference {
        &self.reference
    }

    pub fn hardware_type(&self) -> HardwareType {
        self.reference.hardware_type
    }

    async fn ensure_address(&self, handle: &TransportHandle) -> CoreResult<()> {
        if self.verified.load(Ordering::Acquire) {
            return Ok(());
        }

        let device = normalize_address(&handle.get_address(&self.reference.derivation_path).await?)?;
        if !device.eq_ignore_ascii_case(&self.info.address) {
            return Err(HardwareError::AddressMismatch {
                device,
                stored: self.info.address.clone(),
            }
            .into());
        }

        self.verified.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl Signable for HardwareSigner {
    async fn sign_transaction(&self, payload: &TransactionPayload) -> CoreResult<SignedPayload> {
        let TransactionPayload::Evm(tx) = payload else {
            return Err(payload_mismatch(ChainType::Evm, payload));
        };
        let chain_id = tx
            .chain_id()
            .ok_or_else(|| CoreError::InvalidMessage("hardware signing requires a chain id".into()))?;

        let handle = self.transport.open()?;
        self.ensure_address(&handle).await?;

        tracing::info!(
            hardware_type = %self.reference.hardware_type,
            account = %self.info.uuid,
            chain_id = %chain_id,
            "waiting for transaction approval on device"
        );

        let signature = handle
            .sign_transaction(&self.reference.derivation_path, tx)
            .await?;

        Ok(SignedPayload {
            raw: tx.rlp_signed(&signature),
            signature: format!("0x{}", hex::encode(signature.to_vec())),
        })
    }

    async fn sign_message(&self, message: &str, options: SignMessageOptions) -> CoreResult<String> {
        // 设备只支持带前缀的 personal_sign
        if options.unsafe_without_prefix {
            return Err(CoreError::NotImplemented("unprefixed message signing on hardware"));
        }
        let bytes = message_bytes(message, options)?;

        let handle = self.transport.open()?;
        self.ensure_address(&handle).await?;

        tracing::info!(
            hardware_type = %self.reference.hardware_type,
            account = %self.info.uuid,
            "waiting for message approval on device"
        );

        let signature = handle
            .sign_message(&self.reference.derivation_path, &bytes)
            .await?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}

/// 设备返回的地址转成 checksum 形式；无法解析视为传输错误
fn normalize_address(address: &str) -> Result<String, HardwareError> {
    address
        .parse::<ethers::types::Address>()
        .map(|parsed| to_checksum(&parsed, None))
        .map_err(|e| HardwareError::Transport(format!("device returned invalid address {:?}: {}", address, e)))
}
