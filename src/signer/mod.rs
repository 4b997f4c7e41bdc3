//! 签名器
//!
//! 签名器是封闭的变体集合：
//!
//! - `PrivateKey { Evm, Solana, Btc }`：私钥常驻内存，本地同步签名
//! - `Hardware { Ledger, Trezor }`：不持有秘密，每次签名都委托给设备
//!
//! 统一通过 [`Signable`] 能力接口签名。链族与存储方式在构造时确定，之后
//! 只允许修改别名与隐藏标记。

pub mod hardware;
pub mod private_key;

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Bytes};
use zeroize::Zeroizing;

pub use hardware::HardwareSigner;
pub use private_key::{BtcPrivateKeySigner, EvmPrivateKeySigner, PrivateKeySigner, SolanaPrivateKeySigner};

use crate::{
    domain::{
        account::{SignerAccountInfo, SignerStorage},
        chain_config::ChainType,
    },
    error::{CoreError, CoreResult},
};

/// 消息签名选项，两个开关相互独立
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignMessageOptions {
    /// 直接对 32 字节摘要签名，不加链前缀；摘要总是按 hex 解析
    pub unsafe_without_prefix: bool,
    /// 将输入视为 hex 编码的原始字节而非 UTF-8 文本
    pub array_ify: bool,
}

impl SignMessageOptions {
    pub fn array_ify() -> Self {
        Self {
            array_ify: true,
            ..Self::default()
        }
    }

    pub fn unsafe_without_prefix() -> Self {
        Self {
            unsafe_without_prefix: true,
            ..Self::default()
        }
    }
}

/// 待签名交易
#[derive(Debug, Clone)]
pub enum TransactionPayload {
    Evm(TypedTransaction),
    /// 已序列化的 Solana 交易消息
    Solana(Vec<u8>),
}

impl TransactionPayload {
    pub fn chain_type(&self) -> ChainType {
        match self {
            TransactionPayload::Evm(_) => ChainType::Evm,
            TransactionPayload::Solana(_) => ChainType::Solana,
        }
    }
}

/// 签名结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// 可直接广播的已签名交易
    pub raw: Bytes,
    /// EVM 为 0x 前缀 hex，Solana 为 base58
    pub signature: String,
}

#[async_trait]
pub trait Signable: Send + Sync {
    async fn sign_transaction(&self, payload: &TransactionPayload) -> CoreResult<SignedPayload>;

    async fn sign_message(&self, message: &str, options: SignMessageOptions) -> CoreResult<String>;
}

#[derive(Debug)]
pub enum Signer {
    PrivateKey(PrivateKeySigner),
    Hardware(HardwareSigner),
}

impl Signer {
    pub fn info(&self) -> &SignerAccountInfo {
        match self {
            Signer::PrivateKey(signer) => signer.info(),
            Signer::Hardware(signer) => signer.info(),
        }
    }

    pub fn address(&self) -> &str {
        &self.info().address
    }

    pub fn chain_type(&self) -> ChainType {
        self.info().chain_type
    }

    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.info_mut().alias = alias.into();
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.info_mut().hidden = hidden;
    }

    fn info_mut(&mut self) -> &mut SignerAccountInfo {
        match self {
            Signer::PrivateKey(signer) => signer.info_mut(),
            Signer::Hardware(signer) => signer.info_mut(),
        }
    }

    /// 导出私钥；硬件签名器永远失败
    pub fn get_private_key(&self) -> CoreResult<Zeroizing<String>> {
        match self {
            Signer::PrivateKey(signer) => signer.get_private_key(),
            Signer::Hardware(_) => Err(CoreError::KeyNotExportable),
        }
    }

    /// 持久化用的存储变体
    pub fn storage(&self) -> CoreResult<SignerStorage> {
        match self {
            Signer::PrivateKey(signer) => Ok(SignerStorage::PrivateKeyMaterial {
                private_key: signer.get_private_key()?,
            }),
            Signer::Hardware(signer) => Ok(SignerStorage::HardwareReference(signer.reference().clone())),
        }
    }
}

#[async_trait]
impl Signable for Signer {
    async fn sign_transaction(&self, payload: &TransactionPayload) -> CoreResult<SignedPayload> {
        match self {
            Signer::PrivateKey(signer) => signer.sign_transaction(payload).await,
            Signer::Hardware(signer) => signer.sign_transaction(payload).await,
        }
    }

    async fn sign_message(&self, message: &str, options: SignMessageOptions) -> CoreResult<String> {
        match self {
            Signer::PrivateKey(signer) => signer.sign_message(message, options).await,
            Signer::Hardware(signer) => signer.sign_message(message, options).await,
        }
    }
}

/// 按选项把消息转换成待签名字节
pub(crate) fn message_bytes(message: &str, options: SignMessageOptions) -> CoreResult<Vec<u8>> {
    if options.array_ify || options.unsafe_without_prefix {
        let trimmed = message.strip_prefix("0x").unwrap_or(message);
        hex::decode(trimmed).map_err(|e| CoreError::InvalidMessage(format!("not a hex byte string: {}", e)))
    } else {
        Ok(message.as_bytes().to_vec())
    }
}

pub(crate) fn payload_mismatch(expected: ChainType, payload: &TransactionPayload) -> CoreError {
    CoreError::InvalidMessage(format!(
        "{} signer cannot sign a {} transaction",
        expected,
        payload.chain_type()
    ))
}
