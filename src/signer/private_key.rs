//! 私钥签名器（私钥常驻内存，本地签名）

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use ethers::{
    signers::{LocalWallet, Signer as _},
    types::{Bytes, H256},
    utils::to_checksum,
};
use zeroize::Zeroizing;

use super::{message_bytes, payload_mismatch, SignMessageOptions, Signable, SignedPayload, TransactionPayload};
use crate::{
    domain::{account::SignerAccountInfo, chain_config::ChainType, derivation::derive_private_key},
    error::{CoreError, CoreResult},
};

#[derive(Debug)]
pub enum PrivateKeySigner {
    Evm(EvmPrivateKeySigner),
    Solana(SolanaPrivateKeySigner),
    Btc(BtcPrivateKeySigner),
}

impl PrivateKeySigner {
    pub fn from_private_key(
        chain_type: ChainType,
        alias: impl Into<String>,
        private_key: &str,
    ) -> CoreResult<Self> {
        match chain_type {
            ChainType::Evm => EvmPrivateKeySigner::from_private_key(alias, private_key).map(Self::Evm),
            ChainType::Solana => {
                SolanaPrivateKeySigner::from_private_key(alias, private_key).map(Self::Solana)
            }
            ChainType::Btc => BtcPrivateKeySigner::from_private_key(alias, private_key).map(Self::Btc),
        }
    }

    pub fn from_mnemonic(
        chain_type: ChainType,
        alias: impl Into<String>,
        mnemonic: &str,
        index: u32,
    ) -> CoreResult<Self> {
        match chain_type {
            ChainType::Evm => EvmPrivateKeySigner::from_mnemonic(alias, mnemonic, index).map(Self::Evm),
            ChainType::Solana => {
                SolanaPrivateKeySigner::from_mnemonic(alias, mnemonic, index).map(Self::Solana)
            }
            ChainType::Btc => BtcPrivateKeySigner::from_mnemonic(alias, mnemonic, index).map(Self::Btc),
        }
    }

    /// 从持久化记录恢复；身份信息沿用存储值，地址必须与私钥一致
    pub fn restore(info: SignerAccountInfo, private_key: &str) -> CoreResult<Self> {
        let mut signer = Self::from_private_key(info.chain_type, info.alias.clone(), private_key)?;
        if !signer.info().address.eq_ignore_ascii_case(&info.address) {
            return Err(CoreError::InvalidKeyMaterial(format!(
                "stored key does not match address {}",
                info.address
            )));
        }
        *signer.info_mut() = info;
        Ok(signer)
    }

    pub fn info(&self) -> &SignerAccountInfo {
        match self {
            Self::Evm(s) => &s.info,
            Self::Solana(s) => &s.info,
            Self::Btc(s) => &s.info,
        }
    }

    pub(crate) fn info_mut(&mut self) -> &mut SignerAccountInfo {
        match self {
            Self::Evm(s) => &mut s.info,
            Self::Solana(s) => &mut s.info,
            Self::Btc(s) => &mut s.info,
        }
    }

    pub fn get_private_key(&self) -> CoreResult<Zeroizing<String>> {
        match self {
            Self::Evm(s) => Ok(s.get_private_key()),
            Self::Solana(s) => Ok(s.get_private_key()),
            Self::Btc(_) => Err(CoreError::NotImplemented("bitcoin signer")),
        }
    }
}

#[async_trait]
impl Signable for PrivateKeySigner {
    async fn sign_transaction(&self, payload: &TransactionPayload) -> CoreResult<SignedPayload> {
        match self {
            Self::Evm(s) => s.sign_transaction(payload).await,
            Self::Solana(s) => s.sign_transaction(payload).await,
            Self::Btc(s) => s.sign_transaction(payload).await,
        }
    }

    async fn sign_message(&self, message: &str, options: SignMessageOptions) -> CoreResult<String> {
        match self {
            Self::Evm(s) => s.sign_message(message, options).await,
            Self::Solana(s) => s.sign_message(message, options).await,
            Self::Btc(s) => s.sign_message(message, options).await,
        }
    }
}

// ============ EVM ============

pub struct EvmPrivateKeySigner {
    info: SignerAccountInfo,
    wallet: LocalWallet,
}

impl std::fmt::Debug for EvmPrivateKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmPrivateKeySigner")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl EvmPrivateKeySigner {
    /// 32 字节 hex 私钥，可带 0x 前缀
    pub fn from_private_key(alias: impl Into<String>, private_key: &str) -> CoreResult<Self> {
        let trimmed = private_key.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if trimmed.len() != 64 {
            return Err(CoreError::InvalidKeyMaterial(
                "EVM private key must be 32 bytes of hex".into(),
            ));
        }
        let bytes = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| CoreError::InvalidKeyMaterial(e.to_string()))?,
        );
        Self::from_bytes(alias, &bytes)
    }

    pub fn from_mnemonic(alias: impl Into<String>, mnemonic: &str, index: u32) -> CoreResult<Self> {
        let derived = derive_private_key(ChainType::Evm, mnemonic, index)?;
        Self::from_bytes(alias, derived.private_key.as_ref())
    }

    fn from_bytes(alias: impl Into<String>, bytes: &[u8]) -> CoreResult<Self> {
        let wallet = LocalWallet::from_bytes(bytes)
            .map_err(|e| CoreError::InvalidKeyMaterial(e.to_string()))?;
        let address = to_checksum(&wallet.address(), None);

        Ok(Self {
            info: SignerAccountInfo::new(alias, ChainType::Evm, address),
            wallet,
        })
    }

    pub fn get_private_key(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.wallet.signer().to_bytes())))
    }
}

#[async_trait]
impl Signable for EvmPrivateKeySigner {
    async fn sign_transaction(&self, payload: &TransactionPayload) -> CoreResult<SignedPayload> {
        let TransactionPayload::Evm(tx) = payload else {
            return Err(payload_mismatch(ChainType::Evm, payload));
        };

        // 签名与 RLP 编码必须使用同一个 chain id
        let mut tx = tx.clone();
        if tx.chain_id().is_none() {
            tx.set_chain_id(self.wallet.chain_id());
        }

        let signature = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(CoreError::signing)?;

        Ok(SignedPayload {
            raw: tx.rlp_signed(&signature),
            signature: format!("0x{}", hex::encode(signature.to_vec())),
        })
    }

    async fn sign_message(&self, message: &str, options: SignMessageOptions) -> CoreResult<String> {
        let bytes = message_bytes(message, options)?;

        let signature = if options.unsafe_without_prefix {
            if bytes.len() != 32 {
                return Err(CoreError::InvalidMessage(format!(
                    "unprefixed signing requires a 32-byte digest, got {} bytes",
                    bytes.len()
                )));
            }
            tracing::debug!(address = %self.info.address, "signing raw digest without prefix");
            self.wallet
                .sign_hash(H256::from_slice(&bytes))
                .map_err(CoreError::signing)?
        } else {
            self.wallet
                .sign_message(&bytes)
                .await
                .map_err(CoreError::signing)?
        };

        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}

// ============ Solana ============

pub struct SolanaPrivateKeySigner {
    info: SignerAccountInfo,
    signing_key: SigningKey,
}

impl std::fmt::Debug for SolanaPrivateKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaPrivateKeySigner")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl SolanaPrivateKeySigner {
    /// base58 编码的 64 字节 keypair 或 32 字节种子
    pub fn from_private_key(alias: impl Into<String>, private_key: &str) -> CoreResult<Self> {
        let bytes = Zeroizing::new(
            bs58::decode(private_key.trim())
                .into_vec()
                .map_err(|e| CoreError::InvalidKeyMaterial(e.to_string()))?,
        );

        let signing_key = match bytes.len() {
            32 => {
                let mut seed = Zeroizing::new([0u8; 32]);
                seed.copy_from_slice(&bytes);
                SigningKey::from_bytes(&seed)
            }
            64 => {
                let mut keypair = Zeroizing::new([0u8; 64]);
                keypair.copy_from_slice(&bytes);
                // 校验后 32 字节公钥与私钥匹配
                SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|e| CoreError::InvalidKeyMaterial(e.to_string()))?
            }
            other => {
                return Err(CoreError::InvalidKeyMaterial(format!(
                    "Solana private key must be 32 or 64 bytes, got {}",
                    other
                )))
            }
        };

        Ok(Self::from_signing_key(alias, signing_key))
    }

    pub fn from_mnemonic(alias: impl Into<String>, mnemonic: &str, index: u32) -> CoreResult<Self> {
        let derived = derive_private_key(ChainType::Solana, mnemonic, index)?;
        Ok(Self::from_signing_key(alias, SigningKey::from_bytes(&derived.private_key)))
    }

    fn from_signing_key(alias: impl Into<String>, signing_key: SigningKey) -> Self {
        let address = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
        Self {
            info: SignerAccountInfo::new(alias, ChainType::Solana, address),
            signing_key,
        }
    }

    pub fn get_private_key(&self) -> Zeroizing<String> {
        let keypair = Zeroizing::new(self.signing_key.to_keypair_bytes());
        Zeroizing::new(bs58::encode(&keypair[..]).into_string())
    }
}

#[async_trait]
impl Signable for SolanaPrivateKeySigner {
    async fn sign_transaction(&self, payload: &TransactionPayload) -> CoreResult<SignedPayload> {
        let TransactionPayload::Solana(message) = payload else {
            return Err(payload_mismatch(ChainType::Solana, payload));
        };

        let signature = self.signing_key.sign(message).to_bytes();

        // 单签名交易：shortvec(1) || signature || message
        let mut raw = Vec::with_capacity(1 + signature.len() + message.len());
        raw.push(1u8);
        raw.extend_from_slice(&signature);
        raw.extend_from_slice(message);

        Ok(SignedPayload {
            raw: Bytes::from(raw),
            signature: bs58::encode(signature).into_string(),
        })
    }

    async fn sign_message(&self, message: &str, options: SignMessageOptions) -> CoreResult<String> {
        // ed25519 没有前缀约定，两种模式都直接对字节签名
        let bytes = message_bytes(message, options)?;
        let signature = self.signing_key.sign(&bytes);
        Ok(bs58::encode(signature.to_bytes()).into_string())
    }
}

// ============ Bitcoin（占位） ============

/// 尚未实现，所有操作返回 `NotImplemented`
#[derive(Debug)]
pub struct BtcPrivateKeySigner {
    info: SignerAccountInfo,
}

impl BtcPrivateKeySigner {
    pub fn from_private_key(_alias: impl Into<String>, _private_key: &str) -> CoreResult<Self> {
        Err(CoreError::NotImplemented("bitcoin signer"))
    }

    pub fn from_mnemonic(_alias: impl Into<String>, _mnemonic: &str, _index: u32) -> CoreResult<Self> {
        Err(CoreError::NotImplemented("bitcoin signer"))
    }
}

#[async_trait]
impl Signable for BtcPrivateKeySigner {
    async fn sign_transaction(&self, _payload: &TransactionPayload) -> CoreResult<SignedPayload> {
        Err(CoreError::NotImplemented("bitcoin signer"))
    }

    async fn sign_message(&self, _message: &str, _options: SignMessageOptions) -> CoreResult<String> {
        Err(CoreError::NotImplemented("bitcoin signer"))
    }
}
