//! 私钥派生
//!
//! 同一助记词 + 同一账户索引 => 同一私钥、同一地址

use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::{
    domain::chain_config::ChainType,
    error::{CoreError, CoreResult},
};

type HmacSha512 = Hmac<Sha512>;

const HARDENED_OFFSET: u32 = 0x8000_0000;

/// 派生结果
pub struct DerivedKey {
    /// 原始 32 字节私钥（EVM 为 secp256k1 标量，Solana 为 ed25519 种子）
    pub private_key: Zeroizing<[u8; 32]>,
    pub derivation_path: String,
}

/// 解析并校验 BIP39 助记词
pub fn parse_mnemonic(phrase: &str) -> CoreResult<Mnemonic> {
    Mnemonic::parse_in(Language::English, phrase.trim())
        .map_err(|e| CoreError::InvalidMnemonic(e.to_string()))
}

/// 生成新的助记词（12 或 24 词）
pub fn generate_mnemonic(word_count: usize) -> CoreResult<Zeroizing<String>> {
    let entropy_len = match word_count {
        12 => 16,
        24 => 32,
        other => {
            return Err(CoreError::InvalidMnemonic(format!(
                "unsupported word count {}",
                other
            )))
        }
    };

    let mut entropy = Zeroizing::new(vec![0u8; entropy_len]);
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| CoreError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// 按链族从助记词派生私钥
pub fn derive_private_key(chain_type: ChainType, phrase: &str, index: u32) -> CoreResult<DerivedKey> {
    let mnemonic = parse_mnemonic(phrase)?;
    let seed = Zeroizing::new(mnemonic.to_seed(""));
    let derivation_path = chain_type.derivation_path(index);

    let private_key = match chain_type {
        ChainType::Evm => derive_secp256k1(seed.as_ref(), &derivation_path)?,
        ChainType::Solana => derive_ed25519(seed.as_ref(), &[44, chain_type.coin_type(), index, 0])?,
        ChainType::Btc => return Err(CoreError::NotImplemented("bitcoin key derivation")),
    };

    Ok(DerivedKey {
        private_key,
        derivation_path,
    })
}

/// BIP32 secp256k1 派生
fn derive_secp256k1(seed: &[u8], path: &str) -> CoreResult<Zeroizing<[u8; 32]>> {
    use coins_bip32::prelude::*;
    use k256::ecdsa::SigningKey;

    let derivation_path = path
        .parse::<DerivationPath>()
        .map_err(|e| CoreError::InvalidKeyMaterial(format!("invalid derivation path: {}", e)))?;

    let master_key = XPriv::root_from_seed(seed, None)
        .map_err(|e| CoreError::InvalidKeyMaterial(format!("master key: {}", e)))?;

    let derived_key = master_key
        .derive_path(&derivation_path)
        .map_err(|e| CoreError::InvalidKeyMaterial(format!("child key: {}", e)))?;

    // XPriv 实现 AsRef<SigningKey>
    let signing_key: &SigningKey = derived_key.as_ref();
    let mut bytes = Zeroizing::new([0u8; 32]);
    bytes.copy_from_slice(&signing_key.to_bytes());
    Ok(bytes)
}

/// SLIP-0010 ed25519 派生（只支持硬化索引）
fn derive_ed25519(seed: &[u8], path: &[u32]) -> CoreResult<Zeroizing<[u8; 32]>> {
    let hmac_err = |e: hmac::digest::InvalidLength| CoreError::InvalidKeyMaterial(e.to_string());

    let mut mac = HmacSha512::new_from_slice(b"ed25519 seed").map_err(hmac_err)?;
    mac.update(seed);
    let digest = mac.finalize().into_bytes();

    let mut key = Zeroizing::new([0u8; 32]);
    let mut chain_code = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest[..32]);
    chain_code.copy_from_slice(&digest[32..]);

    for &index in path {
        let mut mac = HmacSha512::new_from_slice(chain_code.as_ref()).map_err(hmac_err)?;
        mac.update(&[0u8]);
        mac.update(key.as_ref());
        mac.update(&(index | HARDENED_OFFSET).to_be_bytes());
        let digest = mac.finalize().into_bytes();

        key.copy_from_slice(&digest[..32]);
        chain_code.copy_from_slice(&digest[32..]);
    }

    Ok(key)
}
