//! 签名器注册表
//!
//! 在 [`KeyValueStore`] 之上管理账户生命周期。每个账户一条 JSON 记录
//! （`signer:{uuid}`），另有一条索引记录保存全部 uuid。

use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    domain::{
        account::{SignerAccountInfo, SignerStorage, StoredSigner},
        chain_config::ChainType,
        derivation,
    },
    error::{CoreError, CoreResult, HardwareError},
    infrastructure::{hardware_transport::HardwareTransportManager, key_value_store::KeyValueStore},
    signer::{HardwareSigner, PrivateKeySigner, Signer},
};

const INDEX_KEY: &str = "signer:index";

fn record_key(uuid: &Uuid) -> String {
    format!("signer:{}", uuid)
}

pub struct SignerRegistry {
    store: Arc<dyn KeyValueStore>,
    hardware: Option<HardwareTransportManager>,
    /// 串行化索引的读改写
    index_lock: Mutex<()>,
}

impl SignerRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            hardware: None,
            index_lock: Mutex::new(()),
        }
    }

    pub fn with_hardware(mut self, transport: HardwareTransportManager) -> Self {
        self.hardware = Some(transport);
        self
    }

    /// 生成 BIP-39 助记词（12 或 24 个单词），不落盘
    pub fn generate_mnemonic(&self, word_count: usize) -> CoreResult<Zeroizing<String>> {
        derivation::generate_mnemonic(word_count)
    }

    pub async fn create_from_mnemonic(
        &self,
        chain_type: ChainType,
        alias: impl Into<String>,
        mnemonic: &str,
        index: u32,
    ) -> CoreResult<Signer> {
        let signer = Signer::PrivateKey(PrivateKeySigner::from_mnemonic(
            chain_type, alias, mnemonic, index,
        )?);
        self.persist_new(&signer).await?;
        Ok(signer)
    }

    pub async fn import_private_key(
        &self,
        chain_type: ChainType,
        alias: impl Into<String>,
        private_key: &str,
    ) -> CoreResult<Signer> {
        let signer = Signer::PrivateKey(PrivateKeySigner::from_private_key(
            chain_type,
            alias,
            private_key,
        )?);
        self.persist_new(&signer).await?;
        Ok(signer)
    }

    /// 从设备读取地址并登记硬件账户
    pub async fn import_hardware(&self, alias: impl Into<String>, account_number: u32) -> CoreResult<Signer> {
        let transport = self.transport()?;
        let signer = Signer::Hardware(HardwareSigner::connect(alias, account_number, transport).await?);
        self.persist_new(&signer).await?;
        Ok(signer)
    }

    pub async fn load(&self, uuid: Uuid) -> CoreResult<Signer> {
        let record = self.load_record(uuid).await?;
        match record.storage {
            SignerStorage::PrivateKeyMaterial { private_key } => Ok(Signer::PrivateKey(
                PrivateKeySigner::restore(record.info, &private_key)?,
            )),
            SignerStorage::HardwareReference(reference) => {
                let transport = self.transport()?;
                if transport.hardware_type() != reference.hardware_type {
                    return Err(HardwareError::Transport(format!(
                        "account requires a {} device, connected device is {}",
                        reference.hardware_type,
                        transport.hardware_type()
                    ))
                    .into());
                }
                Ok(Signer::Hardware(HardwareSigner::restore(
                    record.info,
                    reference,
                    transport,
                )))
            }
        }
    }

    /// 全部账户身份（含隐藏账户），按登记顺序
    pub async fn list_accounts(&self) -> CoreResult<Vec<SignerAccountInfo>> {
        let index = self.load_index().await?;
        let loads = index.iter().map(|uuid| self.load_record(*uuid));
        let outcomes = futures::future::join_all(loads).await;

        let mut accounts = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(record) => accounts.push(record.info),
                Err(CoreError::AccountNotFound(uuid)) => {
                    tracing::warn!(%uuid, "signer index references a missing record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(accounts)
    }

    pub async fn rename(&self, uuid: Uuid, alias: impl Into<String>) -> CoreResult<SignerAccountInfo> {
        let alias = alias.into();
        self.update_info(uuid, |info| info.alias = alias).await
    }

    pub async fn set_hidden(&self, uuid: Uuid, hidden: bool) -> CoreResult<SignerAccountInfo> {
        self.update_info(uuid, |info| info.hidden = hidden).await
    }

    pub async fn delete(&self, uuid: Uuid) -> CoreResult<()> {
        let _guard = self.index_lock.lock().await;

        let mut index = self.load_index().await?;
        let before = index.len();
        index.retain(|id| *id != uuid);
        if index.len() == before {
            return Err(CoreError::AccountNotFound(uuid));
        }

        self.store.delete(&record_key(&uuid)).await?;
        self.save_index(&index).await?;

        tracing::info!(%uuid, "signer deleted");
        Ok(())
    }

    fn transport(&self) -> CoreResult<HardwareTransportManager> {
        self.hardware
            .clone()
            .ok_or_else(|| HardwareError::Transport("no hardware device configured".into()).into())
    }

    async fn persist_new(&self, signer: &Signer) -> CoreResult<()> {
        let record = StoredSigner {
            info: signer.info().clone(),
            storage: signer.storage()?,
        };
        let uuid = record.info.uuid;

        let _guard = self.index_lock.lock().await;
        self.save_record(&record).await?;

        let mut index = self.load_index().await?;
        index.push(uuid);
        self.save_index(&index).await?;

        tracing::info!(
            %uuid,
            chain_type = %record.info.chain_type,
            address = %record.info.address,
            "signer registered"
        );
        Ok(())
    }

    async fn update_info<F>(&self, uuid: Uuid, update: F) -> CoreResult<SignerAccountInfo>
    where
        F: FnOnce(&mut SignerAccountInfo),
    {
        let mut record = self.load_record(uuid).await?;
        update(&mut record.info);
        self.save_record(&record).await?;
        Ok(record.info)
    }

    async fn load_record(&self, uuid: Uuid) -> CoreResult<StoredSigner> {
        let raw = self
            .store
            .load(&record_key(&uuid))
            .await?
            .ok_or(CoreError::AccountNotFound(uuid))?;
        let raw = Zeroizing::new(raw);
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save_record(&self, record: &StoredSigner) -> CoreResult<()> {
        let raw = serde_json::to_string(record)?;
        self.store.save(&record_key(&record.info.uuid), raw).await
    }

    async fn load_index(&self) -> CoreResult<Vec<Uuid>> {
        match self.store.load(INDEX_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_index(&self, index: &[Uuid]) -> CoreResult<()> {
        self.store.save(INDEX_KEY, serde_json::to_string(index)?).await
    }
}

impl std::fmt::Debug for SignerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerRegistry")
            .field("hardware", &self.hardware)
            .finish()
    }
}
