//! 签名器与注册表集成测试
//!
//! 硬件签名器使用本地私钥模拟的设备。

mod common;

use std::{str::FromStr, sync::Arc, time::Duration};

use common::{MockHardwareDevice, ANVIL_ADDRESS_0, ANVIL_KEY_0, ANVIL_KEY_1, TEST_MNEMONIC};
use ethers::{
    types::{transaction::eip2718::TypedTransaction, Address, Signature, TransactionRequest, U256},
    utils::{rlp::Rlp, to_checksum},
};
use walletcore::{
    domain::{ChainType, HardwareReference, HardwareType, SignerAccountInfo},
    error::{CoreError, HardwareError},
    infrastructure::{HardwareTransportManager, InMemoryKeyValueStore, KeyValueStore},
    service::SignerRegistry,
    signer::{HardwareSigner, SignMessageOptions, Signable, Signer, TransactionPayload},
};

fn transport(device: Arc<MockHardwareDevice>) -> HardwareTransportManager {
    HardwareTransportManager::new(device, Duration::from_secs(5))
}

fn evm_transfer() -> TypedTransaction {
    TransactionRequest::new()
        .to(Address::repeat_byte(0x02))
        .value(U256::from(1_000u64))
        .nonce(0u64)
        .gas(21_000u64)
        .gas_price(1_000_000_000u64)
        .chain_id(1u64)
        .into()
}

fn ledger_reference(account_number: u32) -> HardwareReference {
    HardwareReference {
        hardware_type: HardwareType::Ledger,
        account_number,
        derivation_path: ChainType::Evm.derivation_path(account_number),
    }
}

// ============ 硬件签名器 ============

#[tokio::test]
async fn test_hardware_signer_reads_address_once() {
    let device = MockHardwareDevice::new(ANVIL_KEY_1);
    let signer = HardwareSigner::connect("ledger", 0, transport(device.clone()))
        .await
        .unwrap();

    assert_eq!(signer.info().address, to_checksum(&device.address(), None));
    assert_eq!(signer.reference().derivation_path, "m/44'/60'/0'/0/0");

    let signer = Signer::Hardware(signer);
    signer
        .sign_message("hello", SignMessageOptions::default())
        .await
        .unwrap();
    signer
        .sign_message("again", SignMessageOptions::default())
        .await
        .unwrap();
    assert_eq!(device.address_requests.load(std::sync::atomic::Ordering::SeqCst), 1);

    assert!(matches!(signer.get_private_key(), Err(CoreError::KeyNotExportable)));
}

#[tokio::test]
async fn test_hardware_transaction_signature_recovers_device_address() {
    let device = MockHardwareDevice::new(ANVIL_KEY_1);
    let signer = HardwareSigner::connect("ledger", 0, transport(device.clone()))
        .await
        .unwrap();

    let signed = signer
        .sign_transaction(&TransactionPayload::Evm(evm_transfer()))
        .await
        .unwrap();

    let (decoded, signature) = TypedTransaction::decode_signed(&Rlp::new(&signed.raw)).unwrap();
    assert_eq!(signature.recover(decoded.sighash()).unwrap(), device.address());
    assert_eq!(Signature::from_str(&signed.signature).unwrap(), signature);
}

#[tokio::test]
async fn test_restored_hardware_signer_detects_other_device() {
    let device = MockHardwareDevice::new(ANVIL_KEY_1);
    let info = SignerAccountInfo::new("ledger", ChainType::Evm, ANVIL_ADDRESS_0.to_string());
    let signer = HardwareSigner::restore(info, ledger_reference(0), transport(device));

    let err = signer
        .sign_message("hello", SignMessageOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Hardware(HardwareError::AddressMismatch { ref stored, .. }) if stored == ANVIL_ADDRESS_0
    ));
}

#[tokio::test]
async fn test_hardware_rejects_unprefixed_messages() {
    let device = MockHardwareDevice::new(ANVIL_KEY_1);
    let signer = HardwareSigner::connect("ledger", 0, transport(device)).await.unwrap();

    let digest = format!("0x{}", "11".repeat(32));
    let options = SignMessageOptions {
        unsafe_without_prefix: true,
        array_ify: true,
    };
    assert!(matches!(
        signer.sign_message(&digest, options).await,
        Err(CoreError::NotImplemented(_))
    ));
}

#[tokio::test]
async fn test_second_transport_open_is_rejected() {
    let device = MockHardwareDevice::new(ANVIL_KEY_1);
    let manager = transport(device);
    let signer = HardwareSigner::connect("ledger", 0, manager.clone()).await.unwrap();

    let handle = manager.open().unwrap();
    let err = signer
        .sign_message("hello", SignMessageOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Hardware(HardwareError::TransportAlreadyOpen)));

    drop(handle);
    assert!(!manager.is_open());
    signer
        .sign_message("hello", SignMessageOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unparseable_device_address_is_rejected() {
    let device = MockHardwareDevice::new(ANVIL_KEY_1);
    device.report_address("not-an-address");

    let err = HardwareSigner::connect("ledger", 0, transport(device.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Hardware(HardwareError::Transport(_))));

    // 注册表不会留下任何记录
    let store = Arc::new(InMemoryKeyValueStore::new());
    let registry = SignerRegistry::new(store.clone()).with_hardware(transport(device));
    assert!(registry.import_hardware("ledger", 0).await.is_err());
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_device_times_out() {
    let device = MockHardwareDevice::slow(ANVIL_KEY_1, Duration::from_secs(30));
    let manager = HardwareTransportManager::new(device, Duration::from_secs(10));

    let err = HardwareSigner::connect("ledger", 0, manager.clone()).await.unwrap_err();
    assert!(matches!(err, CoreError::Hardware(HardwareError::Timeout(10))));
    assert!(!manager.is_open());
}

// ============ 注册表 ============

#[tokio::test]
async fn test_registry_account_lifecycle() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let registry = SignerRegistry::new(store.clone());

    let evm = registry
        .create_from_mnemonic(ChainType::Evm, "main", TEST_MNEMONIC, 0)
        .await
        .unwrap();
    assert_eq!(evm.address(), "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");

    let sol = registry
        .create_from_mnemonic(ChainType::Solana, "sol", TEST_MNEMONIC, 0)
        .await
        .unwrap();
    let imported = registry
        .import_private_key(ChainType::Evm, "imported", ANVIL_KEY_0)
        .await
        .unwrap();
    assert_eq!(imported.address(), ANVIL_ADDRESS_0);

    let accounts = registry.list_accounts().await.unwrap();
    let aliases: Vec<_> = accounts.iter().map(|a| a.alias.as_str()).collect();
    assert_eq!(aliases, vec!["main", "sol", "imported"]);

    let renamed = registry.rename(sol.info().uuid, "solana").await.unwrap();
    assert_eq!(renamed.alias, "solana");
    let hidden = registry.set_hidden(imported.info().uuid, true).await.unwrap();
    assert!(hidden.hidden);

    // 重新加载后签名结果一致
    let reloaded = registry.load(imported.info().uuid).await.unwrap();
    assert!(reloaded.info().hidden);
    let original = imported
        .sign_message("hello", SignMessageOptions::default())
        .await
        .unwrap();
    let again = reloaded
        .sign_message("hello", SignMessageOptions::default())
        .await
        .unwrap();
    assert_eq!(original, again);

    registry.delete(sol.info().uuid).await.unwrap();
    assert!(matches!(
        registry.load(sol.info().uuid).await,
        Err(CoreError::AccountNotFound(_))
    ));
    assert!(matches!(
        registry.delete(sol.info().uuid).await,
        Err(CoreError::AccountNotFound(_))
    ));
    assert_eq!(registry.list_accounts().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_registry_rejects_unsupported_chain() {
    let registry = SignerRegistry::new(Arc::new(InMemoryKeyValueStore::new()));
    let err = registry
        .create_from_mnemonic(ChainType::Btc, "btc", TEST_MNEMONIC, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotImplemented(_)));
    assert!(registry.list_accounts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registry_hardware_round_trip() {
    let device = MockHardwareDevice::new(ANVIL_KEY_1);
    let store = Arc::new(InMemoryKeyValueStore::new());
    let registry = SignerRegistry::new(store.clone()).with_hardware(transport(device.clone()));

    let signer = registry.import_hardware("ledger", 0).await.unwrap();
    let uuid = signer.info().uuid;

    let raw = store.load(&format!("signer:{}", uuid)).await.unwrap().unwrap();
    assert!(!raw.contains("private_key"));

    // 设备换成另一把钥匙后，恢复的签名器拒绝签名
    device.report_address(ANVIL_ADDRESS_0);
    let restored = registry.load(uuid).await.unwrap();
    let err = restored
        .sign_transaction(&TransactionPayload::Evm(evm_transfer()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Hardware(HardwareError::AddressMismatch { .. })));
}
