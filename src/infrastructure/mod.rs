pub mod hardware_transport;
pub mod key_value_store;
pub mod logging;
pub mod rpc_provider;

pub use hardware_transport::{HardwareDevice, HardwareTransportManager, TransportHandle};
pub use key_value_store::{InMemoryKeyValueStore, KeyValueStore};
pub use rpc_provider::{BlockHeader, EthersRpcProvider, FeeData, FeeHistory, RpcProvider, SimulatedTransaction};
