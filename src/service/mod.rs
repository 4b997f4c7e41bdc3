pub mod fee_service;
pub mod signer_service;
pub mod swap;

pub use fee_service::FeeService;
pub use signer_service::SignerRegistry;
pub use swap::{SwapDetails, SwapOrchestrator, SwapSettlement};
