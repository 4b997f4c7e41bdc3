//! 代币兑换
//!
//! - `quote`: 聚合器报价
//! - `contracts`: ERC-20 与代理合约调用编码
//! - `exchange_rate`: 代币对原生币汇率
//! - `orchestrator`: 把以上组合成可签名的授权/兑换交易

pub mod contracts;
pub mod exchange_rate;
pub mod orchestrator;
pub mod quote;

pub use exchange_rate::{ExchangeRateProvider, OnchainExchangeRate};
pub use orchestrator::{
    calculate_minimum_return_amount, PreparedTransaction, SwapAmounts, SwapDetails,
    SwapOrchestrator, SwapSettlement, SwapTokens,
};
pub use quote::{HttpSwapQuoteClient, QuoteRequest, SwapParams, SwapQuote, SwapQuoteApi};
