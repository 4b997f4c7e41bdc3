//! 兑换报价
//!
//! 外部聚合器的响应在边界处解析成严格结构：缺字段、多字段、金额不是十进制
//! 字符串都会得到 `QuoteParse` 错误，不会带着缺失值继续往下走。

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    config::SwapConfig,
    error::{CoreError, CoreResult},
};

/// 报价请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub chain_id: u64,
    pub from_token: Address,
    pub to_token: Address,
    pub amount: U256,
    pub slippage: Decimal,
    /// 聚合器调用的发起方，即兑换代理合约
    pub destination: Address,
}

/// 聚合器给出的调用参数，报价后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    /// 聚合路由合约
    pub to: Address,
    pub data: Bytes,
    pub amount: U256,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub to_amount: U256,
    pub swap_params: SwapParams,
}

#[async_trait]
pub trait SwapQuoteApi: Send + Sync {
    async fn get_quote(&self, request: &QuoteRequest) -> CoreResult<SwapQuote>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct QuoteResponse {
    to_amount: String,
    tx: QuoteTxResponse,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct QuoteTxResponse {
    from: String,
    to: String,
    data: String,
    value: String,
    gas: u64,
    gas_price: String,
}

fn parse_amount(field: &str, raw: &str) -> CoreResult<U256> {
    U256::from_dec_str(raw)
        .map_err(|_| CoreError::QuoteParse(format!("{} is not a decimal amount: {:?}", field, raw)))
}

fn parse_address(field: &str, raw: &str) -> CoreResult<Address> {
    Address::from_str(raw)
        .map_err(|_| CoreError::QuoteParse(format!("{} is not an address: {:?}", field, raw)))
}

impl QuoteResponse {
    fn into_quote(self, amount: U256) -> CoreResult<SwapQuote> {
        let to_amount = parse_amount("toAmount", &self.to_amount)?;
        // 这两个字段只做校验
        parse_address("tx.from", &self.tx.from)?;
        parse_amount("tx.gasPrice", &self.tx.gas_price)?;

        let data = Bytes::from_str(&self.tx.data)
            .map_err(|_| CoreError::QuoteParse(format!("tx.data is not hex: {:?}", self.tx.data)))?;

        Ok(SwapQuote {
            to_amount,
            swap_params: SwapParams {
                to: parse_address("tx.to", &self.tx.to)?,
                data,
                amount,
                value: parse_amount("tx.value", &self.tx.value)?,
            },
        })
    }
}

/// 解析聚合器响应体
pub fn parse_quote_response(body: &str, amount: U256) -> CoreResult<SwapQuote> {
    let response: QuoteResponse =
        serde_json::from_str(body).map_err(|e| CoreError::QuoteParse(e.to_string()))?;
    response.into_quote(amount)
}

/// 聚合器 HTTP 客户端
pub struct HttpSwapQuoteClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl HttpSwapQuoteClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::rpc(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SwapConfig) -> CoreResult<Self> {
        Self::new(config.quote_api_url.clone(), config.quote_api_key.clone())
    }
}

#[async_trait]
impl SwapQuoteApi for HttpSwapQuoteClient {
    async fn get_quote(&self, request: &QuoteRequest) -> CoreResult<SwapQuote> {
        let url = format!("{}/{}/swap", self.base_url, request.chain_id);

        let mut http_request = self.client.get(&url).query(&[
            ("src", format!("{:?}", request.from_token)),
            ("dst", format!("{:?}", request.to_token)),
            ("amount", request.amount.to_string()),
            ("from", format!("{:?}", request.destination)),
            ("slippage", request.slippage.to_string()),
            ("disableEstimate", "true".to_string()),
        ]);

        if let Some(key) = &self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", key));
        }

        tracing::debug!(chain_id = request.chain_id, amount = %request.amount, "requesting swap quote");

        let response = http_request
            .send()
            .await
            .map_err(|e| CoreError::rpc(format!("quote request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::rpc(format!("failed to read quote response: {}", e)))?;

        if !status.is_success() {
            return Err(CoreError::Rpc(format!("quote api returned {}: {}", status, body)));
        }

        parse_quote_response(&body, request.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(extra: &str) -> String {
        format!(
            r#"{{
                "toAmount": "990000",
                "tx": {{
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222",
                    "data": "0xdeadbeef",
                    "value": "0",
                    "gas": 150000,
                    "gasPrice": "1000000000"
                }}{}
            }}"#,
            extra
        )
    }

    #[test]
    fn test_parse_valid_quote() {
        let quote = parse_quote_response(&body(""), U256::from(1_000u64)).unwrap();
        assert_eq!(quote.to_amount, U256::from(990_000u64));
        assert_eq!(quote.swap_params.to, Address::repeat_byte(0x22));
        assert_eq!(quote.swap_params.data.to_vec(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(quote.swap_params.amount, U256::from(1_000u64));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_quote_response(&body(r#", "protocols": []"#), U256::one()).unwrap_err();
        assert!(matches!(err, CoreError::QuoteParse(_)));
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = parse_quote_response(r#"{"toAmount": "1"}"#, U256::one()).unwrap_err();
        assert!(matches!(err, CoreError::QuoteParse(_)));
    }

    #[test]
    fn test_non_decimal_amount_rejected() {
        let raw = body("").replace("990000", "0x10");
        let err = parse_quote_response(&raw, U256::one()).unwrap_err();
        assert!(matches!(err, CoreError::QuoteParse(msg) if msg.contains("toAmount")));
    }
}
