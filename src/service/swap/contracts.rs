//! 合约调用编码：ERC-20 授权与兑换代理合约

use ethers::{
    abi::{self, ParamType, Token},
    types::{Address, Bytes, U256},
    utils::id,
};

use crate::error::{CoreError, CoreResult};

const ALLOWANCE_SIGNATURE: &str = "allowance(address,address)";
const APPROVE_SIGNATURE: &str = "approve(address,uint256)";
const SWAP_WITH_FEE_SIGNATURE: &str =
    "swapWithFee(address,address,address,uint256,uint256,uint256,bytes)";
const GET_RATE_SIGNATURE: &str = "getRate(address,address,bool)";

fn encode_call(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(tokens));
    Bytes::from(data)
}

pub fn allowance_calldata(owner: Address, spender: Address) -> Bytes {
    encode_call(
        ALLOWANCE_SIGNATURE,
        &[Token::Address(owner), Token::Address(spender)],
    )
}

/// 无限额授权使用 `U256::MAX`
pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    encode_call(
        APPROVE_SIGNATURE,
        &[Token::Address(spender), Token::Uint(amount)],
    )
}

pub fn get_rate_calldata(from_token: Address, to_token: Address, use_wrappers: bool) -> Bytes {
    encode_call(
        GET_RATE_SIGNATURE,
        &[
            Token::Address(from_token),
            Token::Address(to_token),
            Token::Bool(use_wrappers),
        ],
    )
}

/// 解码单个 uint256 返回值
pub fn decode_uint(output: &[u8]) -> CoreResult<U256> {
    let tokens = abi::decode(&[ParamType::Uint(256)], output)
        .map_err(|e| CoreError::Rpc(format!("failed to decode uint256: {}", e)))?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| CoreError::Rpc("empty uint256 return data".into()))
}

/// 代理合约 `swapWithFee` 的参数，报价后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySwapParams {
    pub aggregator: Address,
    pub from_token: Address,
    pub to_token: Address,
    pub amount: U256,
    pub minimum_return_amount: U256,
    /// 无 gas 路径中付给赞助方的报销（以 wei 计），普通路径为 0
    pub gas_refund: U256,
    /// 聚合器调用数据
    pub data: Bytes,
}

impl ProxySwapParams {
    pub fn with_gas_refund(&self, gas_refund: U256) -> Self {
        Self {
            gas_refund,
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Bytes {
        encode_call(
            SWAP_WITH_FEE_SIGNATURE,
            &[
                Token::Address(self.aggregator),
                Token::Address(self.from_token),
                Token::Address(self.to_token),
                Token::Uint(self.amount),
                Token::Uint(self.minimum_return_amount),
                Token::Uint(self.gas_refund),
                Token::Bytes(self.data.to_vec()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erc20_selectors() {
        let approve = approve_calldata(Address::repeat_byte(1), U256::MAX);
        assert_eq!(&approve[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(approve.len(), 4 + 64);

        let allowance = allowance_calldata(Address::repeat_byte(1), Address::repeat_byte(2));
        assert_eq!(&allowance[..4], &[0xdd, 0x62, 0xed, 0x3e]);
    }

    #[test]
    fn test_decode_uint() {
        let encoded = abi::encode(&[Token::Uint(U256::from(42u64))]);
        assert_eq!(decode_uint(&encoded).unwrap(), U256::from(42u64));
        assert!(decode_uint(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_swap_with_fee_round_trips_through_abi() {
        let params = ProxySwapParams {
            aggregator: Address::repeat_byte(0xaa),
            from_token: Address::repeat_byte(0x01),
            to_token: Address::repeat_byte(0x02),
            amount: U256::from(1_000u64),
            minimum_return_amount: U256::from(990u64),
            gas_refund: U256::zero(),
            data: Bytes::from(vec![0xde, 0xad]),
        };
        let refunded = params.with_gas_refund(U256::from(7u64));
        let encoded = refunded.encode();
        assert_eq!(&encoded[..4], &id(SWAP_WITH_FEE_SIGNATURE));

        let decoded = abi::decode(
            &[
                ParamType::Address,
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Bytes,
            ],
            &encoded[4..],
        )
        .unwrap();
        assert_eq!(decoded[5], Token::Uint(U256::from(7u64)));
        assert_eq!(decoded[6], Token::Bytes(vec![0xde, 0xad]));
    }
}
