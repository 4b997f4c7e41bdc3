pub mod units;

pub use units::{gwei_to_wei, parse_gas_limit, parse_gwei, scale_percent, wei_to_gwei};
