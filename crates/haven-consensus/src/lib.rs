//! Consensus rules for the Haven chain: pricing records, conversion fees,
//! collateral, the block conversion cap, coinbase construction with
//! deterministic governance payouts, transaction building, and the
//! protocol-version gates.

pub mod block;
pub mod builder;
pub mod coinbase;
pub mod fees;
pub mod keys;
pub mod oracle;
pub mod validation;

pub use block::{generate_genesis_block, Block};
pub use coinbase::{construct_miner_tx, validate_governance_reward_key, AmountMap, MinerTxParams};
pub use fees::{block_cap, collateral_requirements, expected_conversion_fee, xhv_fee_amount};
pub use oracle::{tx_pr_height_valid, PricingRecord};
