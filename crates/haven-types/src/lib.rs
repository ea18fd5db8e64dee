//! Core type catalog for the Haven chain: assets, transaction types,
//! hard-fork gates, network configuration and chain constants.

pub mod consensus;
pub mod constants;

pub use constants::{Asset, Network, PublicAddress, TransactionType};
