//! Block header model and deterministic genesis construction.

use crate::oracle::PricingRecord;
use haven_tx::{parse_tx, Hash, Transaction, NULL_HASH};
use haven_types::constants::{network_config, Network};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("genesis coinbase blob is not valid hex")]
    GenesisHex(#[from] hex::FromHexError),
    #[error("genesis coinbase blob failed to parse: {0}")]
    GenesisParse(#[from] haven_tx::WireError),
}

/// A block as seen by the pool: header fields, the miner transaction, the
/// included transaction ids, and the stamped pricing record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_id: Hash,
    pub nonce: u32,
    pub miner_tx: Transaction,
    pub tx_hashes: Vec<Hash>,
    pub pricing_record: PricingRecord,
}

/// Build the genesis block from the hardcoded coinbase blob.
///
/// No network-wide configuration input: the zero-fee coinbase ships as a
/// fixed blob per network, with only the nonce varying.
pub fn generate_genesis_block(network: Network) -> Result<Block, BlockError> {
    let config = network_config(network);
    let blob = hex::decode(config.genesis_tx)?;
    let miner_tx = parse_tx(&blob)?;
    Ok(Block {
        major_version: 1,
        minor_version: 0,
        timestamp: 0,
        prev_id: NULL_HASH,
        nonce: config.genesis_nonce,
        miner_tx,
        tx_hashes: Vec::new(),
        pricing_record: PricingRecord::empty(),
    })
}
