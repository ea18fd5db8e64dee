//! Interfaces the pool consumes: the blockchain database, the ring and
//! commitment verifier, and the verification context threaded through
//! admission.

use crate::meta::{RelayCategory, RelayMethod, TxPoolMeta};
use haven_consensus::block::Block;
use haven_consensus::oracle::PricingRecord;
use haven_tx::types::{Hash, Transaction};
use haven_types::constants::{Asset, Network};
use haven_types::TransactionType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transaction {0} not found in the pool table")]
    NotFound(String),
    #[error("database failure: {0}")]
    Database(String),
}

/// Per-transaction verification outcome, mirrored back to the caller.
///
/// Classification results are cached here so the two admission paths and the
/// relay layer do not re-derive them.
#[derive(Debug, Clone, Default)]
pub struct TxVerificationContext {
    pub verification_failed: bool,
    pub verification_impossible: bool,
    pub added_to_pool: bool,
    pub relay: Option<RelayMethod>,
    pub invalid_input: bool,
    pub invalid_output: bool,
    pub fee_too_low: bool,
    pub too_big: bool,
    pub double_spend: bool,
    pub source_asset: Option<Asset>,
    pub dest_asset: Option<Asset>,
    pub tx_type: Option<TransactionType>,
    pub pr: PricingRecord,
    pub pr_height_verified: bool,
}

/// Blockchain database contract.
///
/// The pool's blob and metadata live in the database's txpool table; the
/// in-memory indices are rebuilt from it on startup. Implementations are
/// internally synchronized; the pool always takes its own lock first, then
/// calls in here.
pub trait ChainBackend {
    fn height(&self) -> u64;
    fn nettype(&self) -> Network;
    fn block_id_by_height(&self, height: u64) -> Option<Hash>;
    fn block_by_hash(&self, id: &Hash) -> Option<Block>;

    // txpool table
    fn add_txpool_tx(&self, id: &Hash, blob: &[u8], meta: &TxPoolMeta) -> Result<(), ChainError>;
    fn remove_txpool_tx(&self, id: &Hash) -> Result<(), ChainError>;
    fn update_txpool_tx(&self, id: &Hash, meta: &TxPoolMeta) -> Result<(), ChainError>;
    fn get_txpool_tx_meta(&self, id: &Hash) -> Option<TxPoolMeta>;
    fn get_txpool_tx_blob(&self, id: &Hash, category: RelayCategory) -> Option<Vec<u8>>;
    fn txpool_tx_count(&self, include_sensitive: bool) -> usize;
    fn txpool_has_tx(&self, id: &Hash, category: RelayCategory) -> bool;
    fn txpool_tx_matches_category(&self, id: &Hash, category: RelayCategory) -> bool;
    /// Visit pool entries; the callback returns false to stop. Returns
    /// whether the walk completed.
    fn for_all_txpool_txes(
        &self,
        f: &mut dyn FnMut(&Hash, &TxPoolMeta, Option<&[u8]>) -> bool,
        include_blob: bool,
        category: RelayCategory,
    ) -> bool;

    // chain queries
    fn have_tx(&self, id: &Hash) -> bool;
    fn have_tx_keyimges_as_spent(&self, tx: &Transaction) -> bool;
    fn check_fee(
        &self,
        tx_weight: u64,
        fee: u64,
        pr: &PricingRecord,
        source: Asset,
        destination: Asset,
        tx_type: TransactionType,
    ) -> bool;
    fn check_tx_inputs(
        &self,
        tx: &Transaction,
        max_used_block_height: &mut u64,
        max_used_block_id: &mut Hash,
        tvc: &mut TxVerificationContext,
        kept_by_block: bool,
    ) -> bool;
    fn check_tx_outputs(&self, tx: &Transaction, tvc: &mut TxVerificationContext) -> bool;
    fn get_circulating_supply(&self) -> Vec<(Asset, String)>;
    /// Newest pricing record within the validity window, if any.
    fn latest_acceptable_pr(&self) -> Option<PricingRecord>;

    // transactional scoping for pool writes
    fn txn_begin(&self);
    fn txn_commit(&self);
    fn txn_abort(&self);
}

/// External ring/commitment verifier.
pub trait RingVerifier {
    /// Check the declared burnt/minted amounts against the commitments.
    fn check_burnt_and_minted(
        &self,
        tx: &Transaction,
        amount_burnt: u64,
        amount_minted: u64,
        pr: &PricingRecord,
        source: Asset,
        destination: Asset,
        hf_version: u8,
    ) -> bool;

    /// Full proof-of-value check under a stored record, with the collateral
    /// requirement for offshores/onshores.
    fn ver_rct_semantics_simple(
        &self,
        tx: &Transaction,
        pr: &PricingRecord,
        tx_type: TransactionType,
        source: Asset,
        destination: Asset,
        amount_burnt: u64,
        hf_version: u8,
        collateral: u64,
    ) -> bool;
}

/// Scoped database transaction: commits only on success, aborts when
/// dropped on any error path.
pub struct LockedTxn<'a> {
    chain: &'a dyn ChainBackend,
    done: bool,
}

impl<'a> LockedTxn<'a> {
    pub fn new(chain: &'a dyn ChainBackend) -> Self {
        chain.txn_begin();
        Self { chain, done: false }
    }

    pub fn commit(mut self) {
        self.chain.txn_commit();
        self.done = true;
    }
}

impl Drop for LockedTxn<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.chain.txn_abort();
        }
    }
}
