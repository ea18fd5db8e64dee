//! The transaction memory pool.
//!
//! Public methods form the locked outer tier: they take the pool mutex,
//! then reach into the chain backend (always in that order). The `*_inner`
//! methods are the unlocked tier and never re-acquire. Within one
//! operation, index mutations and database writes sit inside a scoped
//! transaction that commits only on success.

use crate::chain::{ChainBackend, LockedTxn, RingVerifier, TxVerificationContext};
use crate::meta::{FeeOrderKey, RelayCategory, RelayMethod, TxPoolMeta, NEVER_RELAYED};
use haven_consensus::coinbase::AmountMap;
use haven_consensus::fees::xhv_fee_amount;
use haven_consensus::oracle::{tx_pr_height_valid, PricingRecord};
use haven_consensus::validation::{
    check_version_gate, check_version_gate_legacy, min_conversion_unlock_pre_pou,
    pricing_record_for_height, tx_unlock_duration, validate_conversion_unlocks,
};
use haven_consensus::{block_cap, collateral_requirements, expected_conversion_fee};
use haven_consensus::fees::expected_conversion_fee_legacy;
use haven_tx::classify::{classify, ClassifyError};
use haven_tx::extra::{memo, offshore_data};
use haven_tx::types::{Hash, KeyImage, Transaction, TxInput, NULL_HASH};
use haven_tx::wire::{hash_blob, parse_prefix, parse_tx, serialize_tx};
use haven_types::consensus::{block_reward, min_block_weight, transaction_weight_limit};
use haven_types::constants::{
    Asset, HfVersion, Network, COINBASE_BLOB_RESERVED_SIZE, DANDELIONPP_EMBARGO_AVERAGE,
    DEFAULT_TXPOOL_MAX_WEIGHT, MAX_BLOCK_NUMBER, MEMPOOL_TX_FROM_ALT_BLOCK_LIVETIME,
    MEMPOOL_TX_LIVETIME, PRICING_RECORD_VALID_BLOCKS,
};
use haven_types::TransactionType;
use rand::Rng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Re-relay backoff floor (seconds).
const MIN_RELAY_TIME: u64 = 60 * 5;

/// Re-relay backoff ceiling (seconds).
const MAX_RELAY_TIME: u64 = 60 * 60 * 4;

/// Two transactions whose declared conversion fee predates the overflow
/// fix; they are exempt from the legacy fee-equality check.
const FEE_CHECK_EXEMPT_TXS: [&str; 2] = [
    "5cdd9be420bd9034e2ff83a04cd22978c163a5263f8e7a0577f46ec762a21da6",
    "b5cd616fc1b64a04750f890e466663ee3308c07846a174daf4d64c111f2de052",
];

/// Pricing-record soft fork: conversions below this height skip the age
/// check on mainnet.
const PR_SOFT_FORK_HEIGHT: u64 = 658_500;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("failed to parse transaction blob for {0}")]
    Parse(String),
    #[error("database error: {0}")]
    Chain(#[from] crate::chain::ChainError),
    #[error("failed to compute the empty block reward")]
    EmptyBlockReward,
}

// =============================================================================
// Clock
// =============================================================================

/// Injected wall clock, so lifetimes and relay backoff are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Unix-time clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

// =============================================================================
// Result types
// =============================================================================

/// A transaction removed from the pool for block inclusion.
#[derive(Debug, Clone)]
pub struct TakenTx {
    pub tx: Transaction,
    pub blob: Vec<u8>,
    pub weight: u64,
    pub fee: u64,
    pub conversion_fee: u64,
    pub fee_asset: Option<Asset>,
    pub relayed: bool,
    pub do_not_relay: bool,
    pub double_spend_seen: bool,
    pub pruned: bool,
}

/// Pool entry details for queries.
#[derive(Debug, Clone)]
pub struct TxDetails {
    pub tx: Transaction,
    pub blob_size: u64,
    pub weight: u64,
    pub fee: u64,
    pub max_used_block_id: Hash,
    pub max_used_block_height: u64,
    pub kept_by_block: bool,
    pub last_failed_height: u64,
    pub last_failed_id: Hash,
    pub receive_time: u64,
    pub last_relayed_time: u64,
    pub relayed: bool,
    pub do_not_relay: bool,
    pub double_spend_seen: bool,
}

/// One entry of the fee backlog view.
#[derive(Debug, Clone, Copy)]
pub struct TxBacklogEntry {
    pub weight: u64,
    pub fee: u64,
    pub time_in_pool: u64,
}

/// Aggregate pool statistics.
#[derive(Debug, Clone, Default)]
pub struct TxPoolStats {
    pub txs_total: usize,
    pub bytes_total: u64,
    pub bytes_min: u64,
    pub bytes_max: u64,
    pub bytes_med: u64,
    pub fee_total: u64,
    pub oldest: u64,
    pub num_not_relayed: usize,
    pub num_10m: usize,
    pub num_failing: usize,
    pub num_double_spends: usize,
}

/// Result of filling a block template from the pool.
#[derive(Debug, Clone, Default)]
pub struct BlockTemplate {
    pub tx_hashes: Vec<Hash>,
    pub total_weight: u64,
    pub fee_map: AmountMap,
    pub conversion_fee_map: AmountMap,
    pub xasset_conversion_fee_map: AmountMap,
    pub expected_reward: u64,
}

// =============================================================================
// Pool
// =============================================================================

type InputCheckResult = (bool, TxVerificationContext, u64, Hash);

#[derive(Default)]
struct PoolInner {
    spent_key_images: HashMap<KeyImage, HashSet<Hash>>,
    fee_order: BTreeSet<FeeOrderKey>,
    timed_out_transactions: HashSet<Hash>,
    input_cache: HashMap<Hash, InputCheckResult>,
    parsed_tx_cache: HashMap<Hash, Transaction>,
    txpool_weight: u64,
    txpool_max_weight: u64,
    cookie: u64,
    mine_stem_txes: bool,
}

/// Shared, internally synchronized transaction pool.
pub struct TxMemoryPool<B: ChainBackend, V: RingVerifier> {
    chain: B,
    verifier: V,
    clock: Box<dyn Clock>,
    inner: Mutex<PoolInner>,
}

impl<B: ChainBackend, V: RingVerifier> TxMemoryPool<B, V> {
    pub fn new(chain: B, verifier: V) -> Self {
        Self::with_clock(chain, verifier, Box::new(SystemClock))
    }

    pub fn with_clock(chain: B, verifier: V, clock: Box<dyn Clock>) -> Self {
        Self {
            chain,
            verifier,
            clock,
            inner: Mutex::new(PoolInner {
                txpool_max_weight: DEFAULT_TXPOOL_MAX_WEIGHT,
                ..PoolInner::default()
            }),
        }
    }

    pub fn chain(&self) -> &B {
        &self.chain
    }

    /// Monotonic change counter; bumped on every pool mutation so consumers
    /// can detect staleness without holding the lock.
    pub fn cookie(&self) -> u64 {
        self.inner.lock().expect("pool lock").cookie
    }

    pub fn get_txpool_weight(&self) -> u64 {
        self.inner.lock().expect("pool lock").txpool_weight
    }

    pub fn set_txpool_max_weight(&self, bytes: u64) {
        self.inner.lock().expect("pool lock").txpool_max_weight = bytes;
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Serialize, hash and admit a transaction, dispatching to the legacy or
    /// the HAVEN2+ admission path by fork version.
    pub fn add_tx(
        &self,
        tx: &Transaction,
        tvc: &mut TxVerificationContext,
        tx_relay: RelayMethod,
        relayed: bool,
        hf_version: u8,
    ) -> bool {
        let blob = serialize_tx(tx);
        if blob.is_empty() {
            return false;
        }
        let id = hash_blob(&blob);
        let weight = blob.len() as u64;
        self.add_tx_with_id(tx, &id, &blob, weight, tvc, tx_relay, relayed, hf_version)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_tx_with_id(
        &self,
        tx: &Transaction,
        id: &Hash,
        blob: &[u8],
        tx_weight: u64,
        tvc: &mut TxVerificationContext,
        tx_relay: RelayMethod,
        relayed: bool,
        hf_version: u8,
    ) -> bool {
        let mut inner = self.inner.lock().expect("pool lock");
        if hf_version >= HfVersion::HAVEN2 {
            self.add_tx_haven2(&mut inner, tx, id, blob, tx_weight, tvc, tx_relay, relayed, hf_version)
        } else {
            self.add_tx_legacy(&mut inner, tx, id, blob, tx_weight, tvc, tx_relay, relayed, hf_version)
        }
    }

    fn classify_into_tvc(
        &self,
        tx: &Transaction,
        id: &Hash,
        tvc: &mut TxVerificationContext,
    ) -> Option<(Asset, Asset, TransactionType)> {
        if let (Some(source), Some(dest), Some(tx_type)) =
            (tvc.source_asset, tvc.dest_asset, tvc.tx_type)
        {
            if tx_type != TransactionType::Unset {
                return Some((source, dest, tx_type));
            }
        }
        match classify(tx, id, false) {
            Ok((source, dest, tx_type)) => {
                tvc.source_asset = Some(source);
                tvc.dest_asset = Some(dest);
                tvc.tx_type = Some(tx_type);
                Some((source, dest, tx_type))
            }
            Err(err) => {
                warn!(txid = %hex::encode(id), %err, "transaction failed asset classification");
                tvc.verification_failed = true;
                match err {
                    ClassifyError::InvalidInput(_) => tvc.invalid_input = true,
                    ClassifyError::InvalidOutput(_) => tvc.invalid_output = true,
                    ClassifyError::InvalidConversion(..) => {
                        tvc.invalid_input = true;
                        tvc.invalid_output = true;
                    }
                }
                None
            }
        }
    }

    /// Resolve the pricing record a conversion was priced against, caching
    /// it on the verification context.
    fn resolve_pricing_record(
        &self,
        tx: &Transaction,
        id: &Hash,
        tvc: &mut TxVerificationContext,
        allow_hardcoded: bool,
    ) -> bool {
        let current_height = self.chain.height();
        if !tvc.pr_height_verified {
            if !tx_pr_height_valid(current_height, tx.prefix.pricing_record_height, id) {
                error!(
                    txid = %hex::encode(id),
                    pr_height = tx.prefix.pricing_record_height,
                    current_height,
                    "conversion references a pricing record outside the validity window"
                );
                tvc.verification_failed = true;
                return false;
            }
            tvc.pr_height_verified = true;
        }
        if tvc.pr.is_empty() {
            let lookup = |height: u64| {
                self.chain
                    .block_id_by_height(height)
                    .and_then(|block_id| self.chain.block_by_hash(&block_id))
                    .map(|block| block.pricing_record)
            };
            let record = if allow_hardcoded {
                pricing_record_for_height(
                    tx.prefix.pricing_record_height,
                    self.chain.nettype(),
                    lookup,
                )
            } else {
                lookup(tx.prefix.pricing_record_height)
            };
            match record {
                Some(pr) => tvc.pr = pr,
                None => {
                    error!("failed to get block containing pricing record");
                    tvc.verification_failed = true;
                    return false;
                }
            }
        }
        true
    }

    fn check_rates_present(
        &self,
        tvc: &mut TxVerificationContext,
        tx_type: TransactionType,
        source: Asset,
        dest: Asset,
        require_spot: bool,
    ) -> bool {
        use TransactionType as Tt;
        let ok = match tx_type {
            Tt::Offshore | Tt::Onshore => {
                tvc.pr.xhv_ma != 0 && (!require_spot || tvc.pr.xhv_spot != 0)
            }
            Tt::XusdToXasset => tvc.pr.rate(dest) != 0,
            Tt::XassetToXusd => tvc.pr.rate(source) != 0,
            _ => false,
        };
        if !ok {
            error!("empty exchange rate, conversion not possible");
            tvc.verification_failed = true;
        }
        ok
    }

    /// HAVEN2+ admission path.
    #[allow(clippy::too_many_arguments)]
    fn add_tx_haven2(
        &self,
        inner: &mut PoolInner,
        tx: &Transaction,
        id: &Hash,
        blob: &[u8],
        tx_weight: u64,
        tvc: &mut TxVerificationContext,
        mut tx_relay: RelayMethod,
        relayed: bool,
        hf_version: u8,
    ) -> bool {
        let kept_by_block = tx_relay == RelayMethod::Block;

        if !kept_by_block && inner.timed_out_transactions.contains(id) {
            tvc.verification_failed = true;
            return false;
        }

        if !check_input_types_supported(tx) {
            tvc.verification_failed = true;
            tvc.invalid_input = true;
            return false;
        }

        // unlock_time must be a block height, never a wallclock timestamp
        if tx.prefix.unlock_time >= MAX_BLOCK_NUMBER {
            tvc.verification_failed = true;
            return false;
        }

        if let Err(err) = check_version_gate(tx.prefix.version, hf_version) {
            error!(%err, "transaction version not permitted at this fork");
            tvc.verification_failed = true;
            return false;
        }

        let fee = tx.rct_signatures.txn_fee;
        let conversion_fee = tx.rct_signatures.txn_offshore_fee;

        // With shuffled outputs a memo cannot be associated to one of many
        // destinations, so memo transactions are limited to one destination
        // plus change.
        if memo(&tx.prefix.extra).is_some() && tx.prefix.vout.len() > 2 {
            info!("transaction carries memo data with multiple destinations, rejecting");
            tvc.verification_failed = true;
            return false;
        }

        let Some((source, dest, tx_type)) = self.classify_into_tvc(tx, id, tvc) else {
            return false;
        };

        if source != dest {
            let current_height = self.chain.height();
            if !self.resolve_pricing_record(tx, id, tvc, false) {
                return false;
            }
            let require_spot = hf_version >= HfVersion::PER_OUTPUT_UNLOCK;
            if !self.check_rates_present(tvc, tx_type, source, dest, require_spot) {
                return false;
            }

            if tx.prefix.amount_burnt == 0 || tx.prefix.amount_minted == 0 {
                error!("zero burnt/minted for a conversion tx");
                tvc.verification_failed = true;
                return false;
            }

            if !self.verifier.check_burnt_and_minted(
                tx,
                tx.prefix.amount_burnt,
                tx.prefix.amount_minted,
                &tvc.pr,
                source,
                dest,
                hf_version,
            ) {
                info!(
                    burnt = tx.prefix.amount_burnt,
                    minted = tx.prefix.amount_minted,
                    "amount burnt/minted mismatch"
                );
                tvc.verification_failed = true;
                return false;
            }

            let unlock_time = tx_unlock_duration(
                tx.prefix.unlock_time,
                tx.prefix.pricing_record_height,
                current_height,
            );

            if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
                if let Err(err) = validate_conversion_unlocks(
                    tx,
                    tx_type,
                    source,
                    hf_version,
                    self.chain.nettype(),
                    current_height,
                ) {
                    error!(%err, "conversion unlock validation failed");
                    tvc.verification_failed = true;
                    return false;
                }
            } else {
                let required = min_conversion_unlock_pre_pou(tx_type);
                if unlock_time < required {
                    info!(unlock_time, required, "unlock window too short");
                    tvc.verification_failed = true;
                    return false;
                }
            }

            let expected =
                expected_conversion_fee(tx_type, tx.prefix.amount_burnt, unlock_time, hf_version, &tvc.pr, source);
            if expected != conversion_fee {
                info!(expected, declared = conversion_fee, "conversion fee is incorrect");
                tvc.verification_failed = true;
                tvc.fee_too_low = true;
                return false;
            }
        } else {
            // transfers must not touch the circulating supply
            if tx.prefix.amount_burnt != 0 || tx.prefix.amount_minted != 0 {
                error!("burnt/minted set on a transfer tx");
                tvc.verification_failed = true;
                return false;
            }
            if tx.prefix.pricing_record_height != 0 {
                error!("pricing record height set on a transfer tx");
                tvc.verification_failed = true;
                return false;
            }
        }

        if !kept_by_block
            && (fee == 0
                || !self
                    .chain
                    .check_fee(tx_weight, fee, &tvc.pr, source, dest, tx_type))
        {
            tvc.verification_failed = true;
            tvc.fee_too_low = true;
            return false;
        }

        let tx_weight_limit = transaction_weight_limit(hf_version);
        if (!kept_by_block || hf_version >= HfVersion::PER_BYTE_FEE) && tx_weight > tx_weight_limit
        {
            info!(tx_weight, tx_weight_limit, "transaction is too heavy");
            tvc.verification_failed = true;
            tvc.too_big = true;
            return false;
        }

        if !kept_by_block && self.have_tx_keyimges_as_spent_inner(inner, tx, id) {
            self.mark_double_spend_inner(inner, tx);
            info!(txid = %hex::encode(id), "transaction uses already spent key images");
            tvc.verification_failed = true;
            tvc.double_spend = true;
            return false;
        }

        if !self.chain.check_tx_outputs(tx, tvc) {
            info!(txid = %hex::encode(id), "transaction has at least one invalid output");
            tvc.verification_failed = true;
            tvc.invalid_output = true;
            return false;
        }

        // assume failure until success is certain
        tvc.verification_failed = true;

        let receive_time = self.clock.now();
        let mut max_used_block_id = NULL_HASH;
        let mut max_used_block_height = 0u64;
        let mut meta = TxPoolMeta { fee_asset: Some(source), ..TxPoolMeta::default() };

        let inputs_ok = self.check_tx_inputs_cached(
            inner,
            tx,
            id,
            &mut max_used_block_height,
            &mut max_used_block_id,
            tvc,
            kept_by_block,
        );

        if !inputs_ok {
            if !kept_by_block {
                info!("tx used wrong inputs, rejected");
                tvc.verification_failed = true;
                tvc.invalid_input = true;
                return false;
            }
            // may become valid again after a re-org, keep it around
            meta.weight = tx_weight;
            meta.fee = fee;
            meta.conversion_fee = conversion_fee;
            meta.receive_time = receive_time;
            meta.last_relayed_time = self.clock.now();
            meta.relayed = relayed;
            meta.set_relay_method(tx_relay);
            meta.double_spend_seen = self.have_tx_keyimges_as_spent_inner(inner, tx, id);
            meta.pruned = tx.pruned;

            inner.parsed_tx_cache.insert(*id, tx.clone());
            let txn = LockedTxn::new(&self.chain);
            if !self.insert_key_images(inner, tx, id, tx_relay) {
                return false;
            }
            if let Err(err) = self.chain.add_txpool_tx(id, blob, &meta) {
                error!(%err, "error adding transaction to txpool");
                return false;
            }
            let total_fee = self.normalized_fee(&meta, tvc, tx_type, hf_version);
            inner.fee_order.insert(FeeOrderKey {
                fee_xhv: total_fee,
                weight: tx_weight,
                receive_time,
                id: *id,
            });
            txn.commit();

            tvc.verification_impossible = true;
            tvc.added_to_pool = true;
        } else {
            let txn = LockedTxn::new(&self.chain);
            if kept_by_block {
                inner.parsed_tx_cache.insert(*id, tx.clone());
            }

            let existing = self.chain.get_txpool_tx_meta(id);
            let existing_tx = existing.is_some();
            if let Some(m) = existing {
                meta = m;
                // Dandelion++ loop: a tx in `local` state should leave over
                // i2p/tor and come back via a public stem, so treat the
                // reappearance as a fresh stem hop rather than a loop.
                if tx_relay == RelayMethod::Stem && meta.dandelionpp_stem {
                    tx_relay = RelayMethod::Fluff;
                }
            } else {
                meta.set_relay_method(RelayMethod::None);
            }

            if meta.upgrade_relay_method(tx_relay) || !existing_tx {
                meta.last_relayed_time = NEVER_RELAYED;
                meta.receive_time = receive_time;
                meta.weight = tx_weight;
                meta.fee = fee;
                meta.conversion_fee = conversion_fee;
                meta.fee_asset = Some(source);
                meta.max_used_block_id = max_used_block_id;
                meta.max_used_block_height = max_used_block_height;
                meta.last_failed_height = 0;
                meta.last_failed_id = NULL_HASH;
                meta.relayed = relayed;
                meta.double_spend_seen = false;
                meta.pruned = tx.pruned;

                if !self.insert_key_images(inner, tx, id, tx_relay) {
                    return false;
                }

                let _ = self.chain.remove_txpool_tx(id);
                if let Err(err) = self.chain.add_txpool_tx(id, blob, &meta) {
                    error!(%err, "internal error: error adding transaction to txpool");
                    return false;
                }
                let total_fee = self.normalized_fee(&meta, tvc, tx_type, hf_version);
                inner.fee_order.insert(FeeOrderKey {
                    fee_xhv: total_fee,
                    weight: tx_weight,
                    receive_time,
                    id: *id,
                });
            }
            txn.commit();

            tvc.added_to_pool = true;
            if meta.fee > 0 {
                tvc.relay = Some(tx_relay);
            }
        }

        tvc.verification_failed = false;
        inner.txpool_weight += tx_weight;
        inner.cookie += 1;

        info!(
            txid = %hex::encode(id),
            weight = tx_weight,
            fee,
            source = %source,
            "transaction added to pool"
        );

        let max = inner.txpool_max_weight;
        self.prune_inner(inner, max);
        true
    }

    /// Legacy admission path (pre-HAVEN2 forks), with the per-colour fee
    /// fields and the historical soft-fork exceptions.
    #[allow(clippy::too_many_arguments)]
    fn add_tx_legacy(
        &self,
        inner: &mut PoolInner,
        tx: &Transaction,
        id: &Hash,
        blob: &[u8],
        tx_weight: u64,
        tvc: &mut TxVerificationContext,
        mut tx_relay: RelayMethod,
        relayed: bool,
        hf_version: u8,
    ) -> bool {
        let kept_by_block = tx_relay == RelayMethod::Block;

        if tx.prefix.version == 0 {
            // v0 never accepted
            info!("transaction version 0 is invalid");
            tvc.verification_failed = true;
            return false;
        }

        if !kept_by_block && inner.timed_out_transactions.contains(id) {
            tvc.verification_failed = true;
            return false;
        }

        if !check_input_types_supported(tx) {
            tvc.verification_failed = true;
            tvc.invalid_input = true;
            return false;
        }

        if hf_version >= HfVersion::XASSET_FEES_V2 && tx.prefix.unlock_time >= MAX_BLOCK_NUMBER {
            tvc.verification_failed = true;
            return false;
        }

        if check_version_gate_legacy(tx.prefix.version, hf_version).is_err() {
            tvc.verification_failed = true;
            return false;
        }

        let rct = &tx.rct_signatures;
        let fee = rct.txn_fee;
        let fee_usd = rct.txn_fee_usd;
        let fee_xasset = rct.txn_fee_xasset;

        if !self.validate_offshore_data(tx, id, tvc, hf_version) {
            return false;
        }

        if memo(&tx.prefix.extra).is_some() && tx.prefix.vout.len() > 2 {
            info!("transaction carries memo data with multiple destinations, rejecting");
            tvc.verification_failed = true;
            return false;
        }

        let Some((source, dest, tx_type)) = self.classify_into_tvc(tx, id, tvc) else {
            return false;
        };

        if source != dest {
            // conversions were shut off at the xasset-fees-v2 fork and only
            // returned with HAVEN2
            if hf_version >= HfVersion::XASSET_FEES_V2 {
                error!("conversion txs are not permitted at this fork");
                tvc.verification_failed = true;
                return false;
            }

            let skip_pr_checks = tx.prefix.pricing_record_height <= PR_SOFT_FORK_HEIGHT
                && self.chain.nettype() == Network::Mainnet;
            if !skip_pr_checks {
                let current_height = self.chain.height();
                if !self.resolve_pricing_record(tx, id, tvc, true) {
                    return false;
                }
                if !self.check_rates_present(tvc, tx_type, source, dest, false) {
                    return false;
                }
                if tx.prefix.amount_burnt == 0 || tx.prefix.amount_minted == 0 {
                    error!("zero burnt/minted for a conversion tx");
                    tvc.verification_failed = true;
                    return false;
                }
                if !self.verifier.check_burnt_and_minted(
                    tx,
                    tx.prefix.amount_burnt,
                    tx.prefix.amount_minted,
                    &tvc.pr,
                    source,
                    dest,
                    hf_version,
                ) {
                    tvc.verification_failed = true;
                    return false;
                }

                let unlock_time = tx_unlock_duration(
                    tx.prefix.unlock_time,
                    tx.prefix.pricing_record_height,
                    current_height,
                );
                let min_unlock = min_conversion_unlock_pre_pou(tx_type);
                let enforce_unlock = !matches!(
                    tx_type,
                    TransactionType::XusdToXasset | TransactionType::XassetToXusd
                ) || hf_version >= HfVersion::XASSET_FEES_V2;
                if enforce_unlock && unlock_time < min_unlock {
                    info!(unlock_time, min_unlock, "unlock window too short");
                    tvc.verification_failed = true;
                    return false;
                }

                let expected = expected_conversion_fee_legacy(
                    tx_type,
                    tx.prefix.amount_burnt,
                    unlock_time,
                    hf_version,
                );
                let declared = match tx_type {
                    TransactionType::Offshore => rct.txn_offshore_fee,
                    TransactionType::Onshore | TransactionType::XusdToXasset => {
                        rct.txn_offshore_fee_usd
                    }
                    _ => rct.txn_offshore_fee_xasset,
                };
                if expected != declared && !is_fee_check_exempt(id) {
                    info!("conversion fee is incorrect - rejecting");
                    tvc.verification_failed = true;
                    tvc.fee_too_low = true;
                    return false;
                }
            }
        } else {
            if tx.prefix.amount_burnt != 0 || tx.prefix.amount_minted != 0 {
                error!("burnt/minted set on a transfer tx");
                tvc.verification_failed = true;
                return false;
            }
            if hf_version >= HfVersion::XASSET_FULL && tx.prefix.pricing_record_height != 0 {
                error!("pricing record height set on a transfer tx");
                tvc.verification_failed = true;
                return false;
            }
        }

        if !kept_by_block {
            let colour_fee = match source {
                Asset::Xhv => fee,
                Asset::Xusd => fee_usd,
                _ => fee_xasset,
            };
            if (fee == 0 && fee_usd == 0 && fee_xasset == 0)
                || !self
                    .chain
                    .check_fee(tx_weight, colour_fee, &tvc.pr, source, dest, tx_type)
            {
                tvc.verification_failed = true;
                tvc.fee_too_low = true;
                return false;
            }
        }

        let tx_weight_limit = transaction_weight_limit(hf_version);
        if (!kept_by_block || hf_version >= HfVersion::PER_BYTE_FEE) && tx_weight > tx_weight_limit
        {
            info!(tx_weight, tx_weight_limit, "transaction is too heavy");
            tvc.verification_failed = true;
            tvc.too_big = true;
            return false;
        }

        if !kept_by_block && self.have_tx_keyimges_as_spent_inner(inner, tx, id) {
            self.mark_double_spend_inner(inner, tx);
            tvc.verification_failed = true;
            tvc.double_spend = true;
            return false;
        }

        if !self.chain.check_tx_outputs(tx, tvc) {
            tvc.verification_failed = true;
            tvc.invalid_output = true;
            return false;
        }

        tvc.verification_failed = true;

        let receive_time = self.clock.now();
        let mut max_used_block_id = NULL_HASH;
        let mut max_used_block_height = 0u64;
        let (meta_fee, meta_conversion_fee) = match source {
            Asset::Xhv => (fee, rct.txn_offshore_fee),
            Asset::Xusd => (fee_usd, rct.txn_offshore_fee_usd),
            _ => (fee_xasset, rct.txn_offshore_fee_xasset),
        };
        let mut meta = TxPoolMeta { fee_asset: Some(source), ..TxPoolMeta::default() };

        let inputs_ok = self.check_tx_inputs_cached(
            inner,
            tx,
            id,
            &mut max_used_block_height,
            &mut max_used_block_id,
            tvc,
            kept_by_block,
        );

        if !inputs_ok {
            if !kept_by_block {
                info!("tx used wrong inputs, rejected");
                tvc.verification_failed = true;
                tvc.invalid_input = true;
                return false;
            }
            meta.weight = tx_weight;
            meta.fee = meta_fee;
            meta.conversion_fee = meta_conversion_fee;
            meta.receive_time = receive_time;
            meta.last_relayed_time = self.clock.now();
            meta.relayed = relayed;
            meta.set_relay_method(tx_relay);
            meta.double_spend_seen = self.have_tx_keyimges_as_spent_inner(inner, tx, id);
            meta.pruned = tx.pruned;

            inner.parsed_tx_cache.insert(*id, tx.clone());
            let txn = LockedTxn::new(&self.chain);
            if !self.insert_key_images(inner, tx, id, tx_relay) {
                return false;
            }
            if let Err(err) = self.chain.add_txpool_tx(id, blob, &meta) {
                error!(%err, "error adding transaction to txpool");
                return false;
            }
            inner.fee_order.insert(FeeOrderKey {
                fee_xhv: meta.fee,
                weight: tx_weight,
                receive_time,
                id: *id,
            });
            txn.commit();

            tvc.verification_impossible = true;
            tvc.added_to_pool = true;
        } else {
            let txn = LockedTxn::new(&self.chain);
            if kept_by_block {
                inner.parsed_tx_cache.insert(*id, tx.clone());
            }

            let existing = self.chain.get_txpool_tx_meta(id);
            let existing_tx = existing.is_some();
            if let Some(m) = existing {
                meta = m;
                if tx_relay == RelayMethod::Stem && meta.dandelionpp_stem {
                    tx_relay = RelayMethod::Fluff;
                }
            } else {
                meta.set_relay_method(RelayMethod::None);
            }

            if meta.upgrade_relay_method(tx_relay) || !existing_tx {
                meta.last_relayed_time = NEVER_RELAYED;
                meta.receive_time = receive_time;
                meta.weight = tx_weight;
                meta.fee = meta_fee;
                meta.conversion_fee = meta_conversion_fee;
                meta.fee_asset = Some(source);
                meta.max_used_block_id = max_used_block_id;
                meta.max_used_block_height = max_used_block_height;
                meta.last_failed_height = 0;
                meta.last_failed_id = NULL_HASH;
                meta.relayed = relayed;
                meta.double_spend_seen = false;
                meta.pruned = tx.pruned;

                if !self.insert_key_images(inner, tx, id, tx_relay) {
                    return false;
                }
                let _ = self.chain.remove_txpool_tx(id);
                if let Err(err) = self.chain.add_txpool_tx(id, blob, &meta) {
                    error!(%err, "internal error: error adding transaction to txpool");
                    return false;
                }
                inner.fee_order.insert(FeeOrderKey {
                    fee_xhv: meta.fee,
                    weight: tx_weight,
                    receive_time,
                    id: *id,
                });
            }
            txn.commit();

            tvc.added_to_pool = true;
            if meta.fee > 0 {
                tvc.relay = Some(tx_relay);
            }
        }

        tvc.verification_failed = false;
        inner.txpool_weight += tx_weight;
        inner.cookie += 1;

        info!(
            txid = %hex::encode(id),
            weight = tx_weight,
            fee = meta_fee,
            source = %source,
            "transaction added to pool"
        );

        let max = inner.txpool_max_weight;
        self.prune_inner(inner, max);
        true
    }

    /// Pre-HAVEN2 offshore-data consistency checks between the tx-extra
    /// field and the prefix copy.
    fn validate_offshore_data(
        &self,
        tx: &Transaction,
        id: &Hash,
        tvc: &mut TxVerificationContext,
        hf_version: u8,
    ) -> bool {
        let Some(extra_data) = offshore_data(&tx.prefix.extra) else {
            return true;
        };

        if hf_version >= HfVersion::XASSET_FULL {
            let text = String::from_utf8_lossy(&extra_data);
            let Some((src, dst)) = text.split_once('-') else {
                info!(txid = %hex::encode(id), "invalid offshore data format");
                tvc.verification_failed = true;
                return false;
            };
            if Asset::from_symbol(src).is_err() || Asset::from_symbol(dst).is_err() {
                info!(txid = %hex::encode(id), "unsupported asset in offshore data");
                tvc.verification_failed = true;
                return false;
            }
        } else if hf_version >= HfVersion::OFFSHORE_FULL {
            let valid = extra_data.len() == 2
                && extra_data.iter().all(|&b| b == b'A' || b == b'N');
            if !valid {
                info!(txid = %hex::encode(id), "invalid offshore data format");
                tvc.verification_failed = true;
                return false;
            }
        }

        if tx.prefix.offshore_data.is_empty() {
            if hf_version >= HfVersion::XASSET_FULL {
                info!(txid = %hex::encode(id), "empty tx offshore data");
                tvc.verification_failed = true;
                return false;
            }
            if hf_version >= HfVersion::OFFSHORE_FULL && extra_data != b"NN" {
                info!(txid = %hex::encode(id), "invalid offshore data format");
                tvc.verification_failed = true;
                return false;
            }
        } else if tx.prefix.offshore_data != extra_data {
            info!(txid = %hex::encode(id), "offshore data mismatch between prefix and extra");
            tvc.verification_failed = true;
            return false;
        }
        true
    }

    /// Fee-density key fee, normalized to XHV when a record is available.
    fn normalized_fee(
        &self,
        meta: &TxPoolMeta,
        tvc: &mut TxVerificationContext,
        tx_type: TransactionType,
        hf_version: u8,
    ) -> u64 {
        let total = meta.fee + meta.conversion_fee;
        if tvc.pr.is_empty() {
            match self.chain.latest_acceptable_pr() {
                Some(pr) => tvc.pr = pr,
                None => return total,
            }
        }
        xhv_fee_amount(
            meta.fee_asset.unwrap_or(Asset::Xhv),
            total,
            tx_type,
            &tvc.pr,
            hf_version,
        )
    }

    // =========================================================================
    // Key images
    // =========================================================================

    fn insert_key_images(
        &self,
        inner: &mut PoolInner,
        tx: &Transaction,
        id: &Hash,
        tx_relay: RelayMethod,
    ) -> bool {
        for input in &tx.prefix.vin {
            let Some(key_image) = input.key_image() else {
                error!("wrong input type");
                return false;
            };
            let set = inner.spent_key_images.entry(*key_image).or_default();
            if tx_relay != RelayMethod::Block {
                let one_txid = set.is_empty() || (set.len() == 1 && set.contains(id));
                if !one_txid {
                    error!(
                        key_image = %hex::encode(key_image),
                        txid = %hex::encode(id),
                        "internal error: key image already claimed by another tx"
                    );
                    return false;
                }
            }
            let inserted = set.insert(*id);
            if !inserted && self.chain.txpool_tx_matches_category(id, RelayCategory::Legacy) {
                error!("internal error: duplicate key image insertion");
                return false;
            }
        }
        inner.cookie += 1;
        true
    }

    fn remove_transaction_keyimages(
        &self,
        inner: &mut PoolInner,
        vin: &[TxInput],
        id: &Hash,
    ) -> bool {
        for input in vin {
            let Some(key_image) = input.key_image() else {
                error!("wrong input type");
                return false;
            };
            let Some(set) = inner.spent_key_images.get_mut(key_image) else {
                error!(
                    key_image = %hex::encode(key_image),
                    txid = %hex::encode(id),
                    "failed to find transaction input in key images"
                );
                return false;
            };
            if !set.remove(id) {
                error!(
                    key_image = %hex::encode(key_image),
                    txid = %hex::encode(id),
                    "transaction id not found in key image set"
                );
                return false;
            }
            if set.is_empty() {
                inner.spent_key_images.remove(key_image);
            }
        }
        inner.cookie += 1;
        true
    }

    fn have_tx_keyimg_as_spent_inner(
        &self,
        inner: &PoolInner,
        key_image: &KeyImage,
        txid: &Hash,
    ) -> bool {
        if let Some(set) = inner.spent_key_images.get(key_image) {
            if set.is_empty() {
                return false;
            }
            // another tx using the image always counts as spent
            if set.len() > 1 || !set.contains(txid) {
                return true;
            }
            return self.chain.txpool_tx_matches_category(txid, RelayCategory::Legacy);
        }
        false
    }

    fn have_tx_keyimges_as_spent_inner(
        &self,
        inner: &PoolInner,
        tx: &Transaction,
        txid: &Hash,
    ) -> bool {
        tx.prefix.vin.iter().any(|input| {
            input
                .key_image()
                .map(|ki| self.have_tx_keyimg_as_spent_inner(inner, ki, txid))
                .unwrap_or(false)
        })
    }

    /// Is any of the transaction's key images already claimed in the pool?
    pub fn have_tx_keyimges_as_spent(&self, tx: &Transaction, txid: &Hash) -> bool {
        let inner = self.inner.lock().expect("pool lock");
        self.have_tx_keyimges_as_spent_inner(&inner, tx, txid)
    }

    // =========================================================================
    // Input checking
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn check_tx_inputs_cached(
        &self,
        inner: &mut PoolInner,
        tx: &Transaction,
        txid: &Hash,
        max_used_block_height: &mut u64,
        max_used_block_id: &mut Hash,
        tvc: &mut TxVerificationContext,
        kept_by_block: bool,
    ) -> bool {
        if !kept_by_block {
            if let Some((ret, cached_tvc, height, id)) = inner.input_cache.get(txid) {
                *max_used_block_height = *height;
                *max_used_block_id = *id;
                *tvc = cached_tvc.clone();
                return *ret;
            }
        }
        let ret = self.chain.check_tx_inputs(
            tx,
            max_used_block_height,
            max_used_block_id,
            tvc,
            kept_by_block,
        );
        if !kept_by_block {
            inner.input_cache.insert(
                *txid,
                (ret, tvc.clone(), *max_used_block_height, *max_used_block_id),
            );
        }
        ret
    }

    fn is_transaction_ready_to_go(
        &self,
        inner: &mut PoolInner,
        meta: &mut TxPoolMeta,
        txid: &Hash,
        blob: &[u8],
        parsed: &mut Option<Transaction>,
    ) -> Result<bool, PoolError> {
        let get_tx = |parsed: &mut Option<Transaction>| -> Result<Transaction, PoolError> {
            match parsed {
                Some(tx) => Ok(tx.clone()),
                None => {
                    let tx =
                        parse_tx(blob).map_err(|_| PoolError::Parse(hex::encode(txid)))?;
                    *parsed = Some(tx.clone());
                    Ok(tx)
                }
            }
        };

        if meta.max_used_block_id == NULL_HASH {
            // inputs never checked against a block yet
            if meta.last_failed_id != NULL_HASH
                && self.chain.height() > meta.last_failed_height
                && Some(meta.last_failed_id) == self.chain.block_id_by_height(meta.last_failed_height)
            {
                // already known broken at this height
                return Ok(false);
            }
            let tx = get_tx(parsed)?;
            let mut tvc = TxVerificationContext::default();
            if !self.check_tx_inputs_cached(
                inner,
                &tx,
                txid,
                &mut meta.max_used_block_height,
                &mut meta.max_used_block_id,
                &mut tvc,
                false,
            ) {
                meta.last_failed_height = self.chain.height().saturating_sub(1);
                meta.last_failed_id = self
                    .chain
                    .block_id_by_height(meta.last_failed_height)
                    .unwrap_or(NULL_HASH);
                return Ok(false);
            }
        } else {
            if meta.max_used_block_height >= self.chain.height() {
                return Ok(false);
            }
            if meta.last_failed_id != NULL_HASH
                && Some(meta.last_failed_id) == self.chain.block_id_by_height(meta.last_failed_height)
            {
                return Ok(false);
            }
            let tx = get_tx(parsed)?;
            let mut tvc = TxVerificationContext::default();
            if !self.check_tx_inputs_cached(
                inner,
                &tx,
                txid,
                &mut meta.max_used_block_height,
                &mut meta.max_used_block_id,
                &mut tvc,
                false,
            ) {
                meta.last_failed_height = self.chain.height().saturating_sub(1);
                meta.last_failed_id = self
                    .chain
                    .block_id_by_height(meta.last_failed_height)
                    .unwrap_or(NULL_HASH);
                return Ok(false);
            }
        }

        let tx = get_tx(parsed)?;
        if self.chain.have_tx_keyimges_as_spent(&tx) {
            meta.double_spend_seen = true;
            return Ok(false);
        }
        Ok(true)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Remove lowest-density entries until the pool fits in `bytes`
    /// (0 = configured maximum). Entries kept by a block survive.
    pub fn prune(&self, bytes: u64) {
        let mut inner = self.inner.lock().expect("pool lock");
        let target = if bytes == 0 { inner.txpool_max_weight } else { bytes };
        self.prune_inner(&mut inner, target);
    }

    fn prune_inner(&self, inner: &mut PoolInner, bytes: u64) {
        if inner.txpool_weight <= bytes {
            return;
        }
        let txn = LockedTxn::new(&self.chain);
        let mut changed = false;

        let worst_first: Vec<FeeOrderKey> = inner.fee_order.iter().rev().cloned().collect();
        for key in worst_first {
            if inner.txpool_weight <= bytes {
                break;
            }
            let Some(meta) = self.chain.get_txpool_tx_meta(&key.id) else {
                error!("failed to find tx meta in txpool");
                return;
            };
            // entries riding in with a block are being confirmed, leave them
            if meta.kept_by_block {
                continue;
            }
            let Some(blob) = self.chain.get_txpool_tx_blob(&key.id, RelayCategory::All) else {
                error!("failed to find tx blob in txpool");
                return;
            };
            let Ok(prefix) = parse_prefix(&blob) else {
                error!("failed to parse tx from txpool");
                return;
            };
            // remove the db row first so key images survive any failure
            if let Err(err) = self.chain.remove_txpool_tx(&key.id) {
                error!(%err, "error while pruning txpool");
                return;
            }
            inner.txpool_weight -= meta.weight;
            self.remove_transaction_keyimages(inner, &prefix.vin, &key.id);
            inner.fee_order.remove(&key);
            changed = true;
            info!(
                txid = %hex::encode(key.id),
                weight = meta.weight,
                "pruned tx from txpool"
            );
        }
        txn.commit();
        if changed {
            inner.cookie += 1;
        }
        if inner.txpool_weight > bytes {
            info!(
                weight = inner.txpool_weight,
                limit = bytes,
                "pool weight after pruning is larger than limit"
            );
        }
    }

    /// Evict transactions that aged out or whose pricing record can no
    /// longer be mined. Evicted ids are remembered and refused re-admission
    /// unless they arrive in a block.
    pub fn remove_stuck_transactions(&self) -> bool {
        let mut inner = self.inner.lock().expect("pool lock");
        let now = self.clock.now();
        let bc_height = self.chain.height();
        let mut remove: Vec<(Hash, u64)> = Vec::new();
        let mut drop_keys: Vec<FeeOrderKey> = Vec::new();

        self.chain.for_all_txpool_txes(
            &mut |txid, meta, blob| {
                let tx_age = now.saturating_sub(meta.receive_time);

                // A conversion whose record fell out of the validity window
                // can never be mined again; no point keeping it for days.
                let mut invalid_pr = false;
                match blob.map(parse_tx) {
                    Some(Ok(tx)) => {
                        let pr_height = tx.prefix.pricing_record_height;
                        if pr_height > 0
                            && bc_height.saturating_sub(pr_height) + 1 > PRICING_RECORD_VALID_BLOCKS
                        {
                            invalid_pr = true;
                        }
                    }
                    _ => {
                        error!("failed to parse tx from txpool");
                        invalid_pr = true;
                    }
                }

                if (tx_age > MEMPOOL_TX_LIVETIME && !meta.kept_by_block)
                    || (tx_age > MEMPOOL_TX_FROM_ALT_BLOCK_LIVETIME && meta.kept_by_block)
                    || invalid_pr
                {
                    info!(txid = %hex::encode(txid), tx_age, "removing stuck tx from pool");
                    drop_keys.push(FeeOrderKey {
                        fee_xhv: 0,
                        weight: meta.weight,
                        receive_time: meta.receive_time,
                        id: *txid,
                    });
                    remove.push((*txid, meta.weight));
                }
                true
            },
            true,
            RelayCategory::All,
        );

        // fee-order keys carry the normalized fee, so locate by id
        for key in drop_keys {
            let found = inner.fee_order.iter().find(|k| k.id == key.id).cloned();
            match found {
                Some(k) => {
                    inner.fee_order.remove(&k);
                }
                None => {
                    info!(
                        txid = %hex::encode(key.id),
                        "removing tx not present in the sorted container"
                    );
                }
            }
            inner.timed_out_transactions.insert(key.id);
        }

        if !remove.is_empty() {
            let txn = LockedTxn::new(&self.chain);
            for (txid, weight) in &remove {
                let Some(blob) = self.chain.get_txpool_tx_blob(txid, RelayCategory::All) else {
                    warn!(txid = %hex::encode(txid), "failed to remove stuck transaction");
                    continue;
                };
                match parse_prefix(&blob) {
                    Ok(prefix) => {
                        if self.chain.remove_txpool_tx(txid).is_ok() {
                            inner.txpool_weight = inner.txpool_weight.saturating_sub(*weight);
                            self.remove_transaction_keyimages(&mut inner, &prefix.vin, txid);
                        }
                    }
                    Err(_) => {
                        error!("failed to parse tx from txpool");
                    }
                }
            }
            txn.commit();
            inner.cookie += 1;
        }
        true
    }

    /// Remove a transaction for block inclusion, returning its blob and
    /// metadata.
    pub fn take_tx(&self, id: &Hash) -> Option<TakenTx> {
        let mut inner = self.inner.lock().expect("pool lock");

        let sorted_key = inner.fee_order.iter().find(|k| k.id == *id).cloned();

        let txn = LockedTxn::new(&self.chain);
        let meta = match self.chain.get_txpool_tx_meta(id) {
            Some(meta) => meta,
            None => {
                error!("failed to find tx meta in txpool");
                return None;
            }
        };
        let blob = self.chain.get_txpool_tx_blob(id, RelayCategory::All)?;
        let tx = match inner.parsed_tx_cache.get(id) {
            Some(tx) => tx.clone(),
            None => match parse_tx(&blob) {
                Ok(tx) => tx,
                Err(_) => {
                    error!("failed to parse tx from txpool");
                    return None;
                }
            },
        };

        // remove the row first, so key images stay if anything throws
        if self.chain.remove_txpool_tx(id).is_err() {
            error!("failed to remove tx from txpool");
            return None;
        }
        inner.txpool_weight = inner.txpool_weight.saturating_sub(meta.weight);
        self.remove_transaction_keyimages(&mut inner, &tx.prefix.vin, id);
        txn.commit();

        if let Some(key) = sorted_key {
            inner.fee_order.remove(&key);
        }
        inner.cookie += 1;

        Some(TakenTx {
            tx,
            blob,
            weight: meta.weight,
            fee: meta.fee,
            conversion_fee: meta.conversion_fee,
            fee_asset: meta.fee_asset,
            relayed: meta.relayed,
            do_not_relay: meta.do_not_relay,
            double_spend_seen: meta.double_spend_seen,
            pruned: meta.pruned,
        })
    }

    /// Flag every pool entry colliding with the transaction's key images as
    /// a seen double spend. Observability only; nothing is removed.
    pub fn mark_double_spend(&self, tx: &Transaction) {
        let mut inner = self.inner.lock().expect("pool lock");
        self.mark_double_spend_inner(&mut inner, tx);
    }

    fn mark_double_spend_inner(&self, inner: &mut PoolInner, tx: &Transaction) {
        let mut changed = false;
        let txn = LockedTxn::new(&self.chain);
        for input in &tx.prefix.vin {
            let Some(key_image) = input.key_image() else { continue };
            let Some(ids) = inner.spent_key_images.get(key_image) else { continue };
            for txid in ids {
                let Some(mut meta) = self.chain.get_txpool_tx_meta(txid) else {
                    error!("failed to find tx meta in txpool");
                    continue;
                };
                if !meta.double_spend_seen {
                    debug!(
                        txid = %hex::encode(txid),
                        key_image = %hex::encode(key_image),
                        "marking as double spending"
                    );
                    meta.double_spend_seen = true;
                    changed = true;
                    if let Err(err) = self.chain.update_txpool_tx(txid, &meta) {
                        error!(%err, "failed to update tx meta");
                    }
                }
            }
        }
        txn.commit();
        if changed {
            inner.cookie += 1;
        }
    }

    /// Invalidate input-check caches when the chain advances.
    pub fn on_blockchain_inc(&self, _new_height: u64, _top_block_id: &Hash) {
        let mut inner = self.inner.lock().expect("pool lock");
        inner.input_cache.clear();
        inner.parsed_tx_cache.clear();
    }

    /// Invalidate input-check caches when blocks are popped.
    pub fn on_blockchain_dec(&self, _new_height: u64, _top_block_id: &Hash) {
        let mut inner = self.inner.lock().expect("pool lock");
        inner.input_cache.clear();
        inner.parsed_tx_cache.clear();
    }

    // =========================================================================
    // Relay bookkeeping
    // =========================================================================

    /// Transactions due for (re-)relaying.
    pub fn get_relayable_transactions(&self) -> Vec<(Hash, Vec<u8>, RelayMethod)> {
        let _inner = self.inner.lock().expect("pool lock");
        let now = self.clock.now();
        let mut txs = Vec::with_capacity(self.chain.txpool_tx_count(true));
        self.chain.for_all_txpool_txes(
            &mut |txid, meta, _| {
                // zero-fee transactions are never relayed
                if meta.pruned || meta.fee == 0 {
                    return true;
                }
                if !meta.dandelionpp_stem
                    && now.wrapping_sub(meta.last_relayed_time)
                        <= relay_delay(now, meta.receive_time)
                {
                    return true;
                }
                if meta.dandelionpp_stem && meta.last_relayed_time < now {
                    return true;
                }

                // past half its lifetime the tx is not re-relayed, so a
                // flush on one node cannot re-seed its neighbours
                let max_age = if meta.kept_by_block {
                    MEMPOOL_TX_FROM_ALT_BLOCK_LIVETIME
                } else {
                    MEMPOOL_TX_LIVETIME
                };
                if now.saturating_sub(meta.receive_time) <= max_age / 2 {
                    if let Some(blob) = self.chain.get_txpool_tx_blob(txid, RelayCategory::All) {
                        txs.push((*txid, blob, meta.get_relay_method()));
                    } else {
                        error!("failed to get transaction blob from db");
                    }
                }
                true
            },
            false,
            RelayCategory::Relayable,
        );
        txs
    }

    /// Record a relay: upgrades the method and stamps the relay time; stem
    /// relays get a fresh Poisson embargo timeout instead.
    pub fn set_relayed(&self, hashes: &[Hash], method: RelayMethod) {
        let mut inner = self.inner.lock().expect("pool lock");
        let now = self.clock.now();

        let txn = LockedTxn::new(&self.chain);
        for hash in hashes {
            let Some(mut meta) = self.chain.get_txpool_tx_meta(hash) else { continue };
            meta.upgrade_relay_method(method);
            meta.relayed = true;
            if meta.dandelionpp_stem {
                meta.last_relayed_time = now + embargo_timeout();
            } else {
                meta.last_relayed_time = now;
            }
            if let Err(err) = self.chain.update_txpool_tx(hash, &meta) {
                error!(%err, "failed to update txpool transaction metadata");
            }
        }
        txn.commit();
        inner.cookie += 1;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn have_tx(&self, id: &Hash, category: RelayCategory) -> bool {
        let _inner = self.inner.lock().expect("pool lock");
        self.chain.txpool_has_tx(id, category)
    }

    pub fn get_transactions_count(&self, include_sensitive: bool) -> usize {
        let _inner = self.inner.lock().expect("pool lock");
        self.chain.txpool_tx_count(include_sensitive)
    }

    pub fn get_transactions(&self, include_sensitive: bool) -> Vec<Transaction> {
        let _inner = self.inner.lock().expect("pool lock");
        let category = if include_sensitive {
            RelayCategory::All
        } else {
            RelayCategory::Broadcasted
        };
        let mut txs = Vec::with_capacity(self.chain.txpool_tx_count(include_sensitive));
        self.chain.for_all_txpool_txes(
            &mut |_txid, _meta, blob| {
                if let Some(Ok(tx)) = blob.map(parse_tx) {
                    txs.push(tx);
                } else {
                    error!("failed to parse tx from txpool");
                }
                true
            },
            true,
            category,
        );
        txs
    }

    pub fn get_transaction_hashes(&self, include_sensitive: bool) -> Vec<Hash> {
        let _inner = self.inner.lock().expect("pool lock");
        let category = if include_sensitive {
            RelayCategory::All
        } else {
            RelayCategory::Broadcasted
        };
        let mut out = Vec::new();
        self.chain.for_all_txpool_txes(
            &mut |txid, _meta, _| {
                out.push(*txid);
                true
            },
            false,
            category,
        );
        out
    }

    pub fn get_transaction(&self, id: &Hash, category: RelayCategory) -> Option<Vec<u8>> {
        let _inner = self.inner.lock().expect("pool lock");
        self.chain.get_txpool_tx_blob(id, category)
    }

    pub fn get_transaction_info(&self, txid: &Hash) -> Option<TxDetails> {
        let inner = self.inner.lock().expect("pool lock");
        let meta = self.chain.get_txpool_tx_meta(txid)?;
        let blob = self.chain.get_txpool_tx_blob(txid, RelayCategory::All)?;
        let tx = match inner.parsed_tx_cache.get(txid) {
            Some(tx) => tx.clone(),
            None => parse_tx(&blob).ok()?,
        };
        Some(TxDetails {
            tx,
            blob_size: blob.len() as u64,
            weight: meta.weight,
            fee: meta.fee,
            max_used_block_id: meta.max_used_block_id,
            max_used_block_height: meta.max_used_block_height,
            kept_by_block: meta.kept_by_block,
            last_failed_height: meta.last_failed_height,
            last_failed_id: meta.last_failed_id,
            receive_time: meta.receive_time,
            last_relayed_time: if meta.dandelionpp_stem { 0 } else { meta.last_relayed_time },
            relayed: meta.relayed,
            do_not_relay: meta.do_not_relay,
            double_spend_seen: meta.double_spend_seen,
        })
    }

    /// Blobs of every broadcast-visible entry not named in `hashes`.
    pub fn get_complement(&self, hashes: &[Hash]) -> Vec<Vec<u8>> {
        let _inner = self.inner.lock().expect("pool lock");
        let mut out = Vec::new();
        self.chain.for_all_txpool_txes(
            &mut |txid, meta, _| {
                let method = meta.get_relay_method();
                if method != RelayMethod::Block && method != RelayMethod::Fluff {
                    return true;
                }
                if !hashes.contains(txid) {
                    if let Some(blob) =
                        self.chain.get_txpool_tx_blob(txid, RelayCategory::Broadcasted)
                    {
                        out.push(blob);
                    } else {
                        error!(txid = %hex::encode(txid), "failed to get blob for txpool transaction");
                    }
                }
                true
            },
            false,
            RelayCategory::All,
        );
        out
    }

    pub fn get_transaction_backlog(&self, include_sensitive: bool) -> Vec<TxBacklogEntry> {
        let _inner = self.inner.lock().expect("pool lock");
        let now = self.clock.now();
        let category = if include_sensitive {
            RelayCategory::All
        } else {
            RelayCategory::Broadcasted
        };
        let mut out = Vec::new();
        self.chain.for_all_txpool_txes(
            &mut |_txid, meta, _| {
                out.push(TxBacklogEntry {
                    weight: meta.weight,
                    fee: meta.fee,
                    time_in_pool: now.saturating_sub(meta.receive_time),
                });
                true
            },
            false,
            category,
        );
        out
    }

    pub fn get_transaction_stats(&self, include_sensitive: bool) -> TxPoolStats {
        let _inner = self.inner.lock().expect("pool lock");
        let now = self.clock.now();
        let category = if include_sensitive {
            RelayCategory::All
        } else {
            RelayCategory::Broadcasted
        };
        let mut stats = TxPoolStats::default();
        let mut weights: Vec<u64> = Vec::new();
        self.chain.for_all_txpool_txes(
            &mut |_txid, meta, _| {
                stats.txs_total += 1;
                weights.push(meta.weight);
                stats.bytes_total += meta.weight;
                if stats.bytes_min == 0 || meta.weight < stats.bytes_min {
                    stats.bytes_min = meta.weight;
                }
                if meta.weight > stats.bytes_max {
                    stats.bytes_max = meta.weight;
                }
                if !meta.relayed {
                    stats.num_not_relayed += 1;
                }
                stats.fee_total += meta.fee;
                if stats.oldest == 0 || meta.receive_time < stats.oldest {
                    stats.oldest = meta.receive_time;
                }
                if meta.receive_time + 600 < now {
                    stats.num_10m += 1;
                }
                if meta.last_failed_height != 0 {
                    stats.num_failing += 1;
                }
                if meta.double_spend_seen {
                    stats.num_double_spends += 1;
                }
                true
            },
            false,
            category,
        );
        weights.sort_unstable();
        if !weights.is_empty() {
            stats.bytes_med = weights[weights.len() / 2];
        }
        stats
    }

    /// Key images spent by broadcast-visible pool entries.
    pub fn check_for_key_images(&self, key_images: &[KeyImage]) -> Vec<bool> {
        let inner = self.inner.lock().expect("pool lock");
        key_images
            .iter()
            .map(|image| {
                inner.spent_key_images.get(image).map_or(false, |ids| {
                    ids.iter().any(|txid| {
                        self.chain
                            .txpool_tx_matches_category(txid, RelayCategory::Broadcasted)
                    })
                })
            })
            .collect()
    }

    /// Human-readable pool dump.
    pub fn print_pool(&self, short_format: bool) -> String {
        use std::fmt::Write;
        let _inner = self.inner.lock().expect("pool lock");
        let mut out = String::new();
        self.chain.for_all_txpool_txes(
            &mut |txid, meta, blob| {
                let _ = writeln!(out, "id: {}", hex::encode(txid));
                let blob_size = blob.map_or(0, |b| b.len());
                let _ = writeln!(
                    out,
                    "blob_size: {}\nweight: {}\nfee: {}\nkept_by_block: {}\ndouble_spend_seen: {}\nmax_used_block_height: {}\nlast_failed_height: {}",
                    if short_format { "-".to_string() } else { blob_size.to_string() },
                    meta.weight,
                    meta.fee,
                    if meta.kept_by_block { 'T' } else { 'F' },
                    if meta.double_spend_seen { 'T' } else { 'F' },
                    meta.max_used_block_height,
                    meta.last_failed_height,
                );
                true
            },
            !short_format,
            RelayCategory::All,
        );
        out
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Rebuild the in-memory indices from the database.
    ///
    /// Two passes: entries not kept by a block first, then the kept ones, so
    /// a key image shared between the two cannot collide with itself during
    /// reload. Unparseable entries are removed.
    pub fn init(&self, max_txpool_weight: u64, mine_stem_txes: bool) -> bool {
        let mut inner = self.inner.lock().expect("pool lock");
        inner.txpool_max_weight = if max_txpool_weight != 0 {
            max_txpool_weight
        } else {
            DEFAULT_TXPOOL_MAX_WEIGHT
        };
        inner.fee_order.clear();
        inner.spent_key_images.clear();
        inner.txpool_weight = 0;
        let mut remove: Vec<Hash> = Vec::new();

        for pass in 0..2 {
            let kept = pass == 1;
            let mut entries: Vec<(Hash, TxPoolMeta, Vec<u8>)> = Vec::new();
            let complete = self.chain.for_all_txpool_txes(
                &mut |txid, meta, blob| {
                    if meta.kept_by_block != kept {
                        return true;
                    }
                    entries.push((*txid, meta.clone(), blob.map(<[u8]>::to_vec).unwrap_or_default()));
                    true
                },
                true,
                RelayCategory::All,
            );
            if !complete {
                return false;
            }
            for (txid, meta, blob) in entries {
                let prefix = match parse_prefix(&blob) {
                    Ok(prefix) => prefix,
                    Err(_) => {
                        warn!(txid = %hex::encode(txid), "failed to parse tx from txpool, removing");
                        remove.push(txid);
                        continue;
                    }
                };
                if !self.insert_key_images_from_prefix(&mut inner, &prefix.vin, &txid, meta.get_relay_method()) {
                    error!("failed to insert key images from txpool tx");
                    return false;
                }
                inner.fee_order.insert(FeeOrderKey {
                    fee_xhv: meta.fee,
                    weight: meta.weight,
                    receive_time: meta.receive_time,
                    id: txid,
                });
                inner.txpool_weight += meta.weight;
            }
        }

        if !remove.is_empty() {
            let txn = LockedTxn::new(&self.chain);
            for txid in &remove {
                if self.chain.remove_txpool_tx(txid).is_err() {
                    warn!(txid = %hex::encode(txid), "failed to remove corrupt transaction");
                }
            }
            txn.commit();
        }

        inner.mine_stem_txes = mine_stem_txes;
        inner.cookie = 0;
        true
    }

    fn insert_key_images_from_prefix(
        &self,
        inner: &mut PoolInner,
        vin: &[TxInput],
        id: &Hash,
        tx_relay: RelayMethod,
    ) -> bool {
        for input in vin {
            let Some(key_image) = input.key_image() else {
                return false;
            };
            let set = inner.spent_key_images.entry(*key_image).or_default();
            if tx_relay != RelayMethod::Block {
                let one_txid = set.is_empty() || (set.len() == 1 && set.contains(id));
                if !one_txid {
                    return false;
                }
            }
            set.insert(*id);
        }
        inner.cookie += 1;
        true
    }

    /// Startup sweep: recompute the pool weight and drop entries that are
    /// now oversized or already mined.
    pub fn validate(&self, hf_version: u8) -> usize {
        let mut inner = self.inner.lock().expect("pool lock");
        let tx_weight_limit = transaction_weight_limit(hf_version);
        let mut remove: HashSet<Hash> = HashSet::new();

        inner.txpool_weight = 0;
        let mut total = 0u64;
        self.chain.for_all_txpool_txes(
            &mut |txid, meta, _| {
                total += meta.weight;
                if meta.weight > tx_weight_limit {
                    info!(txid = %hex::encode(txid), weight = meta.weight, "transaction is too big, removing");
                    remove.insert(*txid);
                } else if self.chain.have_tx(txid) {
                    info!(txid = %hex::encode(txid), "transaction is in the blockchain, removing");
                    remove.insert(*txid);
                }
                true
            },
            false,
            RelayCategory::All,
        );
        inner.txpool_weight = total;

        let mut n_removed = 0;
        if !remove.is_empty() {
            let txn = LockedTxn::new(&self.chain);
            for txid in &remove {
                let Some(blob) = self.chain.get_txpool_tx_blob(txid, RelayCategory::All) else {
                    continue;
                };
                let Ok(prefix) = parse_prefix(&blob) else {
                    error!("failed to parse tx from txpool");
                    continue;
                };
                if self.chain.remove_txpool_tx(txid).is_err() {
                    error!("failed to remove invalid tx from pool");
                    continue;
                }
                inner.txpool_weight = inner.txpool_weight.saturating_sub(blob.len() as u64);
                self.remove_transaction_keyimages(&mut inner, &prefix.vin, txid);
                let key = inner.fee_order.iter().find(|k| k.id == *txid).cloned();
                if let Some(key) = key {
                    inner.fee_order.remove(&key);
                }
                n_removed += 1;
            }
            txn.commit();
        }
        if n_removed > 0 {
            inner.cookie += 1;
        }
        n_removed
    }

    // =========================================================================
    // Block template
    // =========================================================================

    /// Pick a fee-maximizing, rule-compliant set of pool transactions for a
    /// new block template.
    pub fn fill_block_template(
        &self,
        median_weight: u64,
        already_generated_coins: u64,
        hf_version: u8,
    ) -> Result<BlockTemplate, PoolError> {
        let mut inner = self.inner.lock().expect("pool lock");
        let mut template = BlockTemplate::default();
        use TransactionType as Tt;

        let mut best_coinbase = block_reward(median_weight, 0, already_generated_coins, hf_version)
            .ok_or(PoolError::EmptyBlockReward)?;
        let mut total_fee_xhv = 0u64;

        let max_total_weight = if hf_version >= 5 {
            2 * median_weight - COINBASE_BLOB_RESERVED_SIZE
        } else {
            (130 * median_weight) / 100 - COINBASE_BLOB_RESERVED_SIZE
        };

        debug!(
            median_weight,
            pool_txs = inner.fee_order.len(),
            "filling block template"
        );

        let txn = LockedTxn::new(&self.chain);

        // Latest acceptable record: without one, fees cannot be normalized,
        // no block cap exists, and conversions stay out of the template.
        let mut have_valid_pr = true;
        let latest_pr = match self.chain.latest_acceptable_pr() {
            Some(pr) => pr,
            None => {
                if hf_version >= HfVersion::USE_COLLATERAL {
                    warn!("no pricing record in the last 10 blocks; conversions excluded from template");
                }
                have_valid_pr = false;
                PricingRecord::empty()
            }
        };

        let supply_amounts = self.chain.get_circulating_supply();
        let block_cap_xhv = block_cap(&supply_amounts, &latest_pr);
        let mut total_conversion_xhv = 0u64;
        info!(block_cap_xhv, "block cap limit for offshore/onshore");

        let mut template_key_images: HashSet<KeyImage> = HashSet::new();
        let mut coinbase = 0u64;

        let candidates: Vec<FeeOrderKey> = inner.fee_order.iter().cloned().collect();
        for key in candidates {
            let Some(mut meta) = self.chain.get_txpool_tx_meta(&key.id) else {
                error!("failed to find tx meta");
                continue;
            };
            debug!(
                txid = %hex::encode(key.id),
                weight = meta.weight,
                total_weight = template.total_weight,
                "considering"
            );

            if !meta.matches(RelayCategory::Legacy)
                && !(inner.mine_stem_txes && meta.get_relay_method() == RelayMethod::Stem)
            {
                debug!(method = ?meta.get_relay_method(), "tx relay method not mineable");
            }
            if meta.pruned {
                debug!("  tx is pruned");
                continue;
            }
            if max_total_weight < template.total_weight + meta.weight {
                debug!("  would exceed maximum block weight");
                continue;
            }

            let mut total_fee_this_tx_xhv = 0u64;
            if hf_version >= 5 {
                let Some(reward) = block_reward(
                    median_weight,
                    template.total_weight + meta.weight,
                    already_generated_coins,
                    hf_version,
                ) else {
                    debug!("  would exceed maximum block weight");
                    continue;
                };

                if hf_version >= HfVersion::USE_COLLATERAL {
                    // the fee-order key already carries the XHV-normalized
                    // total when a record was available at admission
                    total_fee_this_tx_xhv = if have_valid_pr {
                        key.fee_xhv
                    } else {
                        meta.fee + meta.conversion_fee
                    };
                    coinbase = reward + total_fee_xhv + total_fee_this_tx_xhv;
                } else {
                    let xhv_fees = template.fee_map.get(&Asset::Xhv).copied().unwrap_or(0);
                    coinbase = if meta.fee_asset == Some(Asset::Xhv) {
                        reward + xhv_fees + meta.fee
                    } else {
                        reward + xhv_fees
                    };
                }
                if coinbase < best_coinbase {
                    debug!(coinbase, best_coinbase, "  would decrease coinbase");
                    continue;
                }
            } else if template.total_weight > median_weight {
                debug!("  would exceed median block weight");
                break;
            }

            let Some(blob) = self.chain.get_txpool_tx_blob(&key.id, RelayCategory::All) else {
                error!("failed to find tx blob");
                continue;
            };

            let original_meta = meta.clone();
            let mut parsed: Option<Transaction> = None;
            let ready = match self.is_transaction_ready_to_go(
                &mut inner,
                &mut meta,
                &key.id,
                &blob,
                &mut parsed,
            ) {
                Ok(ready) => ready,
                Err(err) => {
                    error!(%err, "failed to check transaction readiness");
                    false
                }
            };
            if meta != original_meta {
                if let Err(err) = self.chain.update_txpool_tx(&key.id, &meta) {
                    error!(%err, "failed to update tx meta");
                }
            }
            if !ready {
                debug!("  not ready to go");
                continue;
            }

            let tx = match parsed {
                Some(tx) => tx,
                None => match parse_tx(&blob) {
                    Ok(tx) => tx,
                    Err(_) => continue,
                },
            };

            if tx
                .key_images()
                .iter()
                .any(|ki| template_key_images.contains(ki))
            {
                debug!("  key images already seen");
                continue;
            }

            let Ok((source, dest, tx_type)) = classify(&tx, &key.id, false) else {
                debug!("  at least 1 input or output of the tx was invalid");
                continue;
            };

            let mut conversion_this_tx_xhv = 0u64;
            if source != dest {
                if hf_version >= HfVersion::USE_COLLATERAL
                    && matches!(tx_type, Tt::Offshore | Tt::Onshore)
                {
                    if !have_valid_pr {
                        continue;
                    }
                    conversion_this_tx_xhv = match tx_type {
                        Tt::Offshore => tx.prefix.amount_burnt,
                        _ => tx.prefix.amount_minted,
                    };
                    if total_conversion_xhv + conversion_this_tx_xhv > block_cap_xhv {
                        debug!("  would exceed block conversion cap");
                        continue;
                    }
                }

                if !tx_pr_height_valid(
                    self.chain.height(),
                    tx.prefix.pricing_record_height,
                    &key.id,
                ) {
                    debug!(
                        pr_height = tx.prefix.pricing_record_height,
                        "  pricing record is too old"
                    );
                    continue;
                }

                if hf_version >= HfVersion::HAVEN2 {
                    let Some(block) = self
                        .chain
                        .block_id_by_height(tx.prefix.pricing_record_height)
                        .and_then(|block_id| self.chain.block_by_hash(&block_id))
                    else {
                        debug!("  failed to get block containing pricing record");
                        continue;
                    };

                    let mut collateral = 0u64;
                    if hf_version >= HfVersion::USE_COLLATERAL
                        && matches!(tx_type, Tt::Offshore | Tt::Onshore)
                    {
                        match collateral_requirements(
                            tx_type,
                            tx.prefix.amount_burnt,
                            &block.pricing_record,
                            &supply_amounts,
                        ) {
                            Ok(c) => collateral = c,
                            Err(err) => {
                                debug!(%err, "  failed to get collateral requirements");
                                continue;
                            }
                        }
                    }

                    if !self.verifier.ver_rct_semantics_simple(
                        &tx,
                        &block.pricing_record,
                        tx_type,
                        source,
                        dest,
                        tx.prefix.amount_burnt,
                        hf_version,
                        collateral,
                    ) {
                        debug!("  transaction proof-of-value is now invalid");
                        continue;
                    }
                }
            }

            template.tx_hashes.push(key.id);
            template.total_weight += meta.weight;
            total_fee_xhv += total_fee_this_tx_xhv;
            total_conversion_xhv += conversion_this_tx_xhv;
            let fee_asset = meta.fee_asset.unwrap_or(Asset::Xhv);
            *template.fee_map.entry(fee_asset).or_default() += meta.fee;
            if source != dest {
                if hf_version >= HfVersion::BULLETPROOF_PLUS {
                    // conversion fees are all declared in XHV from BP+
                    *template.conversion_fee_map.entry(Asset::Xhv).or_default() +=
                        meta.conversion_fee;
                } else if hf_version >= HfVersion::XASSET_FEES_V2
                    && source != Asset::Xhv
                    && dest != Asset::Xhv
                {
                    *template.xasset_conversion_fee_map.entry(fee_asset).or_default() +=
                        meta.conversion_fee;
                } else {
                    *template.conversion_fee_map.entry(fee_asset).or_default() +=
                        meta.conversion_fee;
                }
            }
            best_coinbase = coinbase;
            for ki in tx.key_images() {
                template_key_images.insert(ki);
            }
            debug!(
                total_weight = template.total_weight,
                coinbase = best_coinbase,
                "  added"
            );
        }
        txn.commit();

        template.expected_reward = best_coinbase;
        debug!(
            txs = template.tx_hashes.len(),
            weight = template.total_weight,
            coinbase = best_coinbase,
            "block template filled"
        );
        Ok(template)
    }
}

// =============================================================================
// Free helpers
// =============================================================================

/// Every input must be a spend; the coinbase marker never enters the pool.
fn check_input_types_supported(tx: &Transaction) -> bool {
    !tx.prefix.vin.is_empty()
        && tx
            .prefix
            .vin
            .iter()
            .all(|input| !matches!(input, TxInput::Gen { .. }))
}

fn is_fee_check_exempt(id: &Hash) -> bool {
    let id_hex = hex::encode(id);
    FEE_CHECK_EXEMPT_TXS.contains(&id_hex.as_str())
}

/// Increasing re-relay backoff, clamped to the min/max window.
fn relay_delay(now: u64, received: u64) -> u64 {
    let d = (now.saturating_sub(received) + MIN_RELAY_TIME) / MIN_RELAY_TIME * MIN_RELAY_TIME;
    d.min(MAX_RELAY_TIME)
}

/// Dandelion++ embargo: exponential with mean `DANDELIONPP_EMBARGO_AVERAGE`.
fn embargo_timeout() -> u64 {
    let mut rng = rand::thread_rng();
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    (-(DANDELIONPP_EMBARGO_AVERAGE as f64) * u.ln()).round() as u64
}

/// Largest weight a block template may reach at this fork.
pub fn max_template_weight(median_weight: u64, hf_version: u8) -> u64 {
    let median = median_weight.max(min_block_weight(hf_version));
    if hf_version >= 5 {
        2 * median - COINBASE_BLOB_RESERVED_SIZE
    } else {
        (130 * median) / 100 - COINBASE_BLOB_RESERVED_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_delay_backoff() {
        // fresh tx: floor of 5 minutes
        assert_eq!(relay_delay(1_000, 1_000), MIN_RELAY_TIME);
        // older txs back off in 5 minute steps
        assert_eq!(relay_delay(1_600, 1_000), 2 * MIN_RELAY_TIME);
        // capped at four hours
        assert_eq!(relay_delay(1_000_000, 0), MAX_RELAY_TIME);
    }

    #[test]
    fn embargo_timeout_is_positive_and_bounded() {
        for _ in 0..100 {
            let t = embargo_timeout();
            // an exponential with mean 173 essentially never exceeds 2 hours
            assert!(t < 7_200);
        }
    }

    #[test]
    fn input_type_support() {
        let mut tx = Transaction::default();
        assert!(!check_input_types_supported(&tx));
        tx.prefix.vin.push(TxInput::ToKey {
            amount: 0,
            key_offsets: vec![1],
            key_image: [1; 32],
        });
        assert!(check_input_types_supported(&tx));
        tx.prefix.vin.push(TxInput::Gen { height: 1 });
        assert!(!check_input_types_supported(&tx));
    }

    #[test]
    fn fee_exempt_txids() {
        let mut id = [0u8; 32];
        hex::decode_to_slice(FEE_CHECK_EXEMPT_TXS[0], &mut id).unwrap();
        assert!(is_fee_check_exempt(&id));
        assert!(!is_fee_check_exempt(&NULL_HASH));
    }

    #[test]
    fn template_weight_limits() {
        // v5: twice the median less the coinbase reserve
        assert_eq!(max_template_weight(300_000, 18), 600_000 - COINBASE_BLOB_RESERVED_SIZE);
        // pre-v5: 130% of the median
        assert_eq!(max_template_weight(60_000, 4), 78_000 - COINBASE_BLOB_RESERVED_SIZE);
    }
}
