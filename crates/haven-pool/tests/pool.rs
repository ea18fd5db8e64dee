//! End-to-end pool tests against an in-memory chain backend.

use haven_consensus::block::Block;
use haven_consensus::oracle::{AssetRate, PricingRecord};
use haven_pool::{
    ChainBackend, ChainError, Clock, RelayCategory, RelayMethod, RingVerifier, TxMemoryPool,
    TxPoolMeta, TxVerificationContext,
};
use haven_tx::types::{rct_type, Hash, RctSignatures, Transaction, TxInput, TxOutput, TxPrefix};
use haven_tx::wire::{hash_blob, serialize_tx};
use haven_types::constants::{
    Asset, HfVersion, Network, COIN, MAX_BLOCK_NUMBER, MEMPOOL_TX_LIVETIME,
    PRICING_RECORD_VALID_BLOCKS,
};
use haven_types::TransactionType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// =============================================================================
// Mock chain backend
// =============================================================================

#[derive(Default)]
struct MockState {
    height: u64,
    blocks: HashMap<u64, Block>,
    txpool: HashMap<Hash, (Vec<u8>, TxPoolMeta)>,
    mined: Vec<Hash>,
    chain_spent: Vec<[u8; 32]>,
    supply: Vec<(Asset, String)>,
    latest_pr: Option<PricingRecord>,
    fail_inputs: bool,
}

struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    fn new(height: u64) -> Self {
        let mut blocks = HashMap::new();
        for h in 0..height {
            blocks.insert(h, Block::default());
        }
        Self {
            state: Mutex::new(MockState {
                height,
                blocks,
                supply: vec![
                    (Asset::Xhv, (200_000u128 * COIN as u128).to_string()),
                    (Asset::Xusd, "0".to_string()),
                ],
                ..MockState::default()
            }),
        }
    }

    fn set_pricing_record(&self, height: u64, pr: PricingRecord) {
        let mut state = self.state.lock().unwrap();
        let block = state.blocks.entry(height).or_default();
        block.pricing_record = pr.clone();
        state.latest_pr = Some(pr);
    }

    fn clear_latest_pr(&self) {
        self.state.lock().unwrap().latest_pr = None;
    }

    fn set_fail_inputs(&self, fail: bool) {
        self.state.lock().unwrap().fail_inputs = fail;
    }

    fn mark_mined(&self, id: Hash) {
        self.state.lock().unwrap().mined.push(id);
    }

    fn advance_chain(&self, blocks: u64) {
        let mut state = self.state.lock().unwrap();
        let new_tip = state.height + blocks;
        for h in state.height..new_tip {
            state.blocks.insert(h, Block::default());
        }
        state.height = new_tip;
    }

    fn block_id_for(height: u64) -> Hash {
        let mut id = [0xB0u8; 32];
        id[..8].copy_from_slice(&height.to_le_bytes());
        id
    }

    fn height_for_block_id(id: &Hash) -> Option<u64> {
        if id[8..] != [0xB0u8; 24] {
            return None;
        }
        let mut h = [0u8; 8];
        h.copy_from_slice(&id[..8]);
        Some(u64::from_le_bytes(h))
    }
}

impl ChainBackend for MockChain {
    fn height(&self) -> u64 {
        self.state.lock().unwrap().height
    }

    fn nettype(&self) -> Network {
        Network::Mainnet
    }

    fn block_id_by_height(&self, height: u64) -> Option<Hash> {
        let state = self.state.lock().unwrap();
        state.blocks.contains_key(&height).then(|| Self::block_id_for(height))
    }

    fn block_by_hash(&self, id: &Hash) -> Option<Block> {
        let height = Self::height_for_block_id(id)?;
        self.state.lock().unwrap().blocks.get(&height).cloned()
    }

    fn add_txpool_tx(&self, id: &Hash, blob: &[u8], meta: &TxPoolMeta) -> Result<(), ChainError> {
        self.state
            .lock()
            .unwrap()
            .txpool
            .insert(*id, (blob.to_vec(), meta.clone()));
        Ok(())
    }

    fn remove_txpool_tx(&self, id: &Hash) -> Result<(), ChainError> {
        self.state.lock().unwrap().txpool.remove(id);
        Ok(())
    }

    fn update_txpool_tx(&self, id: &Hash, meta: &TxPoolMeta) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        match state.txpool.get_mut(id) {
            Some(entry) => {
                entry.1 = meta.clone();
                Ok(())
            }
            None => Err(ChainError::NotFound(hex::encode(id))),
        }
    }

    fn get_txpool_tx_meta(&self, id: &Hash) -> Option<TxPoolMeta> {
        self.state.lock().unwrap().txpool.get(id).map(|(_, m)| m.clone())
    }

    fn get_txpool_tx_blob(&self, id: &Hash, _category: RelayCategory) -> Option<Vec<u8>> {
        self.state.lock().unwrap().txpool.get(id).map(|(b, _)| b.clone())
    }

    fn txpool_tx_count(&self, _include_sensitive: bool) -> usize {
        self.state.lock().unwrap().txpool.len()
    }

    fn txpool_has_tx(&self, id: &Hash, category: RelayCategory) -> bool {
        self.state
            .lock()
            .unwrap()
            .txpool
            .get(id)
            .map_or(false, |(_, m)| m.matches(category))
    }

    fn txpool_tx_matches_category(&self, id: &Hash, category: RelayCategory) -> bool {
        self.txpool_has_tx(id, category)
    }

    fn for_all_txpool_txes(
        &self,
        f: &mut dyn FnMut(&Hash, &TxPoolMeta, Option<&[u8]>) -> bool,
        include_blob: bool,
        category: RelayCategory,
    ) -> bool {
        let entries: Vec<(Hash, TxPoolMeta, Vec<u8>)> = {
            let state = self.state.lock().unwrap();
            state
                .txpool
                .iter()
                .filter(|(_, (_, m))| m.matches(category))
                .map(|(id, (b, m))| (*id, m.clone(), b.clone()))
                .collect()
        };
        for (id, meta, blob) in entries {
            let blob_ref = include_blob.then_some(blob.as_slice());
            if !f(&id, &meta, blob_ref) {
                return false;
            }
        }
        true
    }

    fn have_tx(&self, id: &Hash) -> bool {
        self.state.lock().unwrap().mined.contains(id)
    }

    fn have_tx_keyimges_as_spent(&self, tx: &Transaction) -> bool {
        let state = self.state.lock().unwrap();
        tx.key_images().iter().any(|ki| state.chain_spent.contains(ki))
    }

    fn check_fee(
        &self,
        _tx_weight: u64,
        fee: u64,
        _pr: &PricingRecord,
        _source: Asset,
        _destination: Asset,
        _tx_type: TransactionType,
    ) -> bool {
        fee > 0
    }

    fn check_tx_inputs(
        &self,
        _tx: &Transaction,
        max_used_block_height: &mut u64,
        max_used_block_id: &mut Hash,
        _tvc: &mut TxVerificationContext,
        _kept_by_block: bool,
    ) -> bool {
        let state = self.state.lock().unwrap();
        if state.fail_inputs {
            return false;
        }
        *max_used_block_height = state.height.saturating_sub(1);
        *max_used_block_id = Self::block_id_for(*max_used_block_height);
        true
    }

    fn check_tx_outputs(&self, _tx: &Transaction, _tvc: &mut TxVerificationContext) -> bool {
        true
    }

    fn get_circulating_supply(&self) -> Vec<(Asset, String)> {
        self.state.lock().unwrap().supply.clone()
    }

    fn latest_acceptable_pr(&self) -> Option<PricingRecord> {
        self.state.lock().unwrap().latest_pr.clone()
    }

    fn txn_begin(&self) {}
    fn txn_commit(&self) {}
    fn txn_abort(&self) {}
}

struct AcceptAllVerifier;

impl RingVerifier for AcceptAllVerifier {
    fn check_burnt_and_minted(
        &self,
        _tx: &Transaction,
        _amount_burnt: u64,
        _amount_minted: u64,
        _pr: &PricingRecord,
        _source: Asset,
        _destination: Asset,
        _hf_version: u8,
    ) -> bool {
        true
    }

    fn ver_rct_semantics_simple(
        &self,
        _tx: &Transaction,
        _pr: &PricingRecord,
        _tx_type: TransactionType,
        _source: Asset,
        _destination: Asset,
        _amount_burnt: u64,
        _hf_version: u8,
        _collateral: u64,
    ) -> bool {
        true
    }
}

#[derive(Clone)]
struct SharedClock(Arc<Mutex<u64>>);

impl SharedClock {
    fn new(now: u64) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    fn advance(&self, seconds: u64) {
        *self.0.lock().unwrap() += seconds;
    }
}

impl Clock for SharedClock {
    fn now(&self) -> u64 {
        *self.0.lock().unwrap()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const TIP: u64 = 1_000_000;
const HF: u8 = HfVersion::USE_COLLATERAL;
const NOW: u64 = 1_700_000_000;

fn record() -> PricingRecord {
    PricingRecord {
        xhv_ma: COIN / 2,
        xhv_spot: 2 * COIN / 5,
        rates: vec![AssetRate { asset: Asset::Xbtc, rate: 25_000_000 }],
        timestamp: 1,
        signature: vec![],
    }
}

fn transfer_tx(ki: u8, fee: u64) -> Transaction {
    Transaction {
        prefix: TxPrefix {
            version: 7,
            unlock_time: 10,
            vin: vec![TxInput::ToKey {
                amount: 0,
                key_offsets: vec![10, 5],
                key_image: [ki; 32],
            }],
            vout: vec![
                TxOutput::ToKey { amount: 0, key: [1; 32] },
                TxOutput::ToKey { amount: 0, key: [2; 32] },
            ],
            output_unlock_times: vec![0, 0],
            collateral_indices: vec![],
            ..TxPrefix::default()
        },
        rct_signatures: RctSignatures {
            rct_type: rct_type::BULLETPROOF_PLUS,
            txn_fee: fee,
            ..RctSignatures::default()
        },
        pruned: false,
    }
}

/// Offshore converting `burnt` XHV, priced against the record at
/// `pr_height`, with the unlock vector and collateral indices the
/// validation rules demand.
fn offshore_tx(ki: u8, burnt: u64, pr_height: u64) -> Transaction {
    let unlock = pr_height + 16_000;
    Transaction {
        prefix: TxPrefix {
            version: 7,
            unlock_time: unlock,
            vin: vec![TxInput::ToKey {
                amount: 0,
                key_offsets: vec![10, 5],
                key_image: [ki; 32],
            }],
            vout: vec![
                TxOutput::Offshore { amount: 0, key: [1; 32] },
                TxOutput::ToKey { amount: 0, key: [2; 32] },
                TxOutput::ToKey { amount: 0, key: [3; 32] },
            ],
            pricing_record_height: pr_height,
            amount_burnt: burnt,
            amount_minted: burnt / 2,
            output_unlock_times: vec![unlock, 0, unlock],
            collateral_indices: vec![2, 0],
            ..TxPrefix::default()
        },
        rct_signatures: RctSignatures {
            rct_type: rct_type::BULLETPROOF_PLUS,
            txn_fee: COIN / 10,
            txn_offshore_fee: (burnt as u128 * 3 / 200) as u64,
            ..RctSignatures::default()
        },
        pruned: false,
    }
}

/// Onshore minting `minted` XHV from `minted / 2` xUSD.
fn onshore_tx(ki: u8, minted: u64, pr_height: u64) -> Transaction {
    let unlock = pr_height + 16_000;
    let burnt = minted / 2;
    Transaction {
        prefix: TxPrefix {
            version: 7,
            unlock_time: unlock,
            vin: vec![
                TxInput::Onshore {
                    amount: 0,
                    key_offsets: vec![10, 5],
                    key_image: [ki; 32],
                },
                TxInput::ToKey {
                    amount: 0,
                    key_offsets: vec![4, 4],
                    key_image: [ki + 1; 32],
                },
            ],
            vout: vec![
                TxOutput::ToKey { amount: 0, key: [1; 32] },
                TxOutput::ToKey { amount: 0, key: [2; 32] },
                TxOutput::ToKey { amount: 0, key: [3; 32] },
                TxOutput::Offshore { amount: 0, key: [4; 32] },
            ],
            pricing_record_height: pr_height,
            amount_burnt: burnt,
            amount_minted: minted,
            output_unlock_times: vec![unlock, unlock, 0, 0],
            collateral_indices: vec![1, 2],
            ..TxPrefix::default()
        },
        rct_signatures: RctSignatures {
            rct_type: rct_type::BULLETPROOF_PLUS,
            txn_fee: COIN / 100,
            txn_offshore_fee: (burnt as u128 * 3 / 200) as u64,
            ..RctSignatures::default()
        },
        pruned: false,
    }
}

type Pool = TxMemoryPool<MockChain, AcceptAllVerifier>;

fn make_pool() -> (Pool, SharedClock) {
    let chain = MockChain::new(TIP);
    chain.set_pricing_record(TIP - 2, record());
    let clock = SharedClock::new(NOW);
    let pool = TxMemoryPool::with_clock(chain, AcceptAllVerifier, Box::new(clock.clone()));
    (pool, clock)
}

fn admit(pool: &Pool, tx: &Transaction, relay: RelayMethod) -> (bool, TxVerificationContext, Hash) {
    let mut tvc = TxVerificationContext::default();
    let ok = pool.add_tx(tx, &mut tvc, relay, false, HF);
    let id = hash_blob(&serialize_tx(tx));
    (ok, tvc, id)
}

// =============================================================================
// Admission
// =============================================================================

#[test]
fn transfer_is_admitted() {
    let (pool, _) = make_pool();
    let tx = transfer_tx(1, COIN / 100);
    let (ok, tvc, id) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(ok, "transfer should be admitted");
    assert!(tvc.added_to_pool);
    assert!(!tvc.verification_failed);
    assert_eq!(tvc.relay, Some(RelayMethod::Fluff));
    assert!(pool.have_tx(&id, RelayCategory::Broadcasted));
    assert_eq!(pool.get_transactions_count(true), 1);
    assert_eq!(pool.get_txpool_weight(), serialize_tx(&tx).len() as u64);
}

#[test]
fn pool_key_image_double_spend_rejected() {
    let (pool, _) = make_pool();
    let (ok, ..) = admit(&pool, &transfer_tx(7, COIN / 100), RelayMethod::Fluff);
    assert!(ok);

    // different tx, same key image
    let mut tx2 = transfer_tx(7, COIN / 50);
    tx2.prefix.unlock_time = 11;
    let (ok, tvc, _) = admit(&pool, &tx2, RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.double_spend);
    assert!(tvc.verification_failed);
}

#[test]
fn block_relay_bypasses_double_spend() {
    let (pool, _) = make_pool();
    let (ok, ..) = admit(&pool, &transfer_tx(7, COIN / 100), RelayMethod::Fluff);
    assert!(ok);

    let mut tx2 = transfer_tx(7, COIN / 50);
    tx2.prefix.unlock_time = 11;
    let (ok, tvc, _) = admit(&pool, &tx2, RelayMethod::Block);
    assert!(ok, "block relay bypasses the pool double-spend check");
    assert!(tvc.added_to_pool);
}

#[test]
fn timestamp_unlock_rejected() {
    let (pool, _) = make_pool();
    let mut tx = transfer_tx(1, COIN / 100);
    tx.prefix.unlock_time = MAX_BLOCK_NUMBER;
    let (ok, tvc, _) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.verification_failed);
}

#[test]
fn version_gate_enforced() {
    let (pool, _) = make_pool();
    let mut tx = transfer_tx(1, COIN / 100);
    tx.prefix.version = 6;
    let (ok, tvc, _) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.verification_failed);
}

#[test]
fn transfer_with_conversion_fields_rejected() {
    let (pool, _) = make_pool();
    let mut tx = transfer_tx(1, COIN / 100);
    tx.prefix.amount_burnt = 5;
    tx.prefix.amount_minted = 5;
    let (ok, ..) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);

    let mut tx = transfer_tx(2, COIN / 100);
    tx.prefix.pricing_record_height = 10;
    let (ok, ..) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
}

#[test]
fn zero_fee_rejected() {
    let (pool, _) = make_pool();
    let (ok, tvc, _) = admit(&pool, &transfer_tx(1, 0), RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.fee_too_low);
}

#[test]
fn oversized_transaction_rejected() {
    let (pool, _) = make_pool();
    let mut tx = transfer_tx(1, COIN / 100);
    // blow the weight past the per-tx limit (half the minimum block weight)
    tx.prefix.vin = (0..4_000u32)
        .map(|i| {
            let mut ki = [0u8; 32];
            ki[..4].copy_from_slice(&i.to_le_bytes());
            TxInput::ToKey { amount: 0, key_offsets: vec![1; 16], key_image: ki }
        })
        .collect();
    let (ok, tvc, _) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.too_big);
}

#[test]
fn offshore_conversion_admitted() {
    let (pool, _) = make_pool();
    let tx = offshore_tx(1, 100 * COIN, TIP - 2);
    let (ok, tvc, id) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(ok, "offshore should be admitted: {tvc:?}");
    assert_eq!(tvc.tx_type, Some(TransactionType::Offshore));
    assert_eq!(tvc.source_asset, Some(Asset::Xhv));
    assert_eq!(tvc.dest_asset, Some(Asset::Xusd));
    assert!(pool.have_tx(&id, RelayCategory::All));
}

#[test]
fn conversion_fee_must_match_exactly() {
    let (pool, _) = make_pool();
    let mut tx = offshore_tx(1, 100 * COIN, TIP - 2);
    tx.rct_signatures.txn_offshore_fee += 1;
    let (ok, tvc, _) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.fee_too_low);
}

#[test]
fn stale_pricing_record_rejected() {
    let (pool, _) = make_pool();
    let stale_height = TIP - PRICING_RECORD_VALID_BLOCKS - 5;
    pool.chain().set_pricing_record(stale_height, record());
    let tx = offshore_tx(1, 100 * COIN, stale_height);
    let (ok, tvc, _) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.verification_failed);
}

#[test]
fn conversion_with_zero_burnt_rejected() {
    let (pool, _) = make_pool();
    let mut tx = offshore_tx(1, 100 * COIN, TIP - 2);
    tx.prefix.amount_burnt = 0;
    let (ok, ..) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
}

#[test]
fn short_conversion_unlock_rejected() {
    let (pool, _) = make_pool();
    let mut tx = offshore_tx(1, 100 * COIN, TIP - 2);
    // converted output unlocks only 100 blocks past the record
    tx.prefix.output_unlock_times[0] = tx.prefix.pricing_record_height + 100;
    let (ok, ..) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok);
}

#[test]
fn failed_inputs_rejected_unless_kept_by_block() {
    let (pool, _) = make_pool();
    pool.chain().set_fail_inputs(true);

    let (ok, tvc, _) = admit(&pool, &transfer_tx(1, COIN / 100), RelayMethod::Fluff);
    assert!(!ok);
    assert!(tvc.invalid_input);

    // transactions riding in with a block are stored for a later re-check
    let (ok, tvc, _) = admit(&pool, &transfer_tx(2, COIN / 100), RelayMethod::Block);
    assert!(ok);
    assert!(tvc.verification_impossible);
    assert!(tvc.added_to_pool);
}

#[test]
fn cookie_bumps_on_mutation() {
    let (pool, _) = make_pool();
    let before = pool.cookie();
    admit(&pool, &transfer_tx(1, COIN / 100), RelayMethod::Fluff);
    assert!(pool.cookie() > before);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn take_tx_removes_all_indices() {
    let (pool, _) = make_pool();
    let tx = transfer_tx(1, COIN / 100);
    let (ok, _, id) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(ok);

    let taken = pool.take_tx(&id).expect("tx should be takeable");
    assert_eq!(taken.tx, tx);
    assert_eq!(taken.fee, COIN / 100);
    assert_eq!(taken.fee_asset, Some(Asset::Xhv));
    assert_eq!(pool.get_transactions_count(true), 0);
    assert_eq!(pool.get_txpool_weight(), 0);

    // key image is free again
    let (ok, ..) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(ok);
}

#[test]
fn prune_drops_lowest_density_first() {
    let (pool, _) = make_pool();
    let cheap = transfer_tx(1, COIN / 1_000);
    let rich = transfer_tx(2, COIN);
    let (_, _, cheap_id) = admit(&pool, &cheap, RelayMethod::Fluff);
    let (_, _, rich_id) = admit(&pool, &rich, RelayMethod::Fluff);
    assert_eq!(pool.get_transactions_count(true), 2);

    // prune to the weight of a single entry
    let one = serialize_tx(&rich).len() as u64;
    pool.prune(one);

    assert!(pool.have_tx(&rich_id, RelayCategory::All), "high fee survives");
    assert!(!pool.have_tx(&cheap_id, RelayCategory::All), "low fee pruned");
    assert!(pool.get_txpool_weight() <= one);
}

#[test]
fn prune_spares_kept_by_block() {
    let (pool, _) = make_pool();
    let tx = transfer_tx(1, COIN / 1_000);
    let (ok, _, id) = admit(&pool, &tx, RelayMethod::Block);
    assert!(ok);

    pool.prune(1);
    assert!(pool.have_tx(&id, RelayCategory::All), "kept-by-block entries survive pruning");
}

#[test]
fn aged_out_transactions_evicted_and_barred() {
    let (pool, clock) = make_pool();
    let tx = transfer_tx(1, COIN / 100);
    let (ok, _, id) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(ok);

    // not yet stuck
    pool.remove_stuck_transactions();
    assert!(pool.have_tx(&id, RelayCategory::All));

    clock.advance(MEMPOOL_TX_LIVETIME + 1);
    pool.remove_stuck_transactions();
    assert!(!pool.have_tx(&id, RelayCategory::All), "aged-out tx evicted");
    assert_eq!(pool.get_txpool_weight(), 0);

    // evicted ids are refused re-admission...
    let (ok, ..) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(!ok, "timed-out tx must not re-enter");

    // ...unless they arrive in a block
    let mut tvc = TxVerificationContext::default();
    let ok = pool.add_tx(&tx, &mut tvc, RelayMethod::Block, false, HF);
    assert!(ok, "block relay overrides the timed-out set");
}

#[test]
fn stuck_conversion_with_stale_record_evicted() {
    let (pool, _) = make_pool();
    let tx = offshore_tx(1, 100 * COIN, TIP - 2);
    let (ok, _, id) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(ok);

    // the chain advances past the record validity window; no need to wait
    // out the full pool lifetime
    pool.chain().advance_chain(PRICING_RECORD_VALID_BLOCKS + 2);
    pool.remove_stuck_transactions();
    assert!(!pool.have_tx(&id, RelayCategory::All), "stale conversion evicted");
}

#[test]
fn mark_double_spend_flags_but_keeps() {
    let (pool, _) = make_pool();
    let tx = transfer_tx(1, COIN / 100);
    let (ok, _, id) = admit(&pool, &tx, RelayMethod::Fluff);
    assert!(ok);

    // an incoming block spends the same key image
    let mut colliding = transfer_tx(1, COIN / 2);
    colliding.prefix.unlock_time = 12;
    pool.mark_double_spend(&colliding);

    let info = pool.get_transaction_info(&id).unwrap();
    assert!(info.double_spend_seen);
    assert!(pool.have_tx(&id, RelayCategory::All), "entry stays in the pool");
}

#[test]
fn relayable_and_set_relayed() {
    let (pool, _) = make_pool();
    let tx = transfer_tx(1, COIN / 100);
    let (ok, _, id) = admit(&pool, &tx, RelayMethod::Local);
    assert!(ok);

    // never-relayed entries are due immediately
    let relayable = pool.get_relayable_transactions();
    assert_eq!(relayable.len(), 1);
    assert_eq!(relayable[0].0, id);
    assert_eq!(relayable[0].2, RelayMethod::Local);

    pool.set_relayed(&[id], RelayMethod::Fluff);
    let info = pool.get_transaction_info(&id).unwrap();
    assert!(info.relayed);
    assert!(pool.have_tx(&id, RelayCategory::Broadcasted));

    // freshly relayed entries back off
    assert!(pool.get_relayable_transactions().is_empty());
}

#[test]
fn init_rebuilds_indices_in_two_passes() {
    let (pool, _) = make_pool();
    let a = transfer_tx(1, COIN / 100);
    let b = offshore_tx(5, 100 * COIN, TIP - 2);
    let (_, _, id_a) = admit(&pool, &a, RelayMethod::Fluff);
    let (ok, _, id_b) = admit(&pool, &b, RelayMethod::Block);
    assert!(ok);

    assert!(pool.init(0, false), "reload should succeed");
    assert!(pool.have_tx(&id_a, RelayCategory::All));
    assert!(pool.have_tx(&id_b, RelayCategory::All));
    let expected = (serialize_tx(&a).len() + serialize_tx(&b).len()) as u64;
    assert_eq!(pool.get_txpool_weight(), expected);

    // key image index restored: a foreign claim on the same image is spent
    assert!(pool.have_tx_keyimges_as_spent(&a, &[0xEE; 32]));
}

#[test]
fn validate_sweeps_mined_transactions() {
    let (pool, _) = make_pool();
    let tx = transfer_tx(1, COIN / 100);
    let (_, _, id) = admit(&pool, &tx, RelayMethod::Fluff);

    pool.chain().mark_mined(id);
    let removed = pool.validate(HF);
    assert_eq!(removed, 1);
    assert!(!pool.have_tx(&id, RelayCategory::All));
}

#[test]
fn stats_backlog_and_complement() {
    let (pool, _) = make_pool();
    admit(&pool, &transfer_tx(1, COIN / 100), RelayMethod::Fluff);
    admit(&pool, &transfer_tx(2, COIN / 50), RelayMethod::Fluff);

    let stats = pool.get_transaction_stats(true);
    assert_eq!(stats.txs_total, 2);
    assert!(stats.bytes_total > 0);
    assert!(stats.bytes_med > 0);
    assert_eq!(stats.fee_total, COIN / 100 + COIN / 50);

    let backlog = pool.get_transaction_backlog(true);
    assert_eq!(backlog.len(), 2);

    let hashes = pool.get_transaction_hashes(true);
    assert_eq!(hashes.len(), 2);
    let complement = pool.get_complement(&hashes[..1]);
    assert_eq!(complement.len(), 1);

    assert_eq!(pool.get_transactions(true).len(), 2);
}

#[test]
fn check_for_key_images_sees_broadcast_entries() {
    let (pool, _) = make_pool();
    admit(&pool, &transfer_tx(9, COIN / 100), RelayMethod::Fluff);
    let spent = pool.check_for_key_images(&[[9; 32], [10; 32]]);
    assert_eq!(spent, vec![true, false]);
}

// =============================================================================
// Block template
// =============================================================================

#[test]
fn template_orders_by_fee_density() {
    let (pool, _) = make_pool();
    let cheap = transfer_tx(1, COIN / 1_000);
    let rich = transfer_tx(2, COIN / 10);
    let (_, _, cheap_id) = admit(&pool, &cheap, RelayMethod::Fluff);
    let (_, _, rich_id) = admit(&pool, &rich, RelayMethod::Fluff);

    let template = pool.fill_block_template(300_000, 1_000_000 * COIN, HF).unwrap();
    assert_eq!(template.tx_hashes, vec![rich_id, cheap_id]);
    assert_eq!(
        template.fee_map.get(&Asset::Xhv).copied().unwrap_or(0),
        COIN / 10 + COIN / 1_000
    );
    assert!(template.expected_reward > 0);
    assert!(template.total_weight > 0);
}

#[test]
fn template_skips_duplicate_key_images() {
    let (pool, _) = make_pool();
    let a = transfer_tx(3, COIN / 10);
    let (_, _, id_a) = admit(&pool, &a, RelayMethod::Fluff);
    // second tx with the same key image arrives via a block
    let mut b = transfer_tx(3, COIN / 20);
    b.prefix.unlock_time = 12;
    let (ok, _, id_b) = admit(&pool, &b, RelayMethod::Block);
    assert!(ok);

    let template = pool.fill_block_template(300_000, 1_000_000 * COIN, HF).unwrap();
    let picked_both = template.tx_hashes.contains(&id_a) && template.tx_hashes.contains(&id_b);
    assert!(!picked_both, "only one claimant of a key image may enter the template");
}

#[test]
fn template_respects_conversion_cap() {
    // A supply of 200,000 XHV and a microscopic price pin the block cap at
    // 1,000 XHV (the 0.5% supply term alone). An offshore burning 600 XHV
    // fits; a second conversion minting 500 XHV would push past the cap.
    let chain = MockChain::new(TIP);
    let tiny = PricingRecord {
        xhv_ma: 1,
        xhv_spot: 1,
        rates: vec![],
        timestamp: 1,
        signature: vec![],
    };
    chain.set_pricing_record(TIP - 2, tiny);
    let pool: Pool =
        TxMemoryPool::with_clock(chain, AcceptAllVerifier, Box::new(SharedClock::new(NOW)));

    let offshore = offshore_tx(1, 600 * COIN, TIP - 2);
    let onshore = onshore_tx(10, 500 * COIN, TIP - 2);
    let (ok, tvc, offshore_id) = admit(&pool, &offshore, RelayMethod::Fluff);
    assert!(ok, "offshore admission failed: {tvc:?}");
    let (ok, tvc, onshore_id) = admit(&pool, &onshore, RelayMethod::Fluff);
    assert!(ok, "onshore admission failed: {tvc:?}");

    let template = pool.fill_block_template(300_000, 1_000_000 * COIN, HF).unwrap();
    let both = template.tx_hashes.contains(&offshore_id) && template.tx_hashes.contains(&onshore_id);
    assert!(!both, "cap of 1000 XHV cannot fit 600 burnt + 500 minted");
    assert_eq!(template.tx_hashes.len(), 1, "exactly one conversion fits under the cap");
}

#[test]
fn template_excludes_conversions_without_recent_record() {
    let (pool, _) = make_pool();
    let conv = offshore_tx(1, 100 * COIN, TIP - 2);
    let plain = transfer_tx(9, COIN / 100);
    let (ok, ..) = admit(&pool, &conv, RelayMethod::Fluff);
    assert!(ok);
    let (_, _, plain_id) = admit(&pool, &plain, RelayMethod::Fluff);

    pool.chain().clear_latest_pr();
    let template = pool.fill_block_template(300_000, 1_000_000 * COIN, HF).unwrap();
    assert_eq!(template.tx_hashes, vec![plain_id], "conversions stay out without a usable record");
}

#[test]
fn template_conversion_fees_aggregate_under_xhv_from_bp_plus() {
    let (pool, _) = make_pool();
    let conv = offshore_tx(1, 100 * COIN, TIP - 2);
    let (ok, ..) = admit(&pool, &conv, RelayMethod::Fluff);
    assert!(ok);

    let template = pool
        .fill_block_template(300_000, 1_000_000 * COIN, HfVersion::BULLETPROOF_PLUS)
        .unwrap();
    assert_eq!(template.tx_hashes.len(), 1);
    assert_eq!(
        template.conversion_fee_map.get(&Asset::Xhv).copied().unwrap_or(0),
        (100u128 * COIN as u128 * 3 / 200) as u64
    );
}

#[test]
fn template_weight_respects_weight_limit() {
    let (pool, _) = make_pool();
    for i in 0..20u8 {
        let (ok, ..) = admit(&pool, &transfer_tx(i + 1, COIN / 10), RelayMethod::Fluff);
        assert!(ok);
    }
    // a tiny median keeps most of the pool out
    let tx_weight = serialize_tx(&transfer_tx(1, COIN / 10)).len() as u64;
    let reserve = haven_types::constants::COINBASE_BLOB_RESERVED_SIZE;
    let median = reserve / 2 + 2 * tx_weight;
    let template = pool.fill_block_template(median, 1_000_000 * COIN, HF).unwrap();
    assert!(template.total_weight <= 2 * median - reserve);
    assert!(template.tx_hashes.len() < 20);
}

#[test]
fn pool_weight_invariant_holds_across_operations() {
    let (pool, _) = make_pool();
    let txs: Vec<Transaction> = (0..5).map(|i| transfer_tx(i + 1, COIN / 10)).collect();
    let mut ids = Vec::new();
    let mut expected = 0u64;
    for tx in &txs {
        let (ok, _, id) = admit(&pool, tx, RelayMethod::Fluff);
        assert!(ok);
        ids.push(id);
        expected += serialize_tx(tx).len() as u64;
    }
    assert_eq!(pool.get_txpool_weight(), expected);

    let taken = pool.take_tx(&ids[0]).unwrap();
    expected -= taken.weight;
    assert_eq!(pool.get_txpool_weight(), expected);
}
