//! Pool entry metadata, relay states, and the fee-density ordering.

use haven_tx::types::{Hash, NULL_HASH};
use haven_types::constants::Asset;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sentinel for "never relayed": the first relay scheduler decides timing.
pub const NEVER_RELAYED: u64 = u64::MAX;

// =============================================================================
// Relay Methods & Categories
// =============================================================================

/// How a transaction reached (or should leave) this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelayMethod {
    /// Received but not yet published anywhere.
    None,
    /// Originated locally, not yet relayed.
    Local,
    /// Dandelion++ anonymity phase.
    Stem,
    /// Network-wide broadcast.
    Fluff,
    /// Observed in a block (re-org path).
    Block,
}

impl Default for RelayMethod {
    fn default() -> Self {
        RelayMethod::None
    }
}

/// Visibility filter for pool queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCategory {
    /// Everything, including unpublished entries.
    All,
    /// Entries that still need relaying.
    Relayable,
    /// Entries visible to pre-Dandelion++ peers.
    Legacy,
    /// Entries already broadcast network-wide.
    Broadcasted,
}

// =============================================================================
// Metadata
// =============================================================================

/// Everything the pool persists per transaction besides the blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPoolMeta {
    pub weight: u64,
    pub fee: u64,
    pub conversion_fee: u64,
    pub fee_asset: Option<Asset>,
    pub max_used_block_height: u64,
    pub max_used_block_id: Hash,
    pub last_failed_height: u64,
    pub last_failed_id: Hash,
    pub receive_time: u64,
    pub last_relayed_time: u64,
    pub kept_by_block: bool,
    pub relayed: bool,
    pub do_not_relay: bool,
    pub double_spend_seen: bool,
    pub pruned: bool,
    pub dandelionpp_stem: bool,
    pub is_local: bool,
    pub(crate) relay_method: RelayMethod,
}

impl TxPoolMeta {
    pub fn get_relay_method(&self) -> RelayMethod {
        self.relay_method
    }

    /// Set the relay method and keep the derived flags in sync.
    pub fn set_relay_method(&mut self, method: RelayMethod) {
        self.relay_method = method;
        self.kept_by_block = method == RelayMethod::Block;
        self.dandelionpp_stem = method == RelayMethod::Stem;
        self.is_local = method == RelayMethod::Local;
    }

    /// Upgrade the relay method; states only move forward through the
    /// lattice none < local < stem < fluff < block. Returns whether the
    /// state changed.
    pub fn upgrade_relay_method(&mut self, method: RelayMethod) -> bool {
        if method > self.relay_method {
            self.set_relay_method(method);
            true
        } else {
            false
        }
    }

    /// Does this entry fall into a query category?
    pub fn matches(&self, category: RelayCategory) -> bool {
        match category {
            RelayCategory::All => true,
            RelayCategory::Broadcasted | RelayCategory::Legacy => matches!(
                self.relay_method,
                RelayMethod::Fluff | RelayMethod::Block
            ),
            RelayCategory::Relayable => matches!(
                self.relay_method,
                RelayMethod::Local | RelayMethod::Stem | RelayMethod::Fluff
            ),
        }
    }
}

// =============================================================================
// Fee Ordering
// =============================================================================

/// Key of the fee-density order.
///
/// Entries sort by descending fee-per-weight, resolved by exact u128
/// cross-multiplication rather than a floating quotient; ties break by
/// ascending receive time and finally by id for a total order. Forward
/// iteration of a `BTreeSet<FeeOrderKey>` therefore yields best-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeOrderKey {
    /// Fee normalized to XHV where a pricing record allowed it.
    pub fee_xhv: u64,
    pub weight: u64,
    pub receive_time: u64,
    pub id: Hash,
}

impl FeeOrderKey {
    fn density_cmp(&self, other: &Self) -> Ordering {
        let lhs = self.fee_xhv as u128 * other.weight.max(1) as u128;
        let rhs = other.fee_xhv as u128 * self.weight.max(1) as u128;
        // higher density sorts first
        rhs.cmp(&lhs)
    }
}

impl Ord for FeeOrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.density_cmp(other)
            .then_with(|| self.receive_time.cmp(&other.receive_time))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for FeeOrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for FeeOrderKey {
    fn default() -> Self {
        Self { fee_xhv: 0, weight: 1, receive_time: 0, id: NULL_HASH }
    }
}
