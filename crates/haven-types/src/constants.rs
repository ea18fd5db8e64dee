//! Haven network constants, asset catalog, and type definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Network Types
// =============================================================================

/// Network type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Stagenet,
}

// =============================================================================
// Asset Catalog
// =============================================================================

/// A supported asset.
///
/// XHV is the native asset, xUSD the stable asset, everything else is a
/// synthetic xAsset pegged via the on-chain pricing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    Xhv,
    Xusd,
    Xag,
    Xau,
    Xaud,
    Xbtc,
    Xcad,
    Xchf,
    Xcny,
    Xeur,
    Xgbp,
    Xjpy,
    Xnok,
    Xnzd,
}

/// Every supported asset, in catalog order.
pub const ASSET_TYPES: [Asset; 14] = [
    Asset::Xhv,
    Asset::Xusd,
    Asset::Xag,
    Asset::Xau,
    Asset::Xaud,
    Asset::Xbtc,
    Asset::Xcad,
    Asset::Xchf,
    Asset::Xcny,
    Asset::Xeur,
    Asset::Xgbp,
    Asset::Xjpy,
    Asset::Xnok,
    Asset::Xnzd,
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported asset type: {0}")]
pub struct UnknownAsset(pub String);

impl Asset {
    /// The symbol as carried in input/output asset tags.
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Xhv => "XHV",
            Asset::Xusd => "XUSD",
            Asset::Xag => "XAG",
            Asset::Xau => "XAU",
            Asset::Xaud => "XAUD",
            Asset::Xbtc => "XBTC",
            Asset::Xcad => "XCAD",
            Asset::Xchf => "XCHF",
            Asset::Xcny => "XCNY",
            Asset::Xeur => "XEUR",
            Asset::Xgbp => "XGBP",
            Asset::Xjpy => "XJPY",
            Asset::Xnok => "XNOK",
            Asset::Xnzd => "XNZD",
        }
    }

    /// Parse an asset tag from the catalog.
    pub fn from_symbol(s: &str) -> Result<Self, UnknownAsset> {
        ASSET_TYPES
            .iter()
            .copied()
            .find(|a| a.symbol() == s)
            .ok_or_else(|| UnknownAsset(s.to_string()))
    }

    /// True for every asset other than XHV and xUSD.
    pub fn is_xasset(&self) -> bool {
        !matches!(self, Asset::Xhv | Asset::Xusd)
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// Transaction Types
// =============================================================================

/// Derived transaction type: the (source, destination) asset pair determines
/// it completely; it is never stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Unset,
    Transfer,
    OffshoreTransfer,
    XassetTransfer,
    Offshore,
    Onshore,
    XusdToXasset,
    XassetToXusd,
}

impl TransactionType {
    /// True for the three same-asset forms.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            TransactionType::Transfer
                | TransactionType::OffshoreTransfer
                | TransactionType::XassetTransfer
        )
    }

    /// True for the four cross-asset forms.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            TransactionType::Offshore
                | TransactionType::Onshore
                | TransactionType::XusdToXasset
                | TransactionType::XassetToXusd
        )
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionType::Unset => "UNSET",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::OffshoreTransfer => "OFFSHORE_TRANSFER",
            TransactionType::XassetTransfer => "XASSET_TRANSFER",
            TransactionType::Offshore => "OFFSHORE",
            TransactionType::Onshore => "ONSHORE",
            TransactionType::XusdToXasset => "XUSD_TO_XASSET",
            TransactionType::XassetToXusd => "XASSET_TO_XUSD",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Transaction Versions
// =============================================================================

/// First transaction version with RingCT.
pub const MIN_RCT_TX_VERSION: u64 = 2;

/// Transaction version introduced with full offshore support.
pub const OFFSHORE_TX_VERSION: u64 = 3;

/// Transaction version from the xasset-fees-v2 fork.
pub const XASSET_FEES_V2_TX_VERSION: u64 = 4;

/// Transaction version from the HAVEN2 fork.
pub const HAVEN2_TX_VERSION: u64 = 5;

/// Transaction version carrying per-output unlock times.
pub const POU_TRANSACTION_VERSION: u64 = 6;

/// Transaction version carrying collateral output indices.
pub const COLLATERAL_TRANSACTION_VERSION: u64 = 7;

// =============================================================================
// Hard Fork Versions
// =============================================================================

/// Hard fork version constants for feature gating.
pub struct HfVersion;

impl HfVersion {
    pub const PER_BYTE_FEE: u8 = 8;
    pub const OFFSHORE_PRICING: u8 = 12;
    pub const OFFSHORE_FULL: u8 = 13;
    pub const CLSAG: u8 = 14;
    pub const XASSET_FULL: u8 = 16;
    pub const XASSET_FEES_V2: u8 = 17;
    pub const HAVEN2: u8 = 18;
    pub const PER_OUTPUT_UNLOCK: u8 = 19;
    pub const USE_COLLATERAL: u8 = 20;
    pub const BULLETPROOF_PLUS: u8 = 21;
}

/// Required transaction version for a hard fork version.
pub fn tx_version_for_hf(hf_version: u8) -> u64 {
    if hf_version >= HfVersion::USE_COLLATERAL {
        COLLATERAL_TRANSACTION_VERSION
    } else if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
        POU_TRANSACTION_VERSION
    } else if hf_version >= HfVersion::HAVEN2 {
        HAVEN2_TX_VERSION
    } else if hf_version >= HfVersion::XASSET_FEES_V2 {
        XASSET_FEES_V2_TX_VERSION
    } else if hf_version >= HfVersion::OFFSHORE_FULL {
        OFFSHORE_TX_VERSION
    } else {
        MIN_RCT_TX_VERSION
    }
}

// =============================================================================
// Core Constants
// =============================================================================

/// Atomic units per coin (10^12).
pub const COIN: u64 = 1_000_000_000_000;

/// Number of decimal places for display.
pub const DISPLAY_DECIMAL_POINT: u32 = 12;

/// Unlock times below this sentinel are block heights, above it wallclock
/// timestamps. Timestamp unlocks are rejected on admission.
pub const MAX_BLOCK_NUMBER: u64 = 500_000_000;

/// Coinbase maturity window (blocks).
pub const MINED_MONEY_UNLOCK_WINDOW: u64 = 60;

/// Default minimum age before an output is spendable (blocks).
pub const DEFAULT_TX_SPENDABLE_AGE: u64 = 10;

/// Reserved size for the coinbase blob in a block template.
pub const COINBASE_BLOB_RESERVED_SIZE: u64 = 600;

/// Upper bound on the value moved per colour in a single transaction.
pub const MAX_TX_VALUE: u64 = 15_000_000 * COIN;

/// Target block time (seconds).
pub const DIFFICULTY_TARGET: u64 = 120;

/// Emission speed factor per minute.
pub const EMISSION_SPEED_FACTOR_PER_MINUTE: u32 = 20;

/// Tail emission per minute.
pub const FINAL_SUBSIDY_PER_MINUTE: u64 = 300_000_000_000;

/// Full reward zone v1 (bytes).
pub const BLOCK_GRANTED_FULL_REWARD_ZONE_V1: u64 = 20_000;

/// Full reward zone v2 (bytes).
pub const BLOCK_GRANTED_FULL_REWARD_ZONE_V2: u64 = 60_000;

/// Full reward zone v5 (bytes).
pub const BLOCK_GRANTED_FULL_REWARD_ZONE_V5: u64 = 300_000;

// Mempool
/// Pool lifetime for a normally relayed transaction (3 days, seconds).
pub const MEMPOOL_TX_LIVETIME: u64 = 86_400 * 3;

/// Pool lifetime for a transaction seen in an alternative block (1 week).
pub const MEMPOOL_TX_FROM_ALT_BLOCK_LIVETIME: u64 = 604_800;

/// Default maximum pool weight (bytes).
pub const DEFAULT_TXPOOL_MAX_WEIGHT: u64 = 648_000_000;

/// Mean of the Dandelion++ embargo timer (seconds).
pub const DANDELIONPP_EMBARGO_AVERAGE: u64 = 173;

// Pricing records
/// A conversion may reference a pricing record at most this many blocks back.
pub const PRICING_RECORD_VALID_BLOCKS: u64 = 10;

// Conversion unlock windows (blocks, 2 minute target)
/// Offshore full-lock window (21 days).
pub const OFFSHORE_UNLOCK_BLOCKS: u64 = 21 * 720;

/// Offshore full-lock window on testnet/stagenet.
pub const OFFSHORE_UNLOCK_BLOCKS_TESTNET: u64 = 60;

/// Onshore full-lock window before the collateral fork (12 hours).
pub const ONSHORE_UNLOCK_BLOCKS: u64 = 360;

/// Onshore full-lock window from the collateral fork (21 days).
pub const ONSHORE_UNLOCK_BLOCKS_COLLATERAL: u64 = 21 * 720;

/// Onshore full-lock window on testnet/stagenet.
pub const ONSHORE_UNLOCK_BLOCKS_TESTNET: u64 = 30;

/// xUSD <-> xAsset full-lock window (2 days).
pub const XASSET_UNLOCK_BLOCKS: u64 = 1_440;

/// xUSD <-> xAsset full-lock window on testnet/stagenet.
pub const XASSET_UNLOCK_BLOCKS_TESTNET: u64 = 60;

// =============================================================================
// Addresses
// =============================================================================

/// A parsed account address: the (spend, view) public key pair.
///
/// Base58 parsing lives outside this workspace; consensus code only ever
/// needs the decoded keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAddress {
    pub spend_public_key: [u8; 32],
    pub view_public_key: [u8; 32],
}

impl PublicAddress {
    pub const fn new(spend_public_key: [u8; 32], view_public_key: [u8; 32]) -> Self {
        Self { spend_public_key, view_public_key }
    }
}

/// A governance wallet entry: the canonical base58 form plus its parsed keys.
#[derive(Debug, Clone, Copy)]
pub struct GovernanceWallet {
    pub address: &'static str,
    pub keys: PublicAddress,
}

// =============================================================================
// Network Configuration
// =============================================================================

/// Hard fork height mapping: version -> activation height.
pub type HardForkHeights = &'static [(u8, u64)];

/// Network-specific configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: Network,
    pub genesis_nonce: u32,
    pub genesis_tx: &'static str,
    /// Governance wallet for hf versions below 4.
    pub governance_wallet: GovernanceWallet,
    /// Multisig governance wallet from hf version 4.
    pub governance_wallet_multi: GovernanceWallet,
    /// Replacement multisig governance wallet from the xasset-full fork.
    pub governance_wallet_multi_new: GovernanceWallet,
    pub hard_fork_heights: HardForkHeights,
}

// Mainnet hard fork heights
static MAINNET_HF_HEIGHTS: [(u8, u64); 10] = [
    (HfVersion::PER_BYTE_FEE, 176_000),
    (HfVersion::OFFSHORE_PRICING, 582_500),
    (HfVersion::OFFSHORE_FULL, 641_500),
    (HfVersion::CLSAG, 700_500),
    (HfVersion::XASSET_FULL, 776_500),
    (HfVersion::XASSET_FEES_V2, 859_000),
    (HfVersion::HAVEN2, 886_575),
    (HfVersion::PER_OUTPUT_UNLOCK, 927_600),
    (HfVersion::USE_COLLATERAL, 965_000),
    (HfVersion::BULLETPROOF_PLUS, 1_029_000),
];

// Testnet hard fork heights
static TESTNET_HF_HEIGHTS: [(u8, u64); 10] = [
    (HfVersion::PER_BYTE_FEE, 10),
    (HfVersion::OFFSHORE_PRICING, 30),
    (HfVersion::OFFSHORE_FULL, 50),
    (HfVersion::CLSAG, 100),
    (HfVersion::XASSET_FULL, 200),
    (HfVersion::XASSET_FEES_V2, 300),
    (HfVersion::HAVEN2, 400),
    (HfVersion::PER_OUTPUT_UNLOCK, 500),
    (HfVersion::USE_COLLATERAL, 600),
    (HfVersion::BULLETPROOF_PLUS, 700),
];

static MAINNET_GOVERNANCE: GovernanceWallet = GovernanceWallet {
    address: "hvxyC6Hz6WJDCtRh6dhKbwcetcfTRBpfnFFgDYvsLDU3BKCWgvTukmwJDcYSZ8bL46LNoZUELXqwEYDg8iyTFzZaUBsRvx7e4w",
    keys: PublicAddress::new(
        [
            0x63, 0x1e, 0x52, 0x16, 0x0f, 0xd6, 0x52, 0x4d, 0xd9, 0x6c, 0x04, 0x2f, 0x7f, 0x7b,
            0x79, 0x26, 0x30, 0x9d, 0x55, 0x4b, 0x37, 0x8f, 0xd8, 0x26, 0x1e, 0x58, 0x7e, 0x77,
            0xdd, 0x7a, 0x1f, 0xe9,
        ],
        [
            0x87, 0xa5, 0x2c, 0x81, 0xb1, 0xb7, 0xfd, 0x53, 0x60, 0xca, 0xeb, 0x07, 0x38, 0x8b,
            0x1a, 0x1b, 0x2e, 0xcf, 0x28, 0x14, 0x23, 0x65, 0x54, 0x7c, 0xb7, 0xfc, 0xfd, 0x8f,
            0xf7, 0xbe, 0xb2, 0x73,
        ],
    ),
};

static MAINNET_GOVERNANCE_MULTI: GovernanceWallet = GovernanceWallet {
    address: "hvxyE3UbWejcdgP2ZGDB8bQAh1zeSTS6FHAUVpGyFv4ZhWHbFGUvrLNuDKKdkFhJrV5j2tCfsa8tJ1z1ZXqUGTKt4wHhDzQ9Jn",
    keys: PublicAddress::new(
        [
            0xa6, 0x3b, 0xd3, 0x12, 0x87, 0x07, 0x14, 0xe4, 0x8f, 0x1e, 0x0e, 0x7d, 0x6a, 0x9e,
            0x5e, 0x31, 0x84, 0x26, 0x4c, 0xbc, 0x5a, 0x6b, 0x24, 0x9c, 0xdd, 0x2f, 0xf0, 0x91,
            0x3a, 0xd1, 0xd5, 0x2e,
        ],
        [
            0x27, 0xf5, 0x92, 0x2e, 0x63, 0xd2, 0x5e, 0x0c, 0x2f, 0x6b, 0x79, 0x9b, 0x9e, 0xe8,
            0x2b, 0x66, 0x00, 0x10, 0x73, 0x24, 0x9a, 0x7e, 0x6a, 0x3d, 0x6c, 0x0b, 0x9e, 0x44,
            0x3e, 0x21, 0x50, 0x6a,
        ],
    ),
};

static MAINNET_GOVERNANCE_MULTI_NEW: GovernanceWallet = GovernanceWallet {
    address: "hvxyF1wRHo6Xz8kHrrRnJVtMPbLFkC6mVFHCUN7u23gWkfsWDPgMRYCDTbqnxvC6fow3GCbBJMtr1yXD2NQsHKFo2GE1SSzUe4",
    keys: PublicAddress::new(
        [
            0xe1, 0xca, 0x60, 0x37, 0x22, 0x8c, 0x43, 0x2b, 0x01, 0xe9, 0xa2, 0x2e, 0x57, 0xc4,
            0xae, 0x0f, 0x2c, 0xb6, 0x18, 0x5b, 0x74, 0x34, 0xb0, 0xde, 0xb2, 0x0d, 0x66, 0x17,
            0x12, 0x55, 0x3a, 0x4c,
        ],
        [
            0x4a, 0x78, 0x56, 0xe4, 0x0e, 0xc9, 0x2b, 0x0f, 0x7a, 0x15, 0x92, 0x6e, 0xd5, 0x09,
            0x6e, 0xb6, 0x1e, 0x63, 0x0c, 0x3e, 0x47, 0x25, 0xc9, 0x2a, 0xc7, 0xd6, 0x62, 0x51,
            0x8d, 0x44, 0xee, 0x19,
        ],
    ),
};

static TESTNET_GOVERNANCE: GovernanceWallet = GovernanceWallet {
    address: "hvta9NBSQaAEkozSNUvkz81xhjYrejDqfEUzwNPnp6cLXHLLjt7W2rRkB3yQJrBc4dHT9B9dMyJ8PD9YdWy5Jyrt3NLSAEXhoC",
    keys: PublicAddress::new(
        [
            0x48, 0x64, 0x25, 0x93, 0x2c, 0x92, 0x2e, 0xe1, 0x53, 0x1f, 0x60, 0x62, 0x92, 0x0e,
            0x5f, 0x1a, 0x1b, 0x23, 0x32, 0x9e, 0x62, 0x9d, 0xd2, 0x75, 0x0e, 0x38, 0x66, 0xc8,
            0x24, 0xcf, 0x80, 0xae,
        ],
        [
            0x9d, 0x2e, 0x6e, 0xb1, 0x44, 0x37, 0x97, 0x18, 0xb8, 0x94, 0x8e, 0x81, 0x39, 0x6e,
            0xf2, 0x3e, 0x04, 0xb1, 0x5d, 0x6a, 0x87, 0x21, 0xb0, 0x72, 0x65, 0x3c, 0x38, 0x9b,
            0xda, 0x3e, 0x22, 0x94,
        ],
    ),
};

static STAGENET_GOVERNANCE: GovernanceWallet = GovernanceWallet {
    address: "hvsa8LKYFNNBcTrA3jXWcbvRee7F4wWWCSCRtSZqe22fXuDTJvDeBFAxKadScogKBy9STHBLVSBYJTuGGYCoFCJm7LHpPtgFPB",
    keys: PublicAddress::new(
        [
            0x1c, 0x00, 0x63, 0x49, 0x25, 0x6a, 0x83, 0x6e, 0x7f, 0x18, 0x54, 0x00, 0x6e, 0x91,
            0x2f, 0xc5, 0x21, 0x9b, 0x23, 0x15, 0x39, 0x91, 0x70, 0x13, 0x0c, 0xdf, 0x0e, 0x6a,
            0x2a, 0x05, 0xb4, 0x3c,
        ],
        [
            0x68, 0x4c, 0xe7, 0x9d, 0xd4, 0x1c, 0x2e, 0x76, 0x93, 0x25, 0x8f, 0xcb, 0x56, 0x4c,
            0x00, 0x19, 0xcb, 0xe1, 0x21, 0x7b, 0x14, 0x9b, 0x28, 0x80, 0xf9, 0x2e, 0xd1, 0x63,
            0xc6, 0x3e, 0x4f, 0x31,
        ],
    ),
};

pub static MAINNET_CONFIG: NetworkConfig = NetworkConfig {
    network: Network::Mainnet,
    genesis_nonce: 10_000,
    genesis_tx: "023c01ff0001ffffffffffff07028be379aa57a70fa19c0ee5765fdc3d2aae0b1034158f4963e157d9042c24fbec21013402fc7071230f1f86f33099119105a7b1f64a898526060ab871e685059c223100",
    governance_wallet: MAINNET_GOVERNANCE,
    governance_wallet_multi: MAINNET_GOVERNANCE_MULTI,
    governance_wallet_multi_new: MAINNET_GOVERNANCE_MULTI_NEW,
    hard_fork_heights: &MAINNET_HF_HEIGHTS,
};

pub static TESTNET_CONFIG: NetworkConfig = NetworkConfig {
    network: Network::Testnet,
    genesis_nonce: 10_001,
    genesis_tx: "023c01ff0001ffffffffffff07028be379aa57a70fa19c0ee5765fdc3d2aae0b1034158f4963e157d9042c24fbec21013402fc7071230f1f86f33099119105a7b1f64a898526060ab871e685059c223100",
    governance_wallet: TESTNET_GOVERNANCE,
    governance_wallet_multi: TESTNET_GOVERNANCE,
    governance_wallet_multi_new: TESTNET_GOVERNANCE,
    hard_fork_heights: &TESTNET_HF_HEIGHTS,
};

pub static STAGENET_CONFIG: NetworkConfig = NetworkConfig {
    network: Network::Stagenet,
    genesis_nonce: 10_002,
    genesis_tx: "023c01ff0001ffffffffffff07028be379aa57a70fa19c0ee5765fdc3d2aae0b1034158f4963e157d9042c24fbec21013402fc7071230f1f86f33099119105a7b1f64a898526060ab871e685059c223100",
    governance_wallet: STAGENET_GOVERNANCE,
    governance_wallet_multi: STAGENET_GOVERNANCE,
    governance_wallet_multi_new: STAGENET_GOVERNANCE,
    hard_fork_heights: &TESTNET_HF_HEIGHTS,
};

/// Get the network configuration for a given network.
pub fn network_config(network: Network) -> &'static NetworkConfig {
    match network {
        Network::Mainnet => &MAINNET_CONFIG,
        Network::Testnet => &TESTNET_CONFIG,
        Network::Stagenet => &STAGENET_CONFIG,
    }
}

/// Governance wallet in effect for a hard fork version.
pub fn governance_wallet(hf_version: u8, network: Network) -> &'static GovernanceWallet {
    let config = network_config(network);
    if hf_version >= HfVersion::XASSET_FULL {
        &config.governance_wallet_multi_new
    } else if hf_version >= 4 {
        &config.governance_wallet_multi
    } else {
        &config.governance_wallet
    }
}

// =============================================================================
// Amount Helpers
// =============================================================================

/// Format an atomic amount as a human-readable string (e.g. 1.5).
pub fn format_amount(atomic: u64) -> String {
    let whole = atomic / COIN;
    let frac = atomic % COIN;
    if frac == 0 {
        format!("{}.0", whole)
    } else {
        let frac_str = format!("{:012}", frac);
        let trimmed = frac_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}

/// Parse a human-readable amount string to atomic units.
pub fn parse_amount(s: &str) -> Option<u64> {
    let s = s.trim();
    let (whole_str, frac_str) = match s.find('.') {
        Some(dot) => (&s[..dot], &s[dot + 1..]),
        None => (s, ""),
    };

    let whole: u64 = whole_str.parse().ok()?;
    let frac: u64 = if frac_str.is_empty() {
        0
    } else {
        if frac_str.len() > DISPLAY_DECIMAL_POINT as usize {
            return None;
        }
        let padded = format!("{:0<12}", frac_str);
        padded.parse().ok()?
    };

    whole.checked_mul(COIN)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_symbol_roundtrip() {
        for asset in ASSET_TYPES {
            assert_eq!(Asset::from_symbol(asset.symbol()).unwrap(), asset);
        }
        assert!(Asset::from_symbol("XXXX").is_err());
        assert!(Asset::from_symbol("xhv").is_err());
    }

    #[test]
    fn xasset_predicate() {
        assert!(!Asset::Xhv.is_xasset());
        assert!(!Asset::Xusd.is_xasset());
        assert!(Asset::Xbtc.is_xasset());
        assert!(Asset::Xjpy.is_xasset());
    }

    #[test]
    fn tx_type_predicates() {
        assert!(TransactionType::Transfer.is_transfer());
        assert!(TransactionType::XassetTransfer.is_transfer());
        assert!(!TransactionType::Offshore.is_transfer());
        assert!(TransactionType::Onshore.is_conversion());
        assert!(TransactionType::XusdToXasset.is_conversion());
        assert!(!TransactionType::Unset.is_conversion());
    }

    #[test]
    fn version_gate_table() {
        assert_eq!(tx_version_for_hf(2), 2);
        assert_eq!(tx_version_for_hf(HfVersion::OFFSHORE_FULL), 3);
        assert_eq!(tx_version_for_hf(HfVersion::XASSET_FEES_V2), 4);
        assert_eq!(tx_version_for_hf(HfVersion::HAVEN2), 5);
        assert_eq!(tx_version_for_hf(HfVersion::PER_OUTPUT_UNLOCK), 6);
        assert_eq!(tx_version_for_hf(HfVersion::USE_COLLATERAL), 7);
        assert_eq!(tx_version_for_hf(HfVersion::BULLETPROOF_PLUS), 7);
    }

    #[test]
    fn governance_wallet_selection() {
        let early = governance_wallet(3, Network::Mainnet);
        let multi = governance_wallet(HfVersion::OFFSHORE_FULL, Network::Mainnet);
        let multi_new = governance_wallet(HfVersion::XASSET_FULL, Network::Mainnet);
        assert_eq!(early.address, MAINNET_GOVERNANCE.address);
        assert_eq!(multi.address, MAINNET_GOVERNANCE_MULTI.address);
        assert_eq!(multi_new.address, MAINNET_GOVERNANCE_MULTI_NEW.address);
        assert_ne!(multi.address, multi_new.address);
    }

    #[test]
    fn amount_format() {
        assert_eq!(format_amount(0), "0.0");
        assert_eq!(format_amount(COIN), "1.0");
        assert_eq!(format_amount(COIN + COIN / 2), "1.5");
        assert_eq!(format_amount(1), "0.000000000001");
    }

    #[test]
    fn amount_parse() {
        assert_eq!(parse_amount("0"), Some(0));
        assert_eq!(parse_amount("1.0"), Some(COIN));
        assert_eq!(parse_amount("1.5"), Some(COIN + COIN / 2));
        assert_eq!(parse_amount("100"), Some(100 * COIN));
        assert_eq!(parse_amount("0.0000000000001"), None);
    }
}
