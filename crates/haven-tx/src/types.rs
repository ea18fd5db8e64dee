//! Transaction data model.
//!
//! Inputs and outputs are tagged unions with one variant per asset kind, so
//! every classification and key-image site is an exhaustive match.

use serde::{Deserialize, Serialize};

/// 32-byte transaction / block id.
pub type Hash = [u8; 32];

/// 32-byte one-time spend marker.
pub type KeyImage = [u8; 32];

/// 32-byte compressed Edwards point.
pub type PublicKey = [u8; 32];

pub const NULL_HASH: Hash = [0u8; 32];

// =============================================================================
// Inputs
// =============================================================================

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxInput {
    /// Coinbase marker; only legal in a miner transaction.
    Gen { height: u64 },
    /// Spend of an XHV output (also the collateral leg of an onshore).
    ToKey {
        amount: u64,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    /// Spend of an xUSD output in a same-asset or xUSD->xAsset context.
    Offshore {
        amount: u64,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    /// Spend of an xUSD output in an onshore conversion.
    Onshore {
        amount: u64,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    /// Spend of an xAsset output, tagged with the asset symbol.
    Xasset {
        amount: u64,
        asset_type: String,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
}

impl TxInput {
    /// Key image, if this is a spend input.
    pub fn key_image(&self) -> Option<&KeyImage> {
        match self {
            TxInput::Gen { .. } => None,
            TxInput::ToKey { key_image, .. }
            | TxInput::Offshore { key_image, .. }
            | TxInput::Onshore { key_image, .. }
            | TxInput::Xasset { key_image, .. } => Some(key_image),
        }
    }

    /// Ring size (number of referenced outputs), 0 for coinbase.
    pub fn ring_size(&self) -> usize {
        match self {
            TxInput::Gen { .. } => 0,
            TxInput::ToKey { key_offsets, .. }
            | TxInput::Offshore { key_offsets, .. }
            | TxInput::Onshore { key_offsets, .. }
            | TxInput::Xasset { key_offsets, .. } => key_offsets.len(),
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            TxInput::Gen { .. } => 0,
            TxInput::ToKey { amount, .. }
            | TxInput::Offshore { amount, .. }
            | TxInput::Onshore { amount, .. }
            | TxInput::Xasset { amount, .. } => *amount,
        }
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// Transaction output: one-time key plus asset tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutput {
    /// XHV output.
    ToKey { amount: u64, key: PublicKey },
    /// xUSD output.
    Offshore { amount: u64, key: PublicKey },
    /// xAsset output, tagged with the asset symbol.
    Xasset {
        amount: u64,
        key: PublicKey,
        asset_type: String,
    },
}

impl TxOutput {
    pub fn key(&self) -> &PublicKey {
        match self {
            TxOutput::ToKey { key, .. }
            | TxOutput::Offshore { key, .. }
            | TxOutput::Xasset { key, .. } => key,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            TxOutput::ToKey { amount, .. }
            | TxOutput::Offshore { amount, .. }
            | TxOutput::Xasset { amount, .. } => *amount,
        }
    }

    pub fn set_amount(&mut self, value: u64) {
        match self {
            TxOutput::ToKey { amount, .. }
            | TxOutput::Offshore { amount, .. }
            | TxOutput::Xasset { amount, .. } => *amount = value,
        }
    }

    /// Asset symbol of this output.
    pub fn asset_symbol(&self) -> &str {
        match self {
            TxOutput::ToKey { .. } => "XHV",
            TxOutput::Offshore { .. } => "XUSD",
            TxOutput::Xasset { asset_type, .. } => asset_type,
        }
    }
}

// =============================================================================
// RingCT Envelope
// =============================================================================

/// RingCT signature type tags.
pub mod rct_type {
    pub const NULL: u8 = 0;
    pub const CLSAG: u8 = 5;
    pub const BULLETPROOF_PLUS: u8 = 6;
    pub const HAVEN2: u8 = 7;
    pub const HAVEN3: u8 = 8;
}

/// The consensus-visible part of the RingCT signatures.
///
/// The proof material itself lives behind the external verifier; the pool
/// only reads the type tag and the fee fields. Transactions below the HAVEN2
/// fork carry separate fee fields per colour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RctSignatures {
    pub rct_type: u8,
    /// Standard per-byte fee, denominated in the source asset.
    pub txn_fee: u64,
    /// Conversion fee, denominated per the fork rules.
    pub txn_offshore_fee: u64,
    /// Legacy per-colour fee fields (pre-HAVEN2 transactions only).
    pub txn_fee_usd: u64,
    pub txn_fee_xasset: u64,
    pub txn_offshore_fee_usd: u64,
    pub txn_offshore_fee_xasset: u64,
    /// Output commitments, kept for the external proof-of-value check.
    pub out_pk: Vec<PublicKey>,
}

// =============================================================================
// Transaction
// =============================================================================

/// Transaction prefix: everything that is hashed for the txid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPrefix {
    pub version: u64,
    pub unlock_time: u64,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    pub extra: Vec<u8>,
    /// Height of the pricing record a conversion was priced against;
    /// 0 for same-asset transactions.
    pub pricing_record_height: u64,
    /// "SOURCE-DEST" marker carried by pre-HAVEN2 conversions.
    pub offshore_data: Vec<u8>,
    pub amount_burnt: u64,
    pub amount_minted: u64,
    /// One unlock height per output, from the per-output-unlock fork.
    pub output_unlock_times: Vec<u64>,
    /// Indices of the collateral output and the collateral change output,
    /// from the collateral fork.
    pub collateral_indices: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub prefix: TxPrefix,
    pub rct_signatures: RctSignatures,
    /// Set when the prunable signature data has been dropped.
    pub pruned: bool,
}

impl Transaction {
    /// Standard fee carried by this transaction.
    pub fn fee(&self) -> u64 {
        self.rct_signatures.txn_fee
    }

    /// Conversion fee carried by this transaction.
    pub fn conversion_fee(&self) -> u64 {
        self.rct_signatures.txn_offshore_fee
    }

    /// All key images, in input order.
    pub fn key_images(&self) -> Vec<KeyImage> {
        self.prefix
            .vin
            .iter()
            .filter_map(|i| i.key_image().copied())
            .collect()
    }

    /// True if any input is the coinbase marker.
    pub fn is_coinbase(&self) -> bool {
        self.prefix
            .vin
            .iter()
            .any(|i| matches!(i, TxInput::Gen { .. }))
    }

    /// Coinbase height, if this is a miner transaction.
    pub fn coinbase_height(&self) -> Option<u64> {
        self.prefix.vin.iter().find_map(|i| match i {
            TxInput::Gen { height } => Some(*height),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend_input(ki: u8) -> TxInput {
        TxInput::ToKey {
            amount: 0,
            key_offsets: vec![10, 4, 1],
            key_image: [ki; 32],
        }
    }

    #[test]
    fn input_key_images() {
        assert_eq!(spend_input(7).key_image(), Some(&[7u8; 32]));
        assert_eq!(TxInput::Gen { height: 5 }.key_image(), None);
    }

    #[test]
    fn input_ring_size() {
        assert_eq!(spend_input(1).ring_size(), 3);
        assert_eq!(TxInput::Gen { height: 5 }.ring_size(), 0);
    }

    #[test]
    fn output_asset_symbols() {
        let o1 = TxOutput::ToKey { amount: 1, key: [0; 32] };
        let o2 = TxOutput::Offshore { amount: 1, key: [0; 32] };
        let o3 = TxOutput::Xasset { amount: 1, key: [0; 32], asset_type: "XBTC".into() };
        assert_eq!(o1.asset_symbol(), "XHV");
        assert_eq!(o2.asset_symbol(), "XUSD");
        assert_eq!(o3.asset_symbol(), "XBTC");
    }

    #[test]
    fn coinbase_detection() {
        let mut tx = Transaction::default();
        assert!(!tx.is_coinbase());
        tx.prefix.vin.push(TxInput::Gen { height: 42 });
        assert!(tx.is_coinbase());
        assert_eq!(tx.coinbase_height(), Some(42));
    }

    #[test]
    fn key_image_collection() {
        let mut tx = Transaction::default();
        tx.prefix.vin.push(spend_input(1));
        tx.prefix.vin.push(TxInput::Onshore {
            amount: 0,
            key_offsets: vec![1],
            key_image: [2; 32],
        });
        assert_eq!(tx.key_images(), vec![[1u8; 32], [2u8; 32]]);
    }
}
