//! Transaction model for the Haven chain: the input/output tagged unions,
//! the binary codec, tx-extra handling and asset-flow classification.

pub mod classify;
pub mod extra;
pub mod types;
pub mod wire;

pub use classify::{classify, tx_asset_types, tx_type_for, ClassifyError};
pub use types::{Hash, KeyImage, PublicKey, RctSignatures, Transaction, TxInput, TxOutput, TxPrefix, NULL_HASH};
pub use wire::{hash_blob, parse_prefix, parse_tx, serialize_prefix, serialize_tx, tx_hash, WireError};
