//! Protocol-version gates and conversion unlock-window validation.

use crate::oracle::PricingRecord;
use haven_tx::types::{Transaction, TxOutput};
use haven_types::constants::{
    Asset, HfVersion, Network, COLLATERAL_TRANSACTION_VERSION, HAVEN2_TX_VERSION,
    OFFSHORE_UNLOCK_BLOCKS, OFFSHORE_UNLOCK_BLOCKS_TESTNET, ONSHORE_UNLOCK_BLOCKS,
    ONSHORE_UNLOCK_BLOCKS_COLLATERAL, ONSHORE_UNLOCK_BLOCKS_TESTNET, POU_TRANSACTION_VERSION,
    XASSET_FEES_V2_TX_VERSION, XASSET_UNLOCK_BLOCKS, XASSET_UNLOCK_BLOCKS_TESTNET,
};
use haven_types::TransactionType;
use thiserror::Error;

/// Chain height after which the unlock-duration computation saturates at
/// zero instead of wrapping.
pub const UNLOCK_SATURATE_HEIGHT: u64 = 973_672;

/// Minimum whole-tx unlock window before per-output unlock times existed.
pub const PRE_POU_CONVERSION_UNLOCK_BLOCKS: u64 = 180;

/// Minimum whole-tx unlock window for xAsset conversions before per-output
/// unlock times existed.
pub const PRE_POU_XASSET_UNLOCK_BLOCKS: u64 = 1_440;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction version {0} below minimum for this fork")]
    VersionTooLow(u64),
    #[error("transaction version {got} not permitted, fork requires {required}")]
    WrongVersion { required: u64, got: u64 },
    #[error("collateral output indices missing or malformed")]
    CollateralIndices,
    #[error("collateral output index {0} out of range")]
    CollateralIndexRange(u64),
    #[error("collateral output {0} is not XHV")]
    CollateralNotXhv(u64),
    #[error("output_unlock_times has {got} entries for {outputs} outputs")]
    OutputUnlockCount { got: usize, outputs: usize },
    #[error("output {index} unlock window {got} below required {required}")]
    UnlockTooShort { index: usize, required: u64, got: u64 },
    #[error("no unlock rule for transaction type {0}")]
    UnsupportedType(TransactionType),
}

/// Unlock window of a conversion in blocks, counted from the pricing-record
/// height.
///
/// Above `UNLOCK_SATURATE_HEIGHT` an unlock below the record height yields
/// zero; before that point the subtraction wraps, as the chain did.
pub fn tx_unlock_duration(tx_unlock_time: u64, tx_pr_height: u64, current_height: u64) -> u64 {
    if current_height > UNLOCK_SATURATE_HEIGHT {
        tx_unlock_time.saturating_sub(tx_pr_height)
    } else {
        tx_unlock_time.wrapping_sub(tx_pr_height)
    }
}

/// HAVEN2+ version gate: v5 minimum, with the per-output-unlock and
/// collateral forks each requiring their exact version while active.
pub fn check_version_gate(tx_version: u64, hf_version: u8) -> Result<(), ValidationError> {
    if tx_version < HAVEN2_TX_VERSION {
        return Err(ValidationError::VersionTooLow(tx_version));
    }
    if hf_version == HfVersion::PER_OUTPUT_UNLOCK && tx_version != POU_TRANSACTION_VERSION {
        return Err(ValidationError::WrongVersion {
            required: POU_TRANSACTION_VERSION,
            got: tx_version,
        });
    }
    if hf_version == HfVersion::USE_COLLATERAL && tx_version != COLLATERAL_TRANSACTION_VERSION {
        return Err(ValidationError::WrongVersion {
            required: COLLATERAL_TRANSACTION_VERSION,
            got: tx_version,
        });
    }
    Ok(())
}

/// Pre-HAVEN2 version gate.
pub fn check_version_gate_legacy(tx_version: u64, hf_version: u8) -> Result<(), ValidationError> {
    if tx_version == 0 {
        return Err(ValidationError::VersionTooLow(0));
    }
    if hf_version >= HfVersion::XASSET_FEES_V2 && tx_version < XASSET_FEES_V2_TX_VERSION {
        return Err(ValidationError::VersionTooLow(tx_version));
    }
    Ok(())
}

fn is_testnet(network: Network) -> bool {
    matches!(network, Network::Testnet | Network::Stagenet)
}

/// Required full-lock window for a converted output.
pub fn expected_unlock_blocks(
    tx_type: TransactionType,
    hf_version: u8,
    network: Network,
) -> Result<u64, ValidationError> {
    use TransactionType as Tt;
    let testnet = is_testnet(network);
    Ok(match tx_type {
        Tt::Offshore => {
            if testnet { OFFSHORE_UNLOCK_BLOCKS_TESTNET } else { OFFSHORE_UNLOCK_BLOCKS }
        }
        Tt::Onshore => {
            if testnet {
                ONSHORE_UNLOCK_BLOCKS_TESTNET
            } else if hf_version >= HfVersion::USE_COLLATERAL {
                ONSHORE_UNLOCK_BLOCKS_COLLATERAL
            } else {
                ONSHORE_UNLOCK_BLOCKS
            }
        }
        Tt::XusdToXasset | Tt::XassetToXusd => {
            if testnet { XASSET_UNLOCK_BLOCKS_TESTNET } else { XASSET_UNLOCK_BLOCKS }
        }
        other => return Err(ValidationError::UnsupportedType(other)),
    })
}

fn output_matches_source(output: &TxOutput, source: Asset) -> bool {
    match output {
        TxOutput::ToKey { .. } => source == Asset::Xhv,
        TxOutput::Offshore { .. } => source == Asset::Xusd,
        TxOutput::Xasset { asset_type, .. } => source.symbol() == asset_type,
    }
}

/// Per-output unlock and collateral-output validation for conversions from
/// the per-output-unlock fork onward.
pub fn validate_conversion_unlocks(
    tx: &Transaction,
    tx_type: TransactionType,
    source: Asset,
    hf_version: u8,
    network: Network,
    current_height: u64,
) -> Result<(), ValidationError> {
    use TransactionType as Tt;
    let is_shore = matches!(tx_type, Tt::Offshore | Tt::Onshore);
    let pr_height = tx.prefix.pricing_record_height;

    if hf_version >= HfVersion::USE_COLLATERAL {
        if tx.prefix.collateral_indices.len() != 2 {
            return Err(ValidationError::CollateralIndices);
        }
        for &idx in &tx.prefix.collateral_indices {
            if idx >= tx.prefix.vout.len() as u64 {
                return Err(ValidationError::CollateralIndexRange(idx));
            }
        }

        if is_shore {
            let col0 = tx.prefix.collateral_indices[0];
            if !matches!(tx.prefix.vout[col0 as usize], TxOutput::ToKey { .. }) {
                return Err(ValidationError::CollateralNotXhv(col0));
            }
            if tx_type == Tt::Onshore {
                let col1 = tx.prefix.collateral_indices[1];
                if !matches!(tx.prefix.vout[col1 as usize], TxOutput::ToKey { .. }) {
                    return Err(ValidationError::CollateralNotXhv(col1));
                }
            }

            if tx.prefix.output_unlock_times.len() != tx.prefix.vout.len() {
                return Err(ValidationError::OutputUnlockCount {
                    got: tx.prefix.output_unlock_times.len(),
                    outputs: tx.prefix.vout.len(),
                });
            }
            let unlock = tx_unlock_duration(
                tx.prefix.output_unlock_times[col0 as usize],
                pr_height,
                current_height,
            );
            let required = if is_testnet(network) {
                ONSHORE_UNLOCK_BLOCKS_TESTNET
            } else {
                ONSHORE_UNLOCK_BLOCKS_COLLATERAL
            };
            if unlock < required {
                return Err(ValidationError::UnlockTooShort {
                    index: col0 as usize,
                    required,
                    got: unlock,
                });
            }
        }
    }

    if tx.prefix.output_unlock_times.len() != tx.prefix.vout.len() {
        return Err(ValidationError::OutputUnlockCount {
            got: tx.prefix.output_unlock_times.len(),
            outputs: tx.prefix.vout.len(),
        });
    }

    let required = expected_unlock_blocks(tx_type, hf_version, network)?;
    for (i, output) in tx.prefix.vout.iter().enumerate() {
        if is_shore && tx.prefix.collateral_indices.contains(&(i as u64)) {
            continue;
        }
        if output_matches_source(output, source) {
            continue;
        }
        let unlock = tx_unlock_duration(tx.prefix.output_unlock_times[i], pr_height, current_height);
        if unlock < required {
            return Err(ValidationError::UnlockTooShort { index: i, required, got: unlock });
        }
    }

    Ok(())
}

/// Whole-tx minimum unlock window before the per-output-unlock fork.
pub fn min_conversion_unlock_pre_pou(tx_type: TransactionType) -> u64 {
    use TransactionType as Tt;
    match tx_type {
        Tt::Offshore | Tt::Onshore => PRE_POU_CONVERSION_UNLOCK_BLOCKS,
        Tt::XusdToXasset | Tt::XassetToXusd => PRE_POU_XASSET_UNLOCK_BLOCKS,
        _ => 0,
    }
}

/// Find the block-stamped record for a conversion, honouring the hardcoded
/// height-821428 replacement on mainnet.
pub fn pricing_record_for_height(
    pr_height: u64,
    network: Network,
    lookup: impl FnOnce(u64) -> Option<PricingRecord>,
) -> Option<PricingRecord> {
    if pr_height == 821_428 && network == Network::Mainnet {
        return Some(PricingRecord::for_height_821428());
    }
    lookup(pr_height)
}
