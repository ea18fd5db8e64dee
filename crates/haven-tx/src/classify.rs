//! Asset-flow classification: derive (source, destination, type) from a
//! transaction's inputs and outputs.

use crate::types::{Hash, Transaction, TxInput, TxOutput};
use haven_types::constants::{Asset, COLLATERAL_TRANSACTION_VERSION};
use haven_types::TransactionType;
use std::collections::BTreeSet;
use thiserror::Error;

/// Three transactions that exploited the XJPY->XBTC pricing bug; their
/// destination is pinned back to XJPY for replay compatibility.
pub const EXPLOIT_TXS: [&str; 3] = [
    "4c87e7245142cb33a8ed4f039b7f33d4e4dd6b541a42a55992fd88efeefc40d1",
    "7089a8faf5bddf8640a3cb41338f1ec2cdd063b1622e3b27923e2c1c31c55418",
    "ad5d15085594b8f2643f058b05931c3e60966128b4c33298206e70bdf9d41c22",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    #[error("invalid conversion from {0} to {1}")]
    InvalidConversion(Asset, Asset),
}

/// Derive the (source, destination) asset pair.
///
/// The source is the unique asset across inputs; from the collateral fork an
/// onshore may additionally spend XHV collateral, making {XHV, XUSD} legal
/// with source xUSD. The destination is the non-source output asset when two
/// are present, otherwise the source itself. Miner transactions always pay
/// out to XHV.
pub fn tx_asset_types(
    tx: &Transaction,
    txid: &Hash,
    is_miner_tx: bool,
) -> Result<(Asset, Asset), ClassifyError> {
    let mut source_assets: BTreeSet<Asset> = BTreeSet::new();
    for input in &tx.prefix.vin {
        match input {
            TxInput::Gen { .. } => {
                if !is_miner_tx {
                    return Err(ClassifyError::InvalidInput(
                        "coinbase input in non-miner transaction".into(),
                    ));
                }
                source_assets.insert(Asset::Xhv);
            }
            TxInput::ToKey { .. } => {
                source_assets.insert(Asset::Xhv);
            }
            TxInput::Offshore { .. } | TxInput::Onshore { .. } => {
                source_assets.insert(Asset::Xusd);
            }
            TxInput::Xasset { asset_type, .. } => {
                if asset_type == "XHV" || asset_type == "XUSD" {
                    return Err(ClassifyError::InvalidInput(format!(
                        "{} tagged as xasset input",
                        asset_type
                    )));
                }
                let asset = Asset::from_symbol(asset_type)
                    .map_err(|e| ClassifyError::InvalidInput(e.to_string()))?;
                source_assets.insert(asset);
            }
        }
    }

    let sat: Vec<Asset> = source_assets.iter().copied().collect();
    let source = if tx.prefix.version >= COLLATERAL_TRANSACTION_VERSION && sat.len() == 2 {
        // only an onshore with an XHV collateral input may mix assets
        if sat == [Asset::Xhv, Asset::Xusd] {
            Asset::Xusd
        } else {
            return Err(ClassifyError::InvalidInput(
                "impossible input asset combination".into(),
            ));
        }
    } else {
        if sat.len() != 1 {
            return Err(ClassifyError::InvalidInput(format!(
                "{} source asset types",
                sat.len()
            )));
        }
        sat[0]
    };

    let mut destination_assets: BTreeSet<Asset> = BTreeSet::new();
    for output in &tx.prefix.vout {
        match output {
            TxOutput::ToKey { .. } => {
                destination_assets.insert(Asset::Xhv);
            }
            TxOutput::Offshore { .. } => {
                destination_assets.insert(Asset::Xusd);
            }
            TxOutput::Xasset { asset_type, .. } => {
                if asset_type == "XHV" || asset_type == "XUSD" {
                    return Err(ClassifyError::InvalidOutput(format!(
                        "{} tagged as xasset output",
                        asset_type
                    )));
                }
                let asset = Asset::from_symbol(asset_type)
                    .map_err(|e| ClassifyError::InvalidOutput(e.to_string()))?;
                destination_assets.insert(asset);
            }
        }
    }

    let dat: Vec<Asset> = destination_assets.iter().copied().collect();
    if dat.is_empty() {
        return Err(ClassifyError::InvalidOutput(
            "no supported destination asset types".into(),
        ));
    }

    let mut destination = if is_miner_tx {
        // miner tx payouts are validated separately; the flow is XHV
        Asset::Xhv
    } else if dat.len() > 2 {
        return Err(ClassifyError::InvalidOutput(format!(
            "{} destination asset types",
            dat.len()
        )));
    } else if dat.len() == 1 {
        if sat.len() != 1 {
            return Err(ClassifyError::InvalidInput(
                "impossible input asset combination".into(),
            ));
        }
        if dat[0] != source {
            // a conversion must keep change in the source asset
            return Err(ClassifyError::InvalidOutput(format!(
                "conversion without change ({} -> {})",
                source, dat[0]
            )));
        }
        dat[0]
    } else {
        if sat.len() == 2 && dat != [Asset::Xhv, Asset::Xusd] {
            return Err(ClassifyError::InvalidInput(
                "impossible input asset combination".into(),
            ));
        }
        if dat[0] == source {
            dat[1]
        } else if dat[1] == source {
            dat[0]
        } else {
            return Err(ClassifyError::InvalidOutput(format!(
                "source asset missing from outputs ({} -> {}, {})",
                source, dat[0], dat[1]
            )));
        }
    };

    let tx_hash_hex = hex::encode(txid);
    if EXPLOIT_TXS.contains(&tx_hash_hex.as_str()) {
        destination = Asset::Xjpy;
    }

    Ok((source, destination))
}

/// Map a (source, destination) pair to a transaction type.
///
/// Total over the legal pairs; any other pair is an invalid conversion.
pub fn tx_type_for(source: Asset, destination: Asset) -> Result<TransactionType, ClassifyError> {
    if source == destination {
        Ok(match source {
            Asset::Xhv => TransactionType::Transfer,
            Asset::Xusd => TransactionType::OffshoreTransfer,
            _ => TransactionType::XassetTransfer,
        })
    } else if source == Asset::Xhv && destination == Asset::Xusd {
        Ok(TransactionType::Offshore)
    } else if source == Asset::Xusd && destination == Asset::Xhv {
        Ok(TransactionType::Onshore)
    } else if source == Asset::Xusd {
        Ok(TransactionType::XusdToXasset)
    } else if destination == Asset::Xusd {
        Ok(TransactionType::XassetToXusd)
    } else {
        Err(ClassifyError::InvalidConversion(source, destination))
    }
}

/// Full classification: (source, destination, type).
pub fn classify(
    tx: &Transaction,
    txid: &Hash,
    is_miner_tx: bool,
) -> Result<(Asset, Asset, TransactionType), ClassifyError> {
    let (source, destination) = tx_asset_types(tx, txid, is_miner_tx)?;
    let tx_type = tx_type_for(source, destination)?;
    Ok((source, destination, tx_type))
}
