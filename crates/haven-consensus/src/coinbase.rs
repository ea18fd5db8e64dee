//! Miner transaction construction and governance payout validation.
//!
//! Every block pays 5% of the base reward to a governance wallet whose
//! output keys are derived deterministically from the block height, so any
//! verifier can recompute them.

use crate::keys::{
    deterministic_keypair_from_height, generate_key_derivation, derive_public_key, scalar_mult_base,
    KeyPair,
};
use haven_tx::extra::{add_extra_nonce, add_pub_key, sort_extra};
use haven_tx::types::{PublicKey, RctSignatures, Transaction, TxInput, TxOutput};
use haven_types::consensus::block_reward;
use haven_types::constants::{
    governance_wallet, tx_version_for_hf, Asset, HfVersion, Network, PublicAddress,
    MINED_MONEY_UNLOCK_WINDOW,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Per-asset amount maps carried through block assembly.
pub type AmountMap = BTreeMap<Asset, u64>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoinbaseError {
    #[error("block is too big")]
    BlockTooBig,
    #[error("failed to derive an output key")]
    KeyDerivation,
    #[error("coinbase output sum {actual} does not match reward {expected}")]
    RewardMismatch { actual: u64, expected: u64 },
    #[error("extra field assembly failed")]
    BadExtra,
}

/// Governance share of the base reward: 5%.
pub fn governance_reward(_height: u64, base_reward: u64) -> u64 {
    base_reward / 20
}

/// One-time key for a governance output at `output_index`, derived from the
/// height-deterministic keypair against the governance wallet.
pub fn deterministic_output_key(
    address: &PublicAddress,
    gov_key: &KeyPair,
    output_index: u64,
) -> Result<PublicKey, CoinbaseError> {
    let derivation = generate_key_derivation(&address.view_public_key, &gov_key.secret)
        .ok_or(CoinbaseError::KeyDerivation)?;
    derive_public_key(&derivation, output_index, &address.spend_public_key)
        .ok_or(CoinbaseError::KeyDerivation)
}

/// Verifier side: rederive the governance output key for a claimed payout
/// and require an exact match.
pub fn validate_governance_reward_key(
    height: u64,
    hf_version: u8,
    output_index: u64,
    output_key: &PublicKey,
    network: Network,
) -> bool {
    let gov_key = deterministic_keypair_from_height(height);
    let wallet = governance_wallet(hf_version, network);
    match deterministic_output_key(&wallet.keys, &gov_key, output_index) {
        Ok(expected) => expected == *output_key,
        Err(_) => false,
    }
}

/// Inputs to miner-transaction construction.
pub struct MinerTxParams<'a> {
    pub height: u64,
    pub median_weight: u64,
    pub already_generated_coins: u64,
    pub current_block_weight: u64,
    pub fee_map: &'a AmountMap,
    pub conversion_fee_map: &'a AmountMap,
    pub xasset_fee_map: &'a AmountMap,
    pub miner_address: &'a PublicAddress,
    /// Fresh transaction secret key; sampled by the caller.
    pub tx_secret_key: [u8; 32],
    pub extra_nonce: &'a [u8],
    pub hf_version: u8,
    pub network: Network,
}

/// Assemble the miner transaction: miner payout, governance co-output, and
/// one miner/governance output pair per non-XHV asset carrying fees.
pub fn construct_miner_tx(params: &MinerTxParams) -> Result<Transaction, CoinbaseError> {
    let MinerTxParams {
        height,
        median_weight,
        already_generated_coins,
        current_block_weight,
        fee_map,
        conversion_fee_map,
        xasset_fee_map,
        miner_address,
        tx_secret_key,
        extra_nonce,
        hf_version,
        network,
    } = *params;

    let mut tx = Transaction::default();

    let tx_pub_key = scalar_mult_base(&tx_secret_key);
    add_pub_key(&mut tx.prefix.extra, &tx_pub_key);
    if !extra_nonce.is_empty() {
        add_extra_nonce(&mut tx.prefix.extra, extra_nonce).map_err(|_| CoinbaseError::BadExtra)?;
    }

    let gov_key = deterministic_keypair_from_height(height);

    let mut reward = block_reward(
        median_weight,
        current_block_weight,
        already_generated_coins,
        hf_version,
    )
    .ok_or(CoinbaseError::BlockTooBig)?;

    let pay_governance = hf_version >= 3 && already_generated_coins != 0;
    let mut governance_amount = 0u64;
    if pay_governance {
        governance_amount = governance_reward(height, reward);
        reward -= governance_amount;
    }

    let xhv_fees = fee_map.get(&Asset::Xhv).copied().unwrap_or(0);
    let block_reward_with_fees = reward + xhv_fees;

    // Miner output, index 0.
    let derivation = generate_key_derivation(&miner_address.view_public_key, &tx_secret_key)
        .ok_or(CoinbaseError::KeyDerivation)?;
    let miner_key = derive_public_key(&derivation, 0, &miner_address.spend_public_key)
        .ok_or(CoinbaseError::KeyDerivation)?;
    let mut summary_amounts = block_reward_with_fees;
    tx.prefix.vout.push(TxOutput::ToKey { amount: block_reward_with_fees, key: miner_key });

    // Governance output, index 1.
    if pay_governance {
        add_pub_key(&mut tx.prefix.extra, &gov_key.public);
        let wallet = governance_wallet(hf_version, network);
        let gov_out_key = deterministic_output_key(&wallet.keys, &gov_key, 1)?;
        let mut amount = governance_amount;
        summary_amounts += amount;
        if hf_version >= HfVersion::OFFSHORE_FULL {
            amount += conversion_fee_map.get(&Asset::Xhv).copied().unwrap_or(0);
        }
        tx.prefix.vout.push(TxOutput::ToKey { amount, key: gov_out_key });

        let expected = block_reward_with_fees + governance_amount;
        if summary_amounts != expected {
            return Err(CoinbaseError::RewardMismatch { actual: summary_amounts, expected });
        }
    }

    // One miner/governance pair per non-XHV asset carrying fees.
    if hf_version >= HfVersion::OFFSHORE_FULL {
        let wallet = governance_wallet(hf_version, network);
        let mut idx: u64 = 2;
        for (&asset, &fee) in fee_map {
            if asset == Asset::Xhv || fee == 0 {
                continue;
            }

            let mut miner_amount = fee;
            let mut governance_amount = governance_reward(height, fee);
            miner_amount -= governance_amount;

            if let Some(&conversion_fee) = conversion_fee_map.get(&asset) {
                governance_amount += conversion_fee;
            }

            if hf_version >= HfVersion::XASSET_FEES_V2 {
                if let Some(&xasset_fee) = xasset_fee_map.get(&asset) {
                    if xasset_fee != 0 {
                        if hf_version >= HfVersion::USE_COLLATERAL {
                            // 1.5% was collected: 80% to governance, 20% to the miner.
                            let fee = xasset_fee as u128;
                            governance_amount += ((fee * 4) / 5) as u64;
                            miner_amount += (fee / 5) as u64;
                        } else {
                            // 0.5% was collected: 80% is burnt, the rest split evenly.
                            let remainder = xasset_fee - (xasset_fee * 4) / 5;
                            miner_amount += remainder / 2;
                            governance_amount += remainder / 2;
                        }
                    }
                }
            }

            let miner_key = derive_public_key(&derivation, idx, &miner_address.spend_public_key)
                .ok_or(CoinbaseError::KeyDerivation)?;
            idx += 1;
            tx.prefix.vout.push(asset_output(asset, miner_amount, miner_key));

            let gov_out_key = deterministic_output_key(&wallet.keys, &gov_key, idx)?;
            idx += 1;
            tx.prefix.vout.push(asset_output(asset, governance_amount, gov_out_key));
        }
    }

    tx.prefix.version = tx_version_for_hf(hf_version);
    tx.prefix.unlock_time = height + MINED_MONEY_UNLOCK_WINDOW;
    tx.prefix.vin.push(TxInput::Gen { height });
    tx.prefix.extra = sort_extra(&tx.prefix.extra).map_err(|_| CoinbaseError::BadExtra)?;
    tx.rct_signatures = RctSignatures::default();

    if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
        let unlock = tx.prefix.unlock_time;
        tx.prefix.output_unlock_times = vec![unlock; tx.prefix.vout.len()];
    }

    debug!(
        height,
        reward = block_reward_with_fees,
        governance = governance_amount,
        outputs = tx.prefix.vout.len(),
        "constructed miner tx"
    );

    Ok(tx)
}

fn asset_output(asset: Asset, amount: u64, key: PublicKey) -> TxOutput {
    match asset {
        Asset::Xhv => TxOutput::ToKey { amount, key },
        Asset::Xusd => TxOutput::Offshore { amount, key },
        other => TxOutput::Xasset { amount, key, asset_type: other.symbol().to_string() },
    }
}
