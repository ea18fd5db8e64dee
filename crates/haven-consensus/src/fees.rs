//! Conversion-fee, collateral and block-cap arithmetic.
//!
//! All integer arithmetic widens to u128 before multiplying. The collateral
//! and block-cap formulas intentionally pass through f64 `exp`/`sqrt`/`powf`;
//! `floor` is applied before the final re-multiplication by `COIN` so the
//! integer outputs are stable.

use crate::oracle::PricingRecord;
use haven_types::constants::{Asset, HfVersion, COIN};
use haven_types::TransactionType;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("no exchange rate for {0}")]
    MissingRate(Asset),
    #[error("bad circulating supply amount for {0}: {1}")]
    BadSupplyAmount(Asset, String),
    #[error("no collateral rule for transaction type {0}")]
    UnsupportedType(TransactionType),
}

/// Circulating supply snapshot: amount strings as reported by the database.
pub type CirculatingSupply = [(Asset, String)];

// =============================================================================
// Cross-Asset Amounts
// =============================================================================

/// Convert an amount of `asset` into xUSD under the record.
pub fn xusd_amount(
    amount: u64,
    asset: Asset,
    pr: &PricingRecord,
    tx_type: TransactionType,
    hf_version: u8,
) -> u64 {
    if asset == Asset::Xusd {
        return amount;
    }

    let amount = amount as u128;
    if asset == Asset::Xhv {
        let rate = if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
            pr.xhv_rate(tx_type) as u128
        } else {
            pr.xhv_ma as u128
        };
        ((amount * rate) / COIN as u128) as u64
    } else {
        let rate = pr.rate(asset) as u128;
        if rate == 0 {
            return 0;
        }
        ((amount * COIN as u128) / rate) as u64
    }
}

/// Convert an xUSD amount into XHV under the record.
pub fn xhv_amount(
    xusd: u64,
    pr: &PricingRecord,
    tx_type: TransactionType,
    hf_version: u8,
) -> u64 {
    let rate = if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
        pr.xhv_rate(tx_type) as u128
    } else {
        pr.xhv_ma as u128
    };
    if rate == 0 {
        return 0;
    }
    ((xusd as u128 * COIN as u128) / rate) as u64
}

/// Convert an xUSD amount into `to_asset` units under the record.
pub fn xasset_amount(xusd: u64, to_asset: Asset, pr: &PricingRecord) -> u64 {
    ((xusd as u128 * pr.rate(to_asset) as u128) / COIN as u128) as u64
}

/// Normalize a fee paid in `fee_asset` to XHV for ordering and reward
/// accounting. Falls back to the raw amount when the record has the needed
/// rate disabled.
pub fn xhv_fee_amount(
    fee_asset: Asset,
    fee_amount: u64,
    tx_type: TransactionType,
    pr: &PricingRecord,
    hf_version: u8,
) -> u64 {
    if fee_asset != Asset::Xhv
        && (pr.xhv_ma == 0 || pr.xhv_spot == 0 || pr.rate(fee_asset) == 0)
    {
        return fee_amount;
    }

    match fee_asset {
        Asset::Xhv => fee_amount,
        Asset::Xusd => xhv_amount(fee_amount, pr, tx_type, hf_version),
        other => {
            let usd = xusd_amount(fee_amount, other, pr, tx_type, hf_version);
            xhv_amount(usd, pr, tx_type, hf_version)
        }
    }
}

// =============================================================================
// Conversion Fees
// =============================================================================

/// Priority tier derived from the unlock window (legacy fee schedule).
pub fn unlock_priority(unlock_time: u64) -> u64 {
    if unlock_time >= 5_040 {
        1
    } else if unlock_time >= 1_440 {
        2
    } else if unlock_time >= 720 {
        3
    } else {
        4
    }
}

fn priority_fee(amount_burnt: u64, priority: u64) -> u64 {
    match priority {
        1 => amount_burnt / 500,
        2 => amount_burnt / 20,
        3 => amount_burnt / 10,
        _ => amount_burnt / 5,
    }
}

/// Expected conversion fee on the HAVEN2+ admission path, in the units the
/// transaction must declare (source asset, normalized to XHV from the
/// bulletproof-plus fork).
pub fn expected_conversion_fee(
    tx_type: TransactionType,
    amount_burnt: u64,
    unlock_time: u64,
    hf_version: u8,
    pr: &PricingRecord,
    source: Asset,
) -> u64 {
    let burnt = amount_burnt as u128;
    let xhv_out_rate = pr.xhv_ma.max(pr.xhv_spot) as u128;
    match tx_type {
        TransactionType::Offshore => ((burnt * 3) / 200) as u64,
        TransactionType::Onshore => {
            if hf_version >= HfVersion::USE_COLLATERAL {
                let mut fee = (burnt * 3) / 200;
                if hf_version >= HfVersion::BULLETPROOF_PLUS && xhv_out_rate != 0 {
                    fee = (fee * COIN as u128) / xhv_out_rate;
                }
                fee as u64
            } else if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
                amount_burnt / 200
            } else {
                priority_fee(amount_burnt, unlock_priority(unlock_time))
            }
        }
        TransactionType::XusdToXasset => {
            if hf_version >= HfVersion::USE_COLLATERAL {
                let mut fee = (burnt * 3) / 200;
                if hf_version >= HfVersion::BULLETPROOF_PLUS && xhv_out_rate != 0 {
                    fee = (fee * COIN as u128) / xhv_out_rate;
                }
                fee as u64
            } else {
                // amount_burnt already carries the 80% burnt fee share
                ((burnt * 10) / 2_008) as u64
            }
        }
        TransactionType::XassetToXusd => {
            if hf_version >= HfVersion::USE_COLLATERAL {
                let mut fee = (burnt * 3) / 200;
                if hf_version >= HfVersion::BULLETPROOF_PLUS {
                    let src_rate = pr.rate(source) as u128;
                    if src_rate != 0 && xhv_out_rate != 0 {
                        fee = (fee * COIN as u128) / src_rate;
                        fee = (fee * COIN as u128) / xhv_out_rate;
                    }
                }
                fee as u64
            } else {
                ((burnt * 10) / 2_008) as u64
            }
        }
        _ => 0,
    }
}

/// Expected conversion fee on the legacy (pre-HAVEN2) admission path, in
/// source-asset units.
pub fn expected_conversion_fee_legacy(
    tx_type: TransactionType,
    amount_burnt: u64,
    unlock_time: u64,
    hf_version: u8,
) -> u64 {
    let burnt = amount_burnt as u128;
    match tx_type {
        TransactionType::Offshore | TransactionType::Onshore => {
            priority_fee(amount_burnt, unlock_priority(unlock_time))
        }
        TransactionType::XusdToXasset | TransactionType::XassetToXusd => {
            if hf_version >= HfVersion::XASSET_FEES_V2 {
                ((burnt * 10) / 2_008) as u64
            } else {
                ((burnt * 3) / 1_000) as u64
            }
        }
        _ => 0,
    }
}

// =============================================================================
// Collateral
// =============================================================================

fn parse_supply(supply: &CirculatingSupply) -> Result<Vec<(Asset, u128)>, FeeError> {
    supply
        .iter()
        .map(|(asset, amount)| {
            amount
                .parse::<u128>()
                .map(|v| (*asset, v))
                .map_err(|_| FeeError::BadSupplyAmount(*asset, amount.clone()))
        })
        .collect()
}

/// Market-cap inputs to the volatility-based shift.
struct McapState {
    mcap_xhv: u128,
    mcap_xassets: u128,
    ratio_mcap: f64,
    rate_mcvbs: f64,
    rate_srvbs: f64,
}

fn mcap_state(
    tx_type: TransactionType,
    pr: &PricingRecord,
    supply: &[(Asset, u128)],
) -> McapState {
    // xAsset market caps in XHV-equivalent terms
    let mut mcap_xassets: u128 = 0;
    for &(asset, amount) in supply {
        if asset == Asset::Xhv {
            continue;
        }
        let price = pr.rate(asset) as u128;
        if price == 0 {
            continue;
        }
        mcap_xassets += (amount * COIN as u128) / price;
    }

    let price_xhv = match tx_type {
        TransactionType::Offshore | TransactionType::Onshore => pr.xhv_rate(tx_type) as u128,
        _ => 0,
    };
    let xhv_supply = supply
        .iter()
        .find(|(a, _)| *a == Asset::Xhv)
        .map_or(0, |(_, v)| *v);
    let mcap_xhv = (xhv_supply * price_xhv) / COIN as u128;

    let ratio_mcap = mcap_xassets as f64 / mcap_xhv as f64;
    let ratio_spread = if ratio_mcap >= 1.0 { 0.0 } else { 1.0 - ratio_mcap };

    let rate_mcvbs = if ratio_mcap == 0.0 {
        0.0
    } else if ratio_mcap < 0.9 {
        ((ratio_mcap + ratio_mcap.sqrt()) * 2.0).exp() - 0.5
    } else {
        ratio_mcap.sqrt() * 40.0
    };
    let rate_srvbs = (1.0 + ratio_spread.sqrt()).exp() + rate_mcvbs + 1.5;

    McapState { mcap_xhv, mcap_xassets, ratio_mcap, rate_mcvbs, rate_srvbs }
}

/// XHV collateral required for a conversion of `amount` (source-asset units).
///
/// Zero for transfers and for xUSD<->xAsset conversions; offshores and
/// onshores pay the volatility-based shift times the amount.
pub fn collateral_requirements(
    tx_type: TransactionType,
    amount: u64,
    pr: &PricingRecord,
    supply: &CirculatingSupply,
) -> Result<u64, FeeError> {
    use TransactionType as Tt;

    match tx_type {
        Tt::Transfer | Tt::OffshoreTransfer | Tt::XassetTransfer
        | Tt::XusdToXasset | Tt::XassetToXusd => return Ok(0),
        Tt::Offshore | Tt::Onshore => {}
        other => return Err(FeeError::UnsupportedType(other)),
    }

    let amounts = parse_supply(supply)?;
    let state = mcap_state(tx_type, pr, &amounts);
    let price_xhv = pr.xhv_rate(tx_type) as u128;
    let amount_128 = amount as u128;

    let collateral = if tx_type == Tt::Offshore {
        let amount_usd = (amount_128 * price_xhv) / COIN as u128;
        let ratio_mcap_new = (amount_usd as f64 + state.mcap_xassets as f64)
            / (state.mcap_xhv as f64 - amount_usd as f64);
        let ratio_mcri = if state.ratio_mcap == 0.0 {
            ratio_mcap_new
        } else {
            ratio_mcap_new / state.ratio_mcap - 1.0
        }
        .abs();

        let slippage_multiplier = if ratio_mcap_new <= 0.1 { 3.0 } else { 10.0 };
        let rate_offsvbs = ratio_mcri.sqrt() * slippage_multiplier;

        let vbs = (state.rate_mcvbs + rate_offsvbs).max(1.0).floor();
        let vbs = (vbs * COIN as f64) as u64 as u128;
        (vbs * amount_128) / COIN as u128
    } else {
        let ratio_mcap_new = (state.mcap_xassets as f64 - amount_128 as f64)
            / (state.mcap_xhv as f64 + amount_128 as f64);
        let ratio_sri = if state.ratio_mcap == 0.0 {
            -ratio_mcap_new
        } else {
            (1.0 - ratio_mcap_new) / (1.0 - state.ratio_mcap) - 1.0
        }
        .max(0.0);
        let rate_onsvbs = ratio_sri.sqrt() * 3.0;

        let vbs = (state.rate_mcvbs.max(state.rate_srvbs) + rate_onsvbs)
            .max(1.0)
            .floor();
        let vbs = (vbs * COIN as f64) as u64 as u128;
        if price_xhv == 0 {
            return Err(FeeError::MissingRate(Asset::Xhv));
        }
        (vbs * amount_128) / price_xhv
    };

    Ok(collateral as u64)
}

// =============================================================================
// Block Conversion Cap
// =============================================================================

/// XHV value of offshore/onshore conversions allowed per block.
pub fn block_cap(supply: &CirculatingSupply, pr: &PricingRecord) -> u64 {
    let xhv_supply = supply
        .iter()
        .find(|(a, _)| *a == Asset::Xhv)
        .and_then(|(_, v)| v.parse::<u128>().ok())
        .map_or(0, |v| (v / COIN as u128) as u64);

    let price = pr.xhv_ma.min(pr.xhv_spot) as f64 / COIN as f64;
    let market_cap = (xhv_supply as f64 * price) as u64;

    (((market_cap as f64 * 3_000.0).powf(0.42) + (xhv_supply * 5 / 1_000) as f64)
        * COIN as f64) as u64
}
