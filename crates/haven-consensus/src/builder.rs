//! User transaction construction.
//!
//! The builder owns everything consensus can observe about a constructed
//! transaction: input ordering, output shuffling, burnt/minted accounting,
//! per-output unlock times, collateral indices, fee residuals and the
//! conversion fee. Ring-signature material is produced by an injected prover
//! and one-time keys by an injected device, so hardware wallets plug in at
//! the same seam.

use crate::fees::{xhv_amount, xusd_amount};
use crate::keys::{
    generate_key_derivation, derive_public_key, keccak256, scalar_mult_base, scalar_mult_key,
};
use crate::oracle::PricingRecord;
use haven_tx::extra::{
    add_pub_key, encrypted_payment_id_from_nonce, encrypted_payment_id_nonce, nonce,
    payment_id_from_nonce, remove_field, serialize_extra, sort_extra, ExtraField, TAG_NONCE,
    TAG_ADDITIONAL_PUB_KEYS, TAG_PUB_KEY,
};
use haven_tx::types::{
    Hash, KeyImage, PublicKey, RctSignatures, Transaction, TxInput, TxOutput,
};
use haven_tx::wire::serialize_prefix;
use haven_types::constants::{
    Asset, HfVersion, PublicAddress, COLLATERAL_TRANSACTION_VERSION, DEFAULT_TX_SPENDABLE_AGE,
    HAVEN2_TX_VERSION, MAX_TX_VALUE, MIN_RCT_TX_VERSION, OFFSHORE_TX_VERSION,
    POU_TRANSACTION_VERSION, XASSET_FEES_V2_TX_VERSION,
};
use haven_types::TransactionType;
use rand::seq::SliceRandom;
use rand::RngCore;
use thiserror::Error;

const NULL_KEY: PublicKey = [0u8; 32];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("no sources provided")]
    EmptySources,
    #[error("transaction type is unset")]
    UnsetType,
    #[error("real output index {real} out of range {ring}")]
    RealIndexOutOfRange { real: usize, ring: usize },
    #[error("destinations must resolve to exactly one view key for payment ids")]
    AmbiguousPaymentId,
    #[error("wrong number of additional tx keys: {got}, need {need}")]
    AdditionalKeyCount { got: usize, need: usize },
    #[error("unsupported input asset {0} for this transaction type")]
    UnsupportedInputAsset(Asset),
    #[error("output asset {0} matches neither source nor destination")]
    StrayOutputAsset(Asset),
    #[error("per-colour value limit exceeded")]
    ValueOverflow,
    #[error("conversion would burn or mint a zero amount")]
    ZeroConversion,
    #[error("key derivation failed")]
    KeyDerivation,
}

// =============================================================================
// Inputs to the builder
// =============================================================================

/// One ring member: global output index plus its one-time key and commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingMember {
    pub global_index: u64,
    pub key: PublicKey,
    pub commitment: PublicKey,
}

/// A spendable output with its decoy ring.
#[derive(Debug, Clone)]
pub struct TxSource {
    pub ring: Vec<RingMember>,
    pub real_output: usize,
    pub real_out_tx_key: PublicKey,
    pub real_output_in_tx_index: u64,
    pub amount: u64,
    pub asset_type: Asset,
    /// Computed by the wallet's key-derivation layer before building.
    pub key_image: KeyImage,
    pub mask: [u8; 32],
    pub rct: bool,
}

/// A payment target, with the amount expressed in all three colour columns
/// the way the wallet accounts for conversions.
#[derive(Debug, Clone)]
pub struct TxDestination {
    pub amount: u64,
    pub amount_usd: u64,
    pub amount_xasset: u64,
    pub asset_type: Asset,
    pub addr: PublicAddress,
    pub is_subaddress: bool,
    pub is_collateral: bool,
}

/// Device seam: one-time output keys and payment-id encryption.
pub trait HwDevice {
    fn generate_output_ephemeral_key(
        &self,
        tx_secret_key: &[u8; 32],
        destination: &TxDestination,
        output_index: u64,
    ) -> Option<PublicKey>;

    fn encrypt_payment_id(
        &self,
        payment_id: [u8; 8],
        view_public_key: &PublicKey,
        tx_secret_key: &[u8; 32],
    ) -> Option<[u8; 8]>;
}

/// Software device: plain Edwards arithmetic.
pub struct SoftwareDevice;

impl HwDevice for SoftwareDevice {
    fn generate_output_ephemeral_key(
        &self,
        tx_secret_key: &[u8; 32],
        destination: &TxDestination,
        output_index: u64,
    ) -> Option<PublicKey> {
        let derivation =
            generate_key_derivation(&destination.addr.view_public_key, tx_secret_key)?;
        derive_public_key(&derivation, output_index, &destination.addr.spend_public_key)
    }

    fn encrypt_payment_id(
        &self,
        payment_id: [u8; 8],
        view_public_key: &PublicKey,
        tx_secret_key: &[u8; 32],
    ) -> Option<[u8; 8]> {
        let derivation = generate_key_derivation(view_public_key, tx_secret_key)?;
        let mut data = Vec::with_capacity(33);
        data.extend_from_slice(&derivation);
        data.push(0x8d);
        let mask = keccak256(&data);
        let mut out = payment_id;
        for i in 0..8 {
            out[i] ^= mask[i];
        }
        Some(out)
    }
}

/// What the external prover needs to produce the RingCT signatures.
#[derive(Debug, Clone)]
pub struct ProofContext {
    pub prefix_hash: Hash,
    pub in_amounts: Vec<u64>,
    /// (asset, amount, is_collateral) per output, pre-zeroing.
    pub out_amounts: Vec<(Asset, u64, bool)>,
    pub fee: u64,
    pub offshore_fee: u64,
    pub collateral_indices: Vec<u64>,
    pub onshore_collateral: u64,
    pub tx_version: u64,
}

/// Prover seam for the ring/commitment proofs.
pub trait RctProver {
    fn prove(&self, ctx: &ProofContext) -> RctSignatures;
}

/// Everything the builder needs besides the device and prover.
pub struct TxBuilderParams {
    pub sources: Vec<TxSource>,
    pub destinations: Vec<TxDestination>,
    pub change_addr: Option<PublicAddress>,
    pub extra: Vec<u8>,
    pub tx_type: TransactionType,
    pub source_asset: Asset,
    pub dest_asset: Asset,
    pub unlock_time: u64,
    pub tx_secret_key: [u8; 32],
    pub additional_secret_keys: Vec<[u8; 32]>,
    pub current_height: u64,
    pub pr: PricingRecord,
    pub hf_version: u8,
    pub onshore_collateral_amount: u64,
    pub shuffle_outs: bool,
}

// =============================================================================
// Wallet-side conversion fee estimates
// =============================================================================

fn tiered(amount: u64, unlock_time: u64) -> u64 {
    if unlock_time >= 5_040 {
        amount / 500
    } else if unlock_time >= 1_440 {
        amount / 20
    } else if unlock_time >= 720 {
        amount / 10
    } else {
        amount / 5
    }
}

/// Conversion fee for an offshore, over the converted (non-change,
/// non-collateral) destinations.
pub fn offshore_fee(dsts: &[TxDestination], unlock_time: u64, hf_version: u8) -> u64 {
    let amount: u64 = dsts
        .iter()
        .filter(|d| d.amount_usd != 0 && !d.is_collateral)
        .map(|d| d.amount)
        .sum();
    if hf_version >= HfVersion::USE_COLLATERAL {
        ((amount as u128 * 3) / 200) as u64
    } else if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
        amount / 200
    } else {
        tiered(amount, unlock_time)
    }
}

/// Conversion fee for an onshore.
pub fn onshore_fee(dsts: &[TxDestination], unlock_time: u64, hf_version: u8) -> u64 {
    let amount_usd: u64 = dsts
        .iter()
        .filter(|d| d.amount != 0 && !d.is_collateral)
        .map(|d| d.amount_usd)
        .sum();
    if hf_version >= HfVersion::USE_COLLATERAL {
        ((amount_usd as u128 * 3) / 200) as u64
    } else if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
        amount_usd / 200
    } else {
        tiered(amount_usd, unlock_time)
    }
}

/// Conversion fee for an xUSD -> xAsset conversion.
pub fn xusd_to_xasset_fee(dsts: &[TxDestination], hf_version: u8) -> u64 {
    let amount_usd: u128 = dsts
        .iter()
        .filter(|d| d.amount_xasset != 0)
        .map(|d| d.amount_usd as u128)
        .sum();
    if hf_version >= HfVersion::USE_COLLATERAL {
        ((amount_usd * 15) / 1_000) as u64
    } else if hf_version >= HfVersion::XASSET_FEES_V2 {
        ((amount_usd * 5) / 1_000) as u64
    } else {
        ((amount_usd * 3) / 1_000) as u64
    }
}

/// Conversion fee for an xAsset -> xUSD conversion.
pub fn xasset_to_xusd_fee(dsts: &[TxDestination], hf_version: u8) -> u64 {
    let amount_xasset: u128 = dsts
        .iter()
        .filter(|d| d.amount_usd != 0)
        .map(|d| d.amount_xasset as u128)
        .sum();
    if hf_version >= HfVersion::USE_COLLATERAL {
        ((amount_xasset * 15) / 1_000) as u64
    } else if hf_version >= HfVersion::XASSET_FEES_V2 {
        ((amount_xasset * 5) / 1_000) as u64
    } else {
        ((amount_xasset * 3) / 1_000) as u64
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Unique recipient view key for payment-id encryption, or the change view
/// key when every destination is change. `None` when ambiguous.
fn destination_view_key_pub(
    destinations: &[TxDestination],
    change_addr: &Option<PublicAddress>,
) -> Option<PublicKey> {
    let mut addr: Option<PublicAddress> = None;
    let mut found_change = false;
    for d in destinations {
        if d.amount == 0 && d.amount_usd == 0 && d.amount_xasset == 0 {
            continue;
        }
        if let Some(change) = change_addr {
            if d.addr == *change && !found_change {
                found_change = true;
                continue;
            }
        }
        if Some(d.addr) == addr {
            continue;
        }
        if addr.is_some() {
            return None;
        }
        addr = Some(d.addr);
    }
    match addr {
        Some(a) => Some(a.view_public_key),
        None => change_addr.map(|c| c.view_public_key),
    }
}

fn tx_version_for_build(hf_version: u8) -> u64 {
    if hf_version >= HfVersion::USE_COLLATERAL {
        COLLATERAL_TRANSACTION_VERSION
    } else if hf_version >= HfVersion::PER_OUTPUT_UNLOCK {
        POU_TRANSACTION_VERSION
    } else if hf_version >= HfVersion::HAVEN2 {
        HAVEN2_TX_VERSION
    } else if hf_version >= HfVersion::XASSET_FEES_V2 {
        XASSET_FEES_V2_TX_VERSION
    } else if hf_version >= HfVersion::CLSAG {
        OFFSHORE_TX_VERSION
    } else {
        MIN_RCT_TX_VERSION
    }
}

fn spend_input(
    tx_type: TransactionType,
    asset: Asset,
    amount: u64,
    key_offsets: Vec<u64>,
    key_image: KeyImage,
) -> Result<TxInput, BuilderError> {
    use TransactionType as Tt;
    Ok(match tx_type {
        Tt::OffshoreTransfer | Tt::XusdToXasset => {
            TxInput::Offshore { amount, key_offsets, key_image }
        }
        Tt::Onshore => match asset {
            Asset::Xusd => TxInput::Onshore { amount, key_offsets, key_image },
            Asset::Xhv => TxInput::ToKey { amount, key_offsets, key_image },
            other => return Err(BuilderError::UnsupportedInputAsset(other)),
        },
        Tt::XassetToXusd | Tt::XassetTransfer => TxInput::Xasset {
            amount,
            asset_type: asset.symbol().to_string(),
            key_offsets,
            key_image,
        },
        _ => TxInput::ToKey { amount, key_offsets, key_image },
    })
}

fn absolute_to_relative(offsets: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(offsets.len());
    let mut prev = 0u64;
    for (i, &o) in offsets.iter().enumerate() {
        if i == 0 {
            out.push(o);
        } else {
            out.push(o - prev);
        }
        prev = o;
    }
    out
}

/// Build a transaction per the construction contract.
pub fn construct_tx<R: RngCore>(
    params: TxBuilderParams,
    device: &dyn HwDevice,
    prover: &dyn RctProver,
    rng: &mut R,
) -> Result<Transaction, BuilderError> {
    let TxBuilderParams {
        mut sources,
        mut destinations,
        change_addr,
        extra,
        tx_type,
        source_asset,
        dest_asset,
        unlock_time,
        tx_secret_key,
        additional_secret_keys,
        current_height,
        pr,
        hf_version,
        onshore_collateral_amount,
        shuffle_outs,
    } = params;
    use TransactionType as Tt;

    if sources.is_empty() {
        return Err(BuilderError::EmptySources);
    }
    if tx_type == Tt::Unset {
        return Err(BuilderError::UnsetType);
    }

    let mut tx = Transaction::default();
    tx.prefix.version = tx_version_for_build(hf_version);
    tx.prefix.unlock_time = unlock_time;
    tx.prefix.extra = extra;
    tx.prefix.pricing_record_height = if source_asset != dest_asset { current_height } else { 0 };
    if source_asset != dest_asset && tx.prefix.version < HAVEN2_TX_VERSION {
        tx.prefix.offshore_data =
            format!("{}-{}", source_asset.symbol(), dest_asset.symbol()).into_bytes();
    }

    // Payment id: re-encrypt an existing short id, or inject a dummy when the
    // destination set is small enough to keep it unlinkable.
    if let Some(nonce_data) = nonce(&tx.prefix.extra) {
        if let Some(pid) = encrypted_payment_id_from_nonce(&nonce_data) {
            let view = destination_view_key_pub(&destinations, &change_addr)
                .filter(|v| *v != NULL_KEY)
                .ok_or(BuilderError::AmbiguousPaymentId)?;
            let encrypted = device
                .encrypt_payment_id(pid, &view, &tx_secret_key)
                .ok_or(BuilderError::KeyDerivation)?;
            let stripped =
                remove_field(&tx.prefix.extra, TAG_NONCE).map_err(|_| BuilderError::KeyDerivation)?;
            tx.prefix.extra = stripped;
            tx.prefix.extra.extend(serialize_extra(&[ExtraField::Nonce(
                encrypted_payment_id_nonce(encrypted),
            )]));
        }
        // a long plaintext id is kept as-is
        let _ = payment_id_from_nonce(&nonce_data);
    } else if destinations.len() <= 2 {
        if let Some(view) =
            destination_view_key_pub(&destinations, &change_addr).filter(|v| *v != NULL_KEY)
        {
            if let Some(dummy) = device.encrypt_payment_id([0u8; 8], &view, &tx_secret_key) {
                tx.prefix.extra.extend(serialize_extra(&[ExtraField::Nonce(
                    encrypted_payment_id_nonce(dummy),
                )]));
            }
        }
    }

    // Per-colour input sums; the XHV collateral of an onshore is kept out of
    // the XHV column so the fee residual lands in the xUSD column.
    let mut inputs_money = 0u64;
    let mut inputs_money_usd = 0u64;
    let mut inputs_money_xasset = 0u64;
    for src in &sources {
        if src.real_output >= src.ring.len() {
            return Err(BuilderError::RealIndexOutOfRange {
                real: src.real_output,
                ring: src.ring.len(),
            });
        }
        if src.asset_type == Asset::Xhv
            && (hf_version < HfVersion::USE_COLLATERAL || tx_type != Tt::Onshore)
        {
            inputs_money += src.amount;
        } else if src.asset_type == Asset::Xusd {
            inputs_money_usd += src.amount;
        } else {
            inputs_money_xasset += src.amount;
        }
    }

    // Inputs in descending key-image order, sources permuted in lock-step.
    sources.sort_by(|a, b| b.key_image.cmp(&a.key_image));
    for src in &sources {
        let absolute: Vec<u64> = src.ring.iter().map(|m| m.global_index).collect();
        let relative = absolute_to_relative(&absolute);
        tx.prefix.vin.push(spend_input(
            tx_type,
            src.asset_type,
            src.amount,
            relative,
            src.key_image,
        )?);
    }

    // Conversion fee before the destinations are shuffled.
    let fee_unlock = unlock_time.saturating_sub(current_height + 1);
    let mut conv_fee = match tx_type {
        Tt::Offshore => offshore_fee(&destinations, fee_unlock, hf_version),
        Tt::Onshore => onshore_fee(&destinations, fee_unlock, hf_version),
        Tt::XusdToXasset => xusd_to_xasset_fee(&destinations, hf_version),
        Tt::XassetToXusd => xasset_to_xusd_fee(&destinations, hf_version),
        _ => 0,
    };

    if shuffle_outs {
        destinations.shuffle(rng);
    }

    // Tx public key: s*D for a single subaddress destination, s*G otherwise.
    let mut num_stdaddresses = 0usize;
    let mut num_subaddresses = 0usize;
    let mut single_dest_subaddress: Option<PublicAddress> = None;
    let mut seen: Vec<PublicAddress> = Vec::new();
    for d in &destinations {
        if change_addr.map_or(false, |c| d.addr == c) {
            continue;
        }
        if seen.contains(&d.addr) {
            continue;
        }
        seen.push(d.addr);
        if d.is_subaddress {
            num_subaddresses += 1;
            single_dest_subaddress = Some(d.addr);
        } else {
            num_stdaddresses += 1;
        }
    }

    let txkey_pub = match single_dest_subaddress {
        Some(sub) if num_stdaddresses == 0 && num_subaddresses == 1 => {
            scalar_mult_key(&tx_secret_key, &sub.spend_public_key)
                .ok_or(BuilderError::KeyDerivation)?
        }
        _ => scalar_mult_base(&tx_secret_key),
    };
    tx.prefix.extra =
        remove_field(&tx.prefix.extra, TAG_PUB_KEY).map_err(|_| BuilderError::KeyDerivation)?;
    add_pub_key(&mut tx.prefix.extra, &txkey_pub);

    let need_additional_txkeys =
        num_subaddresses > 0 && (num_stdaddresses > 0 || num_subaddresses > 1);
    if need_additional_txkeys && additional_secret_keys.len() != destinations.len() {
        return Err(BuilderError::AdditionalKeyCount {
            got: additional_secret_keys.len(),
            need: destinations.len(),
        });
    }

    // Outputs.
    let mut outs_money = 0u64;
    let mut outs_money_usd = 0u64;
    let mut outs_money_xasset = 0u64;
    let mut out_amounts: Vec<(Asset, u64, bool)> = Vec::with_capacity(destinations.len());
    let mut additional_pub_keys: Vec<PublicKey> = Vec::new();
    let pou = hf_version >= HfVersion::PER_OUTPUT_UNLOCK;
    let converting = source_asset != dest_asset;

    if pou && converting && hf_version >= HfVersion::USE_COLLATERAL {
        tx.prefix.collateral_indices = vec![0, 0];
    }

    for (output_index, dst) in destinations.iter().enumerate() {
        let key_for_output = if need_additional_txkeys {
            let sec = &additional_secret_keys[output_index];
            let add_pub = if dst.is_subaddress {
                scalar_mult_key(sec, &dst.addr.spend_public_key)
                    .ok_or(BuilderError::KeyDerivation)?
            } else {
                scalar_mult_base(sec)
            };
            additional_pub_keys.push(add_pub);
            *sec
        } else {
            tx_secret_key
        };
        let out_key = device
            .generate_output_ephemeral_key(&key_for_output, dst, output_index as u64)
            .ok_or(BuilderError::KeyDerivation)?;

        let (out, out_amount) = match dst.asset_type {
            Asset::Xhv => (TxOutput::ToKey { amount: dst.amount, key: out_key }, dst.amount),
            Asset::Xusd => (
                TxOutput::Offshore { amount: dst.amount_usd, key: out_key },
                dst.amount_usd,
            ),
            other => (
                TxOutput::Xasset {
                    amount: dst.amount_xasset,
                    key: out_key,
                    asset_type: other.symbol().to_string(),
                },
                dst.amount_xasset,
            ),
        };
        out_amounts.push((dst.asset_type, out_amount, dst.is_collateral));

        // Per-output unlock policy for conversions: the converted leg takes
        // the full lock, change in the source asset the minimum lock, and
        // collateral legs follow the collateral rules.
        if pou && converting {
            if dst.asset_type == dest_asset {
                if hf_version >= HfVersion::USE_COLLATERAL
                    && tx_type == Tt::Onshore
                    && dst.is_collateral
                {
                    if dst.amount == onshore_collateral_amount {
                        tx.prefix.output_unlock_times.push(tx.prefix.unlock_time);
                        tx.prefix.collateral_indices[0] = output_index as u64;
                    } else {
                        tx.prefix.output_unlock_times.push(0);
                        tx.prefix.collateral_indices[1] = output_index as u64;
                    }
                } else {
                    tx.prefix.output_unlock_times.push(tx.prefix.unlock_time);
                }
            } else if dst.asset_type == source_asset {
                if hf_version >= HfVersion::USE_COLLATERAL
                    && tx_type == Tt::Offshore
                    && dst.is_collateral
                {
                    // offshore collateral merges its change, so the whole
                    // output takes the full lock
                    tx.prefix.output_unlock_times.push(tx.prefix.unlock_time);
                    tx.prefix.collateral_indices[0] = output_index as u64;
                } else {
                    tx.prefix.output_unlock_times.push(0);
                }
            } else {
                return Err(BuilderError::StrayOutputAsset(dst.asset_type));
            }
        } else if pou {
            if tx.prefix.unlock_time.saturating_sub(current_height) > DEFAULT_TX_SPENDABLE_AGE {
                tx.prefix.output_unlock_times.push(tx.prefix.unlock_time);
            } else {
                tx.prefix.output_unlock_times.push(0);
            }
        }

        tx.prefix.vout.push(out);

        // Totals; onshore collateral legs never count.
        if tx_type != Tt::Onshore || !dst.is_collateral {
            outs_money += dst.amount;
            outs_money_usd += dst.amount_usd;
            outs_money_xasset += dst.amount_xasset;
        }
        if converting && dst.asset_type == dest_asset && !dst.is_collateral {
            tx.prefix.amount_minted += out_amount;
            match tx_type {
                Tt::Offshore => tx.prefix.amount_burnt += dst.amount,
                Tt::Onshore | Tt::XusdToXasset => tx.prefix.amount_burnt += dst.amount_usd,
                Tt::XassetToXusd => tx.prefix.amount_burnt += dst.amount_xasset,
                _ => {}
            }
        }
    }

    tx.prefix.extra = remove_field(&tx.prefix.extra, TAG_ADDITIONAL_PUB_KEYS)
        .map_err(|_| BuilderError::KeyDerivation)?;
    if need_additional_txkeys {
        tx.prefix.extra.extend(serialize_extra(&[ExtraField::AdditionalPubKeys(
            additional_pub_keys,
        )]));
    }
    tx.prefix.extra = sort_extra(&tx.prefix.extra).map_err(|_| BuilderError::KeyDerivation)?;

    // Pre-collateral xAsset conversions burn 80% of the conversion fee.
    if hf_version >= HfVersion::XASSET_FEES_V2
        && hf_version < HfVersion::USE_COLLATERAL
        && matches!(tx_type, Tt::XusdToXasset | Tt::XassetToXusd)
    {
        tx.prefix.amount_burnt += (conv_fee * 4) / 5;
    }

    for money in [
        inputs_money,
        inputs_money_usd,
        inputs_money_xasset,
        outs_money,
        outs_money_usd,
        outs_money_xasset,
    ] {
        if money >= MAX_TX_VALUE {
            return Err(BuilderError::ValueOverflow);
        }
    }

    // Fee residual in whichever colour the money moved.
    let fee = if inputs_money > outs_money {
        inputs_money - outs_money - conv_fee
    } else if inputs_money_usd > outs_money_usd {
        inputs_money_usd - outs_money_usd - conv_fee
    } else if inputs_money_xasset > outs_money_xasset {
        inputs_money_xasset - outs_money_xasset - conv_fee
    } else {
        0
    };

    if converting && (tx.prefix.amount_burnt == 0 || tx.prefix.amount_minted == 0) {
        return Err(BuilderError::ZeroConversion);
    }

    // From the bulletproof-plus fork conversion fees are declared in XHV.
    if hf_version >= HfVersion::BULLETPROOF_PLUS {
        conv_fee = match tx_type {
            Tt::Onshore | Tt::XusdToXasset => {
                xhv_amount(conv_fee, &pr, Tt::Onshore, hf_version)
            }
            Tt::XassetToXusd => {
                let usd = xusd_amount(conv_fee, source_asset, &pr, Tt::XassetToXusd, hf_version);
                xhv_amount(usd, &pr, Tt::Onshore, hf_version)
            }
            _ => conv_fee,
        };
    }

    // Commit: zero the cleartext amounts.
    let in_amounts: Vec<u64> = sources.iter().map(|s| s.amount).collect();
    for (input, src) in tx.prefix.vin.iter_mut().zip(&sources) {
        if src.rct {
            match input {
                TxInput::ToKey { amount, .. }
                | TxInput::Offshore { amount, .. }
                | TxInput::Onshore { amount, .. }
                | TxInput::Xasset { amount, .. } => *amount = 0,
                TxInput::Gen { .. } => {}
            }
        }
    }
    for out in &mut tx.prefix.vout {
        out.set_amount(0);
    }

    let prefix_hash = keccak256(&serialize_prefix(&tx.prefix));
    let ctx = ProofContext {
        prefix_hash,
        in_amounts,
        out_amounts,
        fee,
        offshore_fee: conv_fee,
        collateral_indices: tx.prefix.collateral_indices.clone(),
        onshore_collateral: onshore_collateral_amount,
        tx_version: tx.prefix.version,
    };
    tx.rct_signatures = prover.prove(&ctx);

    if tx.prefix.version < HAVEN2_TX_VERSION {
        // legacy envelopes carry the fee in the source colour
        match source_asset {
            Asset::Xhv => {
                tx.rct_signatures.txn_fee = fee;
                tx.rct_signatures.txn_offshore_fee = conv_fee;
            }
            Asset::Xusd => {
                tx.rct_signatures.txn_fee_usd = fee;
                tx.rct_signatures.txn_offshore_fee_usd = conv_fee;
            }
            _ => {
                tx.rct_signatures.txn_fee_xasset = fee;
                tx.rct_signatures.txn_offshore_fee_xasset = conv_fee;
            }
        }
    } else {
        tx.rct_signatures.txn_fee = fee;
        tx.rct_signatures.txn_offshore_fee = conv_fee;
    }

    Ok(tx)
}
