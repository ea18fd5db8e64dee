//! Binary transaction codec: varint-based, versioned by the prefix version.
//!
//! Field presence follows the transaction version: the conversion fields
//! appear from v3, per-output unlock times from v6, collateral indices from
//! v7, and the legacy per-colour fee fields only on v3/v4 envelopes.

use crate::types::{
    rct_type, Hash, RctSignatures, Transaction, TxInput, TxOutput, TxPrefix,
};
use haven_types::constants::{
    COLLATERAL_TRANSACTION_VERSION, HAVEN2_TX_VERSION, OFFSHORE_TX_VERSION,
    POU_TRANSACTION_VERSION,
};
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

const TAG_IN_GEN: u8 = 0xff;
const TAG_IN_TO_KEY: u8 = 0x02;
const TAG_IN_OFFSHORE: u8 = 0x03;
const TAG_IN_ONSHORE: u8 = 0x04;
const TAG_IN_XASSET: u8 = 0x05;

const TAG_OUT_TO_KEY: u8 = 0x02;
const TAG_OUT_OFFSHORE: u8 = 0x03;
const TAG_OUT_XASSET: u8 = 0x04;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of blob")]
    Eof,
    #[error("varint too long")]
    VarintOverflow,
    #[error("unknown input tag {0:#x}")]
    BadInputTag(u8),
    #[error("unknown output tag {0:#x}")]
    BadOutputTag(u8),
    #[error("invalid utf-8 asset tag")]
    BadAssetTag,
    #[error("trailing bytes after transaction")]
    TrailingBytes,
}

// =============================================================================
// Primitives
// =============================================================================

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn write_string(buf: &mut Vec<u8>, s: &[u8]) {
    write_varint(buf, s.len() as u64);
    buf.extend_from_slice(s);
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_byte(&mut self) -> Result<u8, WireError> {
        let b = *self.data.get(self.pos).ok_or(WireError::Eof)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(count).ok_or(WireError::Eof)?;
        if end > self.data.len() {
            return Err(WireError::Eof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_varint(&mut self) -> Result<u64, WireError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            if shift >= 64 {
                return Err(WireError::VarintOverflow);
            }
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_key(&mut self) -> Result<[u8; 32], WireError> {
        let mut key = [0u8; 32];
        key.copy_from_slice(self.read_bytes(32)?);
        Ok(key)
    }

    fn read_string(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_varint()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    fn done(&self) -> bool {
        self.pos == self.data.len()
    }
}

// =============================================================================
// Serialize
// =============================================================================

fn write_input(buf: &mut Vec<u8>, input: &TxInput) {
    match input {
        TxInput::Gen { height } => {
            buf.push(TAG_IN_GEN);
            write_varint(buf, *height);
        }
        TxInput::ToKey { amount, key_offsets, key_image } => {
            buf.push(TAG_IN_TO_KEY);
            write_spend(buf, *amount, None, key_offsets, key_image);
        }
        TxInput::Offshore { amount, key_offsets, key_image } => {
            buf.push(TAG_IN_OFFSHORE);
            write_spend(buf, *amount, None, key_offsets, key_image);
        }
        TxInput::Onshore { amount, key_offsets, key_image } => {
            buf.push(TAG_IN_ONSHORE);
            write_spend(buf, *amount, None, key_offsets, key_image);
        }
        TxInput::Xasset { amount, asset_type, key_offsets, key_image } => {
            buf.push(TAG_IN_XASSET);
            write_spend(buf, *amount, Some(asset_type), key_offsets, key_image);
        }
    }
}

fn write_spend(
    buf: &mut Vec<u8>,
    amount: u64,
    asset_type: Option<&str>,
    key_offsets: &[u64],
    key_image: &[u8; 32],
) {
    write_varint(buf, amount);
    if let Some(asset) = asset_type {
        write_string(buf, asset.as_bytes());
    }
    write_varint(buf, key_offsets.len() as u64);
    for &offset in key_offsets {
        write_varint(buf, offset);
    }
    buf.extend_from_slice(key_image);
}

fn write_output(buf: &mut Vec<u8>, output: &TxOutput) {
    write_varint(buf, output.amount());
    match output {
        TxOutput::ToKey { key, .. } => {
            buf.push(TAG_OUT_TO_KEY);
            buf.extend_from_slice(key);
        }
        TxOutput::Offshore { key, .. } => {
            buf.push(TAG_OUT_OFFSHORE);
            buf.extend_from_slice(key);
        }
        TxOutput::Xasset { key, asset_type, .. } => {
            buf.push(TAG_OUT_XASSET);
            buf.extend_from_slice(key);
            write_string(buf, asset_type.as_bytes());
        }
    }
}

/// Serialize the prefix alone.
pub fn serialize_prefix(prefix: &TxPrefix) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1024);
    write_varint(&mut buf, prefix.version);
    write_varint(&mut buf, prefix.unlock_time);
    write_varint(&mut buf, prefix.vin.len() as u64);
    for input in &prefix.vin {
        write_input(&mut buf, input);
    }
    write_varint(&mut buf, prefix.vout.len() as u64);
    for output in &prefix.vout {
        write_output(&mut buf, output);
    }
    write_string(&mut buf, &prefix.extra);

    if prefix.version >= OFFSHORE_TX_VERSION {
        write_varint(&mut buf, prefix.pricing_record_height);
        write_string(&mut buf, &prefix.offshore_data);
        write_varint(&mut buf, prefix.amount_burnt);
        write_varint(&mut buf, prefix.amount_minted);
    }
    if prefix.version >= POU_TRANSACTION_VERSION {
        write_varint(&mut buf, prefix.output_unlock_times.len() as u64);
        for &t in &prefix.output_unlock_times {
            write_varint(&mut buf, t);
        }
    }
    if prefix.version >= COLLATERAL_TRANSACTION_VERSION {
        write_varint(&mut buf, prefix.collateral_indices.len() as u64);
        for &idx in &prefix.collateral_indices {
            write_varint(&mut buf, idx);
        }
    }
    buf
}

/// Serialize the full transaction.
pub fn serialize_tx(tx: &Transaction) -> Vec<u8> {
    let mut buf = serialize_prefix(&tx.prefix);
    let rct = &tx.rct_signatures;
    buf.push(rct.rct_type);
    if rct.rct_type != rct_type::NULL {
        write_varint(&mut buf, rct.txn_fee);
        write_varint(&mut buf, rct.txn_offshore_fee);
        if tx.prefix.version >= OFFSHORE_TX_VERSION && tx.prefix.version < HAVEN2_TX_VERSION {
            write_varint(&mut buf, rct.txn_fee_usd);
            write_varint(&mut buf, rct.txn_fee_xasset);
            write_varint(&mut buf, rct.txn_offshore_fee_usd);
            write_varint(&mut buf, rct.txn_offshore_fee_xasset);
        }
        write_varint(&mut buf, rct.out_pk.len() as u64);
        for key in &rct.out_pk {
            buf.extend_from_slice(key);
        }
    }
    buf
}

// =============================================================================
// Parse
// =============================================================================

fn read_input(c: &mut Cursor) -> Result<TxInput, WireError> {
    let tag = c.read_byte()?;
    match tag {
        TAG_IN_GEN => Ok(TxInput::Gen { height: c.read_varint()? }),
        TAG_IN_TO_KEY | TAG_IN_OFFSHORE | TAG_IN_ONSHORE => {
            let amount = c.read_varint()?;
            let (key_offsets, key_image) = read_spend_tail(c)?;
            Ok(match tag {
                TAG_IN_TO_KEY => TxInput::ToKey { amount, key_offsets, key_image },
                TAG_IN_OFFSHORE => TxInput::Offshore { amount, key_offsets, key_image },
                _ => TxInput::Onshore { amount, key_offsets, key_image },
            })
        }
        TAG_IN_XASSET => {
            let amount = c.read_varint()?;
            let asset = String::from_utf8(c.read_string()?).map_err(|_| WireError::BadAssetTag)?;
            let (key_offsets, key_image) = read_spend_tail(c)?;
            Ok(TxInput::Xasset { amount, asset_type: asset, key_offsets, key_image })
        }
        other => Err(WireError::BadInputTag(other)),
    }
}

fn read_spend_tail(c: &mut Cursor) -> Result<(Vec<u64>, [u8; 32]), WireError> {
    let count = c.read_varint()? as usize;
    let mut key_offsets = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        key_offsets.push(c.read_varint()?);
    }
    Ok((key_offsets, c.read_key()?))
}

fn read_output(c: &mut Cursor) -> Result<TxOutput, WireError> {
    let amount = c.read_varint()?;
    let tag = c.read_byte()?;
    match tag {
        TAG_OUT_TO_KEY => Ok(TxOutput::ToKey { amount, key: c.read_key()? }),
        TAG_OUT_OFFSHORE => Ok(TxOutput::Offshore { amount, key: c.read_key()? }),
        TAG_OUT_XASSET => {
            let key = c.read_key()?;
            let asset = String::from_utf8(c.read_string()?).map_err(|_| WireError::BadAssetTag)?;
            Ok(TxOutput::Xasset { amount, key, asset_type: asset })
        }
        other => Err(WireError::BadOutputTag(other)),
    }
}

fn parse_prefix_inner(c: &mut Cursor) -> Result<TxPrefix, WireError> {
    let mut prefix = TxPrefix {
        version: c.read_varint()?,
        unlock_time: c.read_varint()?,
        ..TxPrefix::default()
    };

    let vin_count = c.read_varint()? as usize;
    for _ in 0..vin_count {
        prefix.vin.push(read_input(c)?);
    }
    let vout_count = c.read_varint()? as usize;
    for _ in 0..vout_count {
        prefix.vout.push(read_output(c)?);
    }
    prefix.extra = c.read_string()?;

    if prefix.version >= OFFSHORE_TX_VERSION {
        prefix.pricing_record_height = c.read_varint()?;
        prefix.offshore_data = c.read_string()?;
        prefix.amount_burnt = c.read_varint()?;
        prefix.amount_minted = c.read_varint()?;
    }
    if prefix.version >= POU_TRANSACTION_VERSION {
        let count = c.read_varint()? as usize;
        for _ in 0..count {
            prefix.output_unlock_times.push(c.read_varint()?);
        }
    }
    if prefix.version >= COLLATERAL_TRANSACTION_VERSION {
        let count = c.read_varint()? as usize;
        for _ in 0..count {
            prefix.collateral_indices.push(c.read_varint()?);
        }
    }
    Ok(prefix)
}

/// Parse only the prefix, ignoring any trailing signature data.
pub fn parse_prefix(blob: &[u8]) -> Result<TxPrefix, WireError> {
    let mut c = Cursor::new(blob);
    parse_prefix_inner(&mut c)
}

/// Parse a full transaction blob.
pub fn parse_tx(blob: &[u8]) -> Result<Transaction, WireError> {
    let mut c = Cursor::new(blob);
    let prefix = parse_prefix_inner(&mut c)?;
    let mut rct = RctSignatures {
        rct_type: c.read_byte()?,
        ..RctSignatures::default()
    };
    if rct.rct_type != rct_type::NULL {
        rct.txn_fee = c.read_varint()?;
        rct.txn_offshore_fee = c.read_varint()?;
        if prefix.version >= OFFSHORE_TX_VERSION && prefix.version < HAVEN2_TX_VERSION {
            rct.txn_fee_usd = c.read_varint()?;
            rct.txn_fee_xasset = c.read_varint()?;
            rct.txn_offshore_fee_usd = c.read_varint()?;
            rct.txn_offshore_fee_xasset = c.read_varint()?;
        }
        let count = c.read_varint()? as usize;
        for _ in 0..count {
            rct.out_pk.push(c.read_key()?);
        }
    }
    if !c.done() {
        return Err(WireError::TrailingBytes);
    }
    Ok(Transaction { prefix, rct_signatures: rct, pruned: false })
}

// =============================================================================
// Hashing
// =============================================================================

/// Transaction id: Keccak-256 over the serialized transaction.
pub fn tx_hash(tx: &Transaction) -> Hash {
    hash_blob(&serialize_tx(tx))
}

/// Keccak-256 of an arbitrary blob.
pub fn hash_blob(blob: &[u8]) -> Hash {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(blob);
    keccak.finalize(&mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(version: u64) -> Transaction {
        Transaction {
            prefix: TxPrefix {
                version,
                unlock_time: 15_120,
                vin: vec![
                    TxInput::Onshore {
                        amount: 0,
                        key_offsets: vec![100, 20, 3],
                        key_image: [0xAA; 32],
                    },
                    TxInput::ToKey {
                        amount: 0,
                        key_offsets: vec![50, 1],
                        key_image: [0xBB; 32],
                    },
                ],
                vout: vec![
                    TxOutput::ToKey { amount: 0, key: [0x01; 32] },
                    TxOutput::Offshore { amount: 0, key: [0x02; 32] },
                    TxOutput::Xasset {
                        amount: 0,
                        key: [0x03; 32],
                        asset_type: "XBTC".into(),
                    },
                ],
                extra: vec![0x01; 33],
                pricing_record_height: 1_000,
                offshore_data: b"XUSD-XHV".to_vec(),
                amount_burnt: 55,
                amount_minted: 44,
                output_unlock_times: vec![15_120, 0, 0],
                collateral_indices: vec![0, 1],
            },
            rct_signatures: RctSignatures {
                rct_type: rct_type::BULLETPROOF_PLUS,
                txn_fee: 312,
                txn_offshore_fee: 99,
                out_pk: vec![[0x11; 32], [0x12; 32], [0x13; 32]],
                ..RctSignatures::default()
            },
            pruned: false,
        }
    }

    #[test]
    fn varint_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, 1 << 20, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let mut c = Cursor::new(&buf);
            assert_eq!(c.read_varint().unwrap(), value);
            assert!(c.done());
        }
    }

    #[test]
    fn tx_roundtrip_v7() {
        let tx = sample_tx(7);
        let blob = serialize_tx(&tx);
        assert_eq!(parse_tx(&blob).unwrap(), tx);
    }

    #[test]
    fn tx_roundtrip_legacy_fee_fields() {
        let mut tx = sample_tx(4);
        tx.prefix.output_unlock_times.clear();
        tx.prefix.collateral_indices.clear();
        tx.rct_signatures.txn_fee_usd = 17;
        tx.rct_signatures.txn_offshore_fee_usd = 23;
        let blob = serialize_tx(&tx);
        assert_eq!(parse_tx(&blob).unwrap(), tx);
    }

    #[test]
    fn prefix_parse_skips_signatures() {
        let tx = sample_tx(7);
        let blob = serialize_tx(&tx);
        let prefix = parse_prefix(&blob).unwrap();
        assert_eq!(prefix, tx.prefix);
    }

    #[test]
    fn coinbase_roundtrip() {
        let tx = Transaction {
            prefix: TxPrefix {
                version: 7,
                unlock_time: 60,
                vin: vec![TxInput::Gen { height: 1234 }],
                vout: vec![TxOutput::ToKey { amount: 30 * 1_000_000_000_000, key: [9; 32] }],
                extra: vec![],
                output_unlock_times: vec![60],
                ..TxPrefix::default()
            },
            rct_signatures: RctSignatures::default(),
            pruned: false,
        };
        let blob = serialize_tx(&tx);
        assert_eq!(parse_tx(&blob).unwrap(), tx);
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let tx = sample_tx(7);
        let h1 = tx_hash(&tx);
        let h2 = tx_hash(&tx);
        assert_eq!(h1, h2);

        let mut tx2 = tx.clone();
        tx2.prefix.amount_burnt += 1;
        assert_ne!(tx_hash(&tx2), h1);
    }

    #[test]
    fn truncated_blob_fails() {
        let blob = serialize_tx(&sample_tx(7));
        assert!(parse_tx(&blob[..blob.len() - 1]).is_err());
    }
}
