//! Tx-extra field encoding and scanning.
//!
//! The extra blob is a sequence of tagged fields. Unknown tags make the blob
//! unparseable but transactions with such blobs are still accepted; callers
//! treat a parse failure as "no fields".

use crate::types::PublicKey;
use thiserror::Error;

pub const TAG_PADDING: u8 = 0x00;
pub const TAG_PUB_KEY: u8 = 0x01;
pub const TAG_NONCE: u8 = 0x02;
pub const TAG_ADDITIONAL_PUB_KEYS: u8 = 0x04;
pub const TAG_OFFSHORE: u8 = 0x07;
pub const TAG_MEMO: u8 = 0x08;

/// Maximum extra nonce payload.
pub const MAX_EXTRA_NONCE_SIZE: usize = 255;

/// Nonce payload markers for payment ids.
pub const NONCE_PAYMENT_ID: u8 = 0x00;
pub const NONCE_ENCRYPTED_PAYMENT_ID: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtraError {
    #[error("truncated extra field (tag {0:#x})")]
    Truncated(u8),
    #[error("extra nonce too large: {0} bytes")]
    NonceTooLarge(usize),
}

/// A parsed tx-extra field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    Padding(usize),
    PubKey(PublicKey),
    Nonce(Vec<u8>),
    AdditionalPubKeys(Vec<PublicKey>),
    Offshore(Vec<u8>),
    Memo(Vec<u8>),
}

impl ExtraField {
    fn tag(&self) -> u8 {
        match self {
            ExtraField::Padding(_) => TAG_PADDING,
            ExtraField::PubKey(_) => TAG_PUB_KEY,
            ExtraField::Nonce(_) => TAG_NONCE,
            ExtraField::AdditionalPubKeys(_) => TAG_ADDITIONAL_PUB_KEYS,
            ExtraField::Offshore(_) => TAG_OFFSHORE,
            ExtraField::Memo(_) => TAG_MEMO,
        }
    }
}

/// Parse the extra blob into fields.
pub fn parse_extra(extra: &[u8]) -> Result<Vec<ExtraField>, ExtraError> {
    let mut fields = Vec::new();
    let mut i = 0usize;
    while i < extra.len() {
        let tag = extra[i];
        i += 1;
        match tag {
            TAG_PADDING => {
                // padding runs to the end and must be all zeroes
                let run = extra.len() - i;
                if extra[i..].iter().any(|&b| b != 0) {
                    return Err(ExtraError::Truncated(TAG_PADDING));
                }
                fields.push(ExtraField::Padding(run + 1));
                break;
            }
            TAG_PUB_KEY => {
                let end = i.checked_add(32).filter(|&e| e <= extra.len())
                    .ok_or(ExtraError::Truncated(tag))?;
                let mut key = [0u8; 32];
                key.copy_from_slice(&extra[i..end]);
                fields.push(ExtraField::PubKey(key));
                i = end;
            }
            TAG_NONCE | TAG_OFFSHORE | TAG_MEMO => {
                if i >= extra.len() {
                    return Err(ExtraError::Truncated(tag));
                }
                let len = extra[i] as usize;
                i += 1;
                let end = i.checked_add(len).filter(|&e| e <= extra.len())
                    .ok_or(ExtraError::Truncated(tag))?;
                let payload = extra[i..end].to_vec();
                fields.push(match tag {
                    TAG_NONCE => ExtraField::Nonce(payload),
                    TAG_OFFSHORE => ExtraField::Offshore(payload),
                    _ => ExtraField::Memo(payload),
                });
                i = end;
            }
            TAG_ADDITIONAL_PUB_KEYS => {
                if i >= extra.len() {
                    return Err(ExtraError::Truncated(tag));
                }
                let count = extra[i] as usize;
                i += 1;
                let end = i.checked_add(count * 32).filter(|&e| e <= extra.len())
                    .ok_or(ExtraError::Truncated(tag))?;
                let mut keys = Vec::with_capacity(count);
                for chunk in extra[i..end].chunks_exact(32) {
                    let mut key = [0u8; 32];
                    key.copy_from_slice(chunk);
                    keys.push(key);
                }
                fields.push(ExtraField::AdditionalPubKeys(keys));
                i = end;
            }
            other => return Err(ExtraError::Truncated(other)),
        }
    }
    Ok(fields)
}

/// Serialize fields back into an extra blob.
pub fn serialize_extra(fields: &[ExtraField]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        match field {
            ExtraField::Padding(n) => {
                out.extend(std::iter::repeat(0u8).take(*n));
            }
            ExtraField::PubKey(key) => {
                out.push(TAG_PUB_KEY);
                out.extend_from_slice(key);
            }
            ExtraField::Nonce(data) => {
                out.push(TAG_NONCE);
                out.push(data.len() as u8);
                out.extend_from_slice(data);
            }
            ExtraField::AdditionalPubKeys(keys) => {
                out.push(TAG_ADDITIONAL_PUB_KEYS);
                out.push(keys.len() as u8);
                for key in keys {
                    out.extend_from_slice(key);
                }
            }
            ExtraField::Offshore(data) => {
                out.push(TAG_OFFSHORE);
                out.push(data.len() as u8);
                out.extend_from_slice(data);
            }
            ExtraField::Memo(data) => {
                out.push(TAG_MEMO);
                out.push(data.len() as u8);
                out.extend_from_slice(data);
            }
        }
    }
    out
}

/// Sort extra fields by tag with padding forced last, rewriting the blob.
pub fn sort_extra(extra: &[u8]) -> Result<Vec<u8>, ExtraError> {
    let mut fields = parse_extra(extra)?;
    fields.sort_by_key(|f| match f {
        ExtraField::Padding(_) => u8::MAX,
        other => other.tag(),
    });
    Ok(serialize_extra(&fields))
}

/// Append the tx public key field.
pub fn add_pub_key(extra: &mut Vec<u8>, key: &PublicKey) {
    extra.push(TAG_PUB_KEY);
    extra.extend_from_slice(key);
}

/// Append an extra nonce field.
pub fn add_extra_nonce(extra: &mut Vec<u8>, nonce: &[u8]) -> Result<(), ExtraError> {
    if nonce.len() > MAX_EXTRA_NONCE_SIZE {
        return Err(ExtraError::NonceTooLarge(nonce.len()));
    }
    extra.push(TAG_NONCE);
    extra.push(nonce.len() as u8);
    extra.extend_from_slice(nonce);
    Ok(())
}

/// Remove every field with the given tag, keeping the rest in order.
pub fn remove_field(extra: &[u8], tag: u8) -> Result<Vec<u8>, ExtraError> {
    let fields = parse_extra(extra)?;
    let kept: Vec<ExtraField> = fields.into_iter().filter(|f| f.tag() != tag).collect();
    Ok(serialize_extra(&kept))
}

/// First tx public key in the blob.
pub fn tx_pub_key(extra: &[u8]) -> Option<PublicKey> {
    parse_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::PubKey(k) => Some(k),
        _ => None,
    })
}

/// Additional per-destination public keys, if present.
pub fn additional_pub_keys(extra: &[u8]) -> Option<Vec<PublicKey>> {
    parse_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::AdditionalPubKeys(keys) => Some(keys),
        _ => None,
    })
}

/// Memo payload, if present.
pub fn memo(extra: &[u8]) -> Option<Vec<u8>> {
    parse_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::Memo(data) => Some(data),
        _ => None,
    })
}

/// Offshore data payload, if present.
pub fn offshore_data(extra: &[u8]) -> Option<Vec<u8>> {
    parse_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::Offshore(data) => Some(data),
        _ => None,
    })
}

/// Build a nonce payload carrying a short encrypted payment id.
pub fn encrypted_payment_id_nonce(payment_id: [u8; 8]) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(9);
    nonce.push(NONCE_ENCRYPTED_PAYMENT_ID);
    nonce.extend_from_slice(&payment_id);
    nonce
}

/// Extract a short encrypted payment id from a nonce payload.
pub fn encrypted_payment_id_from_nonce(nonce: &[u8]) -> Option<[u8; 8]> {
    if nonce.len() == 9 && nonce[0] == NONCE_ENCRYPTED_PAYMENT_ID {
        let mut id = [0u8; 8];
        id.copy_from_slice(&nonce[1..]);
        Some(id)
    } else {
        None
    }
}

/// Extract a long (unencrypted) payment id from a nonce payload.
pub fn payment_id_from_nonce(nonce: &[u8]) -> Option<[u8; 32]> {
    if nonce.len() == 33 && nonce[0] == NONCE_PAYMENT_ID {
        let mut id = [0u8; 32];
        id.copy_from_slice(&nonce[1..]);
        Some(id)
    } else {
        None
    }
}

/// First nonce payload in the blob.
pub fn nonce(extra: &[u8]) -> Option<Vec<u8>> {
    parse_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::Nonce(data) => Some(data),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_fields() {
        let fields = vec![
            ExtraField::PubKey([7; 32]),
            ExtraField::Nonce(vec![1, 2, 3]),
            ExtraField::AdditionalPubKeys(vec![[1; 32], [2; 32]]),
            ExtraField::Memo(b"hello".to_vec()),
        ];
        let blob = serialize_extra(&fields);
        assert_eq!(parse_extra(&blob).unwrap(), fields);
    }

    #[test]
    fn pub_key_lookup() {
        let mut extra = Vec::new();
        add_pub_key(&mut extra, &[9; 32]);
        assert_eq!(tx_pub_key(&extra), Some([9; 32]));
        assert_eq!(tx_pub_key(&[]), None);
    }

    #[test]
    fn nonce_size_limit() {
        let mut extra = Vec::new();
        assert!(add_extra_nonce(&mut extra, &[0u8; 255]).is_ok());
        let mut extra = Vec::new();
        assert_eq!(
            add_extra_nonce(&mut extra, &[0u8; 256]),
            Err(ExtraError::NonceTooLarge(256))
        );
    }

    #[test]
    fn sort_orders_by_tag() {
        let fields = vec![
            ExtraField::Memo(b"m".to_vec()),
            ExtraField::PubKey([1; 32]),
            ExtraField::Nonce(vec![0]),
        ];
        let sorted = sort_extra(&serialize_extra(&fields)).unwrap();
        let parsed = parse_extra(&sorted).unwrap();
        assert!(matches!(parsed[0], ExtraField::PubKey(_)));
        assert!(matches!(parsed[1], ExtraField::Nonce(_)));
        assert!(matches!(parsed[2], ExtraField::Memo(_)));
    }

    #[test]
    fn remove_field_keeps_rest() {
        let mut extra = Vec::new();
        add_pub_key(&mut extra, &[1; 32]);
        add_extra_nonce(&mut extra, &[5, 5]).unwrap();
        let stripped = remove_field(&extra, TAG_PUB_KEY).unwrap();
        assert_eq!(tx_pub_key(&stripped), None);
        assert_eq!(nonce(&stripped), Some(vec![5, 5]));
    }

    #[test]
    fn payment_id_nonce_roundtrip() {
        let nonce = encrypted_payment_id_nonce([3; 8]);
        assert_eq!(encrypted_payment_id_from_nonce(&nonce), Some([3; 8]));
        assert_eq!(payment_id_from_nonce(&nonce), None);

        let mut long = vec![NONCE_PAYMENT_ID];
        long.extend_from_slice(&[4; 32]);
        assert_eq!(payment_id_from_nonce(&long), Some([4; 32]));
    }

    #[test]
    fn truncated_blob_rejected() {
        assert!(parse_extra(&[TAG_PUB_KEY, 1, 2]).is_err());
        assert!(parse_extra(&[TAG_NONCE, 10, 1]).is_err());
    }
}
