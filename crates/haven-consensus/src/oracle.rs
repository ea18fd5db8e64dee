//! Oracle pricing records and per-asset exchange-rate lookup.
//!
//! A pricing record is stamped into each block by the oracle; conversion
//! transactions reference one by height and are only valid while it is at
//! most `PRICING_RECORD_VALID_BLOCKS` behind the tip.

use haven_types::constants::{Asset, COIN, PRICING_RECORD_VALID_BLOCKS};
use haven_types::TransactionType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One transaction in the chain referenced an 11-block-old record before the
/// age rule was enforced; it stays valid forever.
pub const PR_AGE_EXEMPT_TX: &str =
    "3e61439c9f751a56777a1df1479ce70311755b9d42db5bcbbd873c6f09a020a6";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("no exchange rate for {0}")]
    MissingRate(Asset),
    #[error("pricing record height {pr_height} invalid at chain height {current_height}")]
    StaleRecord { pr_height: u64, current_height: u64 },
}

/// Exchange rate of one xAsset against xUSD, in atomic units per COIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRate {
    pub asset: Asset,
    pub rate: u64,
}

/// Oracle pricing record.
///
/// `xhv_ma` is the 24-hour moving average of the XHV price in xUSD atomic
/// units; `xhv_spot` the spot price. The per-asset table carries the
/// xUSD -> xAsset rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRecord {
    pub xhv_ma: u64,
    pub xhv_spot: u64,
    pub rates: Vec<AssetRate>,
    pub timestamp: u64,
    #[serde(with = "hex_sig")]
    pub signature: Vec<u8>,
}

mod hex_sig {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

impl PricingRecord {
    /// An all-zero record, as stamped into blocks without oracle data.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.xhv_ma == 0
            && self.xhv_spot == 0
            && self.rates.is_empty()
            && self.timestamp == 0
            && self.signature.is_empty()
    }

    /// Raw rate for an asset: xAssets from the table, xUSD is 1:1, XHV the
    /// moving average.
    pub fn rate(&self, asset: Asset) -> u64 {
        match asset {
            Asset::Xusd => COIN,
            Asset::Xhv => self.xhv_ma,
            other => self
                .rates
                .iter()
                .find(|r| r.asset == other)
                .map_or(0, |r| r.rate),
        }
    }

    /// Direction-dependent XHV price: conversions out of XHV use the smaller
    /// of MA and spot, conversions into XHV the larger, removing any
    /// MA-versus-spot arbitrage.
    pub fn xhv_rate(&self, tx_type: TransactionType) -> u64 {
        match tx_type {
            TransactionType::Onshore => self.xhv_ma.max(self.xhv_spot),
            _ => self.xhv_ma.min(self.xhv_spot),
        }
    }

    /// The record the chain hardcodes for height 821428, where the stamped
    /// block carried a corrupt copy.
    pub fn for_height_821428() -> Self {
        PricingRecord {
            xhv_ma: 2_929_556_600,
            xhv_spot: 3_208_152_660,
            rates: vec![
                AssetRate { asset: Asset::Xag, rate: 42_956_109 },
                AssetRate { asset: Asset::Xau, rate: 553_375 },
                AssetRate { asset: Asset::Xaud, rate: 1_364_127_640 },
                AssetRate { asset: Asset::Xbtc, rate: 17_405 },
                AssetRate { asset: Asset::Xcad, rate: 1_269_468_534 },
                AssetRate { asset: Asset::Xchf, rate: 920_661_930 },
                AssetRate { asset: Asset::Xcny, rate: 6_435_494_610 },
                AssetRate { asset: Asset::Xeur, rate: 848_667_875 },
                AssetRate { asset: Asset::Xgbp, rate: 727_205_630 },
                AssetRate { asset: Asset::Xjpy, rate: 110_652_378_300 },
                AssetRate { asset: Asset::Xnok, rate: 8_792_244_623 },
                AssetRate { asset: Asset::Xnzd, rate: 1_475_420_697 },
            ],
            timestamp: 1_613_329_914,
            signature: Vec::new(),
        }
    }
}

/// Is a conversion's pricing-record height still acceptable at the current
/// chain height?
///
/// The record must come from a mined block (strictly below the tip) no more
/// than `PRICING_RECORD_VALID_BLOCKS` back, with a single whitelisted
/// historical exception.
pub fn tx_pr_height_valid(current_height: u64, pr_height: u64, txid: &[u8; 32]) -> bool {
    if pr_height >= current_height {
        return false;
    }
    if current_height.saturating_sub(PRICING_RECORD_VALID_BLOCKS) > pr_height
        && hex::encode(txid) != PR_AGE_EXEMPT_TX
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PricingRecord {
        PricingRecord {
            xhv_ma: 500_000_000_000,  // 0.5 xUSD
            xhv_spot: 600_000_000_000, // 0.6 xUSD
            rates: vec![
                AssetRate { asset: Asset::Xbtc, rate: 25_000_000 },
                AssetRate { asset: Asset::Xjpy, rate: 110_000_000_000_000 },
            ],
            timestamp: 1_000,
            signature: vec![],
        }
    }

    #[test]
    fn empty_record() {
        assert!(PricingRecord::empty().is_empty());
        assert!(!record().is_empty());
    }

    #[test]
    fn rate_lookup() {
        let pr = record();
        assert_eq!(pr.rate(Asset::Xusd), COIN);
        assert_eq!(pr.rate(Asset::Xhv), pr.xhv_ma);
        assert_eq!(pr.rate(Asset::Xbtc), 25_000_000);
        assert_eq!(pr.rate(Asset::Xeur), 0);
    }

    #[test]
    fn direction_dependent_rate() {
        let pr = record();
        assert_eq!(pr.xhv_rate(TransactionType::Offshore), 500_000_000_000);
        assert_eq!(pr.xhv_rate(TransactionType::Onshore), 600_000_000_000);
        assert_eq!(pr.xhv_rate(TransactionType::XusdToXasset), 500_000_000_000);
    }

    #[test]
    fn pr_age_window() {
        let txid = [1u8; 32];
        // at the tip or beyond: never valid
        assert!(!tx_pr_height_valid(100, 100, &txid));
        assert!(!tx_pr_height_valid(100, 101, &txid));
        // within the window
        assert!(tx_pr_height_valid(100, 99, &txid));
        assert!(tx_pr_height_valid(100, 90, &txid));
        // one block too old
        assert!(!tx_pr_height_valid(100, 89, &txid));
    }

    #[test]
    fn pr_age_exemption() {
        let mut txid = [0u8; 32];
        hex::decode_to_slice(PR_AGE_EXEMPT_TX, &mut txid).unwrap();
        assert!(tx_pr_height_valid(100, 50, &txid));
        assert!(!tx_pr_height_valid(100, 100, &txid));
    }

    #[test]
    fn hardcoded_record_is_complete() {
        let pr = PricingRecord::for_height_821428();
        assert!(!pr.is_empty());
        for rate in &pr.rates {
            assert!(rate.rate > 0);
        }
        assert!(pr.xhv_ma > 0 && pr.xhv_spot > 0);
    }

    #[test]
    fn record_serde_roundtrip() {
        let pr = record();
        let json = serde_json::to_string(&pr).unwrap();
        let back: PricingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pr);
    }
}
