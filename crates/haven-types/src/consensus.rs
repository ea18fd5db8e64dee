//! Chain-level consensus constants and the block reward schedule.

use crate::constants::{
    network_config, Network, BLOCK_GRANTED_FULL_REWARD_ZONE_V1, BLOCK_GRANTED_FULL_REWARD_ZONE_V2,
    BLOCK_GRANTED_FULL_REWARD_ZONE_V5, COINBASE_BLOB_RESERVED_SIZE, DIFFICULTY_TARGET,
    EMISSION_SPEED_FACTOR_PER_MINUTE, FINAL_SUBSIDY_PER_MINUTE,
};

/// Total emission curve input: the full u64 range, Monero-style.
pub const MONEY_SUPPLY: u64 = u64::MAX;

// =============================================================================
// Hard Fork Queries
// =============================================================================

/// Get the hard fork version active at a given block height.
pub fn hf_version_for_height(height: u64, network: Network) -> u8 {
    let config = network_config(network);
    let mut active_version = 1u8;
    for &(version, activation_height) in config.hard_fork_heights {
        if height >= activation_height && version > active_version {
            active_version = version;
        }
    }
    active_version
}

// =============================================================================
// Block Weight
// =============================================================================

/// Minimum block weight granted the full reward.
pub fn min_block_weight(hf_version: u8) -> u64 {
    if hf_version < 2 {
        BLOCK_GRANTED_FULL_REWARD_ZONE_V1
    } else if hf_version < 5 {
        BLOCK_GRANTED_FULL_REWARD_ZONE_V2
    } else {
        BLOCK_GRANTED_FULL_REWARD_ZONE_V5
    }
}

/// Per-transaction weight limit.
///
/// From v5 a single transaction may take at most half the minimum block
/// weight, less the coinbase reserve.
pub fn transaction_weight_limit(hf_version: u8) -> u64 {
    if hf_version >= 5 {
        min_block_weight(hf_version) / 2 - COINBASE_BLOB_RESERVED_SIZE
    } else {
        min_block_weight(hf_version) - COINBASE_BLOB_RESERVED_SIZE
    }
}

// =============================================================================
// Block Reward
// =============================================================================

/// Calculate the block reward for a block of `current_block_weight` given the
/// recent `median_weight` and cumulative issuance.
///
/// Returns `None` when the block exceeds twice the effective median and must
/// be rejected as too big.
pub fn block_reward(
    median_weight: u64,
    current_block_weight: u64,
    already_generated_coins: u64,
    hf_version: u8,
) -> Option<u64> {
    let target_minutes = DIFFICULTY_TARGET / 60;
    let emission_speed_factor = EMISSION_SPEED_FACTOR_PER_MINUTE - (target_minutes as u32 - 1);

    let mut base_reward = MONEY_SUPPLY.saturating_sub(already_generated_coins) >> emission_speed_factor;
    let min_subsidy = FINAL_SUBSIDY_PER_MINUTE * target_minutes;
    if base_reward < min_subsidy {
        base_reward = min_subsidy;
    }

    let full_reward_zone = min_block_weight(hf_version);
    let effective_median = median_weight.max(full_reward_zone);

    if current_block_weight <= effective_median {
        return Some(base_reward);
    }
    if current_block_weight > 2 * effective_median {
        return None;
    }

    // reward * (2M - W) * W / M^2, in u128 to avoid overflow
    let m = effective_median as u128;
    let w = current_block_weight as u128;
    let multiplicand = (2 * m - w) * w;
    let reward = (base_reward as u128 * multiplicand) / m / m;

    Some(reward as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HfVersion;

    #[test]
    fn hf_version_lookup_mainnet() {
        assert_eq!(hf_version_for_height(0, Network::Mainnet), 1);
        assert_eq!(hf_version_for_height(176_000, Network::Mainnet), HfVersion::PER_BYTE_FEE);
        assert_eq!(hf_version_for_height(886_575, Network::Mainnet), HfVersion::HAVEN2);
        assert_eq!(hf_version_for_height(886_574, Network::Mainnet), HfVersion::XASSET_FEES_V2);
        assert_eq!(hf_version_for_height(2_000_000, Network::Mainnet), HfVersion::BULLETPROOF_PLUS);
    }

    #[test]
    fn weight_zones() {
        assert_eq!(min_block_weight(1), BLOCK_GRANTED_FULL_REWARD_ZONE_V1);
        assert_eq!(min_block_weight(2), BLOCK_GRANTED_FULL_REWARD_ZONE_V2);
        assert_eq!(min_block_weight(4), BLOCK_GRANTED_FULL_REWARD_ZONE_V2);
        assert_eq!(min_block_weight(5), BLOCK_GRANTED_FULL_REWARD_ZONE_V5);
        assert_eq!(min_block_weight(HfVersion::USE_COLLATERAL), BLOCK_GRANTED_FULL_REWARD_ZONE_V5);
    }

    #[test]
    fn tx_weight_limit_halves_from_v5() {
        assert_eq!(
            transaction_weight_limit(5),
            BLOCK_GRANTED_FULL_REWARD_ZONE_V5 / 2 - COINBASE_BLOB_RESERVED_SIZE
        );
        assert_eq!(
            transaction_weight_limit(4),
            BLOCK_GRANTED_FULL_REWARD_ZONE_V2 - COINBASE_BLOB_RESERVED_SIZE
        );
    }

    #[test]
    fn reward_small_block_gets_base() {
        let r1 = block_reward(300_000, 1_000, 1_000_000, 18).unwrap();
        let r2 = block_reward(300_000, 300_000, 1_000_000, 18).unwrap();
        assert_eq!(r1, r2);
        assert!(r1 > 0);
    }

    #[test]
    fn reward_penalised_above_median() {
        let base = block_reward(300_000, 300_000, 1_000_000, 18).unwrap();
        let penalised = block_reward(300_000, 450_000, 1_000_000, 18).unwrap();
        assert!(penalised < base);
        assert!(penalised > 0);
    }

    #[test]
    fn reward_rejects_oversize_block() {
        assert_eq!(block_reward(300_000, 600_001, 1_000_000, 18), None);
    }

    #[test]
    fn reward_monotone_in_weight() {
        let mut last = u64::MAX;
        for w in [300_000u64, 350_000, 400_000, 500_000, 600_000] {
            let r = block_reward(300_000, w, 1_000_000, 18).unwrap();
            assert!(r <= last, "reward must not increase with weight");
            last = r;
        }
    }

    #[test]
    fn reward_tail_emission_floor() {
        // Issuance near the cap falls back to the tail subsidy.
        let r = block_reward(300_000, 1_000, MONEY_SUPPLY - 1, 18).unwrap();
        assert_eq!(r, FINAL_SUBSIDY_PER_MINUTE * (DIFFICULTY_TARGET / 60));
    }
}
