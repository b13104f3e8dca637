//! Deterministic sortition for elite-edge-node reward weighting.
//!
//! Every node draws the same pseudo-random stream from the block hash and
//! the holder address, so the sampled weight is consensus-safe.

use crate::{
    errors::{InternalError, VMError},
    staking::pool::een_min_stake,
};
use ember_common::{Address, H256, U256};
use ember_crypto::keccak256;

/// Number of reward samples the expected weight is normalized to: a
/// holder staking the whole pool would weigh in at this value.
pub const REWARD_SAMPLES: u64 = 400;

/// Keccak-chained pseudo-random byte stream.
pub struct HashRand {
    state: H256,
    offset: usize,
}

impl HashRand {
    pub fn new(seed: &[u8]) -> Self {
        HashRand {
            state: keccak256(seed),
            // The first block of output is the hash of the state, not the
            // state itself.
            offset: 32,
        }
    }

    pub fn fill_bytes(&mut self, out: &mut [u8]) {
        for byte in out.iter_mut() {
            if self.offset == 32 {
                self.state = keccak256(self.state.as_bytes());
                self.offset = 0;
            }
            *byte = self.state[self.offset];
            self.offset += 1;
        }
    }
}

/// Uniform draw in `[0, max)` by rejection sampling: read just enough
/// bytes to cover `max`, mask the excess bits of the top byte, and retry
/// until the value lands below `max`.
pub fn rand_int(rng: &mut HashRand, max: U256) -> U256 {
    if max.is_zero() {
        return U256::zero();
    }
    let bits = max.bits();
    let bytes = bits.div_ceil(8);
    let top_bits = match bits % 8 {
        0 => 8,
        rem => rem,
    };

    let mut buf = vec![0u8; bytes];
    loop {
        rng.fill_bytes(&mut buf);
        buf[0] &= (1u16 << top_bits).wrapping_sub(1) as u8;
        let value = U256::from_big_endian(&buf);
        if value < max {
            return value;
        }
    }
}

/// Samples a reward weight for a holder staking `stake` out of a pool
/// totalling `total_stake`. One Bernoulli trial is run per minimum-stake
/// unit; the expected weight is `REWARD_SAMPLES * stake / total_stake`.
pub fn sample_reward_weight(
    rng: &mut HashRand,
    stake: U256,
    total_stake: U256,
) -> Result<u64, VMError> {
    if stake.is_zero() || total_stake.is_zero() {
        return Ok(0);
    }
    let trials = (stake / een_min_stake()).low_u64();
    if trials == 0 {
        return Ok(0);
    }

    let range = total_stake
        .checked_mul(U256::from(trials))
        .ok_or(InternalError::ArithmeticOverflow)?;
    let threshold = stake
        .checked_mul(U256::from(REWARD_SAMPLES))
        .ok_or(InternalError::ArithmeticOverflow)?;

    let mut weight = 0u64;
    for _ in 0..trials {
        if rand_int(rng, range) < threshold {
            weight = weight.saturating_add(1);
        }
    }
    Ok(weight)
}

/// Reward weight of `holder` for the block identified by `block_hash`,
/// seeded so every validator computes the same draw.
pub fn random_reward_weight(
    block_hash: H256,
    holder: Address,
    stake: U256,
    total_stake: U256,
) -> Result<u64, VMError> {
    let mut seed = Vec::with_capacity(52);
    seed.extend_from_slice(block_hash.as_bytes());
    seed.extend_from_slice(holder.as_bytes());
    let mut rng = HashRand::new(&seed);
    sample_reward_weight(&mut rng, stake, total_stake)
}
