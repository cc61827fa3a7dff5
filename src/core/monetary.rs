//! Monetary constants.
//!
//! Amounts are integer base units throughout. The coinbase reward
//! halves every [`REWARD_DECAY_INTERVAL`] blocks, computed from the
//! chain length when the chain is opened rather than accumulated
//! event by event.

/// Base units per whole coin.
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// Coinbase reward paid by the genesis block and every block of the
/// first decay interval.
pub const INITIAL_BLOCK_REWARD: u64 = 50 * UNITS_PER_COIN;

/// Number of blocks after which the coinbase reward halves.
pub const REWARD_DECAY_INTERVAL: u64 = 210_000;

/// The coinbase reward for a chain holding `block_count` blocks.
pub fn reward_after(block_count: u64) -> u64 {
    let halvings = block_count / REWARD_DECAY_INTERVAL;
    if halvings >= u64::BITS as u64 {
        return 0;
    }
    INITIAL_BLOCK_REWARD >> halvings
}
