//! Book sizing configuration.

use serde::{Deserialize, Serialize};

use crate::error::BookError;

/// Slots per arena block unless configured otherwise.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Arena sizing for one order book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Order slots per block
    pub block_size: u32,
    /// Blocks allocated up front
    pub initial_blocks: u32,
    /// Upper bound on blocks; `None` grows until the u32 slot space runs out
    pub max_blocks: Option<u32>,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            initial_blocks: 1,
            max_blocks: None,
        }
    }
}

impl BookConfig {
    /// Config sized to hold `orders` resting orders without growing.
    pub fn with_capacity(orders: u32) -> Self {
        let block_size = DEFAULT_BLOCK_SIZE;
        Self {
            block_size,
            initial_blocks: orders.div_ceil(block_size).max(1),
            max_blocks: None,
        }
    }

    pub fn validate(&self) -> Result<(), BookError> {
        if self.block_size == 0 {
            return Err(BookError::InvalidConfig("block_size must be positive"));
        }
        if let Some(max) = self.max_blocks {
            if max < self.initial_blocks {
                return Err(BookError::InvalidConfig("max_blocks is below initial_blocks"));
            }
        }
        let initial = self.initial_blocks as u64 * self.block_size as u64;
        if initial >= u32::MAX as u64 {
            return Err(BookError::InvalidConfig("initial capacity exceeds slot space"));
        }
        Ok(())
    }
}
