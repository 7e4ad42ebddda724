use std::sync::atomic::{AtomicU32, Ordering};

use crate::engine::rules::RuleId;
use crate::EngineError;

/// Monotonic rule-id counter handing out fixed-size blocks.
///
/// Every (re)build of a tab's rules takes a fresh block, so a rebuild never
/// reuses an id that might still be pending removal in the host. Blocks handed
/// out to concurrent callers never overlap.
#[derive(Debug)]
pub struct RuleIdAllocator {
    next: AtomicU32,
    block_size: u32,
}

impl RuleIdAllocator {
    /// Creates an allocator whose first block starts at `next` (ids start at 1).
    pub fn new(next: u32, block_size: u32) -> Self {
        Self {
            next: AtomicU32::new(next.max(1)),
            block_size: block_size.max(1),
        }
    }

    /// Reserves the next block and returns its first id.
    pub fn allocate_block(&self) -> Result<RuleId, EngineError> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(self.block_size))
            .map(RuleId::new)
            .map_err(|_| EngineError::RuleIdsExhausted)
    }

    /// First id that has not been handed out yet. This is what gets persisted.
    pub fn peek_next(&self) -> u32 {
        self.next.load(Ordering::SeqCst)
    }
}
