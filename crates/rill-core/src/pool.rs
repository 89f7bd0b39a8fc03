//! Size-classed recycler for sample blocks.
//!
//! Every value that flows along a graph edge is a [`Block`]: a fixed-length
//! run of `f64` samples. Blocks are requested once per node per epoch and
//! handed back when the epoch retires, so the audio path never allocates in
//! steady state.
//!
//! # Size classes
//!
//! Valid lengths are the powers of two in
//! [`MIN_BLOCK_SIZE`]`..=`[`MAX_BLOCK_SIZE`]. Each length has its own free
//! list, indexed by the trailing-zero count of `n >> log2(MIN_BLOCK_SIZE)`:
//!
//! ```text
//! n:      8    16   32   64   128  256  512  1024 2048
//! class:  0    1    2    3    4    5    6    7    8
//! ```
//!
//! # Example
//!
//! ```rust
//! use rill_core::pool::BlockPool;
//!
//! let pool = BlockPool::new();
//! let mut block = pool.get(128).unwrap();
//! block[0] = 1.0;
//! pool.put(block).unwrap();
//!
//! // Recycled blocks come back zeroed.
//! let block = pool.get(128).unwrap();
//! assert!(block.iter().all(|&s| s == 0.0));
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Smallest block length the pool hands out.
pub const MIN_BLOCK_SIZE: usize = 8;

/// Largest block length the pool hands out.
pub const MAX_BLOCK_SIZE: usize = 2048;

/// Default engine block size.
pub const DEFAULT_BLOCK_SIZE: usize = 128;

const MIN_SHIFT: u32 = MIN_BLOCK_SIZE.trailing_zeros();
const CLASS_COUNT: usize = (MAX_BLOCK_SIZE.trailing_zeros() - MIN_SHIFT + 1) as usize;

/// Errors returned by [`BlockPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Requested or returned length is not a power of two in range.
    #[error("invalid block size {0}: expected a power of two between 8 and 2048")]
    InvalidSize(usize),
}

/// A contiguous run of samples produced by one node for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block(Vec<f64>);

impl Block {
    /// Allocates a zero-filled block of `len` samples.
    ///
    /// Bypasses the pool; prefer [`BlockPool::get`] on the audio path.
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    /// Returns the samples as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Returns the samples as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }

    /// Consumes the block, returning its storage.
    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for Block {
    type Target = [f64];

    #[inline]
    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl DerefMut for Block {
    #[inline]
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl From<Vec<f64>> for Block {
    fn from(samples: Vec<f64>) -> Self {
        Self(samples)
    }
}

/// Returns `true` if `n` is a block length the pool accepts.
pub fn is_valid_block_size(n: usize) -> bool {
    n.is_power_of_two() && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&n)
}

/// Maps a block length to its free-list index.
pub fn size_class(n: usize) -> Result<usize, PoolError> {
    if !is_valid_block_size(n) {
        return Err(PoolError::InvalidSize(n));
    }
    Ok((n >> MIN_SHIFT).trailing_zeros() as usize)
}

/// Counters describing pool behaviour since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks freshly allocated because a free list was empty.
    pub allocations: u64,
    /// Blocks served from a free list.
    pub reuses: u64,
    /// Blocks currently parked in free lists.
    pub free: usize,
}

/// Thread-safe block recycler with one free list per size class.
///
/// Each class is guarded by its own mutex; the critical section is a single
/// `Vec::pop`/`Vec::push`, so contention costs less than the allocation it
/// replaces.
pub struct BlockPool {
    classes: [Mutex<Vec<Block>>; CLASS_COUNT],
    allocations: AtomicU64,
    reuses: AtomicU64,
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            classes: std::array::from_fn(|_| Mutex::new(Vec::new())),
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
        }
    }

    /// Returns a zeroed block of exactly `n` samples.
    pub fn get(&self, n: usize) -> Result<Block, PoolError> {
        let class = size_class(n)?;
        let recycled = self.classes[class].lock().pop();
        match recycled {
            Some(mut block) => {
                block.fill(0.0);
                self.reuses.fetch_add(1, Ordering::Relaxed);
                Ok(block)
            }
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                Ok(Block::zeroed(n))
            }
        }
    }

    /// Returns a block to its size class for reuse.
    pub fn put(&self, block: Block) -> Result<(), PoolError> {
        let class = size_class(block.len())?;
        self.classes[class].lock().push(block);
        Ok(())
    }

    /// Returns every block in `blocks` to the pool, skipping invalid lengths.
    pub fn put_all(&self, blocks: impl IntoIterator<Item = Block>) {
        for block in blocks {
            if let Err(err) = self.put(block) {
                tracing::debug!(%err, "discarding block");
            }
        }
    }

    /// Snapshot of pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            free: self.classes.iter().map(|c| c.lock().len()).sum(),
        }
    }
}

impl std::fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockPool")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(size_class(8), Ok(0));
        assert_eq!(size_class(16), Ok(1));
        assert_eq!(size_class(128), Ok(4));
        assert_eq!(size_class(2048), Ok(8));
        assert_eq!(CLASS_COUNT, 9);
    }

    #[test]
    fn test_get_rejects_invalid_sizes() {
        let pool = BlockPool::new();
        for n in [0, 1, 4, 100, 4096, 3000] {
            assert!(matches!(pool.get(n), Err(PoolError::InvalidSize(m)) if m == n));
        }
    }

    #[test]
    fn test_put_rejects_invalid_sizes() {
        let pool = BlockPool::new();
        let result = pool.put(Block::zeroed(100));
        assert!(matches!(result, Err(PoolError::InvalidSize(100))));
    }

    #[test]
    fn test_get_returns_exact_length() {
        let pool = BlockPool::new();
        let block = pool.get(64).unwrap();
        assert_eq!(block.len(), 64);
    }

    #[test]
    fn test_recycled_blocks_are_zeroed() {
        let pool = BlockPool::new();
        let mut block = pool.get(32).unwrap();
        block.fill(0.75);
        pool.put(block).unwrap();

        let block = pool.get(32).unwrap();
        assert!(block.iter().all(|&s| s == 0.0));
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
    }

    #[test]
    fn test_classes_do_not_mix() {
        let pool = BlockPool::new();
        pool.put(Block::zeroed(16)).unwrap();
        let block = pool.get(32).unwrap();
        assert_eq!(block.len(), 32);
        assert_eq!(pool.stats().free, 1);
    }

    #[test]
    fn test_concurrent_get_put() {
        let pool = std::sync::Arc::new(BlockPool::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let block = pool.get(128).unwrap();
                        assert!(block.iter().all(|&s| s == 0.0));
                        pool.put(block).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.allocations + stats.reuses, 800);
    }
}
