//! Per-tick output of the runner and the crossfade mixer.

use rill_core::{Block, BlockPool};

/// One block per output channel; `channels()[c]` is channel `c`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    channels: Vec<Block>,
}

impl Frame {
    /// Wraps per-channel blocks.
    pub fn new(channels: Vec<Block>) -> Self {
        Self { channels }
    }

    /// Allocates `channels` zeroed blocks of `block_size` samples.
    pub fn silent(channels: usize, block_size: usize) -> Self {
        Self::new((0..channels).map(|_| Block::zeroed(block_size)).collect())
    }

    /// Per-channel blocks.
    pub fn channels(&self) -> &[Block] {
        &self.channels
    }

    /// Mutable per-channel blocks.
    pub fn channels_mut(&mut self) -> &mut [Block] {
        &mut self.channels
    }

    /// Block for `channel`, if present.
    pub fn channel(&self, channel: usize) -> Option<&Block> {
        self.channels.get(channel)
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel (zero for an empty frame).
    pub fn block_size(&self) -> usize {
        self.channels.first().map_or(0, |b| b.len())
    }

    /// Releases the channel blocks.
    pub fn into_blocks(self) -> Vec<Block> {
        self.channels
    }

    /// Hands every channel block back to `pool`.
    pub fn recycle(self, pool: &BlockPool) {
        pool.put_all(self.channels);
    }
}

/// Linear crossfade of `old` into `new`, written into `new`.
///
/// `offset` is the index of this block's first sample within a fade of
/// `total` samples. Sample `i` of the fade is `old * (1 - t) + new * t` with
/// `t = i / total`. Channels pair by index. A channel missing from either
/// side counts as silence; if `old` has more channels than `new`, `new`
/// grows to match.
pub fn crossfade_into(old: &Frame, new: &mut Frame, offset: usize, total: usize, pool: &BlockPool) {
    let block_size = old.block_size().max(new.block_size());
    while new.channels.len() < old.channels.len() {
        let block = pool
            .get(block_size)
            .unwrap_or_else(|_| Block::zeroed(block_size));
        new.channels.push(block);
    }
    let total = total.max(1) as f64;
    for (c, out) in new.channels.iter_mut().enumerate() {
        let from = old.channels.get(c);
        for (j, sample) in out.iter_mut().enumerate() {
            let t = (offset + j) as f64 / total;
            let prior = from.and_then(|b| b.get(j)).copied().unwrap_or(0.0);
            *sample = prior * (1.0 - t) + *sample * t;
        }
    }
}
