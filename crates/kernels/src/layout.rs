//! Block-channel (NCHWc) tensor layouts.
//!
//! Activations are stored `[N][C/blk][H][W][blk]` and filters
//! `[F/blk][C/blk][KH][KW][blk_in][blk_out]`. Channel counts are padded up
//! to a whole number of blocks; padded lanes hold zero.

pub fn padded_channels(channels: usize, block: usize) -> usize {
    channels.next_multiple_of(block)
}

/// Geometry of a blocked activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedActivation {
    pub block: usize,
    pub batch: usize,
    /// Channel count already padded to a multiple of `block`.
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl BlockedActivation {
    pub fn new(block: usize, batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            block,
            batch,
            channels: padded_channels(channels, block),
            height,
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self, n: usize, c: usize, y: usize, x: usize) -> usize {
        let blocks = self.channels / self.block;
        (((n * blocks + c / self.block) * self.height + y) * self.width + x) * self.block
            + c % self.block
    }
}

/// Geometry of a blocked filter tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedFilter {
    pub block: usize,
    /// Filter count padded to a multiple of `block`.
    pub filters: usize,
    /// Input channel count padded to a multiple of `block`.
    pub channels: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
}

impl BlockedFilter {
    pub fn new(
        block: usize,
        filters: usize,
        channels: usize,
        kernel_height: usize,
        kernel_width: usize,
    ) -> Self {
        Self {
            block,
            filters: padded_channels(filters, block),
            channels: padded_channels(channels, block),
            kernel_height,
            kernel_width,
        }
    }

    pub fn len(&self) -> usize {
        self.filters * self.channels * self.kernel_height * self.kernel_width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self, f: usize, c: usize, ky: usize, kx: usize) -> usize {
        let in_blocks = self.channels / self.block;
        let tile = self.block * self.block;
        ((((f / self.block) * in_blocks + c / self.block) * self.kernel_height + ky)
            * self.kernel_width
            + kx)
            * tile
            + (c % self.block) * self.block
            + f % self.block
    }
}
