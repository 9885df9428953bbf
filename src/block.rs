//! The block allocator: the bidirectional mapping between tiles and the
//! data blocks that back their non-uniform bands.
//!
//! A block is a fixed-size `tile_bytes()` slot in the data region. Not every
//! tile owns one: a fully uniform tile's pixel data lives entirely in its
//! tile header (see [`crate::tile`]), so it has no block.

use crate::error::{Error, ErrorKind, Result};
use crate::tile::NO_BLOCK;

/// Tracks which tile owns which block, in both directions, and hands out
/// the next free block on demand.
///
/// `block_to_tile[b] == -1` means block `b` is free. Blocks are always
/// packed from 0 upward as they're allocated; the allocator never leaves a
/// hole below the high-water mark except through deallocation, which is why
/// [`crate::defragment`] exists to recompact after many deallocations.
#[derive(Debug, Clone)]
pub struct BlockAllocator {
    block_to_tile: Vec<i32>,
    next_free_hint: usize,
}

impl BlockAllocator {
    /// Builds an allocator for `n_tiles` tiles with no blocks allocated yet.
    pub fn new(n_tiles: u32) -> Self {
        BlockAllocator { block_to_tile: vec![NO_BLOCK; n_tiles as usize], next_free_hint: 0 }
    }

    /// Rebuilds the allocator from the tile table's `block_num` fields, as
    /// read back from disk.
    pub fn from_tile_blocks(block_nums: impl Iterator<Item = i32>, n_tiles: u32) -> Result<Self> {
        let mut block_to_tile = vec![NO_BLOCK; n_tiles as usize];

        for (tile, block) in block_nums.enumerate() {
            if block == NO_BLOCK {
                continue;
            }

            let block = usize::try_from(block).map_err(|_| Error::new(ErrorKind::InvalidBlockNumber))?;
            let slot = block_to_tile.get_mut(block).ok_or_else(|| Error::new(ErrorKind::InvalidBlockNumber))?;
            *slot = tile as i32;
        }

        Ok(BlockAllocator { block_to_tile, next_free_hint: 0 })
    }

    pub fn capacity(&self) -> u32 {
        self.block_to_tile.len() as u32
    }

    pub fn tile_for_block(&self, block: u32) -> i32 {
        self.block_to_tile[block as usize]
    }

    /// Claims the lowest-numbered free block for `tile`. Every tile has a
    /// dedicated slot reserved by construction, so this never fails for a
    /// valid tile number on a table sized for `n_tiles` blocks.
    pub fn allocate(&mut self, tile: u32) -> Result<u32> {
        for offset in 0..self.block_to_tile.len() {
            let candidate = (self.next_free_hint + offset) % self.block_to_tile.len();
            if self.block_to_tile[candidate] == NO_BLOCK {
                self.block_to_tile[candidate] = tile as i32;
                self.next_free_hint = candidate + 1;
                return Ok(candidate as u32);
            }
        }

        Err(Error::new(ErrorKind::Memory))
    }

    /// Frees the block, if any, owned by `tile`.
    pub fn free(&mut self, block: u32) {
        self.block_to_tile[block as usize] = NO_BLOCK;
        self.next_free_hint = self.next_free_hint.min(block as usize);
    }

    /// Swaps the tile ownership of two blocks, without touching their byte
    /// contents; the defragmenter swaps the bytes separately.
    pub fn swap(&mut self, a: u32, b: u32) {
        self.block_to_tile.swap(a as usize, b as usize);
    }

    /// Highest block number still in use, or `None` if no tile has a block.
    pub fn last_used_block(&self) -> Option<u32> {
        self.block_to_tile.iter().rposition(|&tile| tile != NO_BLOCK).map(|index| index as u32)
    }

    pub fn used_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.block_to_tile.iter().enumerate().filter(|(_, &tile)| tile != NO_BLOCK).map(|(block, _)| block as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_block_first() {
        let mut allocator = BlockAllocator::new(4);
        assert_eq!(allocator.allocate(0).unwrap(), 0);
        assert_eq!(allocator.allocate(1).unwrap(), 1);
        allocator.free(0);
        assert_eq!(allocator.allocate(2).unwrap(), 0);
    }

    #[test]
    fn exhausts_capacity() {
        let mut allocator = BlockAllocator::new(1);
        allocator.allocate(0).unwrap();
        let error = allocator.allocate(1).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Memory);
    }

    #[test]
    fn last_used_block_tracks_high_water_mark() {
        let mut allocator = BlockAllocator::new(4);
        assert_eq!(allocator.last_used_block(), None);

        allocator.allocate(0).unwrap();
        allocator.allocate(1).unwrap();
        assert_eq!(allocator.last_used_block(), Some(1));

        allocator.free(1);
        assert_eq!(allocator.last_used_block(), Some(0));
    }

    #[test]
    fn swap_exchanges_ownership_not_identity() {
        let mut allocator = BlockAllocator::new(2);
        allocator.allocate(7).unwrap();
        allocator.allocate(9).unwrap();
        allocator.swap(0, 1);
        assert_eq!(allocator.tile_for_block(0), 9);
        assert_eq!(allocator.tile_for_block(1), 7);
    }

    #[test]
    fn rebuilds_from_tile_block_numbers() {
        let blocks = [NO_BLOCK, 0, NO_BLOCK, 1];
        let allocator = BlockAllocator::from_tile_blocks(blocks.iter().copied(), 2).unwrap();
        assert_eq!(allocator.tile_for_block(0), 1);
        assert_eq!(allocator.tile_for_block(1), 3);
    }
}
