//! Block-swap compaction: reclaims the gaps left behind by freed blocks so
//! the data region can be truncated to its live size.

use crate::block::BlockAllocator;
use crate::error::Result;
use crate::header::FileHeader;
use crate::io;
use crate::metadata::MetadataStore;
use crate::tile::{TileTable, NO_BLOCK};
use std::io::{Read, Seek, Write};

fn swap_block_bytes(stream: &mut (impl Read + Write + Seek), header: &FileHeader, a: u32, b: u32) -> Result<()> {
    if a == b {
        return Ok(());
    }

    let tile_bytes = header.tile_bytes() as usize;

    let mut buffer_a = vec![0u8; tile_bytes];
    io::seek_to(stream, header.block_offset(a))?;
    io::read_exact(stream, &mut buffer_a)?;

    let mut buffer_b = vec![0u8; tile_bytes];
    io::seek_to(stream, header.block_offset(b))?;
    io::read_exact(stream, &mut buffer_b)?;

    io::seek_to(stream, header.block_offset(a))?;
    io::write_all(stream, &buffer_b)?;

    io::seek_to(stream, header.block_offset(b))?;
    io::write_all(stream, &buffer_a)?;

    Ok(())
}

/// Packs every live block down to the front of the data region, visiting
/// tiles in index order and swapping each out-of-place block into the next
/// free slot. Afterwards, rewrites the metadata region — its start offset
/// depends on the last used block, which this pass just moved — and
/// returns the new total live file size, which the caller should truncate
/// the file to.
///
/// A no-op (beyond rewriting metadata at its current offset) if the data
/// region was already fully packed.
pub fn defragment(
    stream: &mut (impl Read + Write + Seek),
    header: &FileHeader,
    table: &mut TileTable,
    allocator: &mut BlockAllocator,
    metadata: &MetadataStore,
) -> Result<u64> {
    let mut write_cursor = 0u32;

    for tile in 0..table.len() {
        let block_num = table.get(tile)?.block_num;
        if block_num == NO_BLOCK {
            continue;
        }

        let src_block = block_num as u32;
        if src_block != write_cursor {
            let displaced_tile = allocator.tile_for_block(write_cursor);

            swap_block_bytes(stream, header, write_cursor, src_block)?;
            allocator.swap(write_cursor, src_block);

            table.get_mut(tile)?.block_num = write_cursor as i32;
            table.write_one(stream, header, tile)?;

            if displaced_tile != NO_BLOCK {
                table.get_mut(displaced_tile as u32)?.block_num = src_block as i32;
                table.write_one(stream, header, displaced_tile as u32)?;
            }
        }

        write_cursor += 1;
    }

    let live_data_bytes = u64::from(write_cursor) * header.tile_bytes();
    let metadata_offset = header.base_location() + live_data_bytes;

    io::seek_to(stream, metadata_offset)?;
    metadata.write(stream)?;
    io::flush(stream)?;

    Ok(metadata_offset + metadata.encoded_len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FileHeader;
    use std::io::Cursor;

    fn header() -> FileHeader {
        FileHeader::new(4, 4, 1, 2, 2, 1, 0).unwrap()
    }

    fn backing_store(header: &FileHeader, blocks: u32) -> Cursor<Vec<u8>> {
        let size = header.base_location() + u64::from(blocks) * header.tile_bytes();
        Cursor::new(vec![0u8; size as usize])
    }

    #[test]
    fn packs_a_freed_hole_and_shifts_later_blocks_down() {
        let header = header();
        let mut table = TileTable::new_for_header(&header);
        let mut allocator = BlockAllocator::new(header.n_tiles());
        let mut stream = backing_store(&header, header.n_tiles());

        // three tiles get blocks 0, 1, 2; then block 0's tile is freed,
        // leaving a hole that tile occupying block 2 must fall into.
        for tile in 0..3 {
            let block = allocator.allocate(tile).unwrap();
            table.get_mut(tile).unwrap().block_num = block as i32;

            let mut marker = vec![tile as u8; header.tile_bytes() as usize];
            io::seek_to(&mut stream, header.block_offset(block)).unwrap();
            io::write_all(&mut stream, &mut marker).unwrap();
        }

        allocator.free(0);
        table.get_mut(0).unwrap().block_num = NO_BLOCK;

        let metadata = MetadataStore::new();
        let new_size = defragment(&mut stream, &header, &mut table, &mut allocator, &metadata).unwrap();

        assert_eq!(table.get(1).unwrap().block_num, 0);
        assert_eq!(table.get(2).unwrap().block_num, 1);
        assert_eq!(new_size, header.base_location() + 2 * header.tile_bytes());

        let mut moved = vec![0u8; header.tile_bytes() as usize];
        io::seek_to(&mut stream, header.block_offset(1)).unwrap();
        io::read_exact(&mut stream, &mut moved).unwrap();
        assert!(moved.iter().all(|&b| b == 2));
    }

    #[test]
    fn already_packed_data_region_is_a_noop_for_block_numbers() {
        let header = header();
        let mut table = TileTable::new_for_header(&header);
        let mut allocator = BlockAllocator::new(header.n_tiles());
        let mut stream = backing_store(&header, 1);

        let block = allocator.allocate(0).unwrap();
        table.get_mut(0).unwrap().block_num = block as i32;

        let metadata = MetadataStore::new();
        defragment(&mut stream, &header, &mut table, &mut allocator, &metadata).unwrap();
        assert_eq!(table.get(0).unwrap().block_num, 0);
    }
}
