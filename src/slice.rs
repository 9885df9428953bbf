//! Whole-tile, single-band slice operations. Raster window I/O
//! ([`crate::raster`]) decomposes into calls to these.

use crate::block::BlockAllocator;
use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::header::FileHeader;
use crate::io;
use crate::tile::{TileTable, NO_BLOCK};
use crate::uniformity::{band_plane_bytes, demote, scan_plane_uniform, DirtySet};
use std::io::{Read, Seek, Write};

pub(crate) fn validate_band(header: &FileHeader, band: u32) -> UnitResult {
    if band >= header.bands {
        Err(Error::new(ErrorKind::InvalidBand))
    } else {
        Ok(())
    }
}

pub(crate) fn validate_tile(header: &FileHeader, tile: u32) -> UnitResult {
    if tile >= header.n_tiles() {
        Err(Error::new(ErrorKind::InvalidTileNumber))
    } else {
        Ok(())
    }
}

/// Reads one band's pixel plane out of `tile` into `out`, sized exactly
/// `tile_width * tile_height * data_unit_size` bytes. Served straight from
/// the tile header, without touching the data region, whenever the band is
/// uniform.
pub fn get_tile_slice(
    stream: &mut (impl Read + Seek),
    header: &FileHeader,
    table: &TileTable,
    tile: u32,
    band: u32,
    out: &mut [u8],
) -> UnitResult {
    validate_tile(header, tile)?;
    validate_band(header, band)?;

    if out.len() != band_plane_bytes(header) {
        return Err(Error::new(ErrorKind::InvalidBuffer));
    }

    let record = table.get(tile)?;

    if record.is_uniform(band) {
        let unit_size = header.data_unit_size as usize;
        let value = record.uniform_value(band, header.data_unit_size);
        for unit in out.chunks_exact_mut(unit_size) {
            unit.copy_from_slice(value);
        }
        return Ok(());
    }

    let offset = header.block_offset(record.block_num as u32) + band as u64 * band_plane_bytes(header) as u64;
    io::seek_to(stream, offset)?;
    io::read_exact(stream, out)
}

/// Guarantees `tile` has a backing block, allocating one and materializing
/// every band's current uniform value into it if it did not already have
/// one. Returns the (possibly newly allocated) block number. Does not
/// write the tile header through; the caller does that once it has also
/// applied whatever band change motivated ensuring a block in the first
/// place.
pub fn ensure_block(
    stream: &mut (impl Write + Seek),
    header: &FileHeader,
    table: &mut TileTable,
    allocator: &mut BlockAllocator,
    tile: u32,
) -> Result<u32> {
    let record = table.get(tile)?;
    if record.has_block() {
        return Ok(record.block_num as u32);
    }

    let block_num = allocator.allocate(tile)?;

    let mut buffer = vec![0u8; header.tile_bytes() as usize];
    demote(table.get_mut(tile)?, &mut buffer, header);

    io::seek_to(stream, header.block_offset(block_num))?;
    io::write_all(stream, &buffer)?;

    table.get_mut(tile)?.block_num = block_num as i32;
    Ok(block_num)
}

/// Overwrites one band's pixel plane in `tile` with `data`. If the tile had
/// no block yet (every band was uniform, per the format's invariant that a
/// blockless tile is fully uniform), this allocates one and materializes
/// every band's current uniform value into it first, so the rest of the
/// block is consistent with what callers would have read before this call.
///
/// When `intrinsic_write` is set, `data` is first checked for uniformity
/// over the tile's in-image extent (ignoring right/bottom padding); if
/// uniform, this takes a header-only fast path that never touches the data
/// region, freeing the block if the tile becomes fully uniform as a result.
/// Otherwise the tile is marked dirty for a later [`crate::file::SifFile::consolidate`]
/// scan only when `intrinsic_write` is false, matching `sif_set_tile_slice`.
#[allow(clippy::too_many_arguments)]
pub fn set_tile_slice(
    stream: &mut (impl Read + Write + Seek),
    header: &FileHeader,
    table: &mut TileTable,
    allocator: &mut BlockAllocator,
    dirty: &mut DirtySet,
    tile: u32,
    band: u32,
    data: &[u8],
    intrinsic_write: bool,
) -> UnitResult {
    validate_tile(header, tile)?;
    validate_band(header, band)?;

    if data.len() != band_plane_bytes(header) {
        return Err(Error::new(ErrorKind::InvalidBuffer));
    }

    if intrinsic_write {
        let (extent_width, extent_height) = header.effective_tile_extent(tile);
        if let Some(value) = scan_plane_uniform(data, header.data_unit_size as usize, header.tile_width, extent_width, extent_height) {
            let value = value.to_vec();
            let record = table.get_mut(tile)?;
            record.set_uniform(band, true);
            record.set_uniform_value(band, header.data_unit_size, &value);

            if record.is_fully_uniform(header.bands) && record.has_block() {
                allocator.free(record.block_num as u32);
                record.block_num = NO_BLOCK;
            }

            return table.write_one(stream, header, tile);
        }
    }

    let block_num = ensure_block(stream, header, table, allocator, tile)?;

    let offset = header.block_offset(block_num) + band as u64 * band_plane_bytes(header) as u64;
    io::seek_to(stream, offset)?;
    io::write_all(stream, data)?;

    table.get_mut(tile)?.set_uniform(band, false);
    if !intrinsic_write {
        dirty.mark(tile);
    }
    table.write_one(stream, header, tile)
}

/// Sets one band of `tile` to a single repeated `value`. The tile header
/// is always updated eagerly; this is an exact, known value, so no scan is
/// needed the way [`crate::uniformity::scan_and_promote`] needs one. The
/// data region is only touched if `intrinsic_write` is set and the tile
/// already has a block backing other bands. If this makes every band
/// uniform, the block (if any) is freed unconditionally, matching
/// `sif_fill_tile_slice`.
pub fn fill_tile_slice(
    stream: &mut (impl Write + Seek),
    header: &FileHeader,
    table: &mut TileTable,
    allocator: &mut BlockAllocator,
    tile: u32,
    band: u32,
    value: &[u8],
    intrinsic_write: bool,
) -> UnitResult {
    validate_tile(header, tile)?;
    validate_band(header, band)?;

    if value.len() != header.data_unit_size as usize {
        return Err(Error::new(ErrorKind::InvalidBuffer));
    }

    let record = table.get_mut(tile)?;
    record.set_uniform(band, true);
    record.set_uniform_value(band, header.data_unit_size, value);
    let block_num = record.block_num;

    if intrinsic_write && block_num != NO_BLOCK {
        let unit_size = header.data_unit_size as usize;
        let plane_bytes = band_plane_bytes(header);
        let mut plane = vec![0u8; plane_bytes];
        for unit in plane.chunks_exact_mut(unit_size) {
            unit.copy_from_slice(value);
        }

        let offset = header.block_offset(block_num as u32) + band as u64 * plane_bytes as u64;
        io::seek_to(stream, offset)?;
        io::write_all(stream, &plane)?;
    }

    let record = table.get_mut(tile)?;
    if record.is_fully_uniform(header.bands) && record.has_block() {
        allocator.free(record.block_num as u32);
        record.block_num = NO_BLOCK;
    }

    table.write_one(stream, header, tile)
}

/// Fills every band of every tile in `tiles` with the corresponding value
/// in `values` (one `data_unit_size`-byte value per band, in band order).
/// Every band becomes uniform, so any block a filled tile previously held
/// is freed.
pub fn fill_tiles(
    stream: &mut (impl Write + Seek),
    header: &FileHeader,
    table: &mut TileTable,
    allocator: &mut BlockAllocator,
    tiles: impl Iterator<Item = u32>,
    values: &[&[u8]],
    intrinsic_write: bool,
) -> UnitResult {
    if values.len() != header.bands as usize {
        return Err(Error::new(ErrorKind::InvalidBuffer));
    }

    for tile in tiles {
        validate_tile(header, tile)?;

        for (band, value) in values.iter().enumerate() {
            fill_tile_slice(stream, header, table, allocator, tile, band as u32, value, intrinsic_write)?;
        }
    }

    Ok(())
}
