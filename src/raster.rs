//! Raster window I/O: decomposes an arbitrary rectangular pixel region into
//! the per-tile, per-band runs that [`crate::slice`]'s block-level
//! primitives operate on.
//!
//! Raster buffers are band-planar, one `width * height * data_unit_size`
//! plane per band, concatenated in band order, matching the layout a block
//! uses internally.

use crate::block::BlockAllocator;
use crate::error::{Error, ErrorKind, UnitResult};
use crate::header::FileHeader;
use crate::io;
use crate::slice::{ensure_block, validate_band};
use crate::tile::{TileTable, NO_BLOCK};
use crate::uniformity::{band_plane_bytes, DirtySet};
use std::io::{Read, Seek, Write};

fn validate_region(header: &FileHeader, x: u32, y: u32, width: u32, height: u32) -> UnitResult {
    if width == 0 || height == 0 {
        return Err(Error::new(ErrorKind::InvalidRegionSize));
    }

    if x.checked_add(width).map_or(true, |x1| x1 > header.width) || y.checked_add(height).map_or(true, |y1| y1 > header.height) {
        return Err(Error::new(ErrorKind::InvalidCoord));
    }

    Ok(())
}

/// One tile's overlap with a raster window, in both image and tile-local
/// pixel coordinates.
struct Overlap {
    tile: u32,
    /// Pixel offset of this run's top-left corner, relative to the window.
    window_x: u32,
    window_y: u32,
    /// Pixel offset of this run's top-left corner, relative to the tile.
    tile_x: u32,
    tile_y: u32,
    run_width: u32,
    run_height: u32,
}

fn overlaps(header: &FileHeader, x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = Overlap> + '_ {
    let tile_x0 = x / header.tile_width;
    let tile_y0 = y / header.tile_height;
    let tile_x1 = (x + width - 1) / header.tile_width;
    let tile_y1 = (y + height - 1) / header.tile_height;
    let n_tiles_across = header.n_tiles_across();

    (tile_y0..=tile_y1).flat_map(move |ty| {
        (tile_x0..=tile_x1).map(move |tx| {
            let tile_px0 = tx * header.tile_width;
            let tile_py0 = ty * header.tile_height;
            let tile_px1 = (tile_px0 + header.tile_width).min(header.width);
            let tile_py1 = (tile_py0 + header.tile_height).min(header.height);

            let ox0 = x.max(tile_px0);
            let oy0 = y.max(tile_py0);
            let ox1 = (x + width).min(tile_px1);
            let oy1 = (y + height).min(tile_py1);

            Overlap {
                tile: ty * n_tiles_across + tx,
                window_x: ox0 - x,
                window_y: oy0 - y,
                tile_x: ox0 - tile_px0,
                tile_y: oy0 - tile_py0,
                run_width: ox1 - ox0,
                run_height: oy1 - oy0,
            }
        })
    })
}

/// Reads the `width * height` pixel window at `(x, y)`, across every band,
/// into `out` (band-planar, `bands * width * height * data_unit_size` bytes).
pub fn get_raster(
    stream: &mut (impl Read + Seek),
    header: &FileHeader,
    table: &TileTable,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    out: &mut [u8],
) -> UnitResult {
    validate_region(header, x, y, width, height)?;

    let unit_size = header.data_unit_size as usize;
    let plane_len = (width * height) as usize * unit_size;
    if out.len() != plane_len * header.bands as usize {
        return Err(Error::new(ErrorKind::InvalidBuffer));
    }

    for overlap in overlaps(header, x, y, width, height) {
        let record = table.get(overlap.tile)?;

        for band in 0..header.bands {
            let plane = &mut out[band as usize * plane_len..(band as usize + 1) * plane_len];

            if record.is_uniform(band) {
                let value = record.uniform_value(band, header.data_unit_size);
                fill_run(plane, width as usize, unit_size, overlap.window_x, overlap.window_y, overlap.run_width, overlap.run_height, value);
                continue;
            }

            let plane_bytes = band_plane_bytes(header) as u64;
            let block_base = header.block_offset(record.block_num as u32) + band as u64 * plane_bytes;

            for row in 0..overlap.run_height {
                let tile_row_offset =
                    block_base + (u64::from(overlap.tile_y + row) * u64::from(header.tile_width) + u64::from(overlap.tile_x)) * unit_size as u64;
                io::seek_to(stream, tile_row_offset)?;

                let out_start = ((overlap.window_y + row) as usize * width as usize + overlap.window_x as usize) * unit_size;
                let out_end = out_start + overlap.run_width as usize * unit_size;
                io::read_exact(stream, &mut plane[out_start..out_end])?;
            }
        }
    }

    Ok(())
}

fn fill_run(plane: &mut [u8], width: usize, unit_size: usize, window_x: u32, window_y: u32, run_width: u32, run_height: u32, value: &[u8]) {
    for row in 0..run_height {
        let row_start = ((window_y + row) as usize * width + window_x as usize) * unit_size;
        for col in 0..run_width as usize {
            let start = row_start + col * unit_size;
            plane[start..start + unit_size].copy_from_slice(value);
        }
    }
}

/// Returns the run's repeated value if every pixel of `plane`'s
/// `run_width x run_height` window at `(window_x, window_y)` is identical,
/// or `None` otherwise.
fn run_is_uniform(plane: &[u8], width: usize, unit_size: usize, window_x: u32, window_y: u32, run_width: u32, run_height: u32) -> Option<Vec<u8>> {
    let first_start = (window_y as usize * width + window_x as usize) * unit_size;
    let first = &plane[first_start..first_start + unit_size];

    for row in 0..run_height {
        let row_start = ((window_y + row) as usize * width + window_x as usize) * unit_size;
        for col in 0..run_width as usize {
            let start = row_start + col * unit_size;
            if plane[start..start + unit_size] != *first {
                return None;
            }
        }
    }

    Some(first.to_vec())
}

/// Writes the `width * height` pixel window at `(x, y)`, across every band,
/// from `data` (band-planar, `bands * width * height * data_unit_size`
/// bytes). Any tile touched that had no block yet is materialized first,
/// per [`crate::slice::ensure_block`].
///
/// When `intrinsic_write` is set, a touched tile's band only takes the
/// header-only uniform fast path if the write covers that tile's *entire*
/// in-image extent (a partial-tile run can't be summarized by a single
/// per-band uniform value, since the rest of the tile's existing pixels
/// are left untouched); otherwise the band falls back to the block path.
/// A tile is marked dirty for a later consolidate scan only when
/// `intrinsic_write` is false, matching [`crate::slice::set_tile_slice`].
#[allow(clippy::too_many_arguments)]
pub fn set_raster(
    stream: &mut (impl Read + Write + Seek),
    header: &FileHeader,
    table: &mut TileTable,
    allocator: &mut BlockAllocator,
    dirty: &mut DirtySet,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    data: &[u8],
    intrinsic_write: bool,
) -> UnitResult {
    validate_region(header, x, y, width, height)?;

    let unit_size = header.data_unit_size as usize;
    let plane_len = (width * height) as usize * unit_size;
    if data.len() != plane_len * header.bands as usize {
        return Err(Error::new(ErrorKind::InvalidBuffer));
    }

    let touched: Vec<Overlap> = overlaps(header, x, y, width, height).collect();
    let mut touched_tiles = Vec::new();

    for overlap in &touched {
        let (extent_width, extent_height) = header.effective_tile_extent(overlap.tile);
        let full_tile_write = overlap.tile_x == 0 && overlap.tile_y == 0 && overlap.run_width == extent_width && overlap.run_height == extent_height;

        let uniform_values: Vec<Option<Vec<u8>>> = if intrinsic_write && full_tile_write {
            (0..header.bands)
                .map(|band| {
                    let plane = &data[band as usize * plane_len..(band as usize + 1) * plane_len];
                    run_is_uniform(plane, width as usize, unit_size, overlap.window_x, overlap.window_y, overlap.run_width, overlap.run_height)
                })
                .collect()
        } else {
            vec![None; header.bands as usize]
        };

        let needs_block = uniform_values.iter().any(Option::is_none);

        if needs_block {
            let block_num = ensure_block(stream, header, table, allocator, overlap.tile)?;
            let plane_bytes = band_plane_bytes(header) as u64;

            for band in 0..header.bands {
                if let Some(value) = &uniform_values[band as usize] {
                    let record = table.get_mut(overlap.tile)?;
                    record.set_uniform(band, true);
                    record.set_uniform_value(band, header.data_unit_size, value);
                    continue;
                }

                let plane = &data[band as usize * plane_len..(band as usize + 1) * plane_len];
                let block_base = header.block_offset(block_num) + band as u64 * plane_bytes;

                for row in 0..overlap.run_height {
                    let tile_row_offset =
                        block_base + (u64::from(overlap.tile_y + row) * u64::from(header.tile_width) + u64::from(overlap.tile_x)) * unit_size as u64;
                    io::seek_to(stream, tile_row_offset)?;

                    let in_start = ((overlap.window_y + row) as usize * width as usize + overlap.window_x as usize) * unit_size;
                    let in_end = in_start + overlap.run_width as usize * unit_size;
                    io::write_all(stream, &plane[in_start..in_end])?;
                }

                table.get_mut(overlap.tile)?.set_uniform(band, false);
            }
        } else {
            for band in 0..header.bands {
                let value = uniform_values[band as usize].as_ref().expect("needs_block is false, so every band is uniform");
                let record = table.get_mut(overlap.tile)?;
                record.set_uniform(band, true);
                record.set_uniform_value(band, header.data_unit_size, value);
            }
        }

        let record = table.get_mut(overlap.tile)?;
        if record.is_fully_uniform(header.bands) && record.has_block() {
            allocator.free(record.block_num as u32);
            record.block_num = NO_BLOCK;
        }

        if !intrinsic_write {
            dirty.mark(overlap.tile);
        }
        touched_tiles.push(overlap.tile);
    }

    for tile in touched_tiles {
        table.write_one(stream, header, tile)?;
    }

    Ok(())
}

/// Validates a single band index against the header; re-exported for
/// callers (such as [`crate::file::SifFile`]) that accept a band argument
/// alongside a raster window.
pub fn validate_band_index(header: &FileHeader, band: u32) -> UnitResult {
    validate_band(header, band)
}
