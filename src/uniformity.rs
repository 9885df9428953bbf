//! Uniformity compression: deciding when a tile's band needs no backing
//! block because every pixel in it shares one value, and the bookkeeping
//! (dirty tracking, promotion, demotion) that keeps that decision cheap.
//!
//! A block is laid out band-planar: band `b` occupies the contiguous range
//! `[b * plane_bytes, (b + 1) * plane_bytes)`, where `plane_bytes =
//! tile_width * tile_height * data_unit_size`.

use crate::error::{Error, ErrorKind, Result};
use crate::header::FileHeader;
use crate::tile::{TileHeader, TileTable};

pub fn band_plane_bytes(header: &FileHeader) -> usize {
    (header.tile_width * header.tile_height * header.data_unit_size) as usize
}

pub fn band_plane(data: &[u8], header: &FileHeader, band: u32) -> &[u8] {
    let len = band_plane_bytes(header);
    let start = band as usize * len;
    &data[start..start + len]
}

fn band_plane_mut<'a>(data: &'a mut [u8], header: &FileHeader, band: u32) -> &'a mut [u8] {
    let len = band_plane_bytes(header);
    let start = band as usize * len;
    &mut data[start..start + len]
}

/// Scans one band's plane and returns its repeated value if every in-image
/// pixel in it is identical, or `None` otherwise. Only the `extent_width x
/// extent_height` pixels starting at the plane's origin are compared (each
/// row strided by `tile_width`); bytes beyond that extent are padding for a
/// partial right/bottom-edge tile and never affect the result, matching the
/// original library's `_sif_is_uniform`.
pub fn scan_plane_uniform(plane: &[u8], unit_size: usize, tile_width: u32, extent_width: u32, extent_height: u32) -> Option<&[u8]> {
    if unit_size == 0 || extent_width == 0 || extent_height == 0 {
        return None;
    }

    let stride = tile_width as usize * unit_size;
    let row_len = extent_width as usize * unit_size;
    let first = &plane[0..unit_size];

    for row in 0..extent_height as usize {
        let row_start = row * stride;
        for unit in plane[row_start..row_start + row_len].chunks_exact(unit_size) {
            if unit != first {
                return None;
            }
        }
    }

    Some(first)
}

/// Single-slice shallow uniformity test: if `tile`'s `band` is uniform,
/// copies its value into `out` and returns `true`; otherwise leaves `out`
/// untouched and returns `false`. Mirrors `sif_is_slice_shallow_uniform`.
pub fn is_slice_shallow_uniform(tile: &TileHeader, band: u32, data_unit_size: u32, out: &mut [u8]) -> bool {
    if tile.is_uniform(band) {
        out.copy_from_slice(tile.uniform_value(band, data_unit_size));
        true
    } else {
        false
    }
}

/// Window-level shallow uniformity test: decomposes the window into the
/// tile indices it overlaps and returns `true` iff every covered tile's
/// slice is shallow uniform and shares the same uniform value as the first
/// tile's slice, copying that value into `out`. Never reads a data block.
/// Mirrors `sif_is_shallow_uniform`.
pub fn is_shallow_uniform_window(
    header: &FileHeader,
    table: &TileTable,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    band: u32,
    out: &mut [u8],
) -> Result<bool> {
    if width == 0 || height == 0 {
        return Err(Error::new(ErrorKind::InvalidRegionSize));
    }
    if x.checked_add(width).map_or(true, |x1| x1 > header.width) || y.checked_add(height).map_or(true, |y1| y1 > header.height) {
        return Err(Error::new(ErrorKind::InvalidCoord));
    }
    if band >= header.bands {
        return Err(Error::new(ErrorKind::InvalidBand));
    }
    if out.len() != header.data_unit_size as usize {
        return Err(Error::new(ErrorKind::InvalidBuffer));
    }

    let n_tiles_across = header.n_tiles_across();
    let tile_x0 = x / header.tile_width;
    let tile_y0 = y / header.tile_height;
    let tile_x1 = (x + width - 1) / header.tile_width;
    let tile_y1 = (y + height - 1) / header.tile_height;

    let first = table.get(tile_y0 * n_tiles_across + tile_x0)?;
    if !first.is_uniform(band) {
        return Ok(false);
    }
    let first_value = first.uniform_value(band, header.data_unit_size).to_vec();

    for ty in tile_y0..=tile_y1 {
        for tx in tile_x0..=tile_x1 {
            let record = table.get(ty * n_tiles_across + tx)?;
            if !record.is_uniform(band) || record.uniform_value(band, header.data_unit_size) != first_value.as_slice() {
                return Ok(false);
            }
        }
    }

    out.copy_from_slice(&first_value);
    Ok(true)
}

/// Deep-scans a tile's data block band by band, clipping each band's scan
/// to the tile's in-image extent so right/bottom-edge padding bytes never
/// affect the result. For each band that turns out uniform, records its
/// flag and value onto `tile`. Returns `true` if every band was uniform,
/// meaning the caller can free the block.
pub fn scan_and_promote(tile: &mut TileHeader, data: &[u8], header: &FileHeader, tile_index: u32) -> bool {
    let (extent_width, extent_height) = header.effective_tile_extent(tile_index);
    let mut all_uniform = true;

    for band in 0..header.bands {
        let plane = band_plane(data, header, band);
        match scan_plane_uniform(plane, header.data_unit_size as usize, header.tile_width, extent_width, extent_height) {
            Some(value) => {
                tile.set_uniform(band, true);
                tile.set_uniform_value(band, header.data_unit_size, value);
            }
            None => {
                tile.set_uniform(band, false);
                all_uniform = false;
            }
        }
    }

    all_uniform
}

/// Expands every currently-uniform band in `tile` back into real pixel data
/// inside `data` (sized to one full block), and clears those bands'
/// uniform flags. Call this before writing new, non-uniform pixels into a
/// tile that does not yet have a backing block.
pub fn demote(tile: &mut TileHeader, data: &mut [u8], header: &FileHeader) {
    let unit_size = header.data_unit_size as usize;

    for band in 0..header.bands {
        if !tile.is_uniform(band) {
            continue;
        }

        let mut value = [0u8; 8];
        let value = {
            let source = tile.uniform_value(band, header.data_unit_size);
            value[..source.len()].copy_from_slice(source);
            value
        };

        let plane = band_plane_mut(data, header, band);
        for unit in plane.chunks_exact_mut(unit_size) {
            unit.copy_from_slice(&value[..unit_size]);
        }

        tile.set_uniform(band, false);
    }
}

/// Tracks which tiles have been written to since the last consolidation
/// pass, so [`crate::file::SifFile::consolidate`] only has to re-scan
/// tiles that could possibly have changed.
#[derive(Debug, Clone)]
pub struct DirtySet {
    dirty: Vec<bool>,
}

impl DirtySet {
    pub fn new(n_tiles: u32) -> Self {
        DirtySet { dirty: vec![false; n_tiles as usize] }
    }

    pub fn mark(&mut self, tile: u32) {
        self.dirty[tile as usize] = true;
    }

    pub fn is_dirty(&self, tile: u32) -> bool {
        self.dirty[tile as usize]
    }

    /// Returns every currently dirty tile, in ascending order, and clears
    /// the set.
    pub fn take_dirty_tiles(&mut self) -> Vec<u32> {
        let tiles: Vec<u32> = self.dirty.iter().enumerate().filter(|(_, &is_dirty)| is_dirty).map(|(tile, _)| tile as u32).collect();

        for flag in self.dirty.iter_mut() {
            *flag = false;
        }

        tiles
    }
}
