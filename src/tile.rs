//! Per-tile header records: the uniformity bit flags, the uniform pixel
//! values they gate, and the data block each tile currently occupies.

use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::header::FileHeader;
use crate::io::{read_i32_be, write_i32_be};
use smallvec::SmallVec;
use std::io::{Read, Seek, Write};

/// Sentinel stored in a tile's `block_num`: no backing data block, either
/// because every band is uniform or the tile was never materialized.
pub const NO_BLOCK: i32 = -1;

/// One tile's header record: a bitset of which bands are uniform, the
/// uniform value for each such band, and the occupied block (or [`NO_BLOCK`]).
#[derive(Debug, Clone, PartialEq)]
pub struct TileHeader {
    /// One bit per band, MSB-first within each byte (bit `b` lives at byte
    /// `b / 8`, mask `0x80 >> (b % 8)`). Trailing padding bits beyond `bands`
    /// are unused and always left clear.
    uniform_flags: SmallVec<[u8; 4]>,

    /// `data_unit_size` bytes per band. Only the bytes belonging to a band
    /// whose uniform flag is set are meaningful.
    uniform_pixel_values: SmallVec<[u8; 32]>,

    pub block_num: i32,
}

impl TileHeader {
    /// A freshly created tile starts with every band uniform at the
    /// zero value and no backing block: an unwritten tile reads back as
    /// all zero pixels without occupying any data region space.
    pub fn new(header: &FileHeader) -> Self {
        TileHeader {
            uniform_flags: SmallVec::from_elem(0xFFu8, header.n_uniform_flags() as usize),
            uniform_pixel_values: SmallVec::from_elem(0u8, (header.bands * header.data_unit_size) as usize),
            block_num: NO_BLOCK,
        }
    }

    pub fn has_block(&self) -> bool {
        self.block_num != NO_BLOCK
    }

    pub fn is_uniform(&self, band: u32) -> bool {
        let byte = self.uniform_flags[(band / 8) as usize];
        let mask = 0x80u8 >> (band % 8);
        byte & mask != 0
    }

    pub fn set_uniform(&mut self, band: u32, uniform: bool) {
        let byte = &mut self.uniform_flags[(band / 8) as usize];
        let mask = 0x80u8 >> (band % 8);
        if uniform {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// True if every band in `0 .. bands` is uniform, meaning this tile
    /// needs no backing data block at all.
    pub fn is_fully_uniform(&self, bands: u32) -> bool {
        (0..bands).all(|band| self.is_uniform(band))
    }

    pub fn uniform_value(&self, band: u32, data_unit_size: u32) -> &[u8] {
        let start = (band * data_unit_size) as usize;
        &self.uniform_pixel_values[start..start + data_unit_size as usize]
    }

    pub fn set_uniform_value(&mut self, band: u32, data_unit_size: u32, value: &[u8]) {
        let start = (band * data_unit_size) as usize;
        self.uniform_pixel_values[start..start + data_unit_size as usize].copy_from_slice(value);
    }

    /// Wire order is `uniform_pixel_values`, then `uniform_flags`, then
    /// `block_num`, matching `_sif_write_tile_header`.
    pub fn write(&self, stream: &mut impl Write) -> UnitResult {
        crate::io::write_all(stream, &self.uniform_pixel_values)?;
        crate::io::write_all(stream, &self.uniform_flags)?;
        write_i32_be(stream, self.block_num)
    }

    pub fn read(stream: &mut impl Read, header: &FileHeader) -> Result<Self> {
        let mut uniform_pixel_values = SmallVec::from_elem(0u8, (header.bands * header.data_unit_size) as usize);
        crate::io::read_exact(stream, &mut uniform_pixel_values)?;

        let mut uniform_flags = SmallVec::from_elem(0u8, header.n_uniform_flags() as usize);
        crate::io::read_exact(stream, &mut uniform_flags)?;

        let block_num = read_i32_be(stream)?;

        Ok(TileHeader { uniform_flags, uniform_pixel_values, block_num })
    }
}

/// The full in-memory tile-header table, indexed by tile number in
/// row-major order (tile `y * n_tiles_across + x`).
#[derive(Debug)]
pub struct TileTable {
    tiles: Vec<TileHeader>,
}

impl TileTable {
    pub fn new_for_header(header: &FileHeader) -> Self {
        TileTable { tiles: (0..header.n_tiles()).map(|_| TileHeader::new(header)).collect() }
    }

    pub fn len(&self) -> u32 {
        self.tiles.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, tile: u32) -> Result<&TileHeader> {
        self.tiles.get(tile as usize).ok_or_else(|| Error::new(ErrorKind::InvalidTileNumber))
    }

    pub fn get_mut(&mut self, tile: u32) -> Result<&mut TileHeader> {
        self.tiles.get_mut(tile as usize).ok_or_else(|| Error::new(ErrorKind::InvalidTileNumber))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileHeader> {
        self.tiles.iter()
    }

    pub fn read(stream: &mut (impl Read + Seek), header: &FileHeader) -> Result<Self> {
        crate::io::seek_to(stream, header.tile_header_table_offset())?;

        let mut tiles = Vec::with_capacity(header.n_tiles() as usize);
        for _ in 0..header.n_tiles() {
            tiles.push(TileHeader::read(stream, header)?);
        }

        Ok(TileTable { tiles })
    }

    /// Writes every tile record through, in order, starting at the table offset.
    pub fn write_all(&self, stream: &mut (impl Write + Seek), header: &FileHeader) -> UnitResult {
        crate::io::seek_to(stream, header.tile_header_table_offset())?;
        for tile in &self.tiles {
            tile.write(stream)?;
        }
        Ok(())
    }

    /// Writes a single tile's record through, without disturbing its neighbors.
    pub fn write_one(&self, stream: &mut (impl Write + Seek), header: &FileHeader, tile: u32) -> UnitResult {
        let offset = header.tile_header_table_offset() + u64::from(tile) * u64::from(header.tile_header_bytes());
        crate::io::seek_to(stream, offset)?;
        self.get(tile)?.write(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> FileHeader {
        FileHeader::new(4, 4, 3, 2, 2, 2, 0).unwrap()
    }

    #[test]
    fn uniform_flags_are_msb_first_and_independent() {
        let mut tile = TileHeader::new(&header());
        tile.set_uniform(0, false);
        tile.set_uniform(1, false);
        tile.set_uniform(2, false);

        tile.set_uniform(0, true);
        assert!(tile.is_uniform(0));
        assert!(!tile.is_uniform(1));
        assert!(!tile.is_uniform(2));

        tile.set_uniform(2, true);
        assert!(tile.is_uniform(0));
        assert!(!tile.is_uniform(1));
        assert!(tile.is_uniform(2));

        tile.set_uniform(0, false);
        assert!(!tile.is_uniform(0));
        assert!(tile.is_uniform(2));
    }

    #[test]
    fn fully_uniform_requires_every_band() {
        let header = header();
        let mut tile = TileHeader::new(&header);
        assert!(tile.is_fully_uniform(header.bands));

        tile.set_uniform(1, false);
        assert!(!tile.is_fully_uniform(header.bands));

        tile.set_uniform(1, true);
        assert!(tile.is_fully_uniform(header.bands));
    }

    #[test]
    fn uniform_value_round_trips_per_band() {
        let header = header();
        let mut tile = TileHeader::new(&header);
        tile.set_uniform_value(1, header.data_unit_size, &[7, 9]);
        assert_eq!(tile.uniform_value(1, header.data_unit_size), &[7, 9]);
        assert_eq!(tile.uniform_value(0, header.data_unit_size), &[0, 0]);
    }

    #[test]
    fn tile_record_round_trips_through_bytes() {
        let header = header();
        let mut tile = TileHeader::new(&header);
        tile.set_uniform(1, true);
        tile.set_uniform_value(1, header.data_unit_size, &[3, 4]);
        tile.block_num = 5;

        let mut buffer = Vec::new();
        tile.write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), header.tile_header_bytes() as usize);

        let read_back = TileHeader::read(&mut Cursor::new(buffer), &header).unwrap();
        assert_eq!(read_back, tile);
    }

    #[test]
    fn table_rejects_out_of_range_tile_numbers() {
        let header = header();
        let table = TileTable::new_for_header(&header);
        let error = table.get(header.n_tiles()).unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidTileNumber);
    }

    #[test]
    fn table_round_trips_through_a_stream() {
        let header = header();
        let mut table = TileTable::new_for_header(&header);
        table.get_mut(0).unwrap().block_num = 2;
        table.get_mut(1).unwrap().set_uniform(0, true);

        let mut buffer = Cursor::new(vec![0u8; header.tile_header_table_offset() as usize + (header.n_tiles() * header.tile_header_bytes()) as usize]);
        table.write_all(&mut buffer, &header).unwrap();

        let read_back = TileTable::read(&mut buffer, &header).unwrap();
        assert_eq!(read_back.get(0).unwrap().block_num, 2);
        assert!(read_back.get(1).unwrap().is_uniform(0));
    }
}
