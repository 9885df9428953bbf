//! The fixed-layout file header: image geometry, mutable policy flags, and
//! the affine geo-transform. Lives at offset 0 of every SIF file.

use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::io::{read_f64_be, read_f64_native, read_i32_be, write_f64_be, write_f64_native, write_i32_be};
use crate::math::ceil_div;
use std::io::{Read, Write};

/// The 8-byte literal every SIF file begins with, immediately after `header_bytes`.
pub const MAGIC: [u8; 8] = *b"!**SIF**";

/// The legacy format version: the affine transform is stored in the
/// writing host's native byte order.
pub const FORMAT_VERSION_1: i32 = 1;

/// The current format version: the affine transform is stored big-endian,
/// like every other multi-byte value in the header.
pub const FORMAT_VERSION_2: i32 = 2;

/// The newest format version this implementation can read. Opening a file
/// whose `version` exceeds this fails with [`ErrorKind::IncompatibleVersion`].
pub const SUPPORTED_VERSION: i32 = FORMAT_VERSION_2;

/// Number of `i32` fields written after the version, in wire order.
const INT_FIELD_COUNT: u32 = 16;

/// The exact byte length of the header this implementation writes:
/// `header_bytes` (4) + magic (8) + version (4) + 16 ints (64) + 6 doubles (48).
pub const WRITTEN_HEADER_BYTES: u32 = 4 + 8 + 4 + INT_FIELD_COUNT * 4 + 6 * 8;

/// The identity affine transform: pixel coordinates map one-to-one onto the
/// geo-referenced plane.
pub const IDENTITY_TRANSFORM: [f64; 6] = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Fixed image geometry and mutable policy flags, as read from or about to
/// be written to offset 0 of the file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileHeader {
    /// The exact size in bytes of the header as written; also the offset of
    /// the tile-header table. Preserved verbatim across an open/flush cycle
    /// so a future larger header does not break older readers.
    pub header_bytes: u32,

    pub version: i32,

    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub data_unit_size: u32,

    /// Opaque tag the library never interprets; stored for the caller.
    pub user_data_type: i32,

    pub n_keys: u32,

    pub consolidate: bool,
    pub defragment: bool,
    pub intrinsic_write: bool,

    pub affine_geo_transform: [f64; 6],
}

impl FileHeader {
    /// Builds the header for a newly created file: no metadata keys yet,
    /// identity transform, current format version, and the policy flags
    /// the original library enables by default (consolidate and
    /// intrinsic_write on, defragment off).
    pub fn new(
        width: u32,
        height: u32,
        bands: u32,
        tile_width: u32,
        tile_height: u32,
        data_unit_size: u32,
        user_data_type: i32,
    ) -> Result<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(Error::new(ErrorKind::InvalidRegionSize));
        }

        if tile_width == 0 || tile_height == 0 {
            return Err(Error::new(ErrorKind::InvalidTileSize));
        }

        if data_unit_size == 0 {
            return Err(Error::new(ErrorKind::InvalidBuffer));
        }

        Ok(FileHeader {
            header_bytes: WRITTEN_HEADER_BYTES,
            version: SUPPORTED_VERSION,
            width,
            height,
            bands,
            tile_width,
            tile_height,
            data_unit_size,
            user_data_type,
            n_keys: 0,
            consolidate: true,
            defragment: false,
            intrinsic_write: true,
            affine_geo_transform: IDENTITY_TRANSFORM,
        })
    }

    pub fn n_tiles_across(&self) -> u32 {
        ceil_div(self.width, self.tile_width)
    }

    pub fn n_tiles_down(&self) -> u32 {
        ceil_div(self.height, self.tile_height)
    }

    pub fn n_tiles(&self) -> u32 {
        self.n_tiles_across() * self.n_tiles_down()
    }

    pub fn tile_bytes(&self) -> u64 {
        u64::from(self.tile_width) * u64::from(self.tile_height) * u64::from(self.bands) * u64::from(self.data_unit_size)
    }

    pub fn n_uniform_flags(&self) -> u32 {
        ceil_div(self.bands, 8)
    }

    /// The in-image pixel extent of `tile` (row-major index), clipped at the
    /// right/bottom image edge: `(min(tile_width, width - col*tile_width),
    /// min(tile_height, height - row*tile_height))`. Interior tiles always
    /// get the full tile size back.
    pub fn effective_tile_extent(&self, tile: u32) -> (u32, u32) {
        let n_tiles_across = self.n_tiles_across();
        let col = tile % n_tiles_across;
        let row = tile / n_tiles_across;
        let extent_x = self.tile_width.min(self.width - col * self.tile_width);
        let extent_y = self.tile_height.min(self.height - row * self.tile_height);
        (extent_x, extent_y)
    }

    pub fn tile_header_bytes(&self) -> u32 {
        self.bands * self.data_unit_size + self.n_uniform_flags() + 4
    }

    /// Offset of the first tile-header record; equals the on-disk `header_bytes` field.
    pub fn tile_header_table_offset(&self) -> u64 {
        u64::from(self.header_bytes)
    }

    /// Offset of block 0 in the data region: `header_bytes + n_tiles * tile_header_bytes`.
    pub fn base_location(&self) -> u64 {
        self.tile_header_table_offset() + u64::from(self.n_tiles()) * u64::from(self.tile_header_bytes())
    }

    /// Offset of data block `block`.
    pub fn block_offset(&self, block: u32) -> u64 {
        self.base_location() + u64::from(block) * self.tile_bytes()
    }

    fn validate_dimensions(&self) -> UnitResult {
        if self.width == 0 || self.height == 0 || self.bands == 0 {
            return Err(Error::new(ErrorKind::InvalidRegionSize));
        }

        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(Error::new(ErrorKind::InvalidTileSize));
        }

        Ok(())
    }

    /// Writes the fixed-layout header to the current stream position
    /// (always offset 0 in practice).
    pub fn write(&self, stream: &mut impl Write) -> UnitResult {
        self.validate_dimensions()?;

        write_i32_be(stream, self.header_bytes as i32)?;
        write_all_bytes(stream, &MAGIC)?;
        write_i32_be(stream, self.version)?;

        write_i32_be(stream, self.width as i32)?;
        write_i32_be(stream, self.height as i32)?;
        write_i32_be(stream, self.bands as i32)?;
        write_i32_be(stream, self.n_keys as i32)?;
        write_i32_be(stream, self.n_tiles() as i32)?;
        write_i32_be(stream, self.tile_width as i32)?;
        write_i32_be(stream, self.tile_height as i32)?;
        write_i32_be(stream, self.tile_bytes() as i32)?;
        write_i32_be(stream, self.n_tiles_across() as i32)?;
        write_i32_be(stream, self.data_unit_size as i32)?;
        write_i32_be(stream, self.user_data_type)?;
        write_i32_be(stream, self.defragment as i32)?;
        write_i32_be(stream, self.consolidate as i32)?;
        write_i32_be(stream, self.intrinsic_write as i32)?;
        write_i32_be(stream, self.tile_header_bytes() as i32)?;
        write_i32_be(stream, self.n_uniform_flags() as i32)?;

        if self.version <= FORMAT_VERSION_1 {
            for value in &self.affine_geo_transform {
                write_f64_native(stream, *value)?;
            }
        } else {
            for value in &self.affine_geo_transform {
                write_f64_be(stream, *value)?;
            }
        }

        Ok(())
    }

    /// Reads and validates the header from the current stream position.
    /// Rejects a mismatched magic number or a `version` newer than
    /// [`SUPPORTED_VERSION`].
    pub fn read(stream: &mut impl Read) -> Result<Self> {
        let header_bytes = read_i32_be(stream)?;

        let mut magic = [0u8; 8];
        crate::io::read_exact(stream, &mut magic)?;
        if magic != MAGIC {
            return Err(Error::new(ErrorKind::NullHeader));
        }

        let version = read_i32_be(stream)?;
        if version > SUPPORTED_VERSION {
            return Err(Error::new(ErrorKind::IncompatibleVersion));
        }

        let width = read_i32_be(stream)?;
        let height = read_i32_be(stream)?;
        let bands = read_i32_be(stream)?;
        let n_keys = read_i32_be(stream)?;
        let _n_tiles = read_i32_be(stream)?;
        let tile_width = read_i32_be(stream)?;
        let tile_height = read_i32_be(stream)?;
        let _tile_bytes = read_i32_be(stream)?;
        let _n_tiles_across = read_i32_be(stream)?;
        let data_unit_size = read_i32_be(stream)?;
        let user_data_type = read_i32_be(stream)?;
        let defragment = read_i32_be(stream)? != 0;
        let consolidate = read_i32_be(stream)? != 0;
        let intrinsic_write = read_i32_be(stream)? != 0;
        let _tile_header_bytes = read_i32_be(stream)?;
        let _n_uniform_flags = read_i32_be(stream)?;

        let mut affine_geo_transform = [0.0; 6];
        if version <= FORMAT_VERSION_1 {
            for value in affine_geo_transform.iter_mut() {
                *value = read_f64_native(stream)?;
            }
        } else {
            for value in affine_geo_transform.iter_mut() {
                *value = read_f64_be(stream)?;
            }
        }

        let header = FileHeader {
            header_bytes: positive(header_bytes)?,
            version,
            width: positive(width)?,
            height: positive(height)?,
            bands: positive(bands)?,
            tile_width: positive(tile_width)?,
            tile_height: positive(tile_height)?,
            data_unit_size: positive(data_unit_size)?,
            user_data_type,
            n_keys: positive(n_keys)?,
            consolidate,
            defragment,
            intrinsic_write,
            affine_geo_transform,
        };

        header.validate_dimensions()?;
        Ok(header)
    }
}

fn positive(value: i32) -> Result<u32> {
    if value < 0 {
        Err(Error::new(ErrorKind::InvalidRegionSize))
    } else {
        Ok(value as u32)
    }
}

fn write_all_bytes(stream: &mut impl Write, bytes: &[u8]) -> UnitResult {
    crate::io::write_all(stream, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> FileHeader {
        FileHeader::new(4, 4, 2, 2, 2, 1, 7).unwrap()
    }

    #[test]
    fn derived_geometry_matches_spec_example() {
        let header = sample_header();
        assert_eq!(header.n_tiles_across(), 2);
        assert_eq!(header.n_tiles_down(), 2);
        assert_eq!(header.n_tiles(), 4);
        assert_eq!(header.tile_bytes(), 2 * 2 * 2 * 1);
        assert_eq!(header.n_uniform_flags(), 1);
        assert_eq!(header.tile_header_bytes(), 2 * 1 + 1 + 4);
    }

    #[test]
    fn effective_tile_extent_clips_partial_edge_tiles() {
        // 5 wide, 3 tall, with 2x2 tiles: 3 tiles across, 2 tiles down, and
        // both the rightmost column and bottom row are partial.
        let header = FileHeader::new(5, 3, 1, 2, 2, 1, 0).unwrap();
        assert_eq!(header.effective_tile_extent(0), (2, 2)); // top-left, full
        assert_eq!(header.effective_tile_extent(2), (1, 2)); // top-right, clipped in x
        assert_eq!(header.effective_tile_extent(3), (2, 1)); // bottom-left, clipped in y
        assert_eq!(header.effective_tile_extent(5), (1, 1)); // bottom-right, clipped in both
    }

    #[test]
    fn round_trips_through_bytes() {
        let header = sample_header();
        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), WRITTEN_HEADER_BYTES as usize);

        let read_back = FileHeader::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(read_back, header);
    }

    #[test]
    fn rejects_wrong_magic() {
        let header = sample_header();
        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        buffer[4] = b'X'; // corrupt the first magic byte

        let error = FileHeader::read(&mut Cursor::new(buffer)).unwrap_err();
        assert_eq!(error.kind, ErrorKind::NullHeader);
    }

    #[test]
    fn rejects_future_version() {
        let header = sample_header();
        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();

        // the version field starts right after header_bytes (4) + magic (8)
        let version_offset = 12;
        buffer[version_offset..version_offset + 4].copy_from_slice(&(SUPPORTED_VERSION + 1).to_be_bytes());

        let error = FileHeader::read(&mut Cursor::new(buffer)).unwrap_err();
        assert_eq!(error.kind, ErrorKind::IncompatibleVersion);
    }

    #[test]
    fn version_1_doubles_use_host_endian() {
        let mut header = sample_header();
        header.version = FORMAT_VERSION_1;
        header.affine_geo_transform = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();

        let doubles_offset = buffer.len() - 6 * 8;
        let first_double_bytes = &buffer[doubles_offset..doubles_offset + 8];
        let expected = if cfg!(target_endian = "big") {
            1.0_f64.to_be_bytes()
        } else {
            1.0_f64.to_le_bytes()
        };
        assert_eq!(first_double_bytes, expected);

        let read_back = FileHeader::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(read_back.affine_geo_transform, header.affine_geo_transform);
    }
}
