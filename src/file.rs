//! [`SifFile`]: the owned handle that wires the header, tile table, block
//! allocator, and metadata store together into the lifecycle described by
//! the rest of the crate.

use crate::block::BlockAllocator;
use crate::defragment;
use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::header::FileHeader;
use crate::io::{self, DataEndian, Truncatable};
use crate::metadata::MetadataStore;
use crate::raster;
use crate::slice;
use crate::tile::{TileTable, NO_BLOCK};
use crate::uniformity::{self, scan_and_promote, DirtySet};
use std::io::{Read, Seek, Write};

/// An open SIF file: the in-memory header, tile table, block allocator,
/// and metadata store, plus the stream they're backed by.
///
/// Generic over the backing stream so the same logic drives both a real
/// file on disk and an in-memory `Cursor<Vec<u8>>` in tests. Carries no
/// `Drop` impl: an unflushed handle that is simply dropped loses whatever
/// writes [`SifFile::flush`] or [`SifFile::close`] would have persisted.
/// `SifFile<F>` is `Send` whenever `F` is, and deliberately never `Sync` —
/// concurrent access from multiple threads is out of scope.
pub struct SifFile<F> {
    stream: F,
    header: FileHeader,
    table: TileTable,
    allocator: BlockAllocator,
    metadata: MetadataStore,
    dirty: DirtySet,
    read_only: bool,
    data_endian: DataEndian,
    last_error: ErrorKind,
}

impl<F> SifFile<F> {
    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        self.last_error = match &result {
            Ok(_) => ErrorKind::None,
            Err(error) => error.kind,
        };
        result
    }

    /// The last error recorded by any operation on this handle, mirroring
    /// `sif_get_error_description`'s "sticky" status field.
    pub fn last_error(&self) -> ErrorKind {
        self.last_error
    }

    pub fn error_description(&self) -> &'static str {
        self.last_error.description()
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn bands(&self) -> u32 {
        self.header.bands
    }

    pub fn tile_width(&self) -> u32 {
        self.header.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.header.tile_height
    }

    pub fn data_unit_size(&self) -> u32 {
        self.header.data_unit_size
    }

    pub fn user_data_type(&self) -> i32 {
        self.header.user_data_type
    }

    pub fn set_user_data_type(&mut self, user_data_type: i32) {
        self.header.user_data_type = user_data_type;
    }

    pub fn version(&self) -> i32 {
        self.header.version
    }

    pub fn n_tiles(&self) -> u32 {
        self.header.n_tiles()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn data_endian(&self) -> DataEndian {
        self.data_endian
    }

    pub fn consolidate_enabled(&self) -> bool {
        self.header.consolidate
    }

    pub fn set_consolidate_enabled(&mut self, enabled: bool) {
        self.header.consolidate = enabled;
    }

    pub fn defragment_enabled(&self) -> bool {
        self.header.defragment
    }

    pub fn set_defragment_enabled(&mut self, enabled: bool) {
        self.header.defragment = enabled;
    }

    pub fn intrinsic_write_enabled(&self) -> bool {
        self.header.intrinsic_write
    }

    pub fn set_intrinsic_write_enabled(&mut self, enabled: bool) {
        self.header.intrinsic_write = enabled;
    }

    pub fn affine_geo_transform(&self) -> [f64; 6] {
        self.header.affine_geo_transform
    }

    pub fn set_affine_geo_transform(&mut self, transform: [f64; 6]) {
        self.header.affine_geo_transform = transform;
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn get_meta_data(&mut self, key: &str) -> Result<&str> {
        let result = self.metadata.get_string(key);
        self.finish(result)
    }

    pub fn get_meta_data_binary(&mut self, key: &str) -> Result<&[u8]> {
        let result = self.metadata.get_binary(key);
        self.finish(result)
    }

    pub fn set_meta_data(&mut self, key: &str, value: &str) {
        self.metadata.set_string(key, value);
        self.header.n_keys = self.metadata.len();
    }

    pub fn set_meta_data_binary(&mut self, key: &str, value: &[u8]) {
        self.metadata.set_binary(key, value);
        self.header.n_keys = self.metadata.len();
    }

    pub fn remove_meta_data_item(&mut self, key: &str) -> bool {
        let removed = self.metadata.remove(key);
        self.header.n_keys = self.metadata.len();
        removed
    }

    pub fn meta_data_keys(&self) -> impl Iterator<Item = &str> {
        self.metadata.keys()
    }

    pub fn meta_data_num_items(&self) -> u32 {
        self.metadata.len()
    }

    pub fn projection(&mut self) -> Result<&str> {
        let result = self.metadata.projection();
        self.finish(result)
    }

    pub fn set_projection(&mut self, projection: &str) {
        self.metadata.set_projection(projection);
        self.header.n_keys = self.metadata.len();
    }

    pub fn agreement(&mut self) -> Result<&str> {
        let result = self.metadata.agreement();
        self.finish(result)
    }

    pub fn set_agreement(&mut self, agreement: &str) {
        self.metadata.set_agreement(agreement);
        self.header.n_keys = self.metadata.len();
    }

    /// Whether one tile's band is "shallow" uniform: the tile header says
    /// so, without looking at the data region. If it is, copies the
    /// uniform value into `out`.
    pub fn is_slice_shallow_uniform(&mut self, tile: u32, band: u32, out: &mut [u8]) -> Result<bool> {
        let result = (|| {
            if tile >= self.header.n_tiles() {
                return Err(Error::new(ErrorKind::InvalidTileNumber));
            }
            if band >= self.header.bands {
                return Err(Error::new(ErrorKind::InvalidBand));
            }
            if out.len() != self.header.data_unit_size as usize {
                return Err(Error::new(ErrorKind::InvalidBuffer));
            }
            Ok(uniformity::is_slice_shallow_uniform(self.table.get(tile)?, band, self.header.data_unit_size, out))
        })();
        self.finish(result)
    }

    /// Whether an entire pixel window is shallow uniform: every tile the
    /// window overlaps is shallow uniform in `band` and shares the same
    /// value, checked purely from tile headers. If it is, copies the
    /// shared value into `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn is_shallow_uniform(&mut self, x: u32, y: u32, width: u32, height: u32, band: u32, out: &mut [u8]) -> Result<bool> {
        let result = uniformity::is_shallow_uniform_window(&self.header, &self.table, x, y, width, height, band, out);
        self.finish(result)
    }

    /// Offset in the backing stream one byte past the last byte this file
    /// currently occupies: the end of the metadata region.
    fn metadata_offset(&self) -> u64 {
        let live_blocks = self.allocator.last_used_block().map_or(0, |block| u64::from(block) + 1);
        self.header.base_location() + live_blocks * self.header.tile_bytes()
    }

    fn write_header_and_table(&mut self) -> UnitResult
    where
        F: Write + Seek,
    {
        io::seek_to(&mut self.stream, 0)?;
        self.header.write(&mut self.stream)?;
        self.table.write_all(&mut self.stream, &self.header)
    }

    fn write_metadata(&mut self) -> UnitResult
    where
        F: Write + Seek,
    {
        let offset = self.metadata_offset();
        io::seek_to(&mut self.stream, offset)?;
        self.metadata.write(&mut self.stream)
    }
}

impl<F: Write + Seek> SifFile<F> {
    /// Creates a new, empty SIF file: every pixel reads back as zero, and
    /// no data blocks are allocated until something is written.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        stream: F,
        width: u32,
        height: u32,
        bands: u32,
        tile_width: u32,
        tile_height: u32,
        data_unit_size: u32,
        user_data_type: i32,
        data_endian: DataEndian,
    ) -> Result<Self> {
        let header = FileHeader::new(width, height, bands, tile_width, tile_height, data_unit_size, user_data_type)?;
        let table = TileTable::new_for_header(&header);
        let allocator = BlockAllocator::new(header.n_tiles());
        let dirty = DirtySet::new(header.n_tiles());

        let mut file = SifFile {
            stream,
            header,
            table,
            allocator,
            metadata: MetadataStore::new(),
            dirty,
            read_only: false,
            data_endian,
            last_error: ErrorKind::None,
        };

        file.write_header_and_table()?;
        file.write_metadata()?;
        io::flush(&mut file.stream)?;

        log::debug!("created sif file: {}x{}x{}, tile {}x{}", width, height, bands, tile_width, tile_height);
        Ok(file)
    }
}

impl<F: Read + Write + Seek> SifFile<F> {
    /// Opens an existing SIF file. `read_only` only gates this crate's own
    /// write operations; it does not change how the stream itself was
    /// opened at the OS level.
    pub fn open(mut stream: F, read_only: bool, data_endian: DataEndian) -> Result<Self> {
        io::seek_to(&mut stream, 0)?;
        let header = FileHeader::read(&mut stream)?;

        let table = TileTable::read(&mut stream, &header)?;
        let allocator = BlockAllocator::from_tile_blocks(table.iter().map(|record| record.block_num), header.n_tiles())?;
        let dirty = DirtySet::new(header.n_tiles());

        let mut file = SifFile {
            stream,
            header,
            table,
            allocator,
            metadata: MetadataStore::new(),
            dirty,
            read_only,
            data_endian,
            last_error: ErrorKind::None,
        };

        let metadata_offset = file.metadata_offset();
        io::seek_to(&mut file.stream, metadata_offset)?;
        file.metadata = MetadataStore::read(&mut file.stream, file.header.n_keys)?;

        log::debug!("opened sif file: version={} tiles={}", file.header.version, file.header.n_tiles());
        Ok(file)
    }

    /// Creates `dest` as an exact copy of `source`'s current, flushed
    /// contents, then opens it.
    pub fn create_copy<R: Read + Write + Seek + Truncatable>(source: &mut SifFile<R>, mut dest: F) -> Result<Self> {
        source.flush()?;

        let total_len = source.metadata_offset() + source.metadata.encoded_len();
        let mut buffer = vec![0u8; total_len as usize];
        io::seek_to(&mut source.stream, 0)?;
        io::read_exact(&mut source.stream, &mut buffer)?;

        io::seek_to(&mut dest, 0)?;
        io::write_all(&mut dest, &buffer)?;
        io::flush(&mut dest)?;

        log::debug!("created copy of sif file ({} bytes)", total_len);
        Self::open(dest, false, source.data_endian)
    }

    fn require_writable(&self) -> UnitResult {
        if self.read_only {
            Err(Error::new(ErrorKind::InvalidFileMode))
        } else {
            Ok(())
        }
    }

    pub fn get_tile_slice(&mut self, tile: u32, band: u32, out: &mut [u8]) -> UnitResult {
        let result = slice::get_tile_slice(&mut self.stream, &self.header, &self.table, tile, band, out);
        self.finish(result)
    }

    pub fn set_tile_slice(&mut self, tile: u32, band: u32, data: &[u8]) -> UnitResult {
        let intrinsic_write = self.header.intrinsic_write;
        let result = (|| {
            self.require_writable()?;
            slice::set_tile_slice(&mut self.stream, &self.header, &mut self.table, &mut self.allocator, &mut self.dirty, tile, band, data, intrinsic_write)
        })();
        self.finish(result)
    }

    pub fn fill_tile_slice(&mut self, tile: u32, band: u32, value: &[u8]) -> UnitResult {
        let intrinsic_write = self.header.intrinsic_write;
        let result = (|| {
            self.require_writable()?;
            slice::fill_tile_slice(&mut self.stream, &self.header, &mut self.table, &mut self.allocator, tile, band, value, intrinsic_write)
        })();
        self.finish(result)
    }

    pub fn fill_tiles(&mut self, tiles: impl Iterator<Item = u32>, values: &[&[u8]]) -> UnitResult {
        let intrinsic_write = self.header.intrinsic_write;
        let result = (|| {
            self.require_writable()?;
            slice::fill_tiles(&mut self.stream, &self.header, &mut self.table, &mut self.allocator, tiles, values, intrinsic_write)
        })();
        self.finish(result)
    }

    pub fn get_raster(&mut self, x: u32, y: u32, width: u32, height: u32, out: &mut [u8]) -> UnitResult {
        let result = raster::get_raster(&mut self.stream, &self.header, &self.table, x, y, width, height, out);
        self.finish(result)
    }

    pub fn set_raster(&mut self, x: u32, y: u32, width: u32, height: u32, data: &[u8]) -> UnitResult {
        let intrinsic_write = self.header.intrinsic_write;
        let result = (|| {
            self.require_writable()?;
            raster::set_raster(&mut self.stream, &self.header, &mut self.table, &mut self.allocator, &mut self.dirty, x, y, width, height, data, intrinsic_write)
        })();
        self.finish(result)
    }

    /// Re-scans every tile written to since the last consolidation and
    /// frees the block of any that turned out to have become fully
    /// uniform. A no-op if consolidation is disabled, the handle is
    /// read-only, or nothing is dirty.
    pub fn consolidate(&mut self) -> UnitResult {
        let result = (|| {
            if self.read_only || !self.header.consolidate {
                return Ok(());
            }

            let dirty_tiles = self.dirty.take_dirty_tiles();
            log::trace!("consolidating {} dirty tile(s)", dirty_tiles.len());

            for tile in dirty_tiles {
                let block_num = self.table.get(tile)?.block_num;
                if block_num == NO_BLOCK {
                    continue;
                }

                let mut buffer = vec![0u8; self.header.tile_bytes() as usize];
                io::seek_to(&mut self.stream, self.header.block_offset(block_num as u32))?;
                io::read_exact(&mut self.stream, &mut buffer)?;

                let record = self.table.get_mut(tile)?;
                if scan_and_promote(record, &buffer, &self.header, tile) {
                    self.allocator.free(block_num as u32);
                    record.block_num = NO_BLOCK;
                }

                self.table.write_one(&mut self.stream, &self.header, tile)?;
            }

            Ok(())
        })();
        self.finish(result)
    }

    /// Packs every live block down to the front of the data region and
    /// truncates the file to its new, live size.
    pub fn defragment(&mut self) -> UnitResult
    where
        F: Truncatable,
    {
        let result = (|| {
            self.require_writable()?;
            let new_size = defragment::defragment(&mut self.stream, &self.header, &mut self.table, &mut self.allocator, &self.metadata)?;
            self.stream.truncate(new_size)?;
            log::debug!("defragmented sif file: new size {} bytes", new_size);
            Ok(())
        })();
        self.finish(result)
    }

    /// Consolidates, optionally defragments (if that policy flag is set),
    /// and rewrites the metadata region, truncating away any stale bytes
    /// past it.
    pub fn flush(&mut self) -> UnitResult
    where
        F: Truncatable,
    {
        let result = (|| {
            self.require_writable()?;
            self.consolidate()?;

            if self.header.defragment {
                self.defragment()?;
            } else {
                let offset = self.metadata_offset();
                io::seek_to(&mut self.stream, offset)?;
                self.metadata.write(&mut self.stream)?;
                self.stream.truncate(offset + self.metadata.encoded_len())?;
            }

            io::flush(&mut self.stream)?;
            log::debug!("flushed sif file");
            Ok(())
        })();
        self.finish(result)
    }

    /// Flushes and consumes the handle. There is no `Drop`-based flush:
    /// a handle that is merely dropped loses any unwritten metadata or
    /// pending consolidation.
    pub fn close(mut self) -> UnitResult
    where
        F: Truncatable,
    {
        self.flush()
    }
}

/// Peeks at the start of a stream to check for the SIF magic number,
/// without fully parsing or validating the header. Restores the stream's
/// original position on success; leaves it wherever the failed read left
/// it on failure, since the caller is about to give up on the stream anyway.
pub fn is_possibly_sif(stream: &mut (impl Read + Seek)) -> bool {
    let probe = || -> UnitResult {
        let start = stream.stream_position().map_err(|io| Error::io(ErrorKind::Seek, io))?;
        io::seek_to(stream, 4)?;

        let mut magic = [0u8; 8];
        io::read_exact(stream, &mut magic)?;
        if magic != crate::header::MAGIC {
            return Err(Error::new(ErrorKind::NullHeader));
        }

        io::seek_to(stream, start)
    };

    probe().is_ok()
}
