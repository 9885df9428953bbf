//! End-to-end lifecycle tests against a real file on disk.

use rand::Rng;
use sif::io::{adapt_pixel_bytes, DataEndian};
use sif::prelude::*;
use std::fs::OpenOptions;

fn temp_path() -> tempfile::TempPath {
    tempfile::NamedTempFile::new().unwrap().into_temp_path()
}

fn create_rw(path: &std::path::Path) -> std::fs::File {
    OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path).unwrap()
}

fn reopen_rw(path: &std::path::Path) -> std::fs::File {
    OpenOptions::new().read(true).write(true).open(path).unwrap()
}

#[test]
fn create_write_flush_reopen_round_trips_a_full_raster() {
    let path = temp_path();

    {
        let mut file = SifFile::create(create_rw(&path), 6, 5, 2, 4, 4, 2, 0, DataEndian::host()).unwrap();

        let plane_len = 6 * 5;
        let mut data = vec![0u8; 2 * plane_len * 2];
        for (index, byte) in data.iter_mut().enumerate() {
            *byte = (index % 251) as u8;
        }

        file.set_raster(0, 0, 6, 5, &data).unwrap();
        file.close().unwrap();
    }

    let mut reopened = SifFile::open(reopen_rw(&path), false, DataEndian::host()).unwrap();
    let plane_len = 6 * 5;
    let mut out = vec![0u8; 2 * plane_len * 2];
    reopened.get_raster(0, 0, 6, 5, &mut out).unwrap();

    let mut expected = vec![0u8; 2 * plane_len * 2];
    for (index, byte) in expected.iter_mut().enumerate() {
        *byte = (index % 251) as u8;
    }
    assert_eq!(out, expected);
}

#[test]
fn uniform_fill_then_flush_produces_a_minimal_file_on_disk() {
    let path = temp_path();

    let mut file = SifFile::create(create_rw(&path), 64, 64, 1, 8, 8, 4, 0, DataEndian::host()).unwrap();
    let tiles = 0..file.n_tiles();
    file.fill_tiles(tiles, &[&[0, 0, 0, 0]]).unwrap();
    file.flush().unwrap();

    let on_disk_len = std::fs::metadata(&path).unwrap().len();
    // no tile should have materialized a block: the file is just header +
    // tile-header table + (empty) metadata.
    assert!(on_disk_len < (64 * 64 * 4) as u64);
}

#[test]
fn writing_one_pixel_breaks_uniformity_and_consolidation_restores_it() {
    let path = temp_path();
    let mut file = SifFile::create(create_rw(&path), 8, 8, 1, 8, 8, 1, 0, DataEndian::host()).unwrap();
    let mut out = [0u8];

    assert!(file.is_slice_shallow_uniform(0, 0, &mut out).unwrap());

    // intrinsic_write defaults to on: a uniform whole-tile write takes the
    // header-only fast path and never allocates a block.
    file.set_tile_slice(0, 0, &vec![0u8; 64]).unwrap();
    file.flush().unwrap();
    assert!(file.is_slice_shallow_uniform(0, 0, &mut out).unwrap());

    let mut plane = vec![0u8; 64];
    plane[10] = 1;
    file.set_tile_slice(0, 0, &plane).unwrap();
    assert!(!file.is_slice_shallow_uniform(0, 0, &mut out).unwrap());

    plane[10] = 0;
    file.set_tile_slice(0, 0, &plane).unwrap();
    file.flush().unwrap();
    assert!(file.is_slice_shallow_uniform(0, 0, &mut out).unwrap());
}

#[test]
fn writing_non_uniform_data_with_intrinsic_write_disabled_requires_consolidation() {
    let path = temp_path();
    let mut file = SifFile::create(create_rw(&path), 8, 8, 1, 8, 8, 1, 0, DataEndian::host()).unwrap();
    file.set_intrinsic_write_enabled(false);

    let mut plane = vec![5u8; 64];
    plane[10] = 9;
    file.set_tile_slice(0, 0, &plane).unwrap();

    plane[10] = 5;
    file.set_tile_slice(0, 0, &plane).unwrap();

    let mut out = [0u8];
    assert!(!file.is_slice_shallow_uniform(0, 0, &mut out).unwrap());

    file.consolidate().unwrap();
    assert!(file.is_slice_shallow_uniform(0, 0, &mut out).unwrap());
    assert_eq!(out, [5]);
}

#[test]
fn defragment_then_reopen_preserves_pixel_data() {
    let path = temp_path();

    {
        let mut file = SifFile::create(create_rw(&path), 16, 8, 1, 8, 8, 1, 0, DataEndian::host()).unwrap();
        let mut rng = rand::rng();
        let mut tile0 = vec![0u8; 64];
        let mut tile1 = vec![0u8; 64];
        rng.fill(tile0.as_mut_slice());
        rng.fill(tile1.as_mut_slice());
        // guarantee neither tile is accidentally uniform
        tile0[0] = 1;
        tile0[1] = 2;
        tile1[0] = 3;
        tile1[1] = 4;

        file.set_tile_slice(0, 0, &tile0).unwrap();
        file.set_tile_slice(1, 0, &tile1).unwrap();
        file.fill_tile_slice(0, 0, &[0]).unwrap();
        file.consolidate().unwrap();
        file.defragment().unwrap();
        file.close().unwrap();

        let mut reopened = SifFile::open(reopen_rw(&path), false, DataEndian::host()).unwrap();
        let mut out = vec![0u8; 64];
        reopened.get_tile_slice(1, 0, &mut out).unwrap();
        assert_eq!(out, tile1);
    }
}

#[test]
fn metadata_survives_a_full_close_and_reopen_cycle() {
    let path = temp_path();

    {
        let mut file = SifFile::create(create_rw(&path), 2, 2, 1, 2, 2, 1, 0, DataEndian::host()).unwrap();
        file.set_projection("EPSG:32633");
        file.set_agreement("CC0");
        file.set_meta_data_binary("checksum", &[0xDE, 0xAD, 0x00, 0xBE, 0xEF]);
        file.close().unwrap();
    }

    let mut reopened = SifFile::open(reopen_rw(&path), false, DataEndian::host()).unwrap();
    assert_eq!(reopened.projection().unwrap(), "EPSG:32633");
    assert_eq!(reopened.agreement().unwrap(), "CC0");
    assert_eq!(reopened.get_meta_data_binary("checksum").unwrap(), &[0xDE, 0xAD, 0x00, 0xBE, 0xEF]);
    assert!(reopened.remove_meta_data_item("checksum"));
    assert_eq!(reopened.meta_data_num_items(), 2);
}

#[test]
fn pixel_bytes_adapt_between_declared_and_host_endian() {
    let foreign = if DataEndian::host() == DataEndian::Big { DataEndian::Little } else { DataEndian::Big };

    let path = temp_path();
    let mut file = SifFile::create(create_rw(&path), 2, 1, 1, 2, 1, 4, 0, foreign).unwrap();
    assert_eq!(file.data_endian(), foreign);

    // a caller storing 4-byte pixels declared as `foreign`-endian is
    // responsible for adapting to host order itself before interpreting
    // them as, say, an i32 — the core format stores whatever bytes it's
    // given.
    let value: i32 = 1;
    let mut bytes = if foreign == DataEndian::Big { value.to_be_bytes() } else { value.to_le_bytes() };
    adapt_pixel_bytes(&mut bytes, 4, foreign);
    assert_eq!(i32::from_ne_bytes(bytes), value);
}

#[test]
fn invalid_region_is_rejected_without_touching_the_file() {
    let path = temp_path();
    let mut file = SifFile::create(create_rw(&path), 4, 4, 1, 2, 2, 1, 0, DataEndian::host()).unwrap();

    let error = file.set_raster(3, 3, 2, 2, &[1, 2, 3, 4]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::InvalidCoord);
}
