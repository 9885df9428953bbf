//! The keyed metadata store: an ordered dictionary of string keys to
//! arbitrary byte-blob values, persisted as a small region of its own
//! after the data blocks.

use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::io::{read_i32_be, write_i32_be};
use std::io::{Read, Write};

/// Predefined key under which the projection string lives, mirroring the
/// original library's `sif_get_projection`/`sif_set_projection` helpers.
pub const PROJECTION_KEY: &str = "_sif_proj";

/// Predefined key for the free-form agreement/license text, mirroring
/// `sif_get_agreement`/`sif_set_agreement`.
pub const AGREEMENT_KEY: &str = "_sif_agree";

/// An ordered key/value dictionary. Small enough in practice (a handful of
/// entries) that linear lookup beats the bookkeeping of a hash map, and
/// preserves insertion order the way the original library's append-only
/// on-disk layout does.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    entries: Vec<(String, Vec<u8>)>,
}

impl MetadataStore {
    pub fn new() -> Self {
        MetadataStore { entries: Vec::new() }
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(existing, _)| existing == key)
    }

    /// Raw binary lookup: the value as stored, with no NUL-termination
    /// assumption.
    pub fn get_binary(&self, key: &str) -> Result<&[u8]> {
        self.position(key).map(|index| self.entries[index].1.as_slice()).ok_or_else(|| Error::new(ErrorKind::MetadataKeyMissing))
    }

    /// Sets `key` to the raw bytes of `value`, overwriting any existing
    /// entry in place so key order is stable across updates.
    pub fn set_binary(&mut self, key: &str, value: &[u8]) {
        match self.position(key) {
            Some(index) => self.entries[index].1 = value.to_vec(),
            None => self.entries.push((key.to_owned(), value.to_vec())),
        }
    }

    /// String lookup: the value must end in a single NUL byte, which is
    /// stripped before UTF-8 validation.
    pub fn get_string(&self, key: &str) -> Result<&str> {
        let bytes = self.get_binary(key)?;
        let (last, body) = bytes.split_last().ok_or_else(|| Error::new(ErrorKind::MetadataValueInvalid))?;
        if *last != 0 {
            return Err(Error::new(ErrorKind::MetadataValueInvalid));
        }

        std::str::from_utf8(body).map_err(|_| Error::new(ErrorKind::MetadataValueInvalid))
    }

    /// Sets `key` to `value` plus a trailing NUL byte.
    pub fn set_string(&mut self, key: &str, value: &str) {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.set_binary(key, &bytes);
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// The projection string, or `""` if the key was never set. Mirrors
    /// `sif_get_projection`, which maps a missing key to the empty string
    /// rather than an error.
    pub fn projection(&self) -> Result<&str> {
        match self.get_string(PROJECTION_KEY) {
            Err(error) if error.kind == ErrorKind::MetadataKeyMissing => Ok(""),
            other => other,
        }
    }

    pub fn set_projection(&mut self, projection: &str) {
        self.set_string(PROJECTION_KEY, projection);
    }

    /// The agreement/license text, or `""` if the key was never set.
    /// Mirrors `sif_get_agreement`'s missing-key fallback.
    pub fn agreement(&self) -> Result<&str> {
        match self.get_string(AGREEMENT_KEY) {
            Err(error) if error.kind == ErrorKind::MetadataKeyMissing => Ok(""),
            other => other,
        }
    }

    pub fn set_agreement(&mut self, agreement: &str) {
        self.set_string(AGREEMENT_KEY, agreement);
    }

    /// Writes every entry at the current stream position, as
    /// `key_len, key_bytes, value_len, value_bytes` in insertion order.
    /// Does not write the item count; the header's `n_keys` field already
    /// carries it.
    pub fn write(&self, stream: &mut impl Write) -> UnitResult {
        for (key, value) in &self.entries {
            write_i32_be(stream, key.len() as i32)?;
            crate::io::write_all(stream, key.as_bytes())?;
            write_i32_be(stream, value.len() as i32)?;
            crate::io::write_all(stream, value)?;
        }

        Ok(())
    }

    /// Reads exactly `n_keys` entries from the current stream position.
    pub fn read(stream: &mut impl Read, n_keys: u32) -> Result<Self> {
        let mut entries = Vec::with_capacity(n_keys as usize);

        for _ in 0..n_keys {
            let key_len = read_i32_be(stream)?;
            let key_len = usize::try_from(key_len).map_err(|_| Error::new(ErrorKind::MetadataKeyMissing))?;
            let mut key_bytes = vec![0u8; key_len];
            crate::io::read_exact(stream, &mut key_bytes)?;
            let key = String::from_utf8(key_bytes).map_err(|_| Error::new(ErrorKind::MetadataKeyMissing))?;

            let value_len = read_i32_be(stream)?;
            let value_len = usize::try_from(value_len).map_err(|_| Error::new(ErrorKind::MetadataValueInvalid))?;
            let mut value = vec![0u8; value_len];
            crate::io::read_exact(stream, &mut value)?;

            entries.push((key, value));
        }

        Ok(MetadataStore { entries })
    }

    /// The exact byte size [`MetadataStore::write`] will produce, used to
    /// size the file for truncation after a write or defragment.
    pub fn encoded_len(&self) -> u64 {
        self.entries.iter().map(|(key, value)| 4 + key.len() as u64 + 4 + value.len() as u64).sum()
    }
}
