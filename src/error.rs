//! The stable error taxonomy shared by every public operation.
//!
//! Mirrors the `SIF_ERROR_*` status codes of the original C library: each
//! variant here is the same concept, not a renumbering exercise, so that a
//! caller porting error-handling logic from the original format's
//! documentation can match codes one-to-one.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// A result for operations that, on success, produce no value.
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;

/// The stable kind of a failure. `Copy` and exhaustively matchable so a
/// caller can branch on it without downcasting.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// No error. Not normally constructed directly; see [`Error::is_none`].
    None,

    /// An allocation failed (a vector could not be grown to the required size).
    Memory,

    /// The file handle passed to an operation was null or already closed.
    NullFile,

    /// The in-memory header was null (the handle was not fully constructed).
    NullHeader,

    /// A block number outside `0 .. n_tiles` was referenced.
    InvalidBlockNumber,

    /// A tile number outside `0 .. n_tiles` was referenced.
    InvalidTileNumber,

    /// The underlying storage could not be read.
    Read,

    /// The underlying storage could not be written.
    Write,

    /// The underlying storage could not be seeked.
    Seek,

    /// The underlying storage could not be truncated.
    Truncate,

    /// An operation that requires a writable handle was attempted on a read-only one.
    InvalidFileMode,

    /// The file's format version is newer than this implementation understands.
    IncompatibleVersion,

    /// A metadata lookup did not find the requested key.
    MetadataKeyMissing,

    /// A metadata value was requested as a string but is not NUL-terminated.
    MetadataValueInvalid,

    /// The requested format version cannot be written by this implementation.
    CannotWriteVersion,

    /// A band index outside `0 .. bands` was referenced.
    InvalidBand,

    /// A pixel coordinate fell outside the image extent.
    InvalidCoord,

    /// `tile_width` or `tile_height` was not positive.
    InvalidTileSize,

    /// A requested raster window had a non-positive width or height,
    /// or did not fit inside the image.
    InvalidRegionSize,

    /// A caller-supplied buffer was smaller than the operation requires.
    InvalidBuffer,
}

impl ErrorKind {
    pub fn description(self) -> &'static str {
        use ErrorKind::*;
        match self {
            None => "no error",
            Memory => "memory allocation failed",
            NullFile => "file handle is null",
            NullHeader => "header is null",
            InvalidBlockNumber => "invalid block number",
            InvalidTileNumber => "invalid tile number",
            Read => "read error",
            Write => "write error",
            Seek => "seek error",
            Truncate => "truncate error",
            InvalidFileMode => "operation not permitted in this file mode",
            IncompatibleVersion => "incompatible format version",
            MetadataKeyMissing => "metadata key not found",
            MetadataValueInvalid => "metadata value is not a valid string",
            CannotWriteVersion => "cannot write requested format version",
            InvalidBand => "invalid band index",
            InvalidCoord => "invalid pixel coordinate",
            InvalidTileSize => "invalid tile size",
            InvalidRegionSize => "invalid region size",
            InvalidBuffer => "buffer too small",
        }
    }
}

/// An error produced by a `sif` operation. Carries the stable [`ErrorKind`]
/// plus, where available, the underlying I/O error that caused it.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub(crate) io: Option<IoError>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, io: None }
    }

    pub(crate) fn io(kind: ErrorKind, io: IoError) -> Self {
        Error { kind, io: Some(io) }
    }

    pub fn is_none(&self) -> bool {
        self.kind == ErrorKind::None
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.io {
            Some(io) => write!(f, "{}: {}", self.kind.description(), io),
            None => write!(f, "{}", self.kind.description()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.io.as_ref().map(|io| io as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}
