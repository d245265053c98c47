//! NBS binary format reader and writer.
//!
//! Decodes all five NBS revisions (plus the pre-versioned legacy layout)
//! into [`nb_song::Song`], and encodes a song at any target revision,
//! dropping only what that revision cannot express.

mod nbs_format;
mod tempo_marker;

pub use nbs_format::{load_nbs, read_nbs, song_to_nbs, write_nbs, NbsVersion};

use nb_song::ModelError;
use thiserror::Error;

/// The structural reason a byte stream failed to decode.
#[derive(Debug, Error)]
pub enum CorruptKind {
    /// The stream ended inside a field or before the terminators.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A string carried a negative length prefix.
    #[error("string length {0} is negative")]
    StringLength(i32),

    /// The header declared a revision this codec does not know.
    #[error("unsupported format revision {0}")]
    UnsupportedRevision(u8),

    /// A tick jump pushed the running position out of range.
    #[error("tick jump {0} overflowed the running position")]
    TickJump(i16),

    /// A layer jump pushed the running index out of range.
    #[error("layer jump {0} moved the running layer index out of range")]
    LayerJump(i16),

    /// Decoded values violated the song model's contract.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors surfaced by the reader and writer.
#[derive(Debug, Error)]
pub enum NbsError {
    /// The stream is structurally broken. Decoding aborts on the first
    /// such failure; no partial song is ever produced.
    #[error("corrupted song: {0}")]
    Corrupted(#[from] CorruptKind),

    /// The underlying source or sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
