//! Song document model for the NBS note block format.
//!
//! This crate defines the in-memory representation: a fixed grid of time
//! ticks, ordered layers holding sparse notes, a custom instrument table,
//! and a piecewise-constant tempo timeline. Format codecs build songs
//! through [`SongBuilder`] and read them back through [`Song`] accessors;
//! a built song is immutable.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod error;
mod instrument;
mod layer;
mod metadata;
mod note;
mod song;
mod tempo;
mod timeline;

pub use error::{ModelError, Validation};
pub use instrument::{CustomInstrument, TEMPO_CHANGER_NAME};
pub use layer::Layer;
pub use metadata::SongMetadata;
pub use note::{Note, MAX_KEY, MAX_PANNING, MAX_VOLUME, MIN_KEY};
pub use song::{Song, SongBuilder};
pub use tempo::{TempoMap, DEFAULT_TEMPO, INITIAL_TEMPO_TICK};
pub use timeline::TickIndex;
