//! A note placed at one (tick, layer) coordinate.

use crate::error::{bounded, ModelError, Validation};

/// Lowest valid piano key (A0).
pub const MIN_KEY: u8 = 0;
/// Highest valid piano key (C8).
pub const MAX_KEY: u8 = 87;
/// Largest panning magnitude; 0 is center.
pub const MAX_PANNING: i8 = 100;
/// Largest note or layer volume.
pub const MAX_VOLUME: u8 = 100;

/// A single note.
///
/// `instrument` indexes the built-in palette, or — when
/// `custom_instrument` is set — the song's custom instrument table. The
/// two index spaces are independent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Note {
    /// Index into the built-in palette or the song's custom table
    pub instrument: u8,
    /// Which table `instrument` points into
    pub custom_instrument: bool,
    /// Piano key, 0 (A0) to 87 (C8)
    pub key: u8,
    /// Fine pitch offset; 100 units = one semitone
    pub pitch: i16,
    /// Stereo position in [-100; 100], 0 = center
    pub panning: i8,
    /// Volume, 0 to 100
    pub volume: u8,
}

impl Default for Note {
    fn default() -> Self {
        Self {
            instrument: 0,
            custom_instrument: false,
            key: 45,
            pitch: 0,
            panning: 0,
            volume: 100,
        }
    }
}

impl Note {
    /// Create a note with default pitch, panning and volume.
    pub fn new(instrument: u8, custom_instrument: bool, key: u8) -> Self {
        Self {
            instrument,
            custom_instrument,
            key,
            ..Self::default()
        }
    }

    /// Normalize the bounded fields under the given policy.
    pub fn normalized(mut self, policy: Validation) -> Result<Self, ModelError> {
        self.key = bounded(policy, "key", self.key as i64, MIN_KEY as i64, MAX_KEY as i64)? as u8;
        self.volume = bounded(policy, "volume", self.volume as i64, 0, MAX_VOLUME as i64)? as u8;
        self.panning = bounded(
            policy,
            "panning",
            self.panning as i64,
            -(MAX_PANNING as i64),
            MAX_PANNING as i64,
        )? as i8;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let note = Note::default();
        assert_eq!(note.key, 45);
        assert_eq!(note.volume, 100);
        assert_eq!(note.panning, 0);
        assert_eq!(note.pitch, 0);
        assert!(!note.custom_instrument);
    }

    #[test]
    fn clamp_normalization() {
        let mut note = Note::new(0, false, 120);
        note.volume = 200;
        note.panning = 100;
        let note = note.normalized(Validation::Clamp).unwrap();
        assert_eq!(note.key, MAX_KEY);
        assert_eq!(note.volume, MAX_VOLUME);
        assert_eq!(note.panning, 100);
    }

    #[test]
    fn strict_normalization_rejects() {
        let note = Note::new(0, false, 120);
        assert!(matches!(
            note.normalized(Validation::Strict),
            Err(ModelError::ValueOutOfRange { field: "key", .. })
        ));
    }
}
