//! Song-local custom instrument definitions.

use alloc::string::String;

use crate::error::{bounded, ModelError, Validation};
use crate::note::{MAX_KEY, MIN_KEY};

/// Reserved custom-instrument name used to carry tempo automation through
/// format revisions that only support a single initial tempo.
pub const TEMPO_CHANGER_NAME: &str = "Tempo Changer";

/// A custom instrument. Its position in the song's list is the index that
/// notes with the custom-instrument discriminator reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomInstrument {
    /// Display name
    pub name: String,
    /// Playback sample file name
    pub file_name: String,
    /// Piano key the sample is pitched at, 0 (A0) to 87 (C8)
    pub key: u8,
    /// Whether the editor should press the piano key during playback
    pub press_key: bool,
}

impl Default for CustomInstrument {
    fn default() -> Self {
        Self {
            name: String::new(),
            file_name: String::new(),
            key: 45,
            press_key: false,
        }
    }
}

impl CustomInstrument {
    /// Create an instrument with default key and no sample file.
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            ..Self::default()
        }
    }

    /// Normalize the bounded fields under the given policy.
    pub fn normalized(mut self, policy: Validation) -> Result<Self, ModelError> {
        self.key = bounded(policy, "key", self.key as i64, MIN_KEY as i64, MAX_KEY as i64)? as u8;
        Ok(self)
    }
}
