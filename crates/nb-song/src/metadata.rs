//! Song bookkeeping carried verbatim by the wire format.

use alloc::string::String;

/// Editor metadata. None of these fields affect codec or timeline
/// behavior; they are read and written as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SongMetadata {
    pub title: String,
    pub author: String,
    pub original_author: String,
    pub description: String,
    pub auto_save: bool,
    /// Minutes between auto-saves
    pub auto_save_duration: u8,
    /// Time signature numerator, x/4ths
    pub time_signature: u8,
    pub minutes_spent: i32,
    pub left_clicks: i32,
    pub right_clicks: i32,
    pub note_blocks_added: i32,
    pub note_blocks_removed: i32,
    pub original_midi_file_name: String,
    pub loop_enabled: bool,
    /// 0 = loop forever
    pub loop_max_count: u8,
    pub loop_start_tick: i16,
}

impl SongMetadata {
    /// Metadata with editor defaults (auto-save every 10 minutes, 4/4).
    pub fn new() -> Self {
        Self {
            auto_save_duration: 10,
            time_signature: 4,
            ..Self::default()
        }
    }
}
