//! The song document: accumulation builder and the frozen result.

use alloc::vec::Vec;

use crate::error::{ModelError, Validation};
use crate::instrument::CustomInstrument;
use crate::layer::Layer;
use crate::metadata::SongMetadata;
use crate::note::Note;
use crate::tempo::{TempoMap, INITIAL_TEMPO_TICK};
use crate::timeline::TickIndex;

/// Accumulates layers, notes, tempo changes and instruments, then freezes
/// into a [`Song`].
///
/// The builder is the only mutation surface: notes enter and leave through
/// it so the occupied-tick index never drifts from the layer contents.
/// Bounded fields are normalized under the builder's [`Validation`] policy
/// at the call that introduces them.
#[derive(Clone, Debug, Default)]
pub struct SongBuilder {
    validation: Validation,
    layers: Vec<Layer>,
    custom_instruments: Vec<CustomInstrument>,
    tempo: TempoMap,
    occupied: TickIndex,
    metadata: SongMetadata,
    declared_length: i64,
}

impl SongBuilder {
    /// Create a builder with the [`Validation::Clamp`] policy.
    pub fn new() -> Self {
        Self::with_validation(Validation::Clamp)
    }

    /// Create a builder with an explicit validation policy.
    pub fn with_validation(validation: Validation) -> Self {
        Self {
            validation,
            metadata: SongMetadata::new(),
            ..Self::default()
        }
    }

    /// Append a layer. Its attributes are normalized under the policy.
    pub fn add_layer(&mut self, layer: Layer) -> Result<&mut Self, ModelError> {
        let layer = layer.normalized(self.validation)?;
        self.layers.push(layer);
        Ok(self)
    }

    /// Grow the layer list to `count` by appending default layers.
    ///
    /// Shrinking is a contract violation: layers own notes, and removing
    /// them implicitly would silently drop song content.
    pub fn set_layer_count(&mut self, count: usize) -> Result<&mut Self, ModelError> {
        if count < self.layers.len() {
            return Err(ModelError::LayerCountShrunk {
                from: self.layers.len(),
                to: count,
            });
        }
        self.layers.resize_with(count, Layer::new);
        Ok(self)
    }

    /// Replace the display attributes of layer `index`, keeping its notes.
    pub fn set_layer_attributes(
        &mut self,
        index: usize,
        attributes: Layer,
    ) -> Result<&mut Self, ModelError> {
        let attributes = attributes.normalized(self.validation)?;
        let count = self.layers.len();
        let layer = self
            .layers
            .get_mut(index)
            .ok_or(ModelError::LayerIndexOutOfRange { index, count })?;
        layer.name = attributes.name;
        layer.volume = attributes.volume;
        layer.panning = attributes.panning;
        layer.locked = attributes.locked;
        Ok(self)
    }

    /// Remove layer `index` entirely, shifting the layers above it down.
    pub fn remove_layer(&mut self, index: usize) -> Result<Layer, ModelError> {
        if index >= self.layers.len() {
            return Err(ModelError::LayerIndexOutOfRange {
                index,
                count: self.layers.len(),
            });
        }
        let layer = self.layers.remove(index);
        self.rebuild_occupied();
        Ok(layer)
    }

    /// Place a note at (tick, layer), replacing any note already there.
    pub fn set_note(
        &mut self,
        tick: i64,
        layer_index: usize,
        note: Note,
    ) -> Result<&mut Self, ModelError> {
        if tick < 0 {
            return Err(ModelError::NegativeTick(tick));
        }
        let note = note.normalized(self.validation)?;
        let count = self.layers.len();
        let layer = self
            .layers
            .get_mut(layer_index)
            .ok_or(ModelError::LayerIndexOutOfRange {
                index: layer_index,
                count,
            })?;
        layer.notes.insert(tick, note);
        self.occupied.insert(tick);
        Ok(self)
    }

    /// Remove the note at (tick, layer), if any.
    pub fn remove_note(&mut self, tick: i64, layer_index: usize) -> Option<Note> {
        let note = self.layers.get_mut(layer_index)?.notes.remove(&tick)?;
        if !self.tick_occupied(tick) {
            self.occupied.remove(tick);
        }
        Some(note)
    }

    /// Set the tempo in effect from `tick` on; [`INITIAL_TEMPO_TICK`]
    /// addresses the starting tempo. Non-positive tempo removes the change
    /// (resets the initial entry to the default).
    pub fn set_tempo_change(&mut self, tick: i64, tempo: f32) -> Result<&mut Self, ModelError> {
        if tick < INITIAL_TEMPO_TICK {
            return Err(ModelError::TempoTickOutOfRange(tick));
        }
        if !tempo.is_finite() {
            return Err(ModelError::NonFiniteTempo(tempo));
        }
        self.tempo.set(tick, tempo);
        if tick >= 0 {
            if self.tempo.get(tick).is_some() {
                self.occupied.insert(tick);
            } else if !self.layers.iter().any(|layer| layer.notes.contains_key(&tick)) {
                self.occupied.remove(tick);
            }
        }
        Ok(self)
    }

    /// Declare the song length in ticks. The built song is at least this
    /// long; it must cover every occupied tick.
    pub fn set_length(&mut self, length: i64) -> Result<&mut Self, ModelError> {
        let last_tick = self.occupied.last().unwrap_or(-1);
        if last_tick >= length {
            return Err(ModelError::LengthTooShort { length, last_tick });
        }
        self.declared_length = length;
        Ok(self)
    }

    /// Append a custom instrument to the song's table.
    pub fn add_custom_instrument(
        &mut self,
        instrument: CustomInstrument,
    ) -> Result<&mut Self, ModelError> {
        let instrument = instrument.normalized(self.validation)?;
        self.custom_instruments.push(instrument);
        Ok(self)
    }

    /// Replace the metadata wholesale.
    pub fn set_metadata(&mut self, metadata: SongMetadata) -> &mut Self {
        self.metadata = metadata;
        self
    }

    /// Mutable access to the metadata.
    pub fn metadata_mut(&mut self) -> &mut SongMetadata {
        &mut self.metadata
    }

    /// The layers accumulated so far.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The custom instruments accumulated so far.
    pub fn custom_instruments(&self) -> &[CustomInstrument] {
        &self.custom_instruments
    }

    /// The tempo map accumulated so far.
    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    /// Compute the derived aggregates and freeze.
    pub fn build(self) -> Song {
        let last_occupied = self.occupied.last().unwrap_or(-1);
        let song_length = self.declared_length.max(last_occupied + 1);

        let non_custom_instrument_count = self
            .layers
            .iter()
            .flat_map(|layer| layer.notes.values())
            .filter(|note| !note.custom_instrument)
            .map(|note| note.instrument as u32 + 1)
            .max()
            .unwrap_or(0);

        let is_stereo = self.layers.iter().any(|layer| {
            layer.panning != 0 || layer.notes.values().any(|note| note.panning != 0)
        });

        let length_in_seconds = self.tempo.time_at(song_length);

        Song {
            layers: self.layers,
            custom_instruments: self.custom_instruments,
            tempo: self.tempo,
            occupied: self.occupied,
            metadata: self.metadata,
            song_length,
            non_custom_instrument_count,
            is_stereo,
            length_in_seconds,
        }
    }

    fn tick_occupied(&self, tick: i64) -> bool {
        self.tempo.get(tick).is_some()
            || self
                .layers
                .iter()
                .any(|layer| layer.notes.contains_key(&tick))
    }

    fn rebuild_occupied(&mut self) {
        let mut occupied = TickIndex::new();
        for layer in &self.layers {
            for &tick in layer.notes.keys() {
                occupied.insert(tick);
            }
        }
        for (tick, _) in self.tempo.changes() {
            occupied.insert(tick);
        }
        self.occupied = occupied;
    }
}

/// An immutable song document.
///
/// The song owns its layers, layers own their notes; a note is addressed
/// by its (layer index, tick) coordinate through the accessors below.
/// Derived aggregates are computed once by [`SongBuilder::build`] and
/// never change, so a built song is safe to share between threads.
#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    layers: Vec<Layer>,
    custom_instruments: Vec<CustomInstrument>,
    tempo: TempoMap,
    occupied: TickIndex,
    metadata: SongMetadata,
    song_length: i64,
    non_custom_instrument_count: u32,
    is_stereo: bool,
    length_in_seconds: f64,
}

impl Song {
    /// Start building a song.
    pub fn builder() -> SongBuilder {
        SongBuilder::new()
    }

    /// All layers, in order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The layer at `index`, if it exists.
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// The note at (layer, tick), if any.
    pub fn note(&self, layer_index: usize, tick: i64) -> Option<&Note> {
        self.layers.get(layer_index)?.note(tick)
    }

    /// The custom instrument table, in index order.
    pub fn custom_instruments(&self) -> &[CustomInstrument] {
        &self.custom_instruments
    }

    /// The custom instrument at `index`, if it exists.
    pub fn custom_instrument(&self, index: usize) -> Option<&CustomInstrument> {
        self.custom_instruments.get(index)
    }

    /// Editor metadata.
    pub fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }

    /// The tempo automation timeline.
    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    /// The tempo in effect at `tick`, in ticks per second.
    pub fn tempo_at(&self, tick: i64) -> f32 {
        self.tempo.tempo_at(tick)
    }

    /// The first tick after `tick` holding a note or tempo change.
    pub fn next_non_empty_tick(&self, tick: i64) -> Option<i64> {
        self.occupied.next_after(tick)
    }

    /// Length in ticks: one past the highest occupied tick, or the
    /// declared length if that is larger.
    pub fn song_length(&self) -> i64 {
        self.song_length
    }

    /// One past the highest built-in instrument index any note uses;
    /// 0 when only custom instruments (or no notes) appear.
    pub fn non_custom_instrument_count(&self) -> u32 {
        self.non_custom_instrument_count
    }

    /// True when any note or layer is panned off center.
    pub fn is_stereo(&self) -> bool {
        self.is_stereo
    }

    /// Total song length in seconds, integrated once at build time.
    pub fn length_in_seconds(&self) -> f64 {
        self.length_in_seconds
    }

    /// Seconds elapsed from the song start to `tick`.
    ///
    /// Ticks at or past the end return the cached total; tick 0, negative
    /// ticks and the empty song return 0.
    pub fn time_in_seconds_at(&self, tick: i64) -> f64 {
        if tick <= 0 || self.song_length == 0 {
            return 0.0;
        }
        if tick >= self.song_length {
            return self.length_in_seconds;
        }
        self.tempo.time_at(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::DEFAULT_TEMPO;

    fn two_layer_builder() -> SongBuilder {
        let mut builder = SongBuilder::new();
        builder.set_layer_count(2).unwrap();
        builder
    }

    #[test]
    fn sparse_note_placement() {
        let mut builder = two_layer_builder();
        builder.set_note(10, 0, Note::new(0, false, 40)).unwrap();
        let song = builder.build();

        assert_eq!(song.song_length(), 11);
        assert_eq!(song.next_non_empty_tick(-1), Some(10));
        assert_eq!(song.next_non_empty_tick(10), None);
    }

    #[test]
    fn removing_last_note_empties_song() {
        let mut builder = two_layer_builder();
        builder.set_note(10, 0, Note::new(0, false, 40)).unwrap();
        builder.remove_note(10, 0);
        let song = builder.build();

        assert_eq!(song.song_length(), 0);
        assert_eq!(song.next_non_empty_tick(-1), None);
    }

    #[test]
    fn remove_note_keeps_tick_occupied_by_other_layer() {
        let mut builder = two_layer_builder();
        builder.set_note(5, 0, Note::new(0, false, 40)).unwrap();
        builder.set_note(5, 1, Note::new(1, false, 41)).unwrap();
        builder.remove_note(5, 0);
        let song = builder.build();

        assert_eq!(song.next_non_empty_tick(-1), Some(5));
        assert_eq!(song.song_length(), 6);
    }

    #[test]
    fn negative_tick_rejected() {
        let mut builder = two_layer_builder();
        assert_eq!(
            builder.set_note(-3, 0, Note::default()).err(),
            Some(ModelError::NegativeTick(-3))
        );
    }

    #[test]
    fn note_on_missing_layer_rejected() {
        let mut builder = SongBuilder::new();
        assert!(matches!(
            builder.set_note(0, 0, Note::default()),
            Err(ModelError::LayerIndexOutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn layer_count_can_not_shrink() {
        let mut builder = two_layer_builder();
        assert_eq!(
            builder.set_layer_count(1).err(),
            Some(ModelError::LayerCountShrunk { from: 2, to: 1 })
        );
    }

    #[test]
    fn declared_length_must_cover_notes() {
        let mut builder = two_layer_builder();
        builder.set_note(10, 0, Note::default()).unwrap();
        assert_eq!(
            builder.set_length(10).err(),
            Some(ModelError::LengthTooShort {
                length: 10,
                last_tick: 10
            })
        );
        builder.set_length(40).unwrap();
        assert_eq!(builder.build().song_length(), 40);
    }

    #[test]
    fn tempo_change_counts_as_occupied() {
        let mut builder = two_layer_builder();
        builder.set_note(5, 0, Note::default()).unwrap();
        builder.set_tempo_change(3, 15.0).unwrap();
        let song = builder.build();

        assert_eq!(song.next_non_empty_tick(0), Some(3));
        assert_eq!(song.song_length(), 6);
    }

    #[test]
    fn initial_tempo_is_not_an_occupied_tick() {
        let mut builder = SongBuilder::new();
        builder.set_tempo_change(-1, 8.0).unwrap();
        let song = builder.build();

        assert_eq!(song.next_non_empty_tick(-1), None);
        assert_eq!(song.song_length(), 0);
        assert_eq!(song.tempo_at(0), 8.0);
    }

    #[test]
    fn removing_layer_rebuilds_index() {
        let mut builder = two_layer_builder();
        builder.set_note(5, 0, Note::default()).unwrap();
        builder.set_note(10, 1, Note::default()).unwrap();
        builder.remove_layer(0).unwrap();
        let song = builder.build();

        assert_eq!(song.next_non_empty_tick(0), Some(10));
        assert_eq!(song.layers().len(), 1);
    }

    #[test]
    fn removing_layer_keeps_tempo_ticks() {
        let mut builder = two_layer_builder();
        builder.set_note(5, 0, Note::default()).unwrap();
        builder.set_tempo_change(7, 15.0).unwrap();
        builder.remove_layer(0).unwrap();
        let song = builder.build();

        assert_eq!(song.next_non_empty_tick(0), Some(7));
    }

    #[test]
    fn non_custom_instrument_count_ignores_custom() {
        let mut builder = two_layer_builder();
        builder.set_note(0, 0, Note::new(6, false, 40)).unwrap();
        builder.set_note(1, 0, Note::new(9, true, 40)).unwrap();
        let song = builder.build();

        assert_eq!(song.non_custom_instrument_count(), 7);
    }

    #[test]
    fn stereo_from_note_or_layer_panning() {
        let mut builder = two_layer_builder();
        let mut note = Note::default();
        note.panning = -20;
        builder.set_note(0, 0, note).unwrap();
        assert!(builder.build().is_stereo());

        let mut builder = SongBuilder::new();
        let mut layer = Layer::new();
        layer.panning = 30;
        builder.add_layer(layer).unwrap();
        assert!(builder.build().is_stereo());

        let mut builder = two_layer_builder();
        builder.set_note(0, 0, Note::default()).unwrap();
        assert!(!builder.build().is_stereo());
    }

    #[test]
    fn time_in_seconds_clamps_to_song() {
        let mut builder = SongBuilder::new();
        builder.set_tempo_change(-1, 20.0).unwrap();
        builder.set_tempo_change(10, 10.0).unwrap();
        builder.set_length(20).unwrap();
        let song = builder.build();

        assert!((song.time_in_seconds_at(1) - 0.05).abs() < 1e-9);
        assert!((song.time_in_seconds_at(10) - 0.5).abs() < 1e-9);
        assert!((song.time_in_seconds_at(21) - 1.5).abs() < 1e-9);
        assert_eq!(song.time_in_seconds_at(0), 0.0);
    }

    #[test]
    fn empty_song_time_is_zero() {
        let song = SongBuilder::new().build();
        assert_eq!(song.time_in_seconds_at(100), 0.0);
        assert_eq!(song.length_in_seconds(), 0.0);
        assert_eq!(song.tempo_at(50), DEFAULT_TEMPO);
    }

    #[test]
    fn length_in_seconds_matches_scenario() {
        let mut builder = SongBuilder::new();
        builder.set_tempo_change(-1, 20.0).unwrap();
        builder.set_tempo_change(10, 10.0).unwrap();
        builder.set_length(40).unwrap();
        let song = builder.build();

        assert!((song.length_in_seconds() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn strict_builder_surfaces_field_errors() {
        let mut builder = SongBuilder::with_validation(Validation::Strict);
        builder.set_layer_count(1).unwrap();
        let result = builder.set_note(0, 0, Note::new(0, false, 90));
        assert!(matches!(
            result,
            Err(ModelError::ValueOutOfRange { field: "key", .. })
        ));
    }
}
