//! Tempo automation carried as marker instrument notes.
//!
//! The wire format only stores a single initial tempo, so revisions with
//! note pitch express tempo automation as notes of a custom instrument
//! named [`TEMPO_CHANGER_NAME`]: one note per change, pitch = tempo × 15.
//! This module is the only place that knows such notes exist. The reader
//! strips them back into the tempo map; the writer plans them from it.
//! General note handling never inspects instruments for tempo semantics.

use std::collections::BTreeMap;

use log::warn;
use nb_song::{
    CustomInstrument, ModelError, Note, Song, SongBuilder, TEMPO_CHANGER_NAME,
};

use crate::nbs_format::NbsVersion;

/// Pitch units per tick-per-second of tempo.
const TEMPO_PITCH_SCALE: f32 = 15.0;

fn find_marker(instruments: &[CustomInstrument]) -> Option<usize> {
    instruments
        .iter()
        .position(|instrument| instrument.name == TEMPO_CHANGER_NAME)
}

/// Decode side: turn marker notes back into tempo map entries.
///
/// Every note referencing the marker instrument is removed and replaced by
/// a tempo change `abs(pitch) / 15` at its tick. Layers left empty whose
/// name equals the marker name were synthesized by an encoder and are
/// dropped. The marker instrument itself stays in the table so a
/// re-encode can reuse it.
pub(crate) fn extract_tempo_notes(builder: &mut SongBuilder) -> Result<(), ModelError> {
    let Some(marker_index) = find_marker(builder.custom_instruments()) else {
        return Ok(());
    };
    let marker_index = marker_index as u8;

    let mut extracted: Vec<(i64, usize, i16)> = Vec::new();
    for (layer_index, layer) in builder.layers().iter().enumerate() {
        for (tick, note) in layer.notes() {
            if note.custom_instrument && note.instrument == marker_index {
                extracted.push((tick, layer_index, note.pitch));
            }
        }
    }

    for &(tick, layer_index, pitch) in &extracted {
        builder.remove_note(tick, layer_index);
        builder.set_tempo_change(tick, (pitch as f32).abs() / TEMPO_PITCH_SCALE)?;
    }

    let mut index = 0;
    while index < builder.layers().len() {
        let layer = &builder.layers()[index];
        if layer.is_empty() && layer.name == TEMPO_CHANGER_NAME {
            builder.remove_layer(index)?;
        } else {
            index += 1;
        }
    }

    Ok(())
}

/// The synthetic track an encode materializes for a non-constant tempo.
pub(crate) struct TempoTrack {
    /// Custom-instrument index the marker notes reference.
    pub marker_index: u8,
    /// Marker instrument to append to the written table; `None` when the
    /// song already declares one.
    pub appended: Option<CustomInstrument>,
    /// One note per non-initial tempo change, keyed by tick. They are
    /// written on a virtual layer one past the song's real layers.
    pub notes: BTreeMap<i64, Note>,
}

/// Encode side: plan the synthetic tempo track for `version`, if needed.
///
/// Returns `None` when the tempo is constant, and also when the target
/// revision has no note pitch to carry the changes — those encodes keep
/// only the initial tempo.
pub(crate) fn plan_tempo_track(song: &Song, version: NbsVersion) -> Option<TempoTrack> {
    if !song.tempo().has_changes() {
        return None;
    }
    if !version.has_note_extras() {
        warn!(
            "revision {} can not express tempo changes; keeping only the initial tempo",
            version.number()
        );
        return None;
    }

    let (marker_index, appended) = match find_marker(song.custom_instruments()) {
        Some(index) => (index as u8, None),
        None => (
            song.custom_instruments().len() as u8,
            Some(CustomInstrument::new(TEMPO_CHANGER_NAME)),
        ),
    };

    let notes = song
        .tempo()
        .changes()
        .map(|(tick, tempo)| {
            let mut note = Note::new(marker_index, true, 45);
            note.pitch = (tempo * TEMPO_PITCH_SCALE).round() as i16;
            (tick, note)
        })
        .collect();

    Some(TempoTrack {
        marker_index,
        appended,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_song::INITIAL_TEMPO_TICK;

    #[test]
    fn constant_tempo_needs_no_track() {
        let mut builder = SongBuilder::new();
        builder.set_tempo_change(INITIAL_TEMPO_TICK, 8.0).unwrap();
        let song = builder.build();
        assert!(plan_tempo_track(&song, NbsVersion::V5).is_none());
    }

    #[test]
    fn old_revisions_drop_changes() {
        let mut builder = SongBuilder::new();
        builder.set_tempo_change(5, 20.0).unwrap();
        let song = builder.build();
        assert!(plan_tempo_track(&song, NbsVersion::V3).is_none());
    }

    #[test]
    fn plan_appends_marker_when_missing() {
        let mut builder = SongBuilder::new();
        builder.set_tempo_change(INITIAL_TEMPO_TICK, 8.0).unwrap();
        builder.set_tempo_change(5, 20.0).unwrap();
        builder.set_tempo_change(15, 20.0).unwrap();
        let song = builder.build();

        let track = plan_tempo_track(&song, NbsVersion::V4).unwrap();
        assert_eq!(track.marker_index, 0);
        assert_eq!(track.appended.as_ref().unwrap().name, TEMPO_CHANGER_NAME);
        assert_eq!(track.notes.len(), 2);
        assert_eq!(track.notes[&5].pitch, 300);
        assert_eq!(track.notes[&15].pitch, 300);
    }

    #[test]
    fn plan_reuses_declared_marker() {
        let mut builder = SongBuilder::new();
        builder
            .add_custom_instrument(CustomInstrument::new("Kick"))
            .unwrap();
        builder
            .add_custom_instrument(CustomInstrument::new(TEMPO_CHANGER_NAME))
            .unwrap();
        builder.set_tempo_change(3, 6.0).unwrap();
        let song = builder.build();

        let track = plan_tempo_track(&song, NbsVersion::V5).unwrap();
        assert_eq!(track.marker_index, 1);
        assert!(track.appended.is_none());
        assert_eq!(track.notes[&3].pitch, 90);
    }

    #[test]
    fn extraction_round_trips_plan() {
        // build a song the way the decoder sees an encoded tempo track
        let mut builder = SongBuilder::new();
        builder.set_layer_count(2).unwrap();
        builder.set_note(0, 0, Note::new(0, false, 40)).unwrap();
        let mut carrier = nb_song::Layer::new();
        carrier.name = TEMPO_CHANGER_NAME.into();
        builder.add_layer(carrier).unwrap();
        builder
            .add_custom_instrument(CustomInstrument::new(TEMPO_CHANGER_NAME))
            .unwrap();
        let mut marker_note = Note::new(0, true, 45);
        marker_note.pitch = 300;
        builder.set_note(5, 2, marker_note).unwrap();

        extract_tempo_notes(&mut builder).unwrap();
        let song = builder.build();

        assert_eq!(song.layers().len(), 2);
        assert_eq!(song.tempo().get(5), Some(20.0));
        assert_eq!(song.note(0, 0).map(|n| n.key), Some(40));
        assert_eq!(song.custom_instruments().len(), 1);
    }

    #[test]
    fn extraction_keeps_named_layer_with_real_notes() {
        let mut builder = SongBuilder::new();
        let mut layer = nb_song::Layer::new();
        layer.name = TEMPO_CHANGER_NAME.into();
        builder.add_layer(layer).unwrap();
        builder
            .add_custom_instrument(CustomInstrument::new(TEMPO_CHANGER_NAME))
            .unwrap();
        let mut marker_note = Note::new(0, true, 45);
        marker_note.pitch = 150;
        builder.set_note(2, 0, marker_note).unwrap();
        builder.set_note(4, 0, Note::new(3, false, 50)).unwrap();

        extract_tempo_notes(&mut builder).unwrap();
        let song = builder.build();

        // the layer kept its ordinary note, so it survives
        assert_eq!(song.layers().len(), 1);
        assert_eq!(song.tempo().get(2), Some(10.0));
        assert!(song.note(0, 4).is_some());
    }
}
