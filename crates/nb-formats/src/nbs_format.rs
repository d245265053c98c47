//! NBS format reader and writer.
//!
//! The format is little-endian throughout. A file is consumed in one
//! forward pass: header, layer count, metadata, delta-encoded note stream,
//! layer attributes, custom instrument table. Five revisions share this
//! layout, each adding fields; revision 0 is the pre-versioned legacy
//! layout whose leading length field is non-zero.

use std::io::{Read, Write};

use log::{debug, warn};
use nb_song::{
    CustomInstrument, Layer, Note, Song, SongBuilder, INITIAL_TEMPO_TICK,
};

use crate::tempo_marker::{extract_tempo_notes, plan_tempo_track, TempoTrack};
use crate::{CorruptKind, NbsError};

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// A revision of the NBS layout. Revisions only ever add fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NbsVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
    V4 = 4,
    V5 = 5,
}

impl NbsVersion {
    /// The newest revision this codec writes.
    pub const LATEST: NbsVersion = NbsVersion::V5;

    /// The revision byte written to the header.
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Map a header revision byte back to a version.
    pub fn from_number(number: u8) -> Option<NbsVersion> {
        match number {
            1 => Some(NbsVersion::V1),
            2 => Some(NbsVersion::V2),
            3 => Some(NbsVersion::V3),
            4 => Some(NbsVersion::V4),
            5 => Some(NbsVersion::V5),
            _ => None,
        }
    }

    /// Layers carry a panning byte.
    pub fn has_layer_panning(self) -> bool {
        self >= NbsVersion::V2
    }

    /// The header declares the song length.
    pub fn has_declared_length(self) -> bool {
        self >= NbsVersion::V3
    }

    /// Notes carry volume/panning/pitch, layers a lock flag, metadata the
    /// loop fields. Also the revision floor for tempo-marker tracks.
    pub fn has_note_extras(self) -> bool {
        self >= NbsVersion::V4
    }
}

/// Header facts the rest of the decode depends on.
struct Header {
    /// Revision number; 0 for the legacy layout.
    version: u8,
    /// Instrument bytes at or above this value reference the custom table.
    first_custom_index: u8,
}

// ---------------------------------------------------------------------------
// NbsReader — cursor over a byte slice
// ---------------------------------------------------------------------------

struct NbsReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NbsReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, CorruptKind> {
        if self.pos >= self.data.len() {
            return Err(CorruptKind::UnexpectedEof);
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_u16_le(&mut self) -> Result<u16, CorruptKind> {
        if self.pos + 2 > self.data.len() {
            return Err(CorruptKind::UnexpectedEof);
        }
        let v = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn read_i16_le(&mut self) -> Result<i16, CorruptKind> {
        Ok(self.read_u16_le()? as i16)
    }

    fn read_i32_le(&mut self) -> Result<i32, CorruptKind> {
        if self.pos + 4 > self.data.len() {
            return Err(CorruptKind::UnexpectedEof);
        }
        let v = i32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(v)
    }

    /// Length-prefixed string; carriage returns become spaces.
    fn read_string(&mut self) -> Result<String, CorruptKind> {
        let length = self.read_i32_le()?;
        if length < 0 {
            return Err(CorruptKind::StringLength(length));
        }
        let length = length as usize;
        if self.pos + length > self.data.len() {
            return Err(CorruptKind::UnexpectedEof);
        }
        let text = self.data[self.pos..self.pos + length]
            .iter()
            .map(|&b| if b == 0x0D { ' ' } else { b as char })
            .collect();
        self.pos += length;
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Decode a song from a complete in-memory NBS file.
pub fn load_nbs(data: &[u8]) -> Result<Song, NbsError> {
    Ok(parse_song(data)?)
}

/// Decode a song from a stream. The stream is drained before parsing, so
/// transport failures surface as [`NbsError::Io`] and structural failures
/// as [`NbsError::Corrupted`].
pub fn read_nbs(reader: &mut impl Read) -> Result<Song, NbsError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    load_nbs(&data)
}

fn parse_song(data: &[u8]) -> Result<Song, CorruptKind> {
    let mut r = NbsReader::new(data);
    let mut builder = SongBuilder::new();

    let header = read_header(&mut r, &mut builder)?;
    let declared_layers = r.read_u16_le()? as usize;
    builder.set_layer_count(declared_layers)?;
    read_metadata(&mut r, &header, &mut builder)?;
    read_notes(&mut r, &header, &mut builder)?;
    read_layer_attributes(&mut r, &header, &mut builder, declared_layers)?;
    read_custom_instruments(&mut r, &mut builder)?;
    extract_tempo_notes(&mut builder)?;

    Ok(builder.build())
}

fn read_header(r: &mut NbsReader, builder: &mut SongBuilder) -> Result<Header, CorruptKind> {
    let legacy_length = r.read_u16_le()?;
    if legacy_length != 0 {
        // Oldest files start directly with their length; everything else
        // about them matches revision 1 minus the header fields. The
        // custom-instrument boundary predates the header field and was 10.
        debug!("legacy nbs header, song length {}", legacy_length);
        builder.set_length(legacy_length as i64)?;
        return Ok(Header {
            version: 0,
            first_custom_index: 10,
        });
    }

    let version = r.read_u8()?;
    NbsVersion::from_number(version).ok_or(CorruptKind::UnsupportedRevision(version))?;
    let first_custom_index = r.read_u8()?;
    if version >= 3 {
        builder.set_length(r.read_u16_le()? as i64)?;
    }
    debug!(
        "nbs revision {}, custom instrument boundary {}",
        version, first_custom_index
    );
    Ok(Header {
        version,
        first_custom_index,
    })
}

fn read_metadata(
    r: &mut NbsReader,
    header: &Header,
    builder: &mut SongBuilder,
) -> Result<(), CorruptKind> {
    let meta = builder.metadata_mut();
    meta.title = r.read_string()?;
    meta.author = r.read_string()?;
    meta.original_author = r.read_string()?;
    meta.description = r.read_string()?;

    let tempo = r.read_u16_le()? as f32 / 100.0;
    builder.set_tempo_change(INITIAL_TEMPO_TICK, tempo)?;

    let meta = builder.metadata_mut();
    meta.auto_save = r.read_u8()? != 0;
    meta.auto_save_duration = r.read_u8()?;
    meta.time_signature = r.read_u8()?;
    meta.minutes_spent = r.read_i32_le()?;
    meta.left_clicks = r.read_i32_le()?;
    meta.right_clicks = r.read_i32_le()?;
    meta.note_blocks_added = r.read_i32_le()?;
    meta.note_blocks_removed = r.read_i32_le()?;
    meta.original_midi_file_name = r.read_string()?;

    if header.version >= 4 {
        let meta = builder.metadata_mut();
        meta.loop_enabled = r.read_u8()? == 1;
        meta.loop_max_count = r.read_u8()?;
        meta.loop_start_tick = r.read_i16_le()?;
    }
    Ok(())
}

fn read_notes(
    r: &mut NbsReader,
    header: &Header,
    builder: &mut SongBuilder,
) -> Result<(), CorruptKind> {
    let mut tick: i64 = -1;
    loop {
        let tick_jump = r.read_i16_le()?;
        if tick_jump == 0 {
            break;
        }
        tick = tick
            .checked_add(tick_jump as i64)
            .ok_or(CorruptKind::TickJump(tick_jump))?;

        let mut layer: i32 = -1;
        loop {
            let layer_jump = r.read_i16_le()?;
            if layer_jump == 0 {
                break;
            }
            layer = layer
                .checked_add(layer_jump as i32)
                .ok_or(CorruptKind::LayerJump(layer_jump))?;
            if layer < 0 {
                return Err(CorruptKind::LayerJump(layer_jump));
            }

            let instrument = r.read_u8()?;
            let key = r.read_u8()?;
            let mut note = if instrument >= header.first_custom_index {
                Note::new(instrument - header.first_custom_index, true, key)
            } else {
                Note::new(instrument, false, key)
            };
            if header.version >= 4 {
                note.volume = r.read_u8()?;
                // on-disk 0 is fully right, 100 is center
                note.panning = (100 - r.read_u8()? as i16).clamp(-100, 100) as i8;
                note.pitch = r.read_i16_le()?;
            }

            let layer_index = layer as usize;
            if layer_index >= builder.layers().len() {
                // headers may undercount; grow to cover the reference
                debug!(
                    "note stream references layer {} beyond declared count {}",
                    layer_index,
                    builder.layers().len()
                );
                builder.set_layer_count(layer_index + 1)?;
            }
            builder.set_note(tick, layer_index, note)?;
        }
    }
    Ok(())
}

fn read_layer_attributes(
    r: &mut NbsReader,
    header: &Header,
    builder: &mut SongBuilder,
    declared_layers: usize,
) -> Result<(), CorruptKind> {
    // only the originally declared layers have attribute rows; layers
    // appended while reading notes keep their defaults
    for index in 0..declared_layers {
        let mut attributes = Layer::new();
        attributes.name = r.read_string()?;
        if header.version >= 4 {
            attributes.locked = r.read_u8()? == 1;
        }
        attributes.volume = r.read_u8()?;
        if header.version >= 2 {
            attributes.panning = (100 - r.read_u8()? as i16).clamp(-100, 100) as i8;
        }
        builder.set_layer_attributes(index, attributes)?;
    }
    Ok(())
}

fn read_custom_instruments(
    r: &mut NbsReader,
    builder: &mut SongBuilder,
) -> Result<(), CorruptKind> {
    let count = r.read_u8()?;
    for _ in 0..count {
        let mut instrument = CustomInstrument::default();
        instrument.name = r.read_string()?;
        instrument.file_name = r.read_string()?;
        instrument.key = r.read_u8()?;
        instrument.press_key = r.read_u8()? != 0;
        builder.add_custom_instrument(instrument)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Encode a song at the given revision.
///
/// Fields the revision cannot express are dropped; everything else is
/// written exactly. Output goes straight to the sink, so a failing sink
/// leaves partial output behind — discarding it is the caller's job.
pub fn write_nbs(w: &mut impl Write, song: &Song, version: NbsVersion) -> std::io::Result<()> {
    let boundary = instrument_boundary(song);
    let tempo_track = plan_tempo_track(song, version);

    write_header(w, song, version, boundary)?;
    let layer_count = song.layers().len() + tempo_track.is_some() as usize;
    write_u16(w, layer_count as u16)?;
    write_metadata(w, song, version)?;
    write_notes(w, song, version, boundary, tempo_track.as_ref())?;
    write_layer_attributes(w, song, version, tempo_track.is_some())?;
    write_custom_instruments(w, song, tempo_track.as_ref())
}

/// Encode a song into a fresh buffer.
pub fn song_to_nbs(song: &Song, version: NbsVersion) -> Vec<u8> {
    let mut buf = Vec::new();
    write_nbs(&mut buf, song, version).expect("Vec<u8> write cannot fail");
    buf
}

/// The first instrument byte that references the custom table: the song's
/// built-in instrument count rounded up to a vanilla palette size
/// (Minecraft 1.2 had 5 instruments, 1.12 had 10, 1.14 had 16).
/// Third-party readers hardcode these boundaries.
fn instrument_boundary(song: &Song) -> u8 {
    let count = song.non_custom_instrument_count();
    let rounded = if count <= 5 {
        5
    } else if count <= 10 {
        10
    } else {
        count.max(16)
    };
    rounded.min(u8::MAX as u32) as u8
}

fn write_u16(w: &mut impl Write, value: u16) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_i16(w: &mut impl Write, value: i16) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_i32(w: &mut impl Write, value: i32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_string(w: &mut impl Write, text: &str) -> std::io::Result<()> {
    write_i32(w, text.len() as i32)?;
    w.write_all(text.as_bytes())
}

fn write_header(
    w: &mut impl Write,
    song: &Song,
    version: NbsVersion,
    boundary: u8,
) -> std::io::Result<()> {
    write_u16(w, 0)?;
    w.write_all(&[version.number(), boundary])?;
    if version.has_declared_length() {
        write_u16(w, song.song_length().clamp(0, u16::MAX as i64) as u16)?;
    }
    Ok(())
}

fn write_metadata(w: &mut impl Write, song: &Song, version: NbsVersion) -> std::io::Result<()> {
    let meta = song.metadata();
    write_string(w, &meta.title)?;
    write_string(w, &meta.author)?;
    write_string(w, &meta.original_author)?;
    write_string(w, &meta.description)?;

    write_u16(w, (song.tempo_at(0) * 100.0).round() as u16)?;
    w.write_all(&[
        meta.auto_save as u8,
        meta.auto_save_duration,
        meta.time_signature,
    ])?;
    write_i32(w, meta.minutes_spent)?;
    write_i32(w, meta.left_clicks)?;
    write_i32(w, meta.right_clicks)?;
    write_i32(w, meta.note_blocks_added)?;
    write_i32(w, meta.note_blocks_removed)?;
    write_string(w, &meta.original_midi_file_name)?;

    if version.has_note_extras() {
        w.write_all(&[meta.loop_enabled as u8, meta.loop_max_count])?;
        write_i16(w, meta.loop_start_tick)?;
    }
    Ok(())
}

fn write_notes(
    w: &mut impl Write,
    song: &Song,
    version: NbsVersion,
    boundary: u8,
    tempo_track: Option<&TempoTrack>,
) -> std::io::Result<()> {
    let virtual_layer = song.layers().len();
    let mut last_tick: i64 = -1;
    let mut next = song.next_non_empty_tick(-1);

    while let Some(tick) = next {
        let mut occupied: Vec<(usize, &Note)> = song
            .layers()
            .iter()
            .enumerate()
            .filter_map(|(index, layer)| layer.note(tick).map(|note| (index, note)))
            .collect();
        if let Some(track) = tempo_track {
            if let Some(note) = track.notes.get(&tick) {
                occupied.push((virtual_layer, note));
            }
        }

        // a tick occupied only by tempo changes the target revision can
        // not carry produces no entry; jumps stay relative to written ones
        if !occupied.is_empty() {
            let jump = tick - last_tick;
            if jump > i16::MAX as i64 {
                warn!("tick jump {} exceeds the 16-bit delta range", jump);
            }
            write_i16(w, jump as i16)?;
            let mut last_layer: i64 = -1;
            for (layer_index, note) in occupied {
                write_i16(w, (layer_index as i64 - last_layer) as i16)?;
                let instrument = if note.custom_instrument {
                    boundary.wrapping_add(note.instrument)
                } else {
                    note.instrument
                };
                w.write_all(&[instrument, note.key])?;
                if version.has_note_extras() {
                    w.write_all(&[note.volume, (100 - note.panning as i16) as u8])?;
                    write_i16(w, note.pitch)?;
                }
                last_layer = layer_index as i64;
            }
            write_i16(w, 0)?;
            last_tick = tick;
        }

        next = song.next_non_empty_tick(tick);
    }
    write_i16(w, 0)
}

fn write_layer_attributes(
    w: &mut impl Write,
    song: &Song,
    version: NbsVersion,
    synthetic_layer: bool,
) -> std::io::Result<()> {
    for layer in song.layers() {
        write_layer_row(w, layer, version)?;
    }
    if synthetic_layer {
        let mut carrier = Layer::new();
        carrier.name = nb_song::TEMPO_CHANGER_NAME.into();
        write_layer_row(w, &carrier, version)?;
    }
    Ok(())
}

fn write_layer_row(w: &mut impl Write, layer: &Layer, version: NbsVersion) -> std::io::Result<()> {
    write_string(w, &layer.name)?;
    if version.has_note_extras() {
        w.write_all(&[layer.locked as u8])?;
    }
    w.write_all(&[layer.volume])?;
    if version.has_layer_panning() {
        w.write_all(&[(100 - layer.panning as i16) as u8])?;
    }
    Ok(())
}

fn write_custom_instruments(
    w: &mut impl Write,
    song: &Song,
    tempo_track: Option<&TempoTrack>,
) -> std::io::Result<()> {
    let appended = tempo_track.and_then(|track| track.appended.as_ref());
    let count = song.custom_instruments().len() + appended.is_some() as usize;
    w.write_all(&[count as u8])?;
    for instrument in song.custom_instruments().iter().chain(appended) {
        write_string(w, &instrument.name)?;
        write_string(w, &instrument.file_name)?;
        w.write_all(&[instrument.key, instrument.press_key as u8])?;
    }
    Ok(())
}
