//! Piecewise-constant tempo automation.
//!
//! A song's tempo is a step function over ticks: each entry in the map sets
//! the tempo in effect from its tick until the next entry. The entry at
//! [`INITIAL_TEMPO_TICK`] logically precedes tick 0 and carries the tempo
//! the song starts with.

use alloc::collections::BTreeMap;

/// Sentinel tick carrying the tempo in effect before tick 0.
pub const INITIAL_TEMPO_TICK: i64 = -1;

/// Tempo assumed when a song declares none, in ticks per second.
pub const DEFAULT_TEMPO: f32 = 10.0;

/// Ordered tick → ticks-per-second mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TempoMap {
    changes: BTreeMap<i64, f32>,
}

impl TempoMap {
    /// Create an empty map. Lookups fall back to [`DEFAULT_TEMPO`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tempo in effect from `tick` on.
    ///
    /// A non-positive `tempo` removes the change at `tick`; for the initial
    /// tick that resets the starting tempo to [`DEFAULT_TEMPO`].
    pub fn set(&mut self, tick: i64, tempo: f32) {
        debug_assert!(tick >= INITIAL_TEMPO_TICK);
        if tempo > 0.0 {
            self.changes.insert(tick, tempo);
        } else {
            self.changes.remove(&tick);
        }
    }

    /// Remove the tempo change at `tick`. The initial entry is kept; reset
    /// it through [`TempoMap::set`] instead.
    pub fn remove(&mut self, tick: i64) {
        if tick != INITIAL_TEMPO_TICK {
            self.changes.remove(&tick);
        }
    }

    /// The tempo change declared exactly at `tick`, if any.
    pub fn get(&self, tick: i64) -> Option<f32> {
        self.changes.get(&tick).copied()
    }

    /// The tempo in effect at `tick`: the entry at the greatest mapped tick
    /// not after `tick`, or [`DEFAULT_TEMPO`] when nothing applies.
    pub fn tempo_at(&self, tick: i64) -> f32 {
        self.changes
            .range(..=tick)
            .next_back()
            .map(|(_, &tempo)| tempo)
            .unwrap_or(DEFAULT_TEMPO)
    }

    /// Seconds elapsed from tick 0 to `tick`.
    ///
    /// Walks tempo-change boundaries in increasing order, accumulating
    /// `segment_ticks / segment_tempo` per segment, with the partial final
    /// segment priced at the same per-tick rate. Boundaries before tick 0
    /// clamp to 0, so the initial entry only contributes its rate.
    pub fn time_at(&self, tick: i64) -> f64 {
        if tick <= 0 {
            return 0.0;
        }

        let mut seconds = 0.0_f64;
        let mut segment_start = 0_i64;
        let mut segment_tempo = self.tempo_at(0) as f64;
        for (&change_tick, &tempo) in self.changes.range(1..) {
            if change_tick >= tick {
                break;
            }
            seconds += (change_tick - segment_start) as f64 / segment_tempo;
            segment_start = change_tick;
            segment_tempo = tempo as f64;
        }
        seconds + (tick - segment_start) as f64 / segment_tempo
    }

    /// True when any tempo change applies at or after tick 0, i.e. the
    /// tempo is not a single constant for the whole song.
    pub fn has_changes(&self) -> bool {
        self.changes.range(0..).next().is_some()
    }

    /// Iterate over every entry, the initial one included.
    pub fn iter(&self) -> impl Iterator<Item = (i64, f32)> + '_ {
        self.changes.iter().map(|(&tick, &tempo)| (tick, tempo))
    }

    /// Iterate over the non-initial entries in increasing tick order.
    pub fn changes(&self) -> impl Iterator<Item = (i64, f32)> + '_ {
        self.changes.range(0..).map(|(&tick, &tempo)| (tick, tempo))
    }

    /// Number of entries, the initial one included.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True when no tempo is declared at all.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
