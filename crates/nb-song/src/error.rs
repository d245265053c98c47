//! Builder contract violations and the validation policy.

/// How bounded fields (key, volume, panning) are normalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Validation {
    /// Out-of-range values are rejected with [`ModelError::ValueOutOfRange`].
    Strict,
    /// Out-of-range values are clipped to the nearest bound.
    #[default]
    Clamp,
}

/// A builder call that violated the model's contract.
///
/// These are local errors raised at the offending call; they are distinct
/// from the codec's corruption and I/O errors and are never downgraded.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum ModelError {
    /// A bounded field was out of range under [`Validation::Strict`].
    #[cfg_attr(
        feature = "std",
        error("{field} must be in range [{min}; {max}], got {value}")
    )]
    ValueOutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Notes only exist on the non-negative tick grid.
    #[cfg_attr(feature = "std", error("note tick can not be negative, got {0}"))]
    NegativeTick(i64),

    /// Tempo changes only exist at the initial sentinel tick or after.
    #[cfg_attr(feature = "std", error("tempo tick {0} precedes the initial tick"))]
    TempoTickOutOfRange(i64),

    /// NaN and infinite tempos are rejected regardless of policy.
    #[cfg_attr(feature = "std", error("tempo must be finite, got {0}"))]
    NonFiniteTempo(f32),

    /// A (tick, layer) coordinate referenced a layer that does not exist.
    #[cfg_attr(
        feature = "std",
        error("layer index {index} out of range for {count} layers")
    )]
    LayerIndexOutOfRange { index: usize, count: usize },

    /// The declared layer count may only grow.
    #[cfg_attr(
        feature = "std",
        error("layer count can not shrink from {from} to {to}")
    )]
    LayerCountShrunk { from: usize, to: usize },

    /// A declared song length must cover every occupied tick.
    #[cfg_attr(
        feature = "std",
        error("length {length} would not contain occupied tick {last_tick}")
    )]
    LengthTooShort { length: i64, last_tick: i64 },
}

/// Normalize `value` into `[min, max]` under the given policy.
pub(crate) fn bounded(
    policy: Validation,
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<i64, ModelError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        match policy {
            Validation::Strict => Err(ModelError::ValueOutOfRange {
                field,
                value,
                min,
                max,
            }),
            Validation::Clamp => Ok(value.clamp(min, max)),
        }
    }
}
