//! Integer angle arithmetic in tenths of a degree (spec §3 "Angle units").
//!
//! A full circle is exactly 3600 units so every valid slot width in
//! [`VALID_SLOT_WIDTHS`] divides it evenly — slot arithmetic never drifts.

/// Units per full revolution. Invariant I1: `0 <= angle_units < FULL_CIRCLE`.
pub const FULL_CIRCLE: u16 = 3600;

/// Exact divisors of [`FULL_CIRCLE`], ordered ascending. The slot scheduler
/// picks the smallest entry that keeps up with the pipeline's bottleneck
/// stage (spec §4.1 "Slot-width selection").
pub const VALID_SLOT_WIDTHS: [u16; 17] = [
    5, 10, 15, 20, 25, 30, 40, 45, 50, 60, 80, 90, 100, 120, 150, 180, 200,
];

static_assertions::const_assert!(FULL_CIRCLE as u32 % 5 == 0);

/// An angle in `0..FULL_CIRCLE`, wrapping on overflow (invariant I1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AngleUnits(u16);

impl AngleUnits {
    pub const ZERO: AngleUnits = AngleUnits(0);

    /// Construct from a raw value, wrapping modulo [`FULL_CIRCLE`].
    #[inline]
    pub fn new(raw: u16) -> Self {
        AngleUnits(raw % FULL_CIRCLE)
    }

    /// Construct from a possibly-negative-looking wide value (e.g. `base + phase`),
    /// wrapping modulo [`FULL_CIRCLE`].
    #[inline]
    pub fn new_wide(raw: u32) -> Self {
        AngleUnits((raw % FULL_CIRCLE as u32) as u16)
    }

    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn add_units(self, delta: u16) -> AngleUnits {
        AngleUnits::new_wide(self.0 as u32 + delta as u32)
    }
}

/// A slot width committed for one revolution (spec invariant I2:
/// `slots_per_rev * slot_width_units == FULL_CIRCLE` exactly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWidth(u16);

impl SlotWidth {
    /// Default width used before the timer has ever selected one
    /// (spec §4.2: "if zero, use a default (30 units = 3°)").
    pub const DEFAULT: SlotWidth = SlotWidth(30);

    /// Validate `raw` against [`VALID_SLOT_WIDTHS`].
    pub fn from_units(raw: u16) -> Option<Self> {
        VALID_SLOT_WIDTHS.contains(&raw).then_some(SlotWidth(raw))
    }

    #[inline]
    pub const fn units(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn slots_per_revolution(self) -> u16 {
        FULL_CIRCLE / self.0
    }

    /// Pick the smallest valid width whose numeric value covers at least
    /// `min_degrees` (spec §4.1: "pick the smallest value from the
    /// valid-widths table whose degree value >= min_degrees"); falls back
    /// to the coarsest entry if none is wide enough.
    ///
    /// Note: per the spec's own worked example (S1), `min_degrees` is
    /// compared directly against the raw table values (nominally tenths of
    /// a degree) with no further unit conversion.
    pub fn select_for_min_span(min_degrees: f64) -> SlotWidth {
        VALID_SLOT_WIDTHS
            .iter()
            .find(|&&w| w as f64 >= min_degrees)
            .copied()
            .map(SlotWidth)
            .unwrap_or(SlotWidth(*VALID_SLOT_WIDTHS.last().unwrap()))
    }
}

impl Default for SlotWidth {
    fn default() -> Self {
        SlotWidth::DEFAULT
    }
}
