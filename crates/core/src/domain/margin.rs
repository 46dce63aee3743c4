use serde::{Deserialize, Serialize};

/// Margin expressed as a fraction of price in `[0, 1]`.
///
/// This is the scale used by feature computation, the rule scorer, and
/// everything stored inside a model package. Values crossing the API
/// boundary use [`PercentMargin`] instead; conversions are always explicit
/// so the two scales can never be mixed silently.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FractionMargin(pub f64);

/// Margin expressed on a 0-100 scale, as reported on result objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PercentMargin(pub f64);

impl FractionMargin {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn as_percent(self) -> PercentMargin {
        PercentMargin(self.0 * 100.0)
    }

    pub fn clamp(self, floor: f64, ceiling: f64) -> Self {
        Self(self.0.clamp(floor, ceiling))
    }
}

impl PercentMargin {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn as_fraction(self) -> FractionMargin {
        FractionMargin(self.0 / 100.0)
    }
}
