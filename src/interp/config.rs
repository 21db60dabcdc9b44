use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Tolerance parameters for one interpolation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// A child counts as contained when `area(child ∩ parent) / area(child) >= 1 - containment`.
    pub containment: f64,
    /// Two plans are the same when every pairwise area ratio is within `1 ± plan_precision`.
    pub plan_precision: f64,
    /// A fine region is resolved once its apportioned fractions reach `1 - resolution`.
    pub resolution: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self { containment: 0.001, plan_precision: 0.01, resolution: 0.01 }
    }
}

impl Tolerances {
    /// Parse tolerances from JSON; omitted fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let tolerances: Self = serde_json::from_str(json).context("[Tolerances.from_json] invalid JSON")?;
        tolerances.validate()?;
        Ok(tolerances)
    }

    /// Check that every tolerance is finite and in `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("containment", self.containment),
            ("plan_precision", self.plan_precision),
            ("resolution", self.resolution),
        ] {
            ensure!(
                value.is_finite() && (0.0..1.0).contains(&value),
                "[Tolerances.validate] {name} must be in [0, 1), got {value}"
            );
        }
        Ok(())
    }
}
