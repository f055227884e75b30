//! Pass configuration.

use polymask_field::interpolation::{MODULUS_HEADROOM, PRIMALITY_ROUNDS};
use serde::{Deserialize, Serialize};

/// Knobs for the interpolation pass.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PassConfig {
    /// Annotation tag marking a table for absorption.
    pub annotation: String,
    /// Miller-Rabin rounds spent on each modulus candidate.
    pub primality_rounds: usize,
    /// Head-room added above the largest table value before the prime search.
    pub modulus_headroom: i64,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl PassConfig {
    /// The configuration the annotation contract documents: tag
    /// `"interpolate"`, 20 rounds, head-room 100.
    pub fn standard() -> Self {
        PassConfig {
            annotation: "interpolate".into(),
            primality_rounds: PRIMALITY_ROUNDS,
            modulus_headroom: MODULUS_HEADROOM,
        }
    }
}
