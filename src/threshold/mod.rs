// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Thresholds that steer how deep an image is cleaned and where its mask is
//! drawn.
//!
//! Everything here is a pure function of its inputs. The same functions are
//! used by the per-channel line imaging and by the continuum major/minor cycle
//! loop, so results must be exactly reproducible.

mod error;

pub use error::ThresholdError;

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Which of the three thresholds set the mask threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MaskThresholdKind {
    #[strum(serialize = "Theoretical noise threshold")]
    TheoreticalNoise,

    #[strum(serialize = "Noise threshold")]
    Noise,

    #[strum(serialize = "Dynamic range threshold")]
    DynamicRange,
}

/// All of the thresholds derived for a single clean cycle. A new set is made
/// for every cycle; sets are never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSet {
    pub theoretical_noise_threshold: f64,
    pub noise_threshold: f64,
    pub dynamic_range_threshold: f64,
    pub mask_threshold: f64,
    pub mask_threshold_kind: MaskThresholdKind,
}

impl ThresholdSet {
    pub fn new(
        theoretical_noise_threshold: f64,
        noise_threshold: f64,
        dynamic_range_threshold: f64,
    ) -> ThresholdSet {
        let (mask_threshold, mask_threshold_kind) = mask_threshold(
            theoretical_noise_threshold,
            noise_threshold,
            dynamic_range_threshold,
        );
        ThresholdSet {
            theoretical_noise_threshold,
            noise_threshold,
            dynamic_range_threshold,
            mask_threshold,
            mask_threshold_kind,
        }
    }
}

/// `nsigma` times the theoretical noise.
pub fn theoretical_noise_threshold(noise: f64, nsigma: f64) -> f64 {
    nsigma * noise
}

/// The noise threshold for a minor cycle within a major cycle. A zero `c0` is a
/// configuration error.
pub fn noise_threshold(
    imax: f64,
    minor_cycle: usize,
    major_cycle: usize,
    c0: f64,
) -> Result<f64, ThresholdError> {
    if c0 == 0.0 {
        return Err(ThresholdError::ZeroScale { name: "c0" });
    }
    Ok(imax / ((c0 + minor_cycle as f64 * c0) * (major_cycle as f64 + 1.0)))
}

/// The threshold implied by cleaning `imax` to the given dynamic range. An
/// unset (zero) dynamic range is replaced by `dynamic_range_minimum`.
pub fn dynamic_range_threshold(imax: f64, dynamic_range: f64, dynamic_range_minimum: f64) -> f64 {
    let dynamic_range = if dynamic_range == 0.0 {
        dynamic_range_minimum
    } else {
        dynamic_range
    };
    imax / dynamic_range
}

/// The largest of the three thresholds, along with which one it was. Ties go
/// to the earlier argument.
pub fn mask_threshold(
    theoretical_noise_threshold: f64,
    noise_threshold: f64,
    dynamic_range_threshold: f64,
) -> (f64, MaskThresholdKind) {
    let mut max = (theoretical_noise_threshold, MaskThresholdKind::TheoreticalNoise);
    if noise_threshold > max.0 {
        max = (noise_threshold, MaskThresholdKind::Noise);
    }
    if dynamic_range_threshold > max.0 {
        max = (dynamic_range_threshold, MaskThresholdKind::DynamicRange);
    }
    max
}

/// The level at which a clean stops, given the mask threshold of the cycle.
pub fn clean_cutoff(mask_threshold: f64, c1: f64) -> Result<f64, ThresholdError> {
    if c1 == 0.0 {
        return Err(ThresholdError::ZeroScale { name: "c1" });
    }
    Ok(mask_threshold / c1)
}

/// The number of minor cycles needed to clean a channel down to its maximum
/// reachable dynamic range, stepping the dynamic range by `dr0` each cycle.
///
/// A maximum dynamic range below 1 gives a negative count, which is clamped to
/// 0 (no cleaning). A non-finite dynamic range (e.g. a theoretical noise of 0)
/// is an error.
pub fn minor_cycle_count(max_dynamic_range: f64, dr0: f64) -> Result<usize, ThresholdError> {
    if dr0 <= 1.0 {
        return Err(ThresholdError::Dr0NotAboveOne(dr0));
    }
    if !max_dynamic_range.is_finite() {
        return Err(ThresholdError::NonFiniteDynamicRange(max_dynamic_range));
    }

    let count = (max_dynamic_range.ln() / dr0.ln()).ceil();
    if count.is_nan() || count < 0.0 {
        debug!("Minor cycle count {count} (max. dynamic range {max_dynamic_range}) clamped to 0");
        Ok(0)
    } else {
        Ok(count as usize)
    }
}

/// The mask levels of each minor cycle of a line channel.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskLevelSchedule {
    /// Is any cleaning requested at all? This is false when there are no
    /// minor cycles.
    pub clean_requested: bool,

    /// The mask level (and hence clean depth) for each minor cycle.
    pub levels: Vec<f64>,
}

/// Build the mask levels of a line channel. The dynamic range ramps
/// geometrically (`dr0^(k+1)`), the last cycle goes exactly to the maximum
/// dynamic range, and the first cycle never goes beyond `minorcycle0_dr`.
pub fn mask_level_schedule(
    n_iterations: usize,
    dr0: f64,
    max_dynamic_range: f64,
    minorcycle0_dr: f64,
    imax: f64,
) -> MaskLevelSchedule {
    if n_iterations == 0 {
        return MaskLevelSchedule {
            clean_requested: false,
            levels: vec![],
        };
    }

    let mut ramp: Vec<f64> = (0..n_iterations)
        .map(|k| dr0.powi(k as i32 + 1))
        .collect();
    ramp[n_iterations - 1] = max_dynamic_range;
    if ramp[0] >= minorcycle0_dr {
        ramp[0] = minorcycle0_dr;
    }

    MaskLevelSchedule {
        clean_requested: true,
        levels: ramp.into_iter().map(|dr| imax / dr).collect(),
    }
}

/// How the dynamic range grows over major cycles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MajorCycleFunction {
    /// `dr_init * dr0^m`.
    #[strum(serialize = "square")]
    Square,
}

/// How the dynamic range grows over the minor cycles of one major cycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MinorCycleFunction {
    /// Quadratic interpolation from the previous major cycle's ceiling.
    #[strum(serialize = "square")]
    Square,

    /// Decreasing roots of the ramp span, reversed so the ramp increases.
    #[strum(serialize = "power")]
    Power,

    /// Linear interpolation from the previous major cycle's ceiling.
    #[strum(serialize = "linear")]
    Linear,
}

/// The dynamic range ceiling of every major cycle.
pub fn major_cycle_ramp(
    dr_init: f64,
    dr0: f64,
    n_major: usize,
    function: MajorCycleFunction,
) -> Vec<f64> {
    match function {
        MajorCycleFunction::Square => (0..n_major)
            .map(|m| dr_init * dr0.powi(m as i32))
            .collect(),
    }
}

/// The dynamic ranges of the minor cycles of major cycle `major_index`, going
/// from the previous major cycle's ceiling (0 for the first major cycle) up to
/// this one's. A first value of exactly 0 is replaced by `first_cycle_floor`.
pub fn minor_cycle_ramp(
    dr_major: &[f64],
    major_index: usize,
    n_minor: usize,
    function: MinorCycleFunction,
    first_cycle_floor: f64,
) -> Result<Vec<f64>, ThresholdError> {
    let current = *dr_major
        .get(major_index)
        .ok_or(ThresholdError::MajorCycleOutOfRange {
            index: major_index,
            num_major_cycles: dr_major.len(),
        })?;
    let previous = match major_index {
        0 => 0.0,
        i => dr_major[i - 1],
    };
    let span = current - previous;

    let mut ramp: Vec<f64> = match (function, n_minor) {
        (_, 0) => return Ok(vec![]),
        // With a single minor cycle, the interpolating ramps go straight to the
        // ceiling.
        (MinorCycleFunction::Square | MinorCycleFunction::Linear, 1) => vec![current],
        (MinorCycleFunction::Square, _) => {
            let denom = ((n_minor - 1) as f64).powi(2);
            (0..n_minor)
                .map(|n| previous + span * (n as f64).powi(2) / denom)
                .collect()
        }
        (MinorCycleFunction::Linear, _) => {
            let step = span / (n_minor - 1) as f64;
            (0..n_minor).map(|n| previous + step * n as f64).collect()
        }
        (MinorCycleFunction::Power, _) => (0..n_minor)
            .rev()
            .map(|n| previous + span.powf(1.0 / (n as f64 + 1.0)))
            .collect(),
    };

    if ramp[0] == 0.0 {
        ramp[0] = first_cycle_floor;
    }
    Ok(ramp)
}
