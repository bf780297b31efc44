// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ThresholdError {
    #[error("The scale constant {name} is 0; this would divide by zero")]
    ZeroScale { name: &'static str },

    #[error("The dynamic-range step (dr0) must be greater than 1, but got {0}")]
    Dr0NotAboveOne(f64),

    #[error("The maximum dynamic range is not finite ({0}); was the theoretical noise 0?")]
    NonFiniteDynamicRange(f64),

    #[error("Asked for the minor cycles of major cycle {index}, but there are only {num_major_cycles} major cycles")]
    MajorCycleOutOfRange {
        index: usize,
        num_major_cycles: usize,
    },
}
