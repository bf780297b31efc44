// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{
    imaging::{PrimitiveError, ReportError},
    threshold::ThresholdError,
};

#[derive(Error, Debug)]
pub enum ContinuumImagingError {
    #[error("At least one major and one minor cycle are needed (got {major} major, {minor} minor)")]
    NoCycles { major: usize, minor: usize },

    #[error("No visibilities were accepted for the continuum image")]
    NoVisibilities,

    #[error("Unexpected map-formation diagnostics: {0}")]
    Report(#[from] ReportError),

    #[error("Continuum {step} failed: {source}")]
    Primitive {
        step: &'static str,
        source: PrimitiveError,
    },

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

pub(super) trait InStep<T> {
    fn in_step(self, step: &'static str) -> Result<T, ContinuumImagingError>;
}

impl<T> InStep<T> for Result<T, PrimitiveError> {
    fn in_step(self, step: &'static str) -> Result<T, ContinuumImagingError> {
        self.map_err(|source| ContinuumImagingError::Primitive { step, source })
    }
}
