// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{
    imaging::{PrimitiveError, ReportError},
    threshold::ThresholdError,
};

/// Why a single channel couldn't be imaged. None of these stop other channels.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Unexpected map-formation diagnostics: {0}")]
    Report(#[from] ReportError),

    #[error("{step} failed: {source}")]
    Primitive {
        step: &'static str,
        source: PrimitiveError,
    },

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("Imaging panicked: {0}")]
    Panicked(String),
}

/// Attach the step that was running to a primitive failure.
pub(super) trait InStep<T> {
    fn in_step(self, step: &'static str) -> Result<T, ChannelError>;
}

impl<T> InStep<T> for Result<T, PrimitiveError> {
    fn in_step(self, step: &'static str) -> Result<T, ChannelError> {
        self.map_err(|source| ChannelError::Primitive { step, source })
    }
}
