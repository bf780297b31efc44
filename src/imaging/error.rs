// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from invoking the external imaging primitive.

use thiserror::Error;

use crate::io::FitsError;

#[derive(Error, Debug)]
pub enum PrimitiveError {
    #[error("Couldn't start the imaging task '{task}': {source}")]
    Spawn {
        task: String,
        source: std::io::Error,
    },

    #[error("The imaging task '{task}' failed ({status}):\n{stderr}")]
    TaskFailed {
        task: String,
        status: String,
        stderr: String,
    },

    #[error("The imaging task '{task}' reported success, but its output '{output}' doesn't exist")]
    MissingOutput { task: String, output: String },

    #[error("Image '{image}' has no finite pixels; its statistics are undefined")]
    NoFinitePixels { image: String },

    #[error("Couldn't parse '{0}' as a beam shape; expected 'major,minor,position angle' in arcsec, arcsec, degrees")]
    BeamShape(String),

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
