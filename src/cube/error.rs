// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use crate::io::{FitsError, GlobError};

#[derive(Error, Debug)]
pub enum CubeError {
    #[error("The requested channel range {start}..{end} is empty")]
    EmptyRange { start: usize, end: usize },

    #[error("{path}: the header has no {key}")]
    MissingKey { path: PathBuf, key: &'static str },

    #[error("{path}: image shape {shape:?} has more than one non-degenerate axis beyond the sky axes")]
    NonDegenerateAxes { path: PathBuf, shape: Vec<usize> },

    #[error("{path}: expected a {expected_ny}x{expected_nx} image, but it is {ny}x{nx}")]
    ShapeMismatch {
        path: PathBuf,
        expected_ny: usize,
        expected_nx: usize,
        ny: usize,
        nx: usize,
    },

    #[error("Channel {channel} lies outside the cube's channels {start}..{end}")]
    ChannelOutOfRange {
        channel: usize,
        start: usize,
        end: usize,
    },

    #[error("Channel {0} was filled twice")]
    AlreadyFilled(usize),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
