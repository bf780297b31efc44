// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Couldn't build a worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("None of the {0} frequency chunks could be split out")]
    NothingSplit(usize),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    #[error("The {what} channel width ({width} Hz) must be positive")]
    BadChannelWidth { what: &'static str, width: f64 },

    #[error("The chunk bandwidth ({0} Hz) must be positive")]
    BadChunkBandwidth(f64),

    #[error("Can't split {total_channels} channels into {num_chunks} chunks")]
    TooFewChannels {
        total_channels: usize,
        num_chunks: usize,
    },
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Couldn't read the chunk manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't write the chunk manifest {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't decode the chunk manifest {path}: {source}")]
    Decode {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Couldn't encode the chunk manifest: {0}")]
    Encode(#[from] toml::ser::Error),
}
