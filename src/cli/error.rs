// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all linecube-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use super::{
    continuum_image::ContinuumImageArgsError, cube_assemble::CubeAssembleArgsError,
    line_image::LineImageArgsError,
};
use crate::{
    continuum::ContinuumImagingError,
    cube::CubeError,
    imaging::{PrimitiveError, ReportError},
    io::{FitsError, GlobError},
    params::LineImagingError,
    schedule::{ManifestError, SchedulerError, SplitError},
    threshold::ThresholdError,
};

/// The *only* publicly visible error from linecube.
#[derive(Error, Debug)]
pub enum LinecubeError {
    /// A problem with the supplied arguments that was caught before any work
    /// was done.
    #[error("{0}\n\nRun with --help to see the available arguments.")]
    Config(String),

    /// An error from deriving clean thresholds.
    #[error("{0}\n\nCheck the threshold constants (c0, c1, dr0) given to the run.")]
    Threshold(String),

    /// An error from the external imager.
    #[error("{0}\n\nIf the imager's executables aren't on PATH, point --miriad-bin-dir at them.")]
    Primitive(String),

    /// An error from assembling or writing a cube.
    #[error("{0}")]
    Cube(String),

    /// A cfitsio error. Because these are usually quite spartan, some
    /// suggestions are provided here.
    #[error("cfitsio error: {0}\n\nIf you don't know what this means, try turning up verbosity (-v or -vv) and maybe disabling progress bars.")]
    Cfitsio(String),

    /// An error related to argument files.
    #[error("{0}\n\nArgument files must be toml or json, with the same keys as the long argument names.")]
    ArgFile(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

// Binary sub-command errors.

impl From<LineImageArgsError> for LinecubeError {
    fn from(e: LineImageArgsError) -> Self {
        match e {
            LineImageArgsError::Glob(e) => Self::from(e),
            LineImageArgsError::IO(e) => Self::from(e),
            _ => Self::Config(e.to_string()),
        }
    }
}

impl From<ContinuumImageArgsError> for LinecubeError {
    fn from(e: ContinuumImageArgsError) -> Self {
        match e {
            ContinuumImageArgsError::Glob(e) => Self::from(e),
            ContinuumImageArgsError::IO(e) => Self::from(e),
            _ => Self::Config(e.to_string()),
        }
    }
}

impl From<CubeAssembleArgsError> for LinecubeError {
    fn from(e: CubeAssembleArgsError) -> Self {
        match e {
            CubeAssembleArgsError::IO(e) => Self::from(e),
            _ => Self::Config(e.to_string()),
        }
    }
}

// Library code errors.

impl From<LineImagingError> for LinecubeError {
    fn from(e: LineImagingError) -> Self {
        let s = e.to_string();
        match e {
            LineImagingError::EmptyOutputRange { .. } => Self::Config(s),
            LineImagingError::Split(e) => Self::from(e),
            LineImagingError::Scheduler(e) => Self::from(e),
            LineImagingError::Manifest(e) => Self::from(e),
            LineImagingError::Cube(e) => Self::from(e),
            LineImagingError::Glob(e) => Self::from(e),
            LineImagingError::IO(e) => Self::from(e),
        }
    }
}

impl From<ContinuumImagingError> for LinecubeError {
    fn from(e: ContinuumImagingError) -> Self {
        let s = e.to_string();
        match e {
            ContinuumImagingError::NoCycles { .. } => Self::Config(s),
            ContinuumImagingError::NoVisibilities
            | ContinuumImagingError::Report(_)
            | ContinuumImagingError::Primitive { .. } => Self::Primitive(s),
            ContinuumImagingError::Threshold(_) => Self::Threshold(s),
            ContinuumImagingError::IO(e) => Self::from(e),
        }
    }
}

impl From<SchedulerError> for LinecubeError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::ThreadPool(_) => Self::Generic(e.to_string()),
            SchedulerError::NothingSplit(_) => Self::Primitive(e.to_string()),
            SchedulerError::Split(e) => Self::from(e),
            SchedulerError::Manifest(e) => Self::from(e),
            SchedulerError::IO(e) => Self::from(e),
        }
    }
}

impl From<SplitError> for LinecubeError {
    fn from(e: SplitError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<ManifestError> for LinecubeError {
    fn from(e: ManifestError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<CubeError> for LinecubeError {
    fn from(e: CubeError) -> Self {
        match e {
            CubeError::Fits(e) => Self::from(e),
            CubeError::Glob(e) => Self::from(e),
            CubeError::IO(e) => Self::from(e),
            _ => Self::Cube(e.to_string()),
        }
    }
}

impl From<ThresholdError> for LinecubeError {
    fn from(e: ThresholdError) -> Self {
        Self::Threshold(e.to_string())
    }
}

impl From<PrimitiveError> for LinecubeError {
    fn from(e: PrimitiveError) -> Self {
        match e {
            PrimitiveError::Fits(e) => Self::from(e),
            PrimitiveError::BeamShape(_) => Self::Config(e.to_string()),
            _ => Self::Primitive(e.to_string()),
        }
    }
}

impl From<ReportError> for LinecubeError {
    fn from(e: ReportError) -> Self {
        Self::Primitive(e.to_string())
    }
}

impl From<FitsError> for LinecubeError {
    fn from(e: FitsError) -> Self {
        Self::Cfitsio(e.to_string())
    }
}

impl From<GlobError> for LinecubeError {
    fn from(e: GlobError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<std::io::Error> for LinecubeError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
