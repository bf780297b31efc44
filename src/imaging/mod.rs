// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The external imaging primitive.
//!
//! Map formation, masking, deconvolution, restoration, convolution and export
//! are done by an external imager, never in this crate. [`ImagingPrimitive`]
//! is the contract the channel state machine and the continuum driver need;
//! [`UvTasks`] covers the visibility-domain tasks used before imaging.
//! [`Miriad`] implements both by running MIRIAD tasks.
//!
//! All image names given to a primitive are relative to its working directory.

mod error;
mod miriad;
#[cfg(test)]
pub(crate) mod mock;
mod report;
mod statistics;

pub use error::PrimitiveError;
pub use miriad::Miriad;
pub use report::{InvertReport, ReportError};
pub use statistics::ImageStatistics;

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// A Gaussian beam \[arcsec, arcsec, degrees\].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamShape {
    pub major_arcsec: f64,
    pub minor_arcsec: f64,
    pub position_angle_deg: f64,
}

impl FromStr for BeamShape {
    type Err = PrimitiveError;

    /// Parse "major,minor,pa".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<f64> = s
            .split(',')
            .map(|v| v.trim().parse())
            .collect::<Result<_, _>>()
            .map_err(|_| PrimitiveError::BeamShape(s.to_string()))?;
        match values.as_slice() {
            [major_arcsec, minor_arcsec, position_angle_deg] => Ok(BeamShape {
                major_arcsec: *major_arcsec,
                minor_arcsec: *minor_arcsec,
                position_angle_deg: *position_angle_deg,
            }),
            _ => Err(PrimitiveError::BeamShape(s.to_string())),
        }
    }
}

impl Display for BeamShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.major_arcsec, self.minor_arcsec, self.position_angle_deg
        )
    }
}

/// How visibilities are gridded.
#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    /// \[pixels\]
    pub imsize: usize,
    /// \[arcsec\]
    pub cellsize: f64,
    /// Briggs' robustness. `None` gives the imager's default weighting.
    pub robust: Option<f64>,
    /// A pointing centre offset; if given, a mosaic is made.
    pub centre: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvertRequest<'a> {
    pub datasets: &'a [PathBuf],
    pub map: &'a str,
    pub beam: &'a str,
    /// A single (0-indexed) channel to select out of the datasets. `None`
    /// selects everything (multi-frequency synthesis over the whole band).
    pub channel: Option<usize>,
    pub grid: &'a GridParams,
    /// Also produce the sky response (needed for the beam cube).
    pub sky_response: bool,
}

/// Where a clean is allowed to put components.
#[derive(Debug, Clone, PartialEq)]
pub enum CleanRegion {
    /// Only where the mask image is set.
    Mask(String),

    /// A pixel box, 1-indexed and inclusive.
    Box {
        blc: (usize, usize),
        trc: (usize, usize),
    },
}

impl Display for CleanRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanRegion::Mask(mask) => write!(f, "mask({mask})"),
            CleanRegion::Box { blc, trc } => {
                write!(f, "boxes({},{},{},{})", blc.0, blc.1, trc.0, trc.1)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanAlgorithm {
    /// Single-frequency deconvolution (line channels).
    Hogbom,
    /// Multi-frequency deconvolution (continuum).
    MultiFrequency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanRequest<'a> {
    pub map: &'a str,
    pub beam: &'a str,
    pub out: &'a str,
    pub region: CleanRegion,
    pub cutoff: Option<f64>,
    pub max_iterations: usize,
    pub gain: Option<f64>,
    pub seed_model: Option<&'a str>,
    pub algorithm: CleanAlgorithm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Model convolved with the restoring beam plus residuals.
    Clean,
    Residual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreRequest<'a> {
    pub model: &'a str,
    pub beam: &'a str,
    pub map: &'a str,
    pub out: &'a str,
    pub mode: RestoreMode,
    pub resolution: Option<BeamShape>,
}

/// Which planes of an image to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPlane {
    All,
    /// Only the first plane; sky-response beams carry more planes than needed.
    First,
}

/// The operations needed to image a channel.
///
/// Every operation blocks until the external imager is done. Implementors must
/// be usable from many threads at once; concurrent callers never share output
/// names.
pub trait ImagingPrimitive: Sync {
    /// Form a dirty map and beam. The returned lines are the imager's
    /// diagnostics; see [`InvertReport`].
    fn invert(&self, request: &InvertRequest) -> Result<Vec<String>, PrimitiveError>;

    /// Write `out`: a copy of `image` masked to pixels greater than
    /// `threshold`.
    fn mask(&self, image: &str, threshold: f64, out: &str) -> Result<(), PrimitiveError>;

    fn clean(&self, request: &CleanRequest) -> Result<(), PrimitiveError>;

    fn restore(&self, request: &RestoreRequest) -> Result<(), PrimitiveError>;

    fn convolve(&self, image: &str, out: &str, beam: &BeamShape) -> Result<(), PrimitiveError>;

    fn statistics(&self, image: &str) -> Result<ImageStatistics, PrimitiveError>;

    /// Write `image` as a FITS file `out`.
    fn export(&self, image: &str, out: &str, plane: ExportPlane) -> Result<(), PrimitiveError>;
}

/// A channel range to average out of a dataset; 1-indexed like the imager's
/// own channel selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelection {
    pub num_channels: usize,
    pub start: usize,
    pub width: usize,
    pub step: usize,
}

impl Display for ChannelSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "channel,{},{},{},{}",
            self.num_channels, self.start, self.width, self.step
        )
    }
}

/// How continuum emission is removed from a chunk's visibilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContinuumModel<'a> {
    /// Fit and subtract a low-order polynomial over frequency per baseline.
    Polynomial,
    /// Subtract the visibilities of a continuum clean model.
    CleanModel(&'a Path),
}

/// Visibility-domain operations run before channels are imaged.
pub trait UvTasks: Sync {
    fn average_channels(
        &self,
        dataset: &Path,
        out: &Path,
        selection: &ChannelSelection,
    ) -> Result<(), PrimitiveError>;

    fn subtract_continuum(
        &self,
        dataset: &Path,
        out: &Path,
        model: ContinuumModel,
    ) -> Result<(), PrimitiveError>;
}
