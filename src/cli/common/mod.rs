// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common arguments for command-line interfaces. The `line-image` and
//! `continuum-image` subcommands both grid visibilities and derive clean
//! thresholds, so those arguments are shared between them.

mod printers;

pub(super) use printers::InfoPrinter;
pub(crate) use printers::{display_warnings, Warn};

use std::path::{Path, PathBuf};

use clap::Parser;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    constants::{DEFAULT_C1, DEFAULT_CELLSIZE, DEFAULT_DR0, DEFAULT_IMSIZE, DEFAULT_MINORCYCLE0_DR},
    imaging::{BeamShape, GridParams},
    io::{get_all_matches_from_glob, get_single_match_from_glob, GlobError},
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);

    static ref IMSIZE_HELP: String =
        format!("The size of the image along each axis [pixels]. Default: {DEFAULT_IMSIZE}");

    static ref CELLSIZE_HELP: String =
        format!("The size of an image pixel [arcsec]. Default: {DEFAULT_CELLSIZE}");

    static ref C1_HELP: String =
        format!("A clean stops at the mask threshold divided by this. Default: {DEFAULT_C1}");

    static ref DR0_HELP: String =
        format!("The factor the dynamic range grows by every cycle; must be greater than 1. Default: {DEFAULT_DR0}");

    static ref MINORCYCLE0_DR_HELP: String =
        format!("The largest dynamic range the first clean cycle may go to. Default: {DEFAULT_MINORCYCLE0_DR}");
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(LinecubeError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(LinecubeError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(LinecubeError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// How visibilities are gridded into images.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct GridArgs {
    #[clap(long, help = IMSIZE_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) imsize: Option<usize>,

    #[clap(long, help = CELLSIZE_HELP.as_str(), help_heading = "GRIDDING")]
    pub(super) cellsize: Option<f64>,

    /// Briggs' robustness. If not given, the imager's default weighting is
    /// used.
    #[clap(long, allow_hyphen_values = true, help_heading = "GRIDDING")]
    pub(super) robust: Option<f64>,

    /// Offset the pointing centre by this much, e.g. "10,-5" [arcsec]. A
    /// mosaic is made if this is given.
    #[clap(long, allow_hyphen_values = true, help_heading = "GRIDDING")]
    pub(super) centre: Option<String>,
}

impl GridArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            imsize: self.imsize.or(other.imsize),
            cellsize: self.cellsize.or(other.cellsize),
            robust: self.robust.or(other.robust),
            centre: self.centre.or(other.centre),
        }
    }

    pub(super) fn parse(self) -> Result<GridParams, CommonArgsError> {
        let imsize = self.imsize.unwrap_or(DEFAULT_IMSIZE);
        if imsize == 0 {
            return Err(CommonArgsError::ZeroImsize);
        }
        Ok(GridParams {
            imsize,
            cellsize: positive("cellsize", self.cellsize.unwrap_or(DEFAULT_CELLSIZE))?,
            robust: self.robust,
            centre: self.centre,
        })
    }
}

/// The clean-threshold constants both line and continuum imaging use.
#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct ThresholdArgs {
    #[clap(long, help = C1_HELP.as_str(), help_heading = "THRESHOLDS")]
    pub(super) c1: Option<f64>,

    #[clap(long, help = DR0_HELP.as_str(), help_heading = "THRESHOLDS")]
    pub(super) dr0: Option<f64>,

    #[clap(long, help = MINORCYCLE0_DR_HELP.as_str(), help_heading = "THRESHOLDS")]
    pub(super) minorcycle0_dr: Option<f64>,
}

/// Validated [`ThresholdArgs`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Thresholds {
    pub(super) c1: f64,
    pub(super) dr0: f64,
    pub(super) minorcycle0_dr: f64,
}

impl ThresholdArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            c1: self.c1.or(other.c1),
            dr0: self.dr0.or(other.dr0),
            minorcycle0_dr: self.minorcycle0_dr.or(other.minorcycle0_dr),
        }
    }

    pub(super) fn parse(self) -> Result<Thresholds, CommonArgsError> {
        let dr0 = self.dr0.unwrap_or(DEFAULT_DR0);
        if !(dr0 > 1.0) {
            return Err(CommonArgsError::Dr0NotAboveOne(dr0));
        }
        Ok(Thresholds {
            c1: positive("c1", self.c1.unwrap_or(DEFAULT_C1))?,
            dr0,
            minorcycle0_dr: positive(
                "minorcycle0-dr",
                self.minorcycle0_dr.unwrap_or(DEFAULT_MINORCYCLE0_DR),
            )?,
        })
    }
}

/// Values that divide or scale thresholds must be positive and finite.
pub(super) fn positive(name: &'static str, value: f64) -> Result<f64, CommonArgsError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CommonArgsError::NotPositive { name, value })
    }
}

pub(super) fn parse_beam(
    name: &'static str,
    beam: Option<&str>,
) -> Result<Option<BeamShape>, CommonArgsError> {
    beam.map(|b| {
        b.parse().map_err(|_| CommonArgsError::BeamShape {
            name,
            value: b.to_string(),
        })
    })
    .transpose()
}

/// Resolve a path that may be a glob to exactly one existing path.
pub(super) fn resolve_path(path: &Path) -> Result<PathBuf, GlobError> {
    let path = get_single_match_from_glob(&path.display().to_string())?;
    Ok(path.canonicalize().unwrap_or(path))
}

/// Resolve paths that may be globs. Every pattern must match something.
pub(super) fn resolve_paths<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>, GlobError> {
    let mut paths = vec![];
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let matches = get_all_matches_from_glob(pattern)?;
        if matches.is_empty() {
            return Err(GlobError::NoMatches {
                glob: pattern.to_string(),
            });
        }
        paths.extend(matches.into_iter().map(|p| p.canonicalize().unwrap_or(p)));
    }
    Ok(paths)
}

#[derive(Error, Debug)]
pub(super) enum CommonArgsError {
    #[error("The image size must be at least 1 pixel")]
    ZeroImsize,

    #[error("{name} must be positive and finite; got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("dr0 must be greater than 1; got {0}")]
    Dr0NotAboveOne(f64),

    #[error("Couldn't parse {name} '{value}'; expected 'major,minor,position angle' [arcsec, arcsec, degrees]")]
    BeamShape { name: &'static str, value: String },
}
