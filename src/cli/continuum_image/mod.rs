// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.


use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;
use vec1::Vec1;

use super::common::{
    display_warnings, parse_beam, positive, resolve_paths, CommonArgsError, GridArgs, InfoPrinter,
    ThresholdArgs, Thresholds, ARG_FILE_HELP,
};
use crate::{
    constants::{
        DEFAULT_C0, DEFAULT_CONTINUUM_MAJOR_CYCLES, DEFAULT_CONTINUUM_MINOR_CYCLES,
        DEFAULT_DR_INIT, DEFAULT_NSIGMA,
    },
    continuum::ContinuumParams,
    io::GlobError,
    params::ContinuumImageParams,
    threshold::{MajorCycleFunction, MinorCycleFunction},
    LinecubeError,
};

lazy_static::lazy_static! {
    static ref NSIGMA_HELP: String =
        format!("The theoretical noise threshold is this many times the theoretical noise. Default: {DEFAULT_NSIGMA}");

    static ref C0_HELP: String =
        format!("Scales how quickly the noise threshold falls with each cycle. Default: {DEFAULT_C0}");

    static ref DR_INIT_HELP: String =
        format!("The dynamic range ceiling of the first major cycle. Default: {DEFAULT_DR_INIT}");

    static ref MAJOR_CYCLES_HELP: String =
        format!("The number of major cycles. Default: {DEFAULT_CONTINUUM_MAJOR_CYCLES}");

    static ref MINOR_CYCLES_HELP: String =
        format!("The number of minor cycles; each makes a mask, cleans and restores. Default: {DEFAULT_CONTINUUM_MINOR_CYCLES}");

    static ref MAJOR_CYCLE_FUNCTION_HELP: String =
        format!("How the dynamic range grows over major cycles. Supported: {}. Default: {}",
            MajorCycleFunction::iter().join(", "), MajorCycleFunction::Square);

    static ref MINOR_CYCLE_FUNCTION_HELP: String =
        format!("How the dynamic range grows over minor cycles. Supported: {}. Default: {}",
            MinorCycleFunction::iter().join(", "), MinorCycleFunction::Square);
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ContinuumImageCliArgs {
    /// Paths to the calibrated visibilities. Globs are accepted; each must
    /// match at least one path.
    #[clap(short, long, multiple_values(true), help_heading = "INPUT DATA")]
    data: Option<Vec<String>>,

    /// The directory the continuum products are made in.
    #[clap(long, help_heading = "OUTPUT FILES")]
    cont_dir: Option<PathBuf>,

    #[clap(long, help = NSIGMA_HELP.as_str(), help_heading = "DECONVOLUTION")]
    nsigma: Option<f64>,

    #[clap(long, help = C0_HELP.as_str(), help_heading = "DECONVOLUTION")]
    c0: Option<f64>,

    #[clap(long, help = DR_INIT_HELP.as_str(), help_heading = "DECONVOLUTION")]
    dr_init: Option<f64>,

    #[clap(long, help = MAJOR_CYCLES_HELP.as_str(), help_heading = "DECONVOLUTION")]
    major_cycles: Option<usize>,

    #[clap(long, help = MINOR_CYCLES_HELP.as_str(), help_heading = "DECONVOLUTION")]
    minor_cycles: Option<usize>,

    #[clap(long, help = MAJOR_CYCLE_FUNCTION_HELP.as_str(), help_heading = "DECONVOLUTION")]
    major_cycle_function: Option<String>,

    #[clap(long, help = MINOR_CYCLE_FUNCTION_HELP.as_str(), help_heading = "DECONVOLUTION")]
    minor_cycle_function: Option<String>,

    /// The beam to restore with, as "major,minor,position angle" [arcsec,
    /// arcsec, degrees]. Default: the fitted beam.
    #[clap(long, help_heading = "DECONVOLUTION")]
    restoring_beam: Option<String>,

    /// The directory holding the MIRIAD executables. Default: search PATH.
    #[clap(long, help_heading = "IMAGER")]
    miriad_bin_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct ContinuumImageArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "continuum-image")]
    #[serde(default)]
    continuum_image_args: ContinuumImageCliArgs,

    #[clap(flatten)]
    #[serde(rename = "grid")]
    #[serde(default)]
    grid_args: GridArgs,

    #[clap(flatten)]
    #[serde(rename = "thresholds")]
    #[serde(default)]
    threshold_args: ThresholdArgs,
}

impl ContinuumImageArgs {
    /// Consolidate the command-line arguments with those of the argument file,
    /// preferring the command line.
    pub(super) fn merge(self) -> Result<ContinuumImageArgs, LinecubeError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let ContinuumImageArgs {
                args_file: _,
                continuum_image_args,
                grid_args,
                threshold_args,
            } = unpack_arg_file!(arg_file);

            Ok(ContinuumImageArgs {
                args_file: None,
                continuum_image_args: cli_args.continuum_image_args.merge(continuum_image_args),
                grid_args: cli_args.grid_args.merge(grid_args),
                threshold_args: cli_args.threshold_args.merge(threshold_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<ContinuumImageParams, ContinuumImageArgsError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            continuum_image_args:
                ContinuumImageCliArgs {
                    data,
                    cont_dir,
                    nsigma,
                    c0,
                    dr_init,
                    major_cycles,
                    minor_cycles,
                    major_cycle_function,
                    minor_cycle_function,
                    restoring_beam,
                    miriad_bin_dir,
                },
            grid_args,
            threshold_args,
        } = self;

        let datasets = match data {
            Some(d) if !d.is_empty() => resolve_paths(&d)?,
            _ => return Err(ContinuumImageArgsError::NoData),
        };
        let datasets = Vec1::try_from_vec(datasets).map_err(|_| ContinuumImageArgsError::NoData)?;
        let cont_dir = cont_dir.ok_or(ContinuumImageArgsError::NoContinuumDir)?;
        let cont_dir = std::path::absolute(cont_dir)?;

        let num_major_cycles = major_cycles.unwrap_or(DEFAULT_CONTINUUM_MAJOR_CYCLES);
        let num_minor_cycles = minor_cycles.unwrap_or(DEFAULT_CONTINUUM_MINOR_CYCLES);
        if num_major_cycles == 0 || num_minor_cycles == 0 {
            return Err(ContinuumImageArgsError::NoCycles);
        }
        let major_cycle_function = match major_cycle_function {
            None => MajorCycleFunction::Square,
            Some(f) => MajorCycleFunction::from_str(&f)
                .map_err(|_| ContinuumImageArgsError::UnknownFunction(f))?,
        };
        let minor_cycle_function = match minor_cycle_function {
            None => MinorCycleFunction::Square,
            Some(f) => MinorCycleFunction::from_str(&f)
                .map_err(|_| ContinuumImageArgsError::UnknownFunction(f))?,
        };

        let Thresholds {
            c1,
            dr0,
            minorcycle0_dr,
        } = threshold_args.parse()?;
        let continuum = ContinuumParams {
            grid: grid_args.parse()?,
            nsigma: positive("nsigma", nsigma.unwrap_or(DEFAULT_NSIGMA))?,
            c0: positive("c0", c0.unwrap_or(DEFAULT_C0))?,
            c1,
            dr0,
            dr_init: positive("dr-init", dr_init.unwrap_or(DEFAULT_DR_INIT))?,
            minorcycle0_dr,
            num_major_cycles,
            num_minor_cycles,
            major_cycle_function,
            minor_cycle_function,
            restoring_beam: parse_beam("restoring beam", restoring_beam.as_deref())?,
        };

        let mut printer = InfoPrinter::new("Continuum imaging set up".into());
        printer.push_block(
            datasets
                .iter()
                .map(|d| format!("Input data: {}", d.display()).into())
                .collect(),
        );
        printer.push_line(format!("Working in {}", cont_dir.display()).into());
        printer.push_block(vec![
            format!(
                "{num_major_cycles} major cycles ({major_cycle_function}), {num_minor_cycles} minor cycles ({minor_cycle_function})"
            )
            .into(),
            format!(
                "nsigma {}, c0 {}, c1 {c1}, dr0 {dr0}, dr_init {}",
                continuum.nsigma, continuum.c0, continuum.dr_init
            )
            .into(),
        ]);
        printer.display();
        display_warnings();

        Ok(ContinuumImageParams {
            datasets,
            cont_dir,
            continuum,
            miriad_bin_dir,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), LinecubeError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let product = params.run()?;
        info!(
            "Continuum model {} and image {} written to {}",
            product.model,
            product.image_fits,
            params.cont_dir.display()
        );
        Ok(())
    }
}

impl ContinuumImageCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            data: self.data.or(other.data),
            cont_dir: self.cont_dir.or(other.cont_dir),
            nsigma: self.nsigma.or(other.nsigma),
            c0: self.c0.or(other.c0),
            dr_init: self.dr_init.or(other.dr_init),
            major_cycles: self.major_cycles.or(other.major_cycles),
            minor_cycles: self.minor_cycles.or(other.minor_cycles),
            major_cycle_function: self.major_cycle_function.or(other.major_cycle_function),
            minor_cycle_function: self.minor_cycle_function.or(other.minor_cycle_function),
            restoring_beam: self.restoring_beam.or(other.restoring_beam),
            miriad_bin_dir: self.miriad_bin_dir.or(other.miriad_bin_dir),
        }
    }
}

#[derive(Error, Debug)]
pub(super) enum ContinuumImageArgsError {
    #[error("No input data was supplied")]
    NoData,

    #[error("No continuum directory was supplied")]
    NoContinuumDir,

    #[error("There must be at least one major and one minor cycle")]
    NoCycles,

    #[error("Unknown cycle function '{0}'")]
    UnknownFunction(String),

    #[error(transparent)]
    Common(#[from] CommonArgsError),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
