// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.


use std::{num::NonZeroUsize, path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;
use vec1::Vec1;

use super::common::{
    display_warnings, parse_beam, positive, resolve_path, CommonArgsError, GridArgs, InfoPrinter,
    ThresholdArgs, Thresholds, Warn, ARG_FILE_HELP,
};
use crate::{
    channel::{ChannelImagingParams, MinimalRestore},
    constants::{
        DEFAULT_BEAM_CUBE_NAME, DEFAULT_CHANNEL_THREADS, DEFAULT_CHUNK_BANDWIDTH_HZ,
        DEFAULT_CHUNK_THREADS, DEFAULT_IMAGE_CUBE_NAME, DEFAULT_NSIGMA, DEFAULT_RATIO_LIMIT,
    },
    io::GlobError,
    params::{CubeOutcome, CubeRequest, LineImagingParams},
    schedule::{PoolConfig, SubtractMode},
    LinecubeError,
};

/// The subtraction mode that turns continuum subtraction off.
const NO_SUBTRACTION: &str = "none";

lazy_static::lazy_static! {
    static ref SUBTRACT_MODE_HELP: String =
        format!("How the continuum is taken out of each chunk. Supported modes: {}, {NO_SUBTRACTION}. Default: {}",
            SubtractMode::iter().join(", "), SubtractMode::Uvlin);

    static ref MINIMAL_RESTORE_HELP: String =
        format!("What is exported for a channel that gets no clean iterations. Supported values: {}. Default: {}",
            MinimalRestore::iter().join(", "), MinimalRestore::default());

    static ref NSIGMA_HELP: String =
        format!("The theoretical noise threshold is this many times the theoretical noise. Default: {DEFAULT_NSIGMA}");

    static ref RATIO_LIMIT_HELP: String =
        format!("A channel whose dirty map has a max/min ratio at or below this isn't cleaned. Default: {DEFAULT_RATIO_LIMIT}");

    static ref CHUNK_BANDWIDTH_HELP: String =
        format!("The bandwidth of each chunk the band is split into [Hz]. Default: {DEFAULT_CHUNK_BANDWIDTH_HZ}");

    static ref CHUNK_THREADS_HELP: String =
        format!("How many chunks are processed at once. Default: {DEFAULT_CHUNK_THREADS}");

    static ref CHANNEL_THREADS_HELP: String =
        format!("How many channels of each chunk are imaged at once. Default: {DEFAULT_CHANNEL_THREADS}");

    static ref IMAGE_CUBE_NAME_HELP: String =
        format!("The stem of image cube file names; cube N is written to <stem>N.fits. Default: {DEFAULT_IMAGE_CUBE_NAME}");

    static ref BEAM_CUBE_NAME_HELP: String =
        format!("The stem of beam cube file names; cube N is written to <stem>N.fits. Default: {DEFAULT_BEAM_CUBE_NAME}");
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct LineImageCliArgs {
    /// Path to the calibrated visibilities of the whole band. A glob is
    /// accepted if it matches exactly one path.
    #[clap(short, long, help_heading = "INPUT DATA")]
    data: Option<String>,

    /// The number of channels in the input data.
    #[clap(long, help_heading = "INPUT DATA")]
    total_channels: Option<usize>,

    /// The width of an input channel [Hz].
    #[clap(long, help_heading = "INPUT DATA")]
    channel_width: Option<f64>,

    /// The frequency of the first input channel [Hz].
    #[clap(long, help_heading = "INPUT DATA")]
    start_freq: Option<f64>,

    /// The directory that chunks and cubes are made in.
    #[clap(long, help_heading = "OUTPUT FILES")]
    line_dir: Option<PathBuf>,

    #[clap(long, help = IMAGE_CUBE_NAME_HELP.as_str(), help_heading = "OUTPUT FILES")]
    image_cube_name: Option<String>,

    #[clap(long, help = BEAM_CUBE_NAME_HELP.as_str(), help_heading = "OUTPUT FILES")]
    beam_cube_name: Option<String>,

    /// The cubes to make, each as "start,end[,channel width]". start and end
    /// are input channels (end exclusive); the channel width [Hz] defaults to
    /// the input channel width.
    #[clap(short, long, multiple_values(true), help_heading = "CUBES")]
    cubes: Option<Vec<String>>,

    #[clap(long, help = CHUNK_BANDWIDTH_HELP.as_str(), help_heading = "CUBES")]
    chunk_bandwidth: Option<f64>,

    #[clap(long, help = SUBTRACT_MODE_HELP.as_str(), help_heading = "CONTINUUM SUBTRACTION")]
    subtract_mode: Option<String>,

    /// The directory continuum models are found in. Required when subtracting
    /// with a model.
    #[clap(long, help_heading = "CONTINUUM SUBTRACTION")]
    cont_dir: Option<PathBuf>,

    #[clap(long, help = NSIGMA_HELP.as_str(), help_heading = "DECONVOLUTION")]
    nsigma: Option<f64>,

    #[clap(long, help = RATIO_LIMIT_HELP.as_str(), help_heading = "DECONVOLUTION")]
    ratio_limit: Option<f64>,

    /// Don't clean any channel; every channel is minimally restored.
    #[clap(long, help_heading = "DECONVOLUTION")]
    #[serde(default)]
    no_clean: bool,

    #[clap(long, help = MINIMAL_RESTORE_HELP.as_str(), help_heading = "DECONVOLUTION")]
    minimal_restore: Option<String>,

    /// The beam to restore with, as "major,minor,position angle" [arcsec,
    /// arcsec, degrees]. Default: the fitted beam.
    #[clap(long, help_heading = "DECONVOLUTION")]
    restoring_beam: Option<String>,

    /// Convolve every restored image to this beam, as "major,minor,position
    /// angle" [arcsec, arcsec, degrees].
    #[clap(long, help_heading = "DECONVOLUTION")]
    convolution_beam: Option<String>,

    #[clap(long, help = CHUNK_THREADS_HELP.as_str(), help_heading = "PARALLELISM")]
    chunk_threads: Option<usize>,

    #[clap(long, help = CHANNEL_THREADS_HELP.as_str(), help_heading = "PARALLELISM")]
    channel_threads: Option<usize>,

    /// The directory holding the MIRIAD executables. Default: search PATH.
    #[clap(long, help_heading = "IMAGER")]
    miriad_bin_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct LineImageArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "line-image")]
    #[serde(default)]
    line_image_args: LineImageCliArgs,

    #[clap(flatten)]
    #[serde(rename = "grid")]
    #[serde(default)]
    grid_args: GridArgs,

    #[clap(flatten)]
    #[serde(rename = "thresholds")]
    #[serde(default)]
    threshold_args: ThresholdArgs,
}

impl LineImageArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<LineImageArgs, LinecubeError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let LineImageArgs {
                args_file: _,
                line_image_args,
                grid_args,
                threshold_args,
            } = unpack_arg_file!(arg_file);

            Ok(LineImageArgs {
                args_file: None,
                line_image_args: cli_args.line_image_args.merge(line_image_args),
                grid_args: cli_args.grid_args.merge(grid_args),
                threshold_args: cli_args.threshold_args.merge(threshold_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<LineImagingParams, LineImageArgsError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            line_image_args:
                LineImageCliArgs {
                    data,
                    total_channels,
                    channel_width,
                    start_freq,
                    line_dir,
                    image_cube_name,
                    beam_cube_name,
                    cubes,
                    chunk_bandwidth,
                    subtract_mode,
                    cont_dir,
                    nsigma,
                    ratio_limit,
                    no_clean,
                    minimal_restore,
                    restoring_beam,
                    convolution_beam,
                    chunk_threads,
                    channel_threads,
                    miriad_bin_dir,
                },
            grid_args,
            threshold_args,
        } = self;

        let dataset = resolve_path(&PathBuf::from(
            data.ok_or(LineImageArgsError::Missing("data"))?,
        ))?;
        let total_channels = match total_channels.ok_or(LineImageArgsError::Missing("total-channels"))? {
            0 => return Err(LineImageArgsError::NoChannels),
            n => n,
        };
        let input_channel_width_hz = positive(
            "channel-width",
            channel_width.ok_or(LineImageArgsError::Missing("channel-width"))?,
        )?;
        let start_freq_hz = positive(
            "start-freq",
            start_freq.ok_or(LineImageArgsError::Missing("start-freq"))?,
        )?;
        // MIRIAD tasks don't run in the current directory.
        let line_dir = line_dir.ok_or(LineImageArgsError::Missing("line-dir"))?;
        let line_dir = std::path::absolute(line_dir)?;
        let chunk_bandwidth_hz = positive(
            "chunk-bandwidth",
            chunk_bandwidth.unwrap_or(DEFAULT_CHUNK_BANDWIDTH_HZ),
        )?;

        let cubes = cubes
            .unwrap_or_default()
            .iter()
            .map(|c| parse_cube(c, total_channels, input_channel_width_hz))
            .collect::<Result<Vec<_>, _>>()?;
        let cubes = Vec1::try_from_vec(cubes).map_err(|_| LineImageArgsError::NoCubes)?;

        let subtract = parse_subtract_mode(subtract_mode.as_deref())?;
        let cont_dir = match (cont_dir, subtract) {
            (Some(d), _) => std::path::absolute(d)?,
            (None, Some(SubtractMode::Uvmodel)) => return Err(LineImageArgsError::NoContinuumDir),
            (None, _) => line_dir.clone(),
        };

        let minimal_restore = match minimal_restore {
            None => MinimalRestore::default(),
            Some(s) => MinimalRestore::from_str(&s)
                .map_err(|_| LineImageArgsError::UnknownMinimalRestore(s))?,
        };
        let restoring_beam = parse_beam("restoring beam", restoring_beam.as_deref())?;
        let convolution_beam = parse_beam("convolution beam", convolution_beam.as_deref())?;

        let pools = PoolConfig {
            chunk_threads: NonZeroUsize::new(chunk_threads.unwrap_or(DEFAULT_CHUNK_THREADS))
                .ok_or(LineImageArgsError::ZeroThreads("chunk-threads"))?,
            channel_threads: NonZeroUsize::new(channel_threads.unwrap_or(DEFAULT_CHANNEL_THREADS))
                .ok_or(LineImageArgsError::ZeroThreads("channel-threads"))?,
        };

        let grid = grid_args.parse()?;
        let Thresholds {
            c1,
            dr0,
            minorcycle0_dr,
        } = threshold_args.parse()?;
        let channel_params = ChannelImagingParams {
            grid,
            nsigma: positive("nsigma", nsigma.unwrap_or(DEFAULT_NSIGMA))?,
            ratio_limit: positive("ratio-limit", ratio_limit.unwrap_or(DEFAULT_RATIO_LIMIT))?,
            c1,
            dr0,
            minorcycle0_dr,
            clean: !no_clean,
            restoring_beam,
            convolution_beam,
            minimal_restore,
        };
        if no_clean && minimal_restore == MinimalRestore::DirtyMap {
            "No channel will be cleaned and dirty maps will be exported".warn();
        }

        let mut printer = InfoPrinter::new("Line imaging set up".into());
        printer.push_block(vec![
            format!("Input data:     {}", dataset.display()).into(),
            format!(
                "{total_channels} channels of {input_channel_width_hz} Hz from {start_freq_hz} Hz"
            )
            .into(),
        ]);
        printer.push_block(
            cubes
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    format!(
                        "Cube {i}: input channels {}..{} at {} Hz",
                        c.input_channels.start, c.input_channels.end, c.channel_width_hz
                    )
                    .into()
                })
                .collect(),
        );
        printer.push_line(
            match subtract {
                Some(m) => format!("Continuum subtraction: {m}"),
                None => "No continuum subtraction".to_string(),
            }
            .into(),
        );
        printer.push_line(
            format!(
                "{} chunk workers x {} channel workers",
                pools.chunk_threads, pools.channel_threads
            )
            .into(),
        );
        printer.display();
        display_warnings();

        Ok(LineImagingParams {
            dataset,
            line_dir,
            cont_dir,
            total_channels,
            input_channel_width_hz,
            start_freq_hz,
            chunk_bandwidth_hz,
            cubes,
            subtract,
            channel_params,
            pools,
            image_cube_name: image_cube_name.unwrap_or_else(|| DEFAULT_IMAGE_CUBE_NAME.to_string()),
            beam_cube_name: beam_cube_name.unwrap_or_else(|| DEFAULT_BEAM_CUBE_NAME.to_string()),
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

        let outcomes = params.run()?;
        let mut num_written = 0;
        for (i_cube, outcome) in outcomes.iter().enumerate() {
            match outcome {
                CubeOutcome::Written { image, beam } => {
                    num_written += 1;
                    info!(
                        "Cube {i_cube}: wrote {} ({}/{} channels)",
                        image.path.display(),
                        image.filled_channels.len(),
                        image.num_channels
                    );
                    if let Some(beam) = beam {
                        info!("Cube {i_cube}: wrote {}", beam.path.display());
                    }
                }
                CubeOutcome::NoChannels => warn!("Cube {i_cube}: no channels were imaged"),
                CubeOutcome::Failed(e) => error!("Cube {i_cube} failed: {e}"),
            }
        }
        info!("{num_written} of {} cubes written", outcomes.len());
        Ok(())
    }
}

impl LineImageCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            data: self.data.or(other.data),
            total_channels: self.total_channels.or(other.total_channels),
            channel_width: self.channel_width.or(other.channel_width),
            start_freq: self.start_freq.or(other.start_freq),
            line_dir: self.line_dir.or(other.line_dir),
            image_cube_name: self.image_cube_name.or(other.image_cube_name),
            beam_cube_name: self.beam_cube_name.or(other.beam_cube_name),
            cubes: self.cubes.or(other.cubes),
            chunk_bandwidth: self.chunk_bandwidth.or(other.chunk_bandwidth),
            subtract_mode: self.subtract_mode.or(other.subtract_mode),
            cont_dir: self.cont_dir.or(other.cont_dir),
            nsigma: self.nsigma.or(other.nsigma),
            ratio_limit: self.ratio_limit.or(other.ratio_limit),
            no_clean: self.no_clean || other.no_clean,
            minimal_restore: self.minimal_restore.or(other.minimal_restore),
            restoring_beam: self.restoring_beam.or(other.restoring_beam),
            convolution_beam: self.convolution_beam.or(other.convolution_beam),
            chunk_threads: self.chunk_threads.or(other.chunk_threads),
            channel_threads: self.channel_threads.or(other.channel_threads),
            miriad_bin_dir: self.miriad_bin_dir.or(other.miriad_bin_dir),
        }
    }
}

/// Parse "start,end[,channel width]".
fn parse_cube(
    s: &str,
    total_channels: usize,
    input_channel_width_hz: f64,
) -> Result<CubeRequest, LineImageArgsError> {
    let bad = || LineImageArgsError::BadCube(s.to_string());
    let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
    let (start, end, width) = match parts.as_slice() {
        [start, end] => (start, end, None),
        [start, end, width] => (start, end, Some(width)),
        _ => return Err(bad()),
    };
    let start: usize = start.parse().map_err(|_| bad())?;
    let end: usize = end.parse().map_err(|_| bad())?;
    let channel_width_hz = match width {
        None => input_channel_width_hz,
        Some(w) => w.parse().map_err(|_| bad())?,
    };
    if start >= end || !(channel_width_hz > 0.0) {
        return Err(bad());
    }
    if end > total_channels {
        return Err(LineImageArgsError::CubeOutOfRange {
            cube: s.to_string(),
            total_channels,
        });
    }
    if channel_width_hz < input_channel_width_hz {
        format!(
            "Cube '{s}' asks for channels narrower than the input's {input_channel_width_hz} Hz; input channels are used"
        )
        .warn();
    }
    Ok(CubeRequest {
        input_channels: start..end,
        channel_width_hz,
    })
}

fn parse_subtract_mode(mode: Option<&str>) -> Result<Option<SubtractMode>, LineImageArgsError> {
    match mode {
        None => Ok(Some(SubtractMode::Uvlin)),
        Some(m) if m.eq_ignore_ascii_case(NO_SUBTRACTION) => Ok(None),
        Some(m) => SubtractMode::from_str(&m.to_lowercase())
            .map(Some)
            .map_err(|_| LineImageArgsError::UnknownSubtractMode(m.to_string())),
    }
}

#[derive(Error, Debug)]
pub(super) enum LineImageArgsError {
    #[error("No {0} was supplied")]
    Missing(&'static str),

    #[error("The input data must have at least one channel")]
    NoChannels,

    #[error("No cubes were requested; supply at least one with --cubes")]
    NoCubes,

    #[error("Couldn't parse cube '{0}'; expected 'start,end[,channel width]' with start < end and a positive width")]
    BadCube(String),

    #[error("Cube '{cube}' goes past the last input channel ({total_channels} channels)")]
    CubeOutOfRange { cube: String, total_channels: usize },

    #[error("Unknown continuum subtraction mode '{0}'")]
    UnknownSubtractMode(String),

    #[error("Unknown minimal-restore policy '{0}'")]
    UnknownMinimalRestore(String),

    #[error("{0} must be at least 1")]
    ZeroThreads(&'static str),

    #[error("Subtracting the continuum with a model needs --cont-dir")]
    NoContinuumDir,

    #[error(transparent)]
    Common(#[from] CommonArgsError),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
