// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{display_warnings, InfoPrinter, Warn, ARG_FILE_HELP};
use crate::{
    constants::{DEFAULT_BEAM_CUBE_NAME, DEFAULT_IMAGE_CUBE_NAME},
    params::CubeAssembleParams,
    LinecubeError,
};

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CubeAssembleCliArgs {
    /// The directory holding the exported channel images.
    #[clap(short, long, help_heading = "INPUT FILES")]
    dir: Option<PathBuf>,

    /// The first channel of the cube.
    #[clap(long, help_heading = "CHANNELS")]
    start_channel: Option<usize>,

    /// The channel after the last channel of the cube.
    #[clap(long, help_heading = "CHANNELS")]
    end_channel: Option<usize>,

    /// The frequency of the first channel of the cube [Hz].
    #[clap(long, help_heading = "CHANNELS")]
    start_freq: Option<f64>,

    /// The image cube to write. Default: <dir>/HI_image_cube.fits
    #[clap(short, long, help_heading = "OUTPUT FILES")]
    output: Option<PathBuf>,

    /// The beam cube to write. Default: <dir>/HI_beam_cube.fits
    #[clap(long, help_heading = "OUTPUT FILES")]
    beam_output: Option<PathBuf>,

    /// Don't make a beam cube.
    #[clap(long, help_heading = "OUTPUT FILES")]
    #[serde(default)]
    no_beam: bool,
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct CubeAssembleArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "cube-assemble")]
    #[serde(default)]
    cube_assemble_args: CubeAssembleCliArgs,
}

impl CubeAssembleArgs {
    pub(super) fn merge(self) -> Result<CubeAssembleArgs, LinecubeError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let CubeAssembleArgs {
                args_file: _,
                cube_assemble_args,
            } = unpack_arg_file!(arg_file);

            Ok(CubeAssembleArgs {
                args_file: None,
                cube_assemble_args: cli_args.cube_assemble_args.merge(cube_assemble_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<CubeAssembleParams, CubeAssembleArgsError> {
        debug!("{:#?}", self);

        let CubeAssembleCliArgs {
            dir,
            start_channel,
            end_channel,
            start_freq,
            output,
            beam_output,
            no_beam,
        } = self.cube_assemble_args;

        let dir = dir.ok_or(CubeAssembleArgsError::Missing("dir"))?;
        if !dir.is_dir() {
            return Err(CubeAssembleArgsError::NotADirectory(dir));
        }
        let start = start_channel.ok_or(CubeAssembleArgsError::Missing("start-channel"))?;
        let end = end_channel.ok_or(CubeAssembleArgsError::Missing("end-channel"))?;
        if start >= end {
            return Err(CubeAssembleArgsError::EmptyRange { start, end });
        }
        let start_freq_hz = match start_freq {
            Some(f) if f.is_finite() && f > 0.0 => f,
            Some(f) => return Err(CubeAssembleArgsError::BadFreq(f)),
            None => return Err(CubeAssembleArgsError::Missing("start-freq")),
        };

        let image_output =
            output.unwrap_or_else(|| dir.join(format!("{DEFAULT_IMAGE_CUBE_NAME}.fits")));
        let beam_output = match (no_beam, beam_output) {
            (true, Some(_)) => {
                "--no-beam was given; ignoring --beam-output".warn();
                None
            }
            (true, None) => None,
            (false, Some(b)) => Some(b),
            (false, None) => Some(dir.join(format!("{DEFAULT_BEAM_CUBE_NAME}.fits"))),
        };

        let mut printer = InfoPrinter::new("Cube assembly set up".into());
        printer.push_block(vec![
            format!("Channel images in {}", dir.display()).into(),
            format!("Channels {start}..{end} from {start_freq_hz} Hz").into(),
        ]);
        let mut outputs = vec![format!("Image cube: {}", image_output.display()).into()];
        if let Some(b) = &beam_output {
            outputs.push(format!("Beam cube:  {}", b.display()).into());
        }
        printer.push_block(outputs);
        printer.display();
        display_warnings();

        Ok(CubeAssembleParams {
            dir,
            channels: start..end,
            start_freq_hz,
            image_output,
            beam_output,
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

        for summary in params.run()? {
            info!(
                "Wrote {} ({}/{} channels)",
                summary.path.display(),
                summary.filled_channels.len(),
                summary.num_channels
            );
        }
        Ok(())
    }
}

impl CubeAssembleCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            dir: self.dir.or(other.dir),
            start_channel: self.start_channel.or(other.start_channel),
            end_channel: self.end_channel.or(other.end_channel),
            start_freq: self.start_freq.or(other.start_freq),
            output: self.output.or(other.output),
            beam_output: self.beam_output.or(other.beam_output),
            no_beam: self.no_beam || other.no_beam,
        }
    }
}

#[derive(Error, Debug)]
pub(super) enum CubeAssembleArgsError {
    #[error("No {0} was supplied")]
    Missing(&'static str),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("Channels {start}..{end} are empty")]
    EmptyRange { start: usize, end: usize },

    #[error("The start frequency must be positive; got {0}")]
    BadFreq(f64),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
