// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{ops::Range, path::PathBuf};

use log::error;

use crate::{
    cube::{assemble_cube, ChannelImageReader, CubeError, CubeSummary, FitsChannelReader},
    filenames::{CUBE_BEAM_PREFIX, CUBE_IMAGE_PREFIX},
};

/// Assemble already-exported channel images.
pub(crate) struct CubeAssembleParams {
    pub(crate) dir: PathBuf,
    pub(crate) channels: Range<usize>,
    /// The frequency of the first channel in `channels` \[Hz\].
    pub(crate) start_freq_hz: f64,
    pub(crate) image_output: PathBuf,
    /// If `None`, no beam cube is made.
    pub(crate) beam_output: Option<PathBuf>,
}

impl CubeAssembleParams {
    pub(crate) fn run(&self) -> Result<Vec<CubeSummary>, CubeError> {
        self.run_with(&FitsChannelReader)
    }

    pub(crate) fn run_with<R: ChannelImageReader + ?Sized>(
        &self,
        reader: &R,
    ) -> Result<Vec<CubeSummary>, CubeError> {
        let mut jobs = vec![(CUBE_IMAGE_PREFIX, &self.image_output)];
        if let Some(beam_output) = &self.beam_output {
            jobs.push((CUBE_BEAM_PREFIX, beam_output));
        }

        let mut summaries = vec![];
        for (prefix, output) in jobs {
            match assemble_cube(
                reader,
                &self.dir,
                prefix,
                self.channels.clone(),
                self.start_freq_hz,
                output,
            )? {
                Some(s) => summaries.push(s),
                None => error!(
                    "No {prefix}*.fits files in {}; {} was not written",
                    self.dir.display(),
                    output.display()
                ),
            }
        }
        Ok(summaries)
    }
}
