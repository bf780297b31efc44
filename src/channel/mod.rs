// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Imaging a single spectral channel.
//!
//! A channel moves through a small state machine:
//!
//! ```text
//! Start -> Inverted -> Skipped
//!                   -> Gated -> Exported
//!                   -> Cleaning(0..n) -> Restored -> Exported
//! ```
//!
//! A channel without visibilities is skipped and produces nothing. A channel
//! whose dirty map doesn't look like it has emission is gated: it gets one
//! minimal restore so that there's still a well-formed image for the cube.
//! Otherwise the channel is cleaned over a ramp of mask levels (see
//! [`crate::threshold`]).

mod error;

pub use error::ChannelError;

use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    constants::{CLEAN_MAX_ITERATIONS, MINIMAL_CLEAN_GAIN},
    filenames::ChannelFiles,
    imaging::{
        BeamShape, CleanAlgorithm, CleanRegion, CleanRequest, ExportPlane, GridParams,
        ImagingPrimitive, InvertReport, InvertRequest, RestoreMode, RestoreRequest,
    },
    threshold::{
        clean_cutoff, mask_level_schedule, minor_cycle_count, theoretical_noise_threshold,
    },
};
use error::InStep;

/// What happens to a channel that gets no deconvolution iterations, either
/// because it was gated or because no cycles were warranted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum MinimalRestore {
    /// A single, negligible clean iteration followed by a restore. The restored
    /// image is exported.
    #[default]
    #[strum(serialize = "clean-and-restore")]
    CleanAndRestore,

    /// Nothing is run; the dirty map is exported.
    #[strum(serialize = "dirty-map")]
    DirtyMap,
}

/// Everything that steers how a channel is imaged.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelImagingParams {
    pub grid: GridParams,
    pub nsigma: f64,
    /// The max/min ratio a dirty map must reach to be cleaned.
    pub ratio_limit: f64,
    pub c1: f64,
    pub dr0: f64,
    pub minorcycle0_dr: f64,
    /// If false, no channel is ever cleaned.
    pub clean: bool,
    pub restoring_beam: Option<BeamShape>,
    pub convolution_beam: Option<BeamShape>,
    pub minimal_restore: MinimalRestore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Start,
    Inverted,
    Skipped,
    Gated,
    Cleaning { iteration: usize },
    Restored,
    Exported,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Cleaning { iteration } => write!(f, "Cleaning({iteration})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// The outcome of imaging a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagingResult {
    /// No visibilities; nothing was made.
    Empty,

    /// No emission; only a minimal restore was done.
    Unclean,

    /// Deconvolved with the given mask levels, one per iteration. Zero
    /// iterations means only a minimal restore was warranted.
    Cleaned {
        iterations: usize,
        mask_levels: Vec<f64>,
    },
}

/// What a channel left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProduct {
    pub global_channel: usize,
    pub result: ImagingResult,

    /// The exported signal image (relative to the working directory). `None`
    /// only for `Empty` channels.
    pub image: Option<String>,

    /// The exported beam image.
    pub beam: Option<String>,

    /// Every state the channel went through, in order.
    pub states: Vec<ChannelState>,
}

/// Which channel of which dataset to image.
#[derive(Debug, Clone)]
pub struct ChannelJob<'a> {
    pub dataset: &'a Path,
    /// The channel index within `dataset`.
    pub local_channel: usize,
    /// The channel index within the whole band; all names key on this.
    pub global_channel: usize,
}

struct ChannelMachine<'a, P: ?Sized> {
    primitive: &'a P,
    params: &'a ChannelImagingParams,
    files: ChannelFiles,
    context: &'a str,
    states: Vec<ChannelState>,
}

impl<P: ImagingPrimitive + ?Sized> ChannelMachine<'_, P> {
    fn advance(&mut self, state: ChannelState) {
        trace!(
            "Channel {:05}: {} -> {state}",
            self.files.channel(),
            self.states.last().copied().unwrap_or(ChannelState::Start)
        );
        self.states.push(state);
    }

    fn finish(self, result: ImagingResult, image: Option<String>, beam: Option<String>) -> ChannelProduct {
        ChannelProduct {
            global_channel: self.files.channel(),
            result,
            image,
            beam,
            states: self.states,
        }
    }

    /// Returns the name of the image to export.
    fn minimal_restore(&self) -> Result<String, ChannelError> {
        let files = &self.files;
        match self.params.minimal_restore {
            MinimalRestore::DirtyMap => Ok(files.map()),
            MinimalRestore::CleanAndRestore => {
                let (map, beam, model, image) =
                    (files.map(), files.beam(), files.model(0), files.image(0));
                self.primitive
                    .clean(&CleanRequest {
                        map: &map,
                        beam: &beam,
                        out: &model,
                        region: CleanRegion::Box {
                            blc: (1, 1),
                            trc: (2, 2),
                        },
                        cutoff: None,
                        max_iterations: 1,
                        gain: Some(MINIMAL_CLEAN_GAIN),
                        seed_model: None,
                        algorithm: CleanAlgorithm::Hogbom,
                    })
                    .in_step("minimal clean")?;
                self.primitive
                    .restore(&RestoreRequest {
                        model: &model,
                        beam: &beam,
                        map: &map,
                        out: &image,
                        mode: RestoreMode::Clean,
                        resolution: self.params.restoring_beam,
                    })
                    .in_step("minimal restore")?;
                Ok(image)
            }
        }
    }

    /// Clean over the mask levels. Returns the name of the last restored
    /// image.
    fn clean(&mut self, mask_levels: &[f64]) -> Result<String, ChannelError> {
        let (map, beam) = (self.files.map(), self.files.beam());
        let mut last_image = map.clone();
        for (k, &mask_level) in mask_levels.iter().enumerate() {
            self.advance(ChannelState::Cleaning { iteration: k });
            let (mask, model, image, residual) = (
                self.files.mask(k),
                self.files.model(k),
                self.files.image(k),
                self.files.residual(k),
            );
            // The first mask comes from the dirty map, later ones from the
            // previous cycle's image.
            self.primitive
                .mask(&last_image, mask_level, &mask)
                .in_step("masking")?;

            let cutoff = clean_cutoff(mask_level, self.params.c1)?;
            let seed = if k > 0 {
                Some(self.files.model(k - 1))
            } else {
                None
            };
            debug!(
                "Channel {:05} cycle {k}: mask level {mask_level:e}, clean cutoff {cutoff:e}",
                self.files.channel()
            );
            self.primitive
                .clean(&CleanRequest {
                    map: &map,
                    beam: &beam,
                    out: &model,
                    region: CleanRegion::Mask(mask),
                    cutoff: Some(cutoff),
                    max_iterations: CLEAN_MAX_ITERATIONS,
                    gain: None,
                    seed_model: seed.as_deref(),
                    algorithm: CleanAlgorithm::Hogbom,
                })
                .in_step("cleaning")?;

            for (mode, out) in [(RestoreMode::Clean, &image), (RestoreMode::Residual, &residual)] {
                self.primitive
                    .restore(&RestoreRequest {
                        model: &model,
                        beam: &beam,
                        map: &map,
                        out,
                        mode,
                        resolution: self.params.restoring_beam,
                    })
                    .in_step("restoring")?;
            }
            last_image = image;
        }
        Ok(last_image)
    }

    /// Optionally convolve, then write the channel's cube files.
    fn export(&mut self, image: String, last_cycle: usize) -> Result<(String, String), ChannelError> {
        let image = match self.params.convolution_beam {
            Some(beam) => {
                let convolved = self.files.convolved(last_cycle);
                match self.primitive.convolve(&image, &convolved, &beam) {
                    Ok(()) => convolved,
                    Err(e) => {
                        warn!(
                            "Channel {:05}: convolution to {beam} failed, exporting {image} instead: {e}",
                            self.files.channel()
                        );
                        image
                    }
                }
            }
            None => image,
        };

        let (cube_image, cube_beam) = (self.files.cube_image(), self.files.cube_beam());
        self.primitive
            .export(&image, &cube_image, ExportPlane::All)
            .in_step("exporting the image")?;
        self.primitive
            .export(&self.files.beam(), &cube_beam, ExportPlane::First)
            .in_step("exporting the beam")?;
        self.advance(ChannelState::Exported);
        debug!(
            "Channel {:05}: exported {image} ({})",
            self.files.channel(),
            self.context
        );
        Ok((cube_image, cube_beam))
    }
}

/// Drive one channel from its visibilities to its exported cube files.
///
/// `context` describes the worker running the channel and is only used in log
/// messages.
pub fn image_channel<P: ImagingPrimitive + ?Sized>(
    primitive: &P,
    params: &ChannelImagingParams,
    job: &ChannelJob,
    context: &str,
) -> Result<ChannelProduct, ChannelError> {
    let files = ChannelFiles::new(job.global_channel);
    let mut machine = ChannelMachine {
        primitive,
        params,
        files,
        context,
        states: vec![ChannelState::Start],
    };
    let channel = job.global_channel;

    let (map, beam) = (files.map(), files.beam());
    let datasets = [PathBuf::from(job.dataset)];
    let report_lines = match primitive.invert(&InvertRequest {
        datasets: &datasets,
        map: &map,
        beam: &beam,
        channel: Some(job.local_channel),
        grid: &params.grid,
        sky_response: true,
    }) {
        Ok(lines) => lines,
        Err(e) => {
            warn!("Channel {channel:05}: map formation failed, skipping ({context}): {e}");
            machine.advance(ChannelState::Skipped);
            return Ok(machine.finish(ImagingResult::Empty, None, None));
        }
    };
    let report = InvertReport::parse(&report_lines)?;
    machine.advance(ChannelState::Inverted);

    let rms = match report.theoretical_rms_noise {
        Some(rms) if !report.is_empty() => rms,
        _ => {
            info!("Channel {channel:05}: no visibilities, skipping ({context})");
            machine.advance(ChannelState::Skipped);
            return Ok(machine.finish(ImagingResult::Empty, None, None));
        }
    };
    let noise_threshold = theoretical_noise_threshold(rms, params.nsigma);

    let map_stats = primitive.statistics(&map).in_step("dirty map statistics")?;
    let ratio = map_stats.max_min_ratio();
    // A NaN ratio never counts as emission.
    let emission = ratio >= params.ratio_limit;
    let (result, final_image, last_cycle) = if !emission {
        debug!(
            "Channel {channel:05}: max/min ratio {ratio:.4} is below {}; not cleaning",
            params.ratio_limit
        );
        machine.advance(ChannelState::Gated);
        let image = machine.minimal_restore()?;
        (ImagingResult::Unclean, image, 0)
    } else {
        let imax = map_stats.max;
        let max_dynamic_range = imax / noise_threshold;
        let n_iterations = minor_cycle_count(max_dynamic_range, params.dr0)?;
        let schedule = mask_level_schedule(
            n_iterations,
            params.dr0,
            max_dynamic_range,
            params.minorcycle0_dr,
            imax,
        );

        if schedule.clean_requested && params.clean {
            info!("Emission found in channel {channel:05}. Cleaning! ({context})");
            let image = machine.clean(&schedule.levels)?;
            machine.advance(ChannelState::Restored);
            (
                ImagingResult::Cleaned {
                    iterations: n_iterations,
                    mask_levels: schedule.levels,
                },
                image,
                n_iterations - 1,
            )
        } else {
            debug!(
                "Channel {channel:05}: no clean cycles (max. dynamic range {max_dynamic_range:.3}, cleaning enabled: {})",
                params.clean
            );
            let image = machine.minimal_restore()?;
            machine.advance(ChannelState::Restored);
            (
                ImagingResult::Cleaned {
                    iterations: 0,
                    mask_levels: vec![],
                },
                image,
                0,
            )
        }
    };

    let (image, beam) = machine.export(final_image, last_cycle)?;
    Ok(machine.finish(result, Some(image), Some(beam)))
}
