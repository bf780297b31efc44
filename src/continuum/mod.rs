// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Deep multi-frequency continuum imaging.
//!
//! The dynamic range ramps up over major cycles; the last major cycle's ceiling
//! is then spread over the minor cycles. Each minor cycle masks, cleans and
//! restores, with the mask threshold taken from [`ThresholdSet`].

mod error;

pub use error::ContinuumImagingError;

use std::path::PathBuf;

use log::{debug, info};

use crate::{
    constants::MFCLEAN_MAX_ITERATIONS,
    filenames::{continuum_cycle_name, continuum_image_fits_name, continuum_model_name},
    imaging::{
        BeamShape, CleanAlgorithm, CleanRegion, CleanRequest, ExportPlane, GridParams,
        ImagingPrimitive, InvertReport, InvertRequest, RestoreMode, RestoreRequest,
    },
    threshold::{
        clean_cutoff, dynamic_range_threshold, major_cycle_ramp, minor_cycle_ramp,
        noise_threshold, theoretical_noise_threshold, MajorCycleFunction, MinorCycleFunction,
        ThresholdSet,
    },
};
use error::InStep;

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuumParams {
    pub grid: GridParams,
    pub nsigma: f64,
    pub c0: f64,
    pub c1: f64,
    pub dr0: f64,
    pub dr_init: f64,
    pub minorcycle0_dr: f64,
    pub num_major_cycles: usize,
    pub num_minor_cycles: usize,
    pub major_cycle_function: MajorCycleFunction,
    pub minor_cycle_function: MinorCycleFunction,
    pub restoring_beam: Option<BeamShape>,
}

/// What one minor cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct MinorCycleReport {
    pub cycle: usize,
    pub dynamic_range: f64,
    pub thresholds: ThresholdSet,
    pub clean_cutoff: f64,
    pub residual_peak: f64,
    pub residual_rms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuumProduct {
    pub cycles: Vec<MinorCycleReport>,
    /// The final clean model, usable for continuum subtraction.
    pub model: String,
    /// The final image as FITS.
    pub image_fits: String,
}

pub struct ContinuumImager<'a, P: ?Sized> {
    primitive: &'a P,
    params: &'a ContinuumParams,
}

impl<'a, P: ImagingPrimitive + ?Sized> ContinuumImager<'a, P> {
    pub fn new(primitive: &'a P, params: &'a ContinuumParams) -> ContinuumImager<'a, P> {
        ContinuumImager { primitive, params }
    }

    /// The dynamic range of every minor cycle.
    pub fn minor_cycle_dynamic_ranges(&self) -> Result<Vec<f64>, ContinuumImagingError> {
        let p = self.params;
        if p.num_major_cycles == 0 || p.num_minor_cycles == 0 {
            return Err(ContinuumImagingError::NoCycles {
                major: p.num_major_cycles,
                minor: p.num_minor_cycles,
            });
        }
        let dr_major = major_cycle_ramp(p.dr_init, p.dr0, p.num_major_cycles, p.major_cycle_function);
        debug!("Major cycle dynamic ranges: {dr_major:?}");
        Ok(minor_cycle_ramp(
            &dr_major,
            p.num_major_cycles - 1,
            p.num_minor_cycles,
            p.minor_cycle_function,
            p.minorcycle0_dr,
        )?)
    }

    /// Image `datasets` together. Products are named relative to the
    /// primitive's working directory.
    pub fn run(&self, datasets: &[PathBuf]) -> Result<ContinuumProduct, ContinuumImagingError> {
        let p = self.params;
        let dr_minor = self.minor_cycle_dynamic_ranges()?;
        info!("Dynamic range limits for the continuum minor cycles are {dr_minor:?}");

        let map = continuum_cycle_name("map", 0);
        let beam = continuum_cycle_name("beam", 0);
        let report = self
            .primitive
            .invert(&InvertRequest {
                datasets,
                map: &map,
                beam: &beam,
                channel: None,
                grid: &p.grid,
                sky_response: true,
            })
            .in_step("map formation")?;
        let report = InvertReport::parse(&report)?;
        let rms = match report.theoretical_rms_noise {
            Some(rms) if !report.is_empty() => rms,
            _ => return Err(ContinuumImagingError::NoVisibilities),
        };
        let theoretical = theoretical_noise_threshold(rms, p.nsigma);
        info!(
            "The theoretical noise threshold is {} x {rms:e} = {theoretical:e} Jy/beam",
            p.nsigma
        );

        let imax = self
            .primitive
            .statistics(&map)
            .in_step("dirty map statistics")?
            .max;
        let final_model = continuum_model_name(p.num_major_cycles);
        let last_cycle = p.num_minor_cycles - 1;

        let mut cycles = Vec::with_capacity(p.num_minor_cycles);
        for (minc, &dynamic_range) in dr_minor.iter().enumerate() {
            let thresholds = ThresholdSet::new(
                theoretical,
                noise_threshold(imax, minc, p.num_major_cycles, p.c0)?,
                dynamic_range_threshold(imax, dynamic_range, p.minorcycle0_dr),
            );
            info!(
                "Mask threshold for continuum minor cycle {minc} set to {:e} Jy/beam ({})",
                thresholds.mask_threshold, thresholds.mask_threshold_kind
            );

            let mask = continuum_cycle_name("mask", minc);
            let mask_source = match minc {
                0 => map.clone(),
                _ => continuum_cycle_name("image", minc - 1),
            };
            self.primitive
                .mask(&mask_source, thresholds.mask_threshold, &mask)
                .in_step("masking")?;

            let cutoff = clean_cutoff(thresholds.mask_threshold, p.c1)?;
            info!("Clean cutoff for continuum minor cycle {minc} set to {cutoff:e} Jy/beam");
            let model = if minc == last_cycle {
                final_model.clone()
            } else {
                continuum_cycle_name("model", minc)
            };
            let seed = match minc {
                0 => None,
                _ => Some(continuum_cycle_name("model", minc - 1)),
            };
            self.primitive
                .clean(&CleanRequest {
                    map: &map,
                    beam: &beam,
                    out: &model,
                    region: CleanRegion::Mask(mask),
                    cutoff: Some(cutoff),
                    max_iterations: MFCLEAN_MAX_ITERATIONS,
                    gain: None,
                    seed_model: seed.as_deref(),
                    algorithm: CleanAlgorithm::MultiFrequency,
                })
                .in_step("cleaning")?;

            let image = continuum_cycle_name("image", minc);
            let residual = continuum_cycle_name("residual", minc);
            for (mode, out) in [(RestoreMode::Clean, &image), (RestoreMode::Residual, &residual)] {
                self.primitive
                    .restore(&RestoreRequest {
                        model: &model,
                        beam: &beam,
                        map: &map,
                        out,
                        mode,
                        resolution: p.restoring_beam,
                    })
                    .in_step("restoring")?;
            }

            let residual_stats = self
                .primitive
                .statistics(&residual)
                .in_step("residual statistics")?;
            info!(
                "Continuum minor cycle {minc}: residual peak {:e} Jy/beam, rms {:e} Jy/beam",
                residual_stats.max, residual_stats.stddev
            );
            cycles.push(MinorCycleReport {
                cycle: minc,
                dynamic_range,
                thresholds,
                clean_cutoff: cutoff,
                residual_peak: residual_stats.max,
                residual_rms: residual_stats.stddev,
            });
        }

        let image_fits = continuum_image_fits_name(p.num_major_cycles);
        self.primitive
            .export(
                &continuum_cycle_name("image", last_cycle),
                &image_fits,
                ExportPlane::All,
            )
            .in_step("exporting the image")?;
        info!("Final continuum image is {image_fits}; model is {final_model}");

        Ok(ContinuumProduct {
            cycles,
            model: final_model,
            image_fits,
        })
    }
}
