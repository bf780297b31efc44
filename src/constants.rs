// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All threshold constants are double precision. Pixel data are only converted to
single precision when cubes are filled.
 */

/// The rest frequency of the neutral hydrogen line \[Hz\]. Written into the
/// header of every assembled cube.
pub const HI_REST_FREQ_HZ: f64 = 1420405751.77;

/// The value filling cube slices that have no channel image (the channel had
/// no visibilities, or imaging it failed).
pub const NO_DATA: f32 = f32::NAN;

/// The axis types that survive header reconciliation. Everything else is
/// pruned from the cube header.
pub const RETAINED_AXIS_TYPES: [&str; 3] = ["RA---NCP", "DEC--NCP", "FREQ-OBS"];

/// The axis type of the sky-response (beam) axis, which MIRIAD may put ahead of
/// the frequency axis.
pub const SKY_RESPONSE_AXIS_TYPE: &str = "SDBEAM";

/// The number of clean iterations given to a thresholded clean; the cutoff
/// stops the clean well before this.
pub const CLEAN_MAX_ITERATIONS: usize = 100000;

/// The number of clean iterations given to a continuum multi-frequency clean.
pub const MFCLEAN_MAX_ITERATIONS: usize = 1000000;

/// The loop gain of the single clean iteration used only to establish beam
/// geometry for a restore.
pub const MINIMAL_CLEAN_GAIN: f64 = 0.0000001;

/// Default number of sigmas above the theoretical noise to mask.
pub const DEFAULT_NSIGMA: f64 = 45.0;

/// Default max/min ratio a dirty map must reach before it is considered to
/// contain emission.
pub const DEFAULT_RATIO_LIMIT: f64 = 1.05;

/// Default scale of the noise threshold.
pub const DEFAULT_C0: f64 = 10.0;

/// Default ratio between the mask threshold and the clean cutoff.
pub const DEFAULT_C1: f64 = 5.0;

/// Default dynamic-range step between consecutive minor cycles.
pub const DEFAULT_DR0: f64 = 2.0;

/// Default ceiling of the dynamic range for the first minor cycle.
pub const DEFAULT_MINORCYCLE0_DR: f64 = 5.0;

/// Default initial dynamic range of the first major cycle.
pub const DEFAULT_DR_INIT: f64 = 20.0;

/// Default number of continuum major cycles.
pub const DEFAULT_CONTINUUM_MAJOR_CYCLES: usize = 3;

/// Default number of continuum minor cycles.
pub const DEFAULT_CONTINUUM_MINOR_CYCLES: usize = 3;

/// Default image size \[pixels\].
pub const DEFAULT_IMSIZE: usize = 660;

/// Default cell size \[arcsec\].
pub const DEFAULT_CELLSIZE: f64 = 6.0;

/// Default bandwidth of a frequency chunk before rounding to a power of two
/// \[Hz\].
pub const DEFAULT_CHUNK_BANDWIDTH_HZ: f64 = 2.5e6;

/// Default number of workers over frequency chunks.
pub const DEFAULT_CHUNK_THREADS: usize = 4;

/// Default number of workers over channels within a chunk.
pub const DEFAULT_CHANNEL_THREADS: usize = 8;

/// Default name stem of the image cube.
pub const DEFAULT_IMAGE_CUBE_NAME: &str = "HI_image_cube";

/// Default name stem of the beam cube.
pub const DEFAULT_BEAM_CUBE_NAME: &str = "HI_beam_cube";
