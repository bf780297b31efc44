// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Spectral-line cube imaging of calibrated radio-interferometric visibilities.

The band is split into frequency chunks, the continuum is taken out of each
chunk, and every channel is deconvolved with thresholds derived from its own
dirty map. The exported channel images are assembled into image and beam cubes.
 */

pub mod channel;
mod cli;
pub mod constants;
pub mod continuum;
pub mod cube;
pub mod filenames;
pub mod imaging;
mod io;
mod params;
pub mod schedule;
pub mod threshold;

use crossbeam_utils::atomic::AtomicCell;

// Re-exports.
pub use cli::{Linecube, LinecubeError};

/// Should progress bars be drawn?
pub static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
