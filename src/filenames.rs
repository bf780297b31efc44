// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The file-naming convention of every intermediate and exported product.
//!
//! Names are the only thing that associates a channel's products with the
//! channel; the cube assembler joins on them. Every name that can be written
//! while channels are imaged concurrently contains the 5-digit global channel
//! index, so two distinct channels can never collide.

use std::path::{Path, PathBuf};

/// Prefix of exported per-channel signal images.
pub const CUBE_IMAGE_PREFIX: &str = "cube_image_";
/// Prefix of exported per-channel beam images.
pub const CUBE_BEAM_PREFIX: &str = "cube_beam_";
/// Extension of exported per-channel images.
pub const CUBE_CHANNEL_EXTENSION: &str = "fits";
/// The manifest of frequency chunks written by the splitting stage.
pub const CHUNK_MANIFEST_FILENAME: &str = "chunks.toml";
/// The directory (relative to the line directory) holding all channel products
/// and the assembled cubes.
pub const CUBES_DIR: &str = "cubes";

/// The names of all products of a single channel. All names are relative to
/// the directory the imaging primitive is run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelFiles {
    channel: usize,
}

impl ChannelFiles {
    pub fn new(global_channel: usize) -> ChannelFiles {
        ChannelFiles {
            channel: global_channel,
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    fn cycle_name(&self, stem: &str, cycle: usize) -> String {
        format!("{stem}_{cycle:02}_{:05}", self.channel)
    }

    /// The dirty map. Only made once per channel.
    pub fn map(&self) -> String {
        self.cycle_name("map", 0)
    }

    /// The dirty beam. Only made once per channel.
    pub fn beam(&self) -> String {
        self.cycle_name("beam", 0)
    }

    pub fn mask(&self, cycle: usize) -> String {
        self.cycle_name("mask", cycle)
    }

    pub fn model(&self, cycle: usize) -> String {
        self.cycle_name("model", cycle)
    }

    pub fn image(&self, cycle: usize) -> String {
        self.cycle_name("image", cycle)
    }

    pub fn residual(&self, cycle: usize) -> String {
        self.cycle_name("residual", cycle)
    }

    pub fn convolved(&self, cycle: usize) -> String {
        self.cycle_name("convol", cycle)
    }

    pub fn cube_image(&self) -> String {
        cube_image_filename(self.channel)
    }

    pub fn cube_beam(&self) -> String {
        cube_beam_filename(self.channel)
    }

    /// Every name this channel could ever write, given a number of clean
    /// cycles.
    pub fn all(&self, num_cycles: usize) -> Vec<String> {
        let mut names = vec![self.map(), self.beam(), self.cube_image(), self.cube_beam()];
        for cycle in 0..num_cycles.max(1) {
            names.push(self.mask(cycle));
            names.push(self.model(cycle));
            names.push(self.image(cycle));
            names.push(self.residual(cycle));
            names.push(self.convolved(cycle));
        }
        names
    }
}

/// The exported file of a channel, for either the image or the beam prefix.
pub fn cube_channel_filename(prefix: &str, global_channel: usize) -> String {
    format!("{prefix}{global_channel:05}.{CUBE_CHANNEL_EXTENSION}")
}

pub fn cube_image_filename(global_channel: usize) -> String {
    cube_channel_filename(CUBE_IMAGE_PREFIX, global_channel)
}

pub fn cube_beam_filename(global_channel: usize) -> String {
    cube_channel_filename(CUBE_BEAM_PREFIX, global_channel)
}

/// A glob pattern matching every exported channel file with the given prefix
/// inside `dir`.
pub fn channel_glob(dir: &Path, prefix: &str) -> String {
    dir.join(format!("{prefix}*.{CUBE_CHANNEL_EXTENSION}"))
        .display()
        .to_string()
}

/// The 2-digit name of a frequency chunk.
pub fn chunk_name(chunk: usize) -> String {
    format!("{chunk:02}")
}

/// The directory of a frequency chunk.
pub fn chunk_dir(line_dir: &Path, chunk: usize) -> PathBuf {
    line_dir.join(chunk_name(chunk))
}

/// The dataset made by splitting out a frequency chunk.
pub fn chunk_dataset(line_dir: &Path, chunk: usize) -> PathBuf {
    let name = chunk_name(chunk);
    line_dir.join(&name).join(format!("{name}.mir"))
}

/// The continuum-subtracted dataset of a frequency chunk; this is what channels
/// are imaged from.
pub fn chunk_line_dataset(line_dir: &Path, chunk: usize) -> PathBuf {
    let name = chunk_name(chunk);
    line_dir.join(&name).join(format!("{name}_line.mir"))
}

/// An intermediate product of a continuum minor cycle, e.g. `image_02`.
pub fn continuum_cycle_name(stem: &str, minor_cycle: usize) -> String {
    format!("{stem}_{minor_cycle:02}")
}

pub fn continuum_model_name(major_cycle: usize) -> String {
    format!("model_mf_{major_cycle:02}")
}

pub fn continuum_image_fits_name(major_cycle: usize) -> String {
    format!("image_mf_{major_cycle:02}.fits")
}

/// The continuum model with the given major cycle number.
pub fn continuum_model(cont_dir: &Path, major_cycle: usize) -> PathBuf {
    cont_dir.join(continuum_model_name(major_cycle))
}

/// The FITS rendition of a continuum image; its presence marks a usable model.
pub fn continuum_image_fits(cont_dir: &Path, major_cycle: usize) -> PathBuf {
    cont_dir.join(continuum_image_fits_name(major_cycle))
}

/// The output cube for cube number `cube_index`, e.g. `HI_image_cube0.fits`.
pub fn cube_output(dir: &Path, stem: &str, cube_index: usize) -> PathBuf {
    dir.join(format!("{stem}{cube_index}.fits"))
}
