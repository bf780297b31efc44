// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Assembling exported channel images into a cube.
//!
//! Channels that produced no image (no visibilities, or imaging failed) leave
//! their slice filled with [`NO_DATA`].

mod error;
mod header;
#[cfg(test)]
mod tests;

pub use error::CubeError;
pub use header::{HeaderValue, MetadataHeader};

use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use ndarray::prelude::*;

use crate::{
    constants::NO_DATA,
    filenames::{channel_glob, cube_channel_filename},
    io::{
        fits_create_image, fits_get_image, fits_get_image_shape, fits_open, fits_open_hdu,
        fits_read_header_cards, fits_write_image, fits_write_key, get_all_matches_from_glob,
    },
};

/// Reads exported channel images.
pub trait ChannelImageReader: Sync {
    fn read_header(&self, path: &Path) -> Result<MetadataHeader, CubeError>;

    /// The sky plane of the image, with shape (ny, nx).
    fn read_plane(&self, path: &Path) -> Result<Array2<f32>, CubeError>;
}

/// Channel images in FITS files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsChannelReader;

impl ChannelImageReader for FitsChannelReader {
    fn read_header(&self, path: &Path) -> Result<MetadataHeader, CubeError> {
        let mut fptr = fits_open(path)?;
        let hdu = fits_open_hdu(&mut fptr, 0)?;
        let cards = fits_read_header_cards(&mut fptr, &hdu)?;
        Ok(MetadataHeader::from_cards(cards))
    }

    fn read_plane(&self, path: &Path) -> Result<Array2<f32>, CubeError> {
        let mut fptr = fits_open(path)?;
        let hdu = fits_open_hdu(&mut fptr, 0)?;
        let shape = fits_get_image_shape(&fptr, &hdu)?.to_vec();
        let plane_shape = match shape.as_slice() {
            [extra @ .., ny, nx] if extra.iter().all(|&n| n == 1) => Some((*ny, *nx)),
            _ => None,
        };
        let (ny, nx) = match plane_shape {
            Some(s) => s,
            None => {
                return Err(CubeError::NonDegenerateAxes {
                    path: path.to_path_buf(),
                    shape,
                })
            }
        };
        let pixels: Vec<f32> = fits_get_image(&mut fptr, &hdu)?;
        Array2::from_shape_vec((ny, nx), pixels).map_err(|_| CubeError::NonDegenerateAxes {
            path: path.to_path_buf(),
            shape,
        })
    }
}

/// The cube being filled. Every channel slot starts out as [`NO_DATA`] and may
/// be filled once.
pub struct CubeAccumulator {
    data: Array3<f32>,
    channels: Range<usize>,
    filled: Vec<bool>,
}

impl CubeAccumulator {
    pub fn new(channels: Range<usize>, ny: usize, nx: usize) -> Result<CubeAccumulator, CubeError> {
        if channels.is_empty() {
            return Err(CubeError::EmptyRange {
                start: channels.start,
                end: channels.end,
            });
        }
        let num_channels = channels.len();
        Ok(CubeAccumulator {
            data: Array3::from_elem((num_channels, ny, nx), NO_DATA),
            channels,
            filled: vec![false; num_channels],
        })
    }

    /// (ny, nx)
    pub fn plane_shape(&self) -> (usize, usize) {
        let (_, ny, nx) = self.data.dim();
        (ny, nx)
    }

    /// Copy a channel's plane into its slice.
    pub fn fill(&mut self, global_channel: usize, plane: ArrayView2<f32>) -> Result<(), CubeError> {
        if !self.channels.contains(&global_channel) {
            return Err(CubeError::ChannelOutOfRange {
                channel: global_channel,
                start: self.channels.start,
                end: self.channels.end,
            });
        }
        let slot = global_channel - self.channels.start;
        if self.filled[slot] {
            return Err(CubeError::AlreadyFilled(global_channel));
        }
        self.data.slice_mut(s![slot, .., ..]).assign(&plane);
        self.filled[slot] = true;
        Ok(())
    }

    /// The global channels that were filled.
    pub fn filled_channels(&self) -> Vec<usize> {
        self.channels
            .clone()
            .zip(&self.filled)
            .filter(|(_, f)| **f)
            .map(|(c, _)| c)
            .collect()
    }

    pub fn into_data(self) -> Array3<f32> {
        self.data
    }
}

/// A cube ready to be written.
#[derive(Debug)]
pub struct AssembledCube {
    pub data: Array3<f32>,
    pub header: MetadataHeader,
    pub filled_channels: Vec<usize>,
}

fn required_axis_length(
    header: &MetadataHeader,
    path: &Path,
    key: &'static str,
) -> Result<usize, CubeError> {
    header
        .get_f64(key)
        .filter(|n| *n >= 1.0)
        .map(|n| n as usize)
        .ok_or_else(|| CubeError::MissingKey {
            path: path.to_path_buf(),
            key,
        })
}

/// Gather the channel images named `{prefix}CCCCC.fits` in `dir` for the
/// global channels in `channels`. The geometry and header come from the first
/// image in lexicographic order. Returns `None` if there are no images at all.
pub fn assemble<R: ChannelImageReader + ?Sized>(
    reader: &R,
    dir: &Path,
    prefix: &str,
    channels: Range<usize>,
) -> Result<Option<AssembledCube>, CubeError> {
    let files = get_all_matches_from_glob(&channel_glob(dir, prefix))?;
    let first = match files.first() {
        Some(f) => f,
        None => return Ok(None),
    };
    debug!("Taking the cube geometry from {}", first.display());
    let header = reader.read_header(first)?;
    let nx = required_axis_length(&header, first, "NAXIS1")?;
    let ny = required_axis_length(&header, first, "NAXIS2")?;

    let mut accumulator = CubeAccumulator::new(channels.clone(), ny, nx)?;
    for channel in channels {
        let path = dir.join(cube_channel_filename(prefix, channel));
        if !path.exists() {
            debug!("No image for channel {channel:05}");
            continue;
        }
        let plane = match reader.read_plane(&path) {
            Ok(p) => p,
            Err(e) => {
                warn!("Couldn't read the image of channel {channel:05}: {e}");
                continue;
            }
        };
        if plane.dim() != (ny, nx) {
            warn!(
                "{}",
                CubeError::ShapeMismatch {
                    path,
                    expected_ny: ny,
                    expected_nx: nx,
                    ny: plane.nrows(),
                    nx: plane.ncols(),
                }
            );
            continue;
        }
        accumulator.fill(channel, plane.view())?;
    }

    let filled_channels = accumulator.filled_channels();
    Ok(Some(AssembledCube {
        data: accumulator.into_data(),
        header,
        filled_channels,
    }))
}

/// Write a cube as the primary image of a new FITS file, replacing any file
/// already there.
pub fn write_cube(path: &Path, cube: &AssembledCube) -> Result<(), CubeError> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let (num_channels, ny, nx) = cube.data.dim();
    let mut fptr = fits_create_image(path, &[num_channels, ny, nx])?;
    let hdu = fits_open_hdu(&mut fptr, 0)?;
    let pixels: Vec<f32> = cube.data.iter().copied().collect();
    fits_write_image(&mut fptr, &hdu, &pixels)?;
    for (key, value) in cube.header.descriptive_cards() {
        match value {
            HeaderValue::Int(i) => fits_write_key(&mut fptr, &hdu, key, *i)?,
            HeaderValue::Float(f) => fits_write_key(&mut fptr, &hdu, key, *f)?,
            HeaderValue::Str(s) => fits_write_key(&mut fptr, &hdu, key, s.clone())?,
        }
    }
    Ok(())
}

/// What came of assembling a cube.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeSummary {
    pub path: PathBuf,
    pub num_channels: usize,
    pub filled_channels: Vec<usize>,
}

/// Assemble, reconcile and write one cube. Returns `None` (and writes nothing)
/// if no channel images exist.
pub fn assemble_cube<R: ChannelImageReader + ?Sized>(
    reader: &R,
    dir: &Path,
    prefix: &str,
    channels: Range<usize>,
    start_freq_hz: f64,
    output: &Path,
) -> Result<Option<CubeSummary>, CubeError> {
    let num_channels = channels.len();
    let mut cube = match assemble(reader, dir, prefix, channels)? {
        Some(c) => c,
        None => return Ok(None),
    };
    cube.header.reconcile(start_freq_hz);
    write_cube(output, &cube)?;
    info!(
        "Wrote {} ({} of {num_channels} channels have data)",
        output.display(),
        cube.filled_channels.len()
    );
    Ok(Some(CubeSummary {
        path: output.to_path_buf(),
        num_channels,
        filled_channels: cube.filled_channels,
    }))
}
