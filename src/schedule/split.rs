// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splitting the band into frequency chunks and removing the continuum from
//! each chunk.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::{fan_out, FrequencyChunk, ManifestError, PoolConfig, SchedulerError, SplitError};
use crate::{
    filenames::{
        chunk_dataset, chunk_dir, chunk_line_dataset, chunk_name, continuum_image_fits,
        continuum_model, CHUNK_MANIFEST_FILENAME,
    },
    imaging::{ChannelSelection, ContinuumModel, PrimitiveError, UvTasks},
};

/// How the band is cut into chunks, and how channels are binned within them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPlan {
    pub total_channels: usize,
    pub input_channel_width_hz: f64,
    pub num_chunks: usize,
    pub channels_per_chunk: usize,
    pub binning: usize,
}

impl SplitPlan {
    pub fn new(
        total_channels: usize,
        input_channel_width_hz: f64,
        chunk_bandwidth_hz: f64,
        output_channel_width_hz: f64,
    ) -> Result<SplitPlan, SplitError> {
        if !(input_channel_width_hz.is_finite() && input_channel_width_hz > 0.0) {
            return Err(SplitError::BadChannelWidth {
                what: "input",
                width: input_channel_width_hz,
            });
        }
        if !(output_channel_width_hz.is_finite() && output_channel_width_hz > 0.0) {
            return Err(SplitError::BadChannelWidth {
                what: "output",
                width: output_channel_width_hz,
            });
        }
        if !(chunk_bandwidth_hz.is_finite() && chunk_bandwidth_hz > 0.0) {
            return Err(SplitError::BadChunkBandwidth(chunk_bandwidth_hz));
        }

        let total_bandwidth = total_channels as f64 * input_channel_width_hz;
        let num_chunks = ((total_bandwidth / chunk_bandwidth_hz).round() as usize)
            .max(1)
            .next_power_of_two();
        let channels_per_chunk = total_channels / num_chunks;
        if channels_per_chunk == 0 {
            return Err(SplitError::TooFewChannels {
                total_channels,
                num_chunks,
            });
        }
        if total_channels % num_chunks != 0 {
            warn!(
                "{total_channels} channels don't split evenly into {num_chunks} chunks; the last {} channels are dropped",
                total_channels % num_chunks
            );
        }

        let mut binning = ((output_channel_width_hz / input_channel_width_hz).round() as usize)
            .clamp(1, channels_per_chunk);
        while channels_per_chunk % binning != 0 {
            binning += 1;
        }

        Ok(SplitPlan {
            total_channels,
            input_channel_width_hz,
            num_chunks,
            channels_per_chunk,
            binning,
        })
    }

    pub fn output_channels_per_chunk(&self) -> usize {
        self.channels_per_chunk / self.binning
    }

    pub fn output_channel_width_hz(&self) -> f64 {
        self.input_channel_width_hz * self.binning as f64
    }

    /// The input channels averaged into `chunk`.
    pub fn selection(&self, chunk: usize) -> ChannelSelection {
        ChannelSelection {
            num_channels: self.output_channels_per_chunk(),
            start: 1 + chunk * self.channels_per_chunk,
            width: self.binning,
            step: self.binning,
        }
    }

    pub fn chunks(&self) -> Vec<FrequencyChunk> {
        (0..self.num_chunks)
            .map(|id| FrequencyChunk {
                id,
                num_channels: self.output_channels_per_chunk(),
                channel_width_hz: self.output_channel_width_hz(),
            })
            .collect()
    }
}

/// The persisted record of a split. Later stages read channel counts from
/// here instead of probing the chunk directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub total_channels: usize,
    pub input_channel_width_hz: f64,
    pub binning: usize,
    pub chunks: Vec<FrequencyChunk>,
}

impl ChunkManifest {
    pub fn from_plan(plan: &SplitPlan) -> ChunkManifest {
        ChunkManifest {
            total_channels: plan.total_channels,
            input_channel_width_hz: plan.input_channel_width_hz,
            binning: plan.binning,
            chunks: plan.chunks(),
        }
    }

    pub fn path(line_dir: &Path) -> PathBuf {
        line_dir.join(CHUNK_MANIFEST_FILENAME)
    }

    pub fn write(&self, line_dir: &Path) -> Result<(), ManifestError> {
        let path = Self::path(line_dir);
        let contents = toml::to_string(self)?;
        fs::write(&path, contents).map_err(|source| ManifestError::Write { path, source })
    }

    pub fn read(line_dir: &Path) -> Result<ChunkManifest, ManifestError> {
        let path = Self::path(line_dir);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(source) => return Err(ManifestError::Read { path, source }),
        };
        toml::from_str(&contents).map_err(|source| ManifestError::Decode { path, source })
    }
}

/// The channel count of every chunk in the manifest. A chunk whose line
/// dataset holds no visibilities, or whose recorded count is zero, gets the
/// equal-split estimate instead.
pub fn resolve_channel_counts(manifest: &ChunkManifest, line_dir: &Path) -> Vec<FrequencyChunk> {
    let num_chunks = manifest.chunks.len().max(1);
    let estimate = (manifest.total_channels as f64
        / num_chunks as f64
        / manifest.binning.max(1) as f64)
        .round() as usize;

    manifest
        .chunks
        .iter()
        .map(|chunk| {
            let visdata = chunk_line_dataset(line_dir, chunk.id).join("visdata");
            let materialised = visdata.exists();
            if !materialised {
                debug!("No visibilities found at {}", visdata.display());
            }
            if materialised && chunk.num_channels > 0 {
                chunk.clone()
            } else {
                info!(
                    "Chunk {} has no usable channel count; assuming {estimate} channels",
                    chunk.name()
                );
                FrequencyChunk {
                    num_channels: estimate,
                    ..chunk.clone()
                }
            }
        })
        .collect()
}

/// Average the input visibilities into one dataset per chunk, then record the
/// split in a manifest. A chunk that fails to split is logged and left for the
/// later stages to skip; if no chunk could be split, nothing is recorded.
pub fn split_chunks<U: UvTasks + ?Sized>(
    uv: &U,
    dataset: &Path,
    line_dir: &Path,
    plan: &SplitPlan,
    pools: &PoolConfig,
) -> Result<ChunkManifest, SchedulerError> {
    info!(
        "Splitting {} channels into {} chunks of {} channels (binning {})",
        plan.total_channels, plan.num_chunks, plan.channels_per_chunk, plan.binning
    );
    fs::create_dir_all(line_dir)?;
    let chunks = plan.chunks();
    let groups: Vec<_> = chunks.iter().map(|c| (c, vec![c.id])).collect();
    let results = fan_out(pools, &groups, |_, &id, context| -> Result<(), PrimitiveError> {
        let dir = chunk_dir(line_dir, id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        let selection = plan.selection(id);
        debug!("Splitting chunk {} with {selection} ({context})", chunk_name(id));
        uv.average_channels(dataset, &chunk_dataset(line_dir, id), &selection)
    })?;
    let mut num_split = 0;
    for (chunk, result) in chunks.iter().zip(results) {
        match result {
            Ok(()) => num_split += 1,
            Err(e) => warn!("Splitting chunk {} failed: {e}", chunk.name()),
        }
    }
    if num_split == 0 {
        return Err(SchedulerError::NothingSplit(chunks.len()));
    }

    let manifest = ChunkManifest::from_plan(plan);
    manifest.write(line_dir)?;
    Ok(manifest)
}

/// How continuum emission is taken out of each chunk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SubtractMode {
    /// Fit a polynomial to each baseline's spectrum.
    #[strum(serialize = "uvlin")]
    Uvlin,

    /// Subtract a continuum clean model.
    #[strum(serialize = "uvmodel")]
    Uvmodel,
}

/// The latest continuum model with a FITS image beside it.
pub fn latest_continuum_model(cont_dir: &Path) -> Option<PathBuf> {
    (1..=9)
        .rev()
        .find(|&n| continuum_image_fits(cont_dir, n).exists())
        .map(|n| continuum_model(cont_dir, n))
}

fn use_unsubtracted(line_dir: &Path, chunk: &FrequencyChunk) -> Result<(), std::io::Error> {
    let line = chunk_line_dataset(line_dir, chunk.id);
    if line.exists() {
        fs::remove_dir_all(&line)?;
    }
    let split = chunk_dataset(line_dir, chunk.id);
    if split.exists() {
        fs::rename(split, line)?;
    }
    Ok(())
}

/// Make every chunk's line dataset. With no mode the split datasets are used
/// as they are. A chunk whose subtraction fails falls back to its unsubtracted
/// data.
pub fn subtract_continuum<U: UvTasks + ?Sized>(
    uv: &U,
    line_dir: &Path,
    manifest: &ChunkManifest,
    mode: Option<SubtractMode>,
    cont_dir: &Path,
    pools: &PoolConfig,
) -> Result<(), SchedulerError> {
    let model_path = match mode {
        Some(SubtractMode::Uvmodel) => latest_continuum_model(cont_dir).unwrap_or_else(|| {
            let fallback = continuum_model(cont_dir, 0);
            warn!(
                "No continuum image found in {}; using {}",
                cont_dir.display(),
                fallback.display()
            );
            fallback
        }),
        _ => PathBuf::new(),
    };
    let model = match mode {
        None => None,
        Some(SubtractMode::Uvlin) => Some(ContinuumModel::Polynomial),
        Some(SubtractMode::Uvmodel) => Some(ContinuumModel::CleanModel(&model_path)),
    };
    match mode {
        Some(mode) => info!("Subtracting the continuum with {mode}"),
        None => info!("Not subtracting the continuum"),
    }

    let groups: Vec<_> = manifest.chunks.iter().map(|c| (c, vec![c.id])).collect();
    let results = fan_out(pools, &groups, |chunk, _, context| {
        let model = match model {
            Some(m) => m,
            None => return use_unsubtracted(line_dir, chunk),
        };
        let split = chunk_dataset(line_dir, chunk.id);
        if !split.exists() {
            warn!("Chunk {} was never split; skipping it", chunk.name());
            return Ok(());
        }
        let line = chunk_line_dataset(line_dir, chunk.id);
        if line.exists() {
            fs::remove_dir_all(&line)?;
        }
        match uv.subtract_continuum(&split, &line, model) {
            Ok(()) => {
                debug!("Subtracted the continuum from chunk {} ({context})", chunk.name());
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Continuum subtraction failed for chunk {} ({context}): {e}; using the unsubtracted data",
                    chunk.name()
                );
                use_unsubtracted(line_dir, chunk)
            }
        }
    })?;
    for (chunk, result) in manifest.chunks.iter().zip(results) {
        if let Err(e) = result {
            warn!("Couldn't prepare the line data of chunk {}: {e}", chunk.name());
        }
    }
    Ok(())
}
