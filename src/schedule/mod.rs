// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fanning work out over frequency chunks, and over the channels within each
//! chunk.
//!
//! There are two levels of workers. The outer pool takes chunks; every outer
//! worker builds its own inner pool for the channels of its chunk. Pools are
//! local to a call, so nothing about the nesting outlives it.

mod error;
mod split;

pub use error::{ManifestError, SchedulerError, SplitError};
pub use split::{
    latest_continuum_model, resolve_channel_counts, split_chunks, subtract_continuum,
    ChunkManifest, SplitPlan, SubtractMode,
};

use std::{
    fmt::Display,
    num::NonZeroUsize,
    ops::Range,
    panic::{catch_unwind, AssertUnwindSafe},
    path::Path,
};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use rayon::{prelude::*, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    channel::{image_channel, ChannelError, ChannelImagingParams, ChannelJob, ChannelProduct},
    filenames::{chunk_line_dataset, chunk_name},
    imaging::ImagingPrimitive,
    PROGRESS_BARS,
};

/// A contiguous sub-band of the data, split out into its own dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyChunk {
    pub id: usize,
    pub num_channels: usize,
    pub channel_width_hz: f64,
}

impl FrequencyChunk {
    /// The zero-padded name, e.g. "03".
    pub fn name(&self) -> String {
        chunk_name(self.id)
    }
}

/// The atomic unit of imaging work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelUnit {
    pub chunk: usize,
    /// The channel within the chunk.
    pub local: usize,
    /// The channel within the whole band.
    pub global: usize,
}

/// Enumerate the channels of every chunk. Global indices run contiguously over
/// the chunks, in chunk order.
pub fn channel_units(chunks: &[FrequencyChunk]) -> Vec<Vec<ChannelUnit>> {
    let mut base = 0;
    chunks
        .iter()
        .map(|chunk| {
            let units = (0..chunk.num_channels)
                .map(|local| ChannelUnit {
                    chunk: chunk.id,
                    local,
                    global: base + local,
                })
                .collect();
            base += chunk.num_channels;
            units
        })
        .collect()
}

/// How many workers to use at each level. The product bounds how many
/// external tasks run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub chunk_threads: NonZeroUsize,
    pub channel_threads: NonZeroUsize,
}

impl PoolConfig {
    pub fn serial() -> PoolConfig {
        PoolConfig {
            chunk_threads: NonZeroUsize::MIN,
            channel_threads: NonZeroUsize::MIN,
        }
    }
}

/// Which worker of which pool is running something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    pub chunk_thread: usize,
    pub chunk_threads: usize,
    pub channel_thread: usize,
    pub channel_threads: usize,
}

impl Display for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "threads [{}/{},{}/{}]",
            self.chunk_thread + 1,
            self.chunk_threads,
            self.channel_thread + 1,
            self.channel_threads
        )
    }
}

/// Run `work` for every unit of every group. Groups go to the outer pool;
/// each group's units go to an inner pool made for that group. Results come
/// back in group order, then unit order.
pub fn fan_out<G, U, R, F>(
    pools: &PoolConfig,
    groups: &[(G, Vec<U>)],
    work: F,
) -> Result<Vec<R>, SchedulerError>
where
    G: Sync,
    U: Sync,
    R: Send,
    F: Fn(&G, &U, &WorkerContext) -> R + Sync,
{
    let chunk_threads = pools.chunk_threads.get();
    let channel_threads = pools.channel_threads.get();
    let outer = ThreadPoolBuilder::new()
        .num_threads(chunk_threads)
        .thread_name(|i| format!("chunk-{i}"))
        .build()?;

    let nested: Vec<Vec<R>> = outer.install(|| {
        groups
            .par_iter()
            .map(|(group, units)| -> Result<Vec<R>, SchedulerError> {
                let chunk_thread = rayon::current_thread_index().unwrap_or(0);
                let inner = ThreadPoolBuilder::new()
                    .num_threads(channel_threads)
                    .thread_name(move |i| format!("chunk-{chunk_thread}-channel-{i}"))
                    .build()?;
                Ok(inner.install(|| {
                    units
                        .par_iter()
                        .map(|unit| {
                            let context = WorkerContext {
                                chunk_thread,
                                chunk_threads,
                                channel_thread: rayon::current_thread_index().unwrap_or(0),
                                channel_threads,
                            };
                            work(group, unit, &context)
                        })
                        .collect::<Vec<R>>()
                }))
            })
            .collect::<Result<Vec<Vec<R>>, SchedulerError>>()
    })?;
    Ok(nested.into_iter().flatten().collect())
}

/// What happened to a single channel.
#[derive(Debug)]
pub struct ChannelRecord {
    pub unit: ChannelUnit,
    pub outcome: Result<ChannelProduct, ChannelError>,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Image every channel whose global index is in `output_range`. Channels are
/// read from each chunk's continuum-subtracted dataset. A chunk without a
/// dataset is skipped; a failing (or panicking) channel is recorded and
/// doesn't affect any other channel.
pub fn image_channels<P: ImagingPrimitive + ?Sized>(
    primitive: &P,
    params: &ChannelImagingParams,
    line_dir: &Path,
    chunks: &[FrequencyChunk],
    output_range: Range<usize>,
    pools: &PoolConfig,
) -> Result<Vec<ChannelRecord>, SchedulerError> {
    let total_channels: usize = chunks.iter().map(|c| c.num_channels).sum();
    let mut groups = vec![];
    for (chunk, units) in chunks.iter().zip(channel_units(chunks)) {
        let dataset = chunk_line_dataset(line_dir, chunk.id);
        if !dataset.exists() {
            warn!(
                "No continuum-subtracted data available for chunk {}; its channels are skipped",
                chunk.name()
            );
            continue;
        }
        let units: Vec<ChannelUnit> = units
            .into_iter()
            .filter(|u| output_range.contains(&u.global))
            .collect();
        if !units.is_empty() {
            groups.push(((chunk, dataset), units));
        }
    }
    let num_units: usize = groups.iter().map(|(_, u)| u.len()).sum();
    info!(
        "Imaging {num_units} channels (global channels {}..{} of {total_channels})",
        output_range.start, output_range.end
    );

    let progress = ProgressBar::with_draw_target(
        Some(num_units as u64),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:17}: [{wide_bar:.blue}] {pos:5}/{len:5} channels ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Imaging channels");

    let mut records = fan_out(pools, &groups, |(chunk, dataset), unit, context| {
        let context = context.to_string();
        let job = ChannelJob {
            dataset,
            local_channel: unit.local,
            global_channel: unit.global,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            image_channel(primitive, params, &job, &context)
        }))
        .unwrap_or_else(|payload| Err(ChannelError::Panicked(panic_message(payload))));

        match &outcome {
            Ok(_) => debug!(
                "Finished processing channel {:05}/{:05} of chunk {} ({context})",
                unit.global,
                total_channels.saturating_sub(1),
                chunk.name()
            ),
            Err(e) => warn!("Channel {:05} failed ({context}): {e}", unit.global),
        }
        progress.inc(1);
        ChannelRecord {
            unit: *unit,
            outcome,
        }
    })?;
    progress.finish_with_message("Channels imaged");

    records.sort_unstable_by_key(|r| r.unit.global);
    Ok(records)
}
