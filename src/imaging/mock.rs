// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An in-process imaging primitive for tests. It records every call, writes
//! placeholder outputs into its working directory and can be told to fail or
//! panic for particular channels.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MockOp {
    Invert,
    Mask,
    Clean,
    Restore,
    Convolve,
    Statistics,
    Export,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Invert {
        map: String,
        channel: Option<usize>,
    },
    Mask {
        image: String,
        threshold: f64,
        out: String,
    },
    Clean {
        out: String,
        cutoff: Option<f64>,
        max_iterations: usize,
        region: CleanRegion,
        seed_model: Option<String>,
        algorithm: CleanAlgorithm,
    },
    Restore {
        model: String,
        out: String,
        mode: RestoreMode,
    },
    Convolve {
        image: String,
        out: String,
    },
    Statistics(String),
    Export {
        image: String,
        out: String,
    },
    AverageChannels {
        out: PathBuf,
        selection: ChannelSelection,
    },
    SubtractContinuum {
        out: PathBuf,
        model: Option<PathBuf>,
    },
}

pub(crate) struct MockPrimitive {
    pub(crate) work_dir: PathBuf,

    /// Global channels whose map formation accepts no visibilities.
    pub(crate) empty_channels: HashSet<usize>,

    /// Operations that fail for a global channel.
    pub(crate) failures: HashSet<(MockOp, usize)>,

    /// Global channels whose map formation panics.
    pub(crate) panicking_channels: HashSet<usize>,

    /// Chunks whose continuum subtraction fails.
    pub(crate) failing_chunks: HashSet<usize>,

    /// How many of the next channel averagings fail.
    pub(crate) failing_splits: Mutex<usize>,

    /// Statistics of every dirty map.
    pub(crate) map_stats: ImageStatistics,

    pub(crate) rms_noise: f64,

    calls: Mutex<Vec<Call>>,
}

impl MockPrimitive {
    pub(crate) fn new(work_dir: &Path) -> MockPrimitive {
        MockPrimitive {
            work_dir: work_dir.to_path_buf(),
            empty_channels: HashSet::new(),
            failures: HashSet::new(),
            panicking_channels: HashSet::new(),
            failing_chunks: HashSet::new(),
            failing_splits: Mutex::new(0),
            map_stats: ImageStatistics {
                max: 1.0,
                min: -0.1,
                sum: 0.0,
                stddev: 0.01,
            },
            rms_noise: 0.001,
            calls: Mutex::new(vec![]),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// All calls that touched the given global channel.
    pub(crate) fn calls_for(&self, channel: usize) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                let name = match c {
                    Call::Invert { map, .. } => map,
                    Call::Mask { out, .. }
                    | Call::Clean { out, .. }
                    | Call::Restore { out, .. }
                    | Call::Convolve { out, .. }
                    | Call::Export { out, .. } => out,
                    Call::Statistics(image) => image,
                    Call::AverageChannels { .. } | Call::SubtractContinuum { .. } => return false,
                };
                channel_of(name) == Some(channel)
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: MockOp, name: &str) -> Result<(), PrimitiveError> {
        match channel_of(name) {
            Some(c) if self.failures.contains(&(op, c)) => Err(PrimitiveError::TaskFailed {
                task: format!("{op:?}"),
                status: "exit status: 1".to_string(),
                stderr: format!("### Fatal Error: forced failure for channel {c}"),
            }),
            _ => Ok(()),
        }
    }

    fn touch(&self, name: &str, contents: &str) -> Result<(), PrimitiveError> {
        fs::write(self.work_dir.join(name), contents)?;
        Ok(())
    }
}

/// The global channel index at the end of a product name, e.g. 42 from
/// "image_03_00042" or "cube_image_00042.fits".
pub(crate) fn channel_of(name: &str) -> Option<usize> {
    let stem = name.strip_suffix(".fits").unwrap_or(name);
    stem.rsplit('_').next()?.parse().ok()
}

fn chunk_of(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    name.get(..2)?.parse().ok()
}

impl ImagingPrimitive for MockPrimitive {
    fn invert(&self, request: &InvertRequest) -> Result<Vec<String>, PrimitiveError> {
        self.record(Call::Invert {
            map: request.map.to_string(),
            channel: request.channel,
        });
        let channel = channel_of(request.map);
        if let Some(c) = channel {
            if self.panicking_channels.contains(&c) {
                panic!("forced panic for channel {c}");
            }
        }
        self.check(MockOp::Invert, request.map)?;
        self.touch(request.map, "map")?;
        self.touch(request.beam, "beam")?;

        let visibilities = match channel {
            Some(c) if self.empty_channels.contains(&c) => 0,
            _ => 4096,
        };
        let mut lines = vec![
            "INVERT: version mock".to_string(),
            format!("Visibilities accepted: {visibilities}"),
        ];
        if visibilities > 0 {
            lines.push(format!("Theoretical rms noise: {:E}", self.rms_noise));
        }
        Ok(lines)
    }

    fn mask(&self, image: &str, threshold: f64, out: &str) -> Result<(), PrimitiveError> {
        self.record(Call::Mask {
            image: image.to_string(),
            threshold,
            out: out.to_string(),
        });
        self.check(MockOp::Mask, out)?;
        self.touch(out, "mask")
    }

    fn clean(&self, request: &CleanRequest) -> Result<(), PrimitiveError> {
        self.record(Call::Clean {
            out: request.out.to_string(),
            cutoff: request.cutoff,
            max_iterations: request.max_iterations,
            region: request.region.clone(),
            seed_model: request.seed_model.map(String::from),
            algorithm: request.algorithm,
        });
        self.check(MockOp::Clean, request.out)?;
        self.touch(request.out, "model")
    }

    fn restore(&self, request: &RestoreRequest) -> Result<(), PrimitiveError> {
        self.record(Call::Restore {
            model: request.model.to_string(),
            out: request.out.to_string(),
            mode: request.mode,
        });
        self.check(MockOp::Restore, request.out)?;
        self.touch(request.out, "image")
    }

    fn convolve(&self, image: &str, out: &str, _beam: &BeamShape) -> Result<(), PrimitiveError> {
        self.record(Call::Convolve {
            image: image.to_string(),
            out: out.to_string(),
        });
        self.check(MockOp::Convolve, out)?;
        self.touch(out, "convolved")
    }

    fn statistics(&self, image: &str) -> Result<ImageStatistics, PrimitiveError> {
        self.record(Call::Statistics(image.to_string()));
        self.check(MockOp::Statistics, image)?;
        if image.starts_with("map_") {
            Ok(self.map_stats)
        } else {
            Ok(ImageStatistics {
                max: self.map_stats.max / 10.0,
                min: self.map_stats.min / 10.0,
                sum: 0.0,
                stddev: self.rms_noise,
            })
        }
    }

    /// The exported file contains the name of the image it came from.
    fn export(&self, image: &str, out: &str, _plane: ExportPlane) -> Result<(), PrimitiveError> {
        self.record(Call::Export {
            image: image.to_string(),
            out: out.to_string(),
        });
        self.check(MockOp::Export, out)?;
        self.touch(out, image)
    }
}

impl UvTasks for MockPrimitive {
    fn average_channels(
        &self,
        _dataset: &Path,
        out: &Path,
        selection: &ChannelSelection,
    ) -> Result<(), PrimitiveError> {
        self.record(Call::AverageChannels {
            out: out.to_path_buf(),
            selection: *selection,
        });
        {
            let mut failing = self.failing_splits.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(PrimitiveError::TaskFailed {
                    task: "uvaver".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "forced failure".to_string(),
                });
            }
        }
        fs::create_dir_all(out)?;
        fs::write(out.join("visdata"), "vis")?;
        Ok(())
    }

    fn subtract_continuum(
        &self,
        _dataset: &Path,
        out: &Path,
        model: ContinuumModel,
    ) -> Result<(), PrimitiveError> {
        self.record(Call::SubtractContinuum {
            out: out.to_path_buf(),
            model: match model {
                ContinuumModel::Polynomial => None,
                ContinuumModel::CleanModel(m) => Some(m.to_path_buf()),
            },
        });
        if let Some(chunk) = chunk_of(out) {
            if self.failing_chunks.contains(&chunk) {
                return Err(PrimitiveError::TaskFailed {
                    task: "subtract".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: format!("forced failure for chunk {chunk}"),
                });
            }
        }
        fs::create_dir_all(out)?;
        fs::write(out.join("visdata"), "vis")?;
        Ok(())
    }
}
