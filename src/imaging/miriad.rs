// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Running MIRIAD tasks.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use itertools::Itertools;
use log::trace;

use super::*;
use crate::io::{fits_get_image, fits_open, fits_open_hdu};

/// Runs MIRIAD tasks as child processes inside `work_dir`.
#[derive(Debug, Clone)]
pub struct Miriad {
    /// Where the MIRIAD executables live. If `None`, they are looked up on
    /// `PATH`.
    pub bin_dir: Option<PathBuf>,

    pub work_dir: PathBuf,
}

impl Miriad {
    /// Relative directories are taken relative to the current directory, not
    /// the work directory tasks run in.
    pub fn new(bin_dir: Option<PathBuf>, work_dir: PathBuf) -> Miriad {
        Miriad {
            bin_dir: bin_dir.map(absolute),
            work_dir: absolute(work_dir),
        }
    }

    /// The same tasks, but run somewhere else.
    pub fn in_dir(&self, work_dir: PathBuf) -> Miriad {
        Miriad {
            bin_dir: self.bin_dir.clone(),
            work_dir: absolute(work_dir),
        }
    }

    fn executable(&self, task: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(task),
            None => PathBuf::from(task),
        }
    }

    /// Run a task with `key=value` arguments, returning everything it printed.
    fn run(&self, task: &str, args: &[(&str, String)]) -> Result<Vec<String>, PrimitiveError> {
        let mut cmd = Command::new(self.executable(task));
        cmd.current_dir(&self.work_dir)
            .args(args.iter().map(|(k, v)| format!("{k}={v}")));
        trace!("Running {cmd:?}");

        let output = cmd.output().map_err(|source| PrimitiveError::Spawn {
            task: task.to_string(),
            source,
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(PrimitiveError::TaskFailed {
                task: task.to_string(),
                status: output.status.to_string(),
                stderr: stderr.into_owned(),
            });
        }
        Ok(stdout.lines().chain(stderr.lines()).map(String::from).collect())
    }

    fn require(&self, task: &str, output: &str) -> Result<(), PrimitiveError> {
        if self.work_dir.join(output).exists() {
            Ok(())
        } else {
            Err(PrimitiveError::MissingOutput {
                task: task.to_string(),
                output: output.to_string(),
            })
        }
    }

    /// MIRIAD refuses to overwrite; clear the way first.
    fn remove_existing(&self, name: &str) -> Result<(), PrimitiveError> {
        let path = self.work_dir.join(name);
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn absolute(p: PathBuf) -> PathBuf {
    std::path::absolute(&p).unwrap_or(p)
}

/// Tasks run inside the work directory, so paths handed to them must not be
/// relative to ours.
fn path_arg(p: &Path) -> String {
    absolute(p.to_path_buf()).display().to_string()
}

impl ImagingPrimitive for Miriad {
    fn invert(&self, request: &InvertRequest) -> Result<Vec<String>, PrimitiveError> {
        let InvertRequest {
            datasets,
            map,
            beam,
            channel,
            grid,
            sky_response,
        } = request;
        self.remove_existing(map)?;
        self.remove_existing(beam)?;

        let mut args = vec![
            ("vis", datasets.iter().map(|d| path_arg(d)).join(",")),
            ("map", map.to_string()),
            ("beam", beam.to_string()),
            ("imsize", grid.imsize.to_string()),
            ("cell", grid.cellsize.to_string()),
            ("stokes", "ii".to_string()),
            ("slop", "1".to_string()),
        ];
        if let Some(channel) = channel {
            args.push(("line", format!("channel,1,{},1,1", channel + 1)));
        }
        if let Some(robust) = grid.robust {
            args.push(("robust", robust.to_string()));
        }
        let mut options = vec!["mfs", "double"];
        if let Some(centre) = &grid.centre {
            args.push(("offset", centre.clone()));
            options.push("mosaic");
        }
        if *sky_response {
            options.push("sdb");
        }
        args.push(("options", options.join(",")));

        self.run("invert", &args)
    }

    fn mask(&self, image: &str, threshold: f64, out: &str) -> Result<(), PrimitiveError> {
        self.remove_existing(out)?;
        self.run(
            "maths",
            &[
                ("exp", format!("<{image}>")),
                ("mask", format!("<{image}>.gt.{threshold}")),
                ("out", out.to_string()),
            ],
        )?;
        self.require("maths", out)
    }

    fn clean(&self, request: &CleanRequest) -> Result<(), PrimitiveError> {
        let task = match request.algorithm {
            CleanAlgorithm::Hogbom => "clean",
            CleanAlgorithm::MultiFrequency => "mfclean",
        };
        self.remove_existing(request.out)?;
        let mut args = vec![
            ("map", request.map.to_string()),
            ("beam", request.beam.to_string()),
            ("out", request.out.to_string()),
            ("niters", request.max_iterations.to_string()),
            ("region", request.region.to_string()),
        ];
        if let Some(cutoff) = request.cutoff {
            args.push(("cutoff", cutoff.to_string()));
        }
        if let Some(gain) = request.gain {
            args.push(("gain", gain.to_string()));
        }
        if let Some(model) = request.seed_model {
            args.push(("model", model.to_string()));
        }
        self.run(task, &args)?;
        self.require(task, request.out)
    }

    fn restore(&self, request: &RestoreRequest) -> Result<(), PrimitiveError> {
        self.remove_existing(request.out)?;
        let mode = match request.mode {
            RestoreMode::Clean => "clean",
            RestoreMode::Residual => "residual",
        };
        let mut args = vec![
            ("model", request.model.to_string()),
            ("beam", request.beam.to_string()),
            ("map", request.map.to_string()),
            ("out", request.out.to_string()),
            ("mode", mode.to_string()),
        ];
        if let Some(beam) = request.resolution {
            args.push(("fwhm", format!("{},{}", beam.major_arcsec, beam.minor_arcsec)));
            args.push(("pa", beam.position_angle_deg.to_string()));
        }
        self.run("restor", &args)?;
        self.require("restor", request.out)
    }

    fn convolve(&self, image: &str, out: &str, beam: &BeamShape) -> Result<(), PrimitiveError> {
        self.remove_existing(out)?;
        self.run(
            "convol",
            &[
                ("map", image.to_string()),
                ("fwhm", format!("{},{}", beam.major_arcsec, beam.minor_arcsec)),
                ("pa", beam.position_angle_deg.to_string()),
                ("out", out.to_string()),
                ("options", "final".to_string()),
            ],
        )?;
        self.require("convol", out)
    }

    fn statistics(&self, image: &str) -> Result<ImageStatistics, PrimitiveError> {
        // The temporary name is derived from the (channel-unique) image name.
        let fits_name = format!("{image}.fits");
        self.export(image, &fits_name, ExportPlane::All)?;
        let fits_path = self.work_dir.join(&fits_name);
        let _remove_fits = scopeguard::guard((), |_| {
            let _ = fs::remove_file(&fits_path);
        });

        let mut fptr = fits_open(self.work_dir.join(&fits_name))?;
        let hdu = fits_open_hdu(&mut fptr, 0)?;
        let pixels: Vec<f32> = fits_get_image(&mut fptr, &hdu)?;
        ImageStatistics::from_pixels(&pixels).ok_or_else(|| PrimitiveError::NoFinitePixels {
            image: image.to_string(),
        })
    }

    fn export(&self, image: &str, out: &str, plane: ExportPlane) -> Result<(), PrimitiveError> {
        self.remove_existing(out)?;
        let mut args = vec![
            ("op", "xyout".to_string()),
            ("in", image.to_string()),
            ("out", out.to_string()),
        ];
        if plane == ExportPlane::First {
            args.push(("region", "images(1,1)".to_string()));
        }
        self.run("fits", &args)?;
        self.require("fits", out)
    }
}

impl UvTasks for Miriad {
    fn average_channels(
        &self,
        dataset: &Path,
        out: &Path,
        selection: &ChannelSelection,
    ) -> Result<(), PrimitiveError> {
        if out.exists() {
            fs::remove_dir_all(out)?;
        }
        self.run(
            "uvaver",
            &[
                ("vis", path_arg(dataset)),
                ("out", path_arg(out)),
                ("line", selection.to_string()),
            ],
        )?;
        Ok(())
    }

    fn subtract_continuum(
        &self,
        dataset: &Path,
        out: &Path,
        model: ContinuumModel,
    ) -> Result<(), PrimitiveError> {
        if out.exists() {
            fs::remove_dir_all(out)?;
        }
        match model {
            ContinuumModel::Polynomial => self.run(
                "uvlin",
                &[("vis", path_arg(dataset)), ("out", path_arg(out))],
            )?,
            ContinuumModel::CleanModel(model) => self.run(
                "uvmodel",
                &[
                    ("vis", path_arg(dataset)),
                    ("model", path_arg(model)),
                    ("options", "subtract,mfs".to_string()),
                    ("out", path_arg(out)),
                ],
            )?,
        };
        Ok(())
    }
}
