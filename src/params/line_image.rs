// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Make spectral-line cubes: split the band into chunks, take the continuum
//! out of each chunk, image every requested channel and assemble the exported
//! channel images into image and beam cubes.

use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};
use thiserror::Error;
use vec1::Vec1;

use crate::{
    channel::ChannelImagingParams,
    cube::{assemble_cube, ChannelImageReader, CubeError, CubeSummary, FitsChannelReader},
    filenames::{channel_glob, cube_output, CUBES_DIR, CUBE_BEAM_PREFIX, CUBE_IMAGE_PREFIX},
    imaging::{ImagingPrimitive, Miriad, UvTasks},
    io::{get_all_matches_from_glob, GlobError},
    schedule::{
        image_channels, resolve_channel_counts, split_chunks, subtract_continuum, ChunkManifest,
        ManifestError, PoolConfig, SchedulerError, SplitError, SplitPlan, SubtractMode,
    },
};

/// One cube to make.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CubeRequest {
    /// Input (unbinned) channels, end exclusive.
    pub(crate) input_channels: Range<usize>,
    /// \[Hz\]
    pub(crate) channel_width_hz: f64,
}

pub(crate) struct LineImagingParams {
    /// The calibrated visibilities of the whole band.
    pub(crate) dataset: PathBuf,
    pub(crate) line_dir: PathBuf,
    /// Where continuum models are looked for when subtracting with a model.
    pub(crate) cont_dir: PathBuf,
    pub(crate) total_channels: usize,
    /// \[Hz\]
    pub(crate) input_channel_width_hz: f64,
    /// The frequency of the first input channel \[Hz\].
    pub(crate) start_freq_hz: f64,
    /// \[Hz\]
    pub(crate) chunk_bandwidth_hz: f64,
    pub(crate) cubes: Vec1<CubeRequest>,
    /// `None` means the continuum isn't subtracted.
    pub(crate) subtract: Option<SubtractMode>,
    pub(crate) channel_params: ChannelImagingParams,
    pub(crate) pools: PoolConfig,
    pub(crate) image_cube_name: String,
    pub(crate) beam_cube_name: String,
    pub(crate) miriad_bin_dir: Option<PathBuf>,
}

/// What came of a single requested cube.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CubeOutcome {
    Written {
        image: CubeSummary,
        /// `None` if no beams were exported.
        beam: Option<CubeSummary>,
    },

    /// Not a single channel image was made, so nothing was written.
    NoChannels,

    Failed(String),
}

impl LineImagingParams {
    pub(crate) fn cubes_dir(&self) -> PathBuf {
        self.line_dir.join(CUBES_DIR)
    }

    pub(crate) fn run(&self) -> Result<Vec<CubeOutcome>, LineImagingError> {
        let miriad = Miriad::new(self.miriad_bin_dir.clone(), self.cubes_dir());
        self.run_with(&miriad, &FitsChannelReader)
    }

    /// Make every requested cube. A cube that fails is logged and recorded,
    /// and the next cube is still attempted. `primitive` must work inside
    /// [`LineImagingParams::cubes_dir`].
    pub(crate) fn run_with<P, R>(
        &self,
        primitive: &P,
        reader: &R,
    ) -> Result<Vec<CubeOutcome>, LineImagingError>
    where
        P: ImagingPrimitive + UvTasks + ?Sized,
        R: ChannelImageReader + ?Sized,
    {
        fs::create_dir_all(self.cubes_dir())?;

        let mut outcomes = Vec::with_capacity(self.cubes.len());
        // The channel width the chunks on disk were made for.
        let mut prepared_width = None;
        for (i_cube, cube) in self.cubes.iter().enumerate() {
            let result = self.make_cube(i_cube, cube, &mut prepared_width, primitive, reader);
            let outcome = match result {
                Ok(o) => o,
                Err(e) => {
                    warn!("Failed to create line cube {i_cube}: {e}");
                    CubeOutcome::Failed(e.to_string())
                }
            };
            info!("Line imaging done for cube {i_cube}");
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn make_cube<P, R>(
        &self,
        i_cube: usize,
        cube: &CubeRequest,
        prepared_width: &mut Option<f64>,
        primitive: &P,
        reader: &R,
    ) -> Result<CubeOutcome, LineImagingError>
    where
        P: ImagingPrimitive + UvTasks + ?Sized,
        R: ChannelImageReader + ?Sized,
    {
        let manifest = if *prepared_width != Some(cube.channel_width_hz) {
            // Whatever was prepared before is gone once preparing starts.
            *prepared_width = None;
            let plan = SplitPlan::new(
                self.total_channels,
                self.input_channel_width_hz,
                self.chunk_bandwidth_hz,
                cube.channel_width_hz,
            )?;
            let manifest = split_chunks(primitive, &self.dataset, &self.line_dir, &plan, &self.pools)?;
            info!("Chunks created for cube {i_cube}");
            subtract_continuum(
                primitive,
                &self.line_dir,
                &manifest,
                self.subtract,
                &self.cont_dir,
                &self.pools,
            )?;
            info!("Continuum subtraction done for cube {i_cube}");
            *prepared_width = Some(cube.channel_width_hz);
            manifest
        } else {
            info!("Chunks for cube {i_cube} already exist; not splitting or subtracting again");
            ChunkManifest::read(&self.line_dir)?
        };

        let chunks = resolve_channel_counts(&manifest, &self.line_dir);
        let binning = manifest.binning;
        let output_channels = output_channel_range(&cube.input_channels, binning);
        if output_channels.is_empty() {
            return Err(LineImagingError::EmptyOutputRange {
                start: cube.input_channels.start,
                end: cube.input_channels.end,
                binning,
            });
        }
        info!(
            "Channel range of cube {i_cube} before binning: {}..{}, after: {}..{}",
            cube.input_channels.start,
            cube.input_channels.end,
            output_channels.start,
            output_channels.end
        );
        let start_freq_hz = cube_start_freq_hz(
            self.start_freq_hz,
            self.input_channel_width_hz,
            binning,
            output_channels.start,
        );

        let cubes_dir = self.cubes_dir();
        remove_channel_images(&cubes_dir)?;
        let records = image_channels(
            primitive,
            &self.channel_params,
            &self.line_dir,
            &chunks,
            output_channels.clone(),
            &self.pools,
        )?;
        let num_failed = records.iter().filter(|r| r.outcome.is_err()).count();
        if num_failed > 0 {
            warn!("{num_failed} channels of cube {i_cube} failed to image");
        }

        let image = assemble_cube(
            reader,
            &cubes_dir,
            CUBE_IMAGE_PREFIX,
            output_channels.clone(),
            start_freq_hz,
            &cube_output(&cubes_dir, &self.image_cube_name, i_cube),
        )?;
        let image = match image {
            Some(i) => i,
            None => {
                error!("No channel images were made for cube {i_cube}; no cube was written");
                return Ok(CubeOutcome::NoChannels);
            }
        };
        let beam = assemble_cube(
            reader,
            &cubes_dir,
            CUBE_BEAM_PREFIX,
            output_channels,
            start_freq_hz,
            &cube_output(&cubes_dir, &self.beam_cube_name, i_cube),
        )?;
        if beam.is_none() {
            error!("No channel beams were made for cube {i_cube}; no beam cube was written");
        }
        Ok(CubeOutcome::Written { image, beam })
    }
}

/// The binned channels covering `input_channels`.
pub(super) fn output_channel_range(input_channels: &Range<usize>, binning: usize) -> Range<usize> {
    input_channels.start / binning..input_channels.end / binning
}

/// The frequency of the first channel of a cube starting at binned channel
/// `output_start`.
pub(super) fn cube_start_freq_hz(
    start_freq_hz: f64,
    input_channel_width_hz: f64,
    binning: usize,
    output_start: usize,
) -> f64 {
    start_freq_hz + input_channel_width_hz * (binning * output_start) as f64
}

/// Channel images exported for an earlier cube must not end up in this one.
fn remove_channel_images(cubes_dir: &Path) -> Result<(), LineImagingError> {
    for prefix in [CUBE_IMAGE_PREFIX, CUBE_BEAM_PREFIX] {
        for stale in get_all_matches_from_glob(&channel_glob(cubes_dir, prefix))? {
            debug!("Removing {}", stale.display());
            fs::remove_file(stale)?;
        }
    }
    Ok(())
}

#[derive(Error, Debug)]
pub(crate) enum LineImagingError {
    #[error("Input channels {start}..{end} give no channels after binning by {binning}")]
    EmptyOutputRange {
        start: usize,
        end: usize,
        binning: usize,
    },

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Cube(#[from] CubeError),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, num::NonZeroUsize};

    use approx::assert_abs_diff_eq;
    use ndarray::prelude::*;
    use serial_test::serial;
    use tempfile::TempDir;
    use vec1::vec1;

    use super::*;
    use crate::{
        channel::MinimalRestore,
        constants::{HI_REST_FREQ_HZ, NO_DATA},
        cube::MetadataHeader,
        imaging::{
            mock::{channel_of, Call, MockPrimitive},
            GridParams,
        },
        io::{fits_get_image, fits_get_image_shape, fits_open, fits_open_hdu, fits_read_header_cards},
    };

    /// Every channel image is 3x4 pixels of its channel number.
    struct ChannelNumberReader;

    impl ChannelImageReader for ChannelNumberReader {
        fn read_header(&self, _path: &Path) -> Result<MetadataHeader, CubeError> {
            Ok(MetadataHeader::from_cards(
                [
                    ("NAXIS", "4"),
                    ("NAXIS1", "4"),
                    ("NAXIS2", "3"),
                    ("NAXIS3", "1"),
                    ("NAXIS4", "1"),
                    ("CTYPE1", "'RA---NCP'"),
                    ("CTYPE2", "'DEC--NCP'"),
                    ("CTYPE3", "'FREQ-OBS'"),
                    ("CRVAL3", "1.4E+09"),
                    ("CTYPE4", "'STOKES  '"),
                    ("BUNIT", "'JY/BEAM '"),
                ]
                .map(|(k, v)| (k.to_string(), v.to_string())),
            ))
        }

        fn read_plane(&self, path: &Path) -> Result<Array2<f32>, CubeError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap();
            Ok(Array2::from_elem((3, 4), channel_of(name).unwrap() as f32))
        }
    }

    fn get_params(tmp: &TempDir, cubes: Vec1<CubeRequest>) -> LineImagingParams {
        LineImagingParams {
            dataset: tmp.path().join("target.mir"),
            line_dir: tmp.path().join("line"),
            cont_dir: tmp.path().join("continuum"),
            total_channels: 8,
            input_channel_width_hz: 1e5,
            start_freq_hz: 1.3e9,
            chunk_bandwidth_hz: 4e5,
            cubes,
            subtract: None,
            channel_params: ChannelImagingParams {
                grid: GridParams {
                    imsize: 8,
                    cellsize: 6.0,
                    robust: None,
                    centre: None,
                },
                nsigma: 4.5,
                ratio_limit: 1.05,
                c1: 5.0,
                dr0: 2.0,
                minorcycle0_dr: 3.0,
                clean: true,
                restoring_beam: None,
                convolution_beam: None,
                minimal_restore: MinimalRestore::CleanAndRestore,
            },
            pools: PoolConfig {
                chunk_threads: NonZeroUsize::new(2).unwrap(),
                channel_threads: NonZeroUsize::new(2).unwrap(),
            },
            image_cube_name: "HI_image_cube".to_string(),
            beam_cube_name: "HI_beam_cube".to_string(),
            miriad_bin_dir: None,
        }
    }

    fn num_splits(mock: &MockPrimitive) -> usize {
        mock.calls()
            .iter()
            .filter(|c| matches!(c, Call::AverageChannels { .. }))
            .count()
    }

    #[test]
    fn test_output_range_and_start_freq() {
        assert_eq!(output_channel_range(&(10..30), 4), 2..7);
        assert_eq!(output_channel_range(&(0..1), 2), 0..0);
        assert_abs_diff_eq!(cube_start_freq_hz(1.3e9, 1e5, 4, 2), 1.3e9 + 8e5);
        assert_abs_diff_eq!(cube_start_freq_hz(1.3e9, 1e5, 1, 0), 1.3e9);
    }

    #[test]
    #[serial]
    fn test_two_chunks_with_an_empty_channel() {
        let tmp = TempDir::new().unwrap();
        let params = get_params(
            &tmp,
            vec1![CubeRequest {
                input_channels: 2..7,
                channel_width_hz: 1e5,
            }],
        );
        fs::create_dir_all(params.cubes_dir()).unwrap();
        let mut mock = MockPrimitive::new(&params.cubes_dir());
        mock.empty_channels.insert(5);

        let outcomes = params.run_with(&mock, &ChannelNumberReader).unwrap();
        let (image, beam) = match outcomes.as_slice() {
            [CubeOutcome::Written { image, beam }] => (image, beam.as_ref().unwrap()),
            other => panic!("unexpected outcomes: {other:?}"),
        };

        let exported: HashSet<usize> = get_all_matches_from_glob(&channel_glob(
            &params.cubes_dir(),
            CUBE_IMAGE_PREFIX,
        ))
        .unwrap()
        .iter()
        .map(|p| channel_of(p.file_name().unwrap().to_str().unwrap()).unwrap())
        .collect();
        assert_eq!(exported, HashSet::from([2, 3, 4, 6]));
        assert_eq!(image.num_channels, 5);
        assert_eq!(image.filled_channels, vec![2, 3, 4, 6]);
        assert_eq!(beam.filled_channels, vec![2, 3, 4, 6]);
        assert_eq!(image.path, params.cubes_dir().join("HI_image_cube0.fits"));
        assert_eq!(beam.path, params.cubes_dir().join("HI_beam_cube0.fits"));

        let mut fptr = fits_open(&image.path).unwrap();
        let hdu = fits_open_hdu(&mut fptr, 0).unwrap();
        assert_eq!(fits_get_image_shape(&fptr, &hdu).unwrap(), &[5, 3, 4]);
        let data: Vec<f32> = fits_get_image(&mut fptr, &hdu).unwrap();
        let data = Array3::from_shape_vec((5, 3, 4), data).unwrap();
        for (slice, channel) in data.outer_iter().zip(2..) {
            if channel == 5 {
                assert!(slice.iter().all(|p| p.is_nan()));
                assert!(NO_DATA.is_nan());
            } else {
                assert!(slice.iter().all(|&p| p == channel as f32));
            }
        }
        let header = MetadataHeader::from_cards(fits_read_header_cards(&mut fptr, &hdu).unwrap());
        assert_abs_diff_eq!(
            header.get_f64("RESTFREQ").unwrap(),
            HI_REST_FREQ_HZ,
            epsilon = 1.0
        );
        // Binning is 1, so the cube starts at input channel 2.
        assert_abs_diff_eq!(header.get_f64("CRVAL3").unwrap(), 1.3e9 + 2e5, epsilon = 1.0);
        assert!(header.get("CTYPE4").is_none());
    }

    #[test]
    #[serial]
    fn test_split_only_when_width_changes() {
        let tmp = TempDir::new().unwrap();
        let params = get_params(
            &tmp,
            vec1![
                CubeRequest {
                    input_channels: 0..4,
                    channel_width_hz: 1e5,
                },
                CubeRequest {
                    input_channels: 4..8,
                    channel_width_hz: 1e5,
                },
                CubeRequest {
                    input_channels: 0..8,
                    channel_width_hz: 2e5,
                },
            ],
        );
        fs::create_dir_all(params.cubes_dir()).unwrap();
        let mock = MockPrimitive::new(&params.cubes_dir());

        let outcomes = params.run_with(&mock, &ChannelNumberReader).unwrap();
        assert_eq!(outcomes.len(), 3);
        // Two chunks are split for the first cube, and again for the third.
        assert_eq!(num_splits(&mock), 4);

        match &outcomes[1] {
            CubeOutcome::Written { image, .. } => {
                assert_eq!(image.filled_channels, vec![4, 5, 6, 7])
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Binning by 2 leaves 4 output channels, and nothing exported for the
        // second cube leaks into the third.
        match &outcomes[2] {
            CubeOutcome::Written { image, .. } => {
                assert_eq!(image.num_channels, 4);
                assert_eq!(image.filled_channels, vec![0, 1, 2, 3]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        for i in 0..3 {
            assert!(params
                .cubes_dir()
                .join(format!("HI_image_cube{i}.fits"))
                .exists());
        }
    }

    #[test]
    #[serial]
    fn test_failed_cube_does_not_stop_the_next() {
        let tmp = TempDir::new().unwrap();
        let params = get_params(
            &tmp,
            vec1![
                CubeRequest {
                    input_channels: 0..1,
                    channel_width_hz: 2e5,
                },
                CubeRequest {
                    input_channels: 0..4,
                    channel_width_hz: 1e5,
                },
            ],
        );
        fs::create_dir_all(params.cubes_dir()).unwrap();
        let mock = MockPrimitive::new(&params.cubes_dir());

        let outcomes = params.run_with(&mock, &ChannelNumberReader).unwrap();
        assert!(matches!(outcomes[0], CubeOutcome::Failed(_)));
        assert!(matches!(outcomes[1], CubeOutcome::Written { .. }));
        assert!(!params.cubes_dir().join("HI_image_cube0.fits").exists());
        assert!(params.cubes_dir().join("HI_image_cube1.fits").exists());
    }

    #[test]
    fn test_no_channels_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let params = get_params(
            &tmp,
            vec1![CubeRequest {
                input_channels: 0..2,
                channel_width_hz: 1e5,
            }],
        );
        fs::create_dir_all(params.cubes_dir()).unwrap();
        let mut mock = MockPrimitive::new(&params.cubes_dir());
        mock.empty_channels.extend([0, 1]);

        let outcomes = params.run_with(&mock, &ChannelNumberReader).unwrap();
        assert_eq!(outcomes, vec![CubeOutcome::NoChannels]);
        assert!(!params.cubes_dir().join("HI_image_cube0.fits").exists());
        assert!(!params.cubes_dir().join("HI_beam_cube0.fits").exists());
    }

    #[test]
    #[serial]
    fn test_failed_preparation_is_retried() {
        let tmp = TempDir::new().unwrap();
        let params = get_params(
            &tmp,
            vec1![
                CubeRequest {
                    input_channels: 0..4,
                    channel_width_hz: 1e5,
                },
                CubeRequest {
                    input_channels: 4..8,
                    channel_width_hz: 1e5,
                },
            ],
        );
        fs::create_dir_all(params.cubes_dir()).unwrap();
        let mock = MockPrimitive::new(&params.cubes_dir());
        // Both chunks of the first cube fail to split.
        *mock.failing_splits.lock().unwrap() = 2;

        let outcomes = params.run_with(&mock, &ChannelNumberReader).unwrap();
        assert!(matches!(outcomes[0], CubeOutcome::Failed(_)));
        // The second cube has the same width, but nothing usable was made for
        // the first, so it splits again.
        assert_eq!(num_splits(&mock), 4);
        match &outcomes[1] {
            CubeOutcome::Written { image, .. } => {
                assert_eq!(image.filled_channels, vec![4, 5, 6, 7])
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    #[serial]
    #[cfg(unix)]
    fn test_relative_directories() {
        use std::os::unix::fs::PermissionsExt;

        use indoc::formatdoc;

        let tmp = TempDir::new().unwrap();
        let previous_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(tmp.path()).unwrap();
        let _restore = scopeguard::guard(previous_dir, |d| {
            let _ = std::env::set_current_dir(d);
        });
        let cwd = std::env::current_dir().unwrap();
        let log = cwd.join("invert.log");

        // Stand-ins for the MIRIAD tasks that run before any image exists.
        // Every channel reports no visibilities.
        fs::create_dir_all("bin").unwrap();
        let scripts = [
            (
                "uvaver",
                formatdoc! {r#"
                    #!/bin/sh
                    for arg in "$@"; do
                        case "$arg" in
                            out=*) mkdir -p "${{arg#out=}}" && touch "${{arg#out=}}/visdata" ;;
                        esac
                    done
                "#},
            ),
            (
                "invert",
                formatdoc! {r#"
                    #!/bin/sh
                    for arg in "$@"; do
                        case "$arg" in
                            vis=*) echo "${{arg#vis=}}" >> '{log}' ;;
                        esac
                    done
                    echo "Visibilities accepted: 0"
                "#,
                log = log.display()},
            ),
        ];
        for (task, contents) in scripts {
            let path = Path::new("bin").join(task);
            fs::write(&path, contents).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        fs::create_dir_all("target.mir").unwrap();

        let mut params = get_params(
            &tmp,
            vec1![CubeRequest {
                input_channels: 0..8,
                channel_width_hz: 1e5,
            }],
        );
        params.dataset = PathBuf::from("target.mir");
        params.line_dir = PathBuf::from("line");
        params.cont_dir = PathBuf::from("continuum");
        params.miriad_bin_dir = Some(PathBuf::from("bin"));
        params.pools = PoolConfig::serial();

        let outcomes = params.run().unwrap();
        assert_eq!(outcomes, vec![CubeOutcome::NoChannels]);

        // The chunks are where the manifest says, not under the cubes
        // directory the tasks run in.
        assert!(cwd.join("line/00/00_line.mir/visdata").exists());
        assert!(cwd.join("line/01/01_line.mir/visdata").exists());
        assert!(!cwd.join("line/cubes/line").exists());

        // Every channel was inverted from its chunk's data.
        let inverted = fs::read_to_string(&log).unwrap();
        let inverted: Vec<&str> = inverted.lines().collect();
        assert_eq!(inverted.len(), 8);
        for chunk in ["00", "01"] {
            let dataset = cwd.join(format!("line/{chunk}/{chunk}_line.mir"));
            let dataset = dataset.display().to_string();
            assert_eq!(inverted.iter().filter(|&&v| v == dataset).count(), 4);
        }
    }
}
