// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fs;

use approx::assert_abs_diff_eq;
use serial_test::serial;
use tempfile::TempDir;

use super::*;
use crate::{
    constants::HI_REST_FREQ_HZ,
    filenames::{cube_beam_filename, cube_image_filename, CUBE_BEAM_PREFIX, CUBE_IMAGE_PREFIX},
    imaging::mock::channel_of,
};

const NX: usize = 4;
const NY: usize = 3;

fn cards(pairs: &[(&str, &str)]) -> MetadataHeader {
    MetadataHeader::from_cards(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    )
}

fn channel_header() -> MetadataHeader {
    cards(&[
        ("SIMPLE", "T"),
        ("BITPIX", "-32"),
        ("NAXIS", "4"),
        ("NAXIS1", "4"),
        ("NAXIS2", "3"),
        ("NAXIS3", "1"),
        ("NAXIS4", "1"),
        ("CTYPE1", "'RA---NCP'"),
        ("CRVAL1", "1.5E+02"),
        ("CTYPE2", "'DEC--NCP'"),
        ("CRVAL2", "-3.0D+01"),
        ("CTYPE3", "'FREQ-OBS'"),
        ("CRVAL3", "1.4E+09"),
        ("CDELT3", "1.85185E+04"),
        ("CRPIX3", "1.0"),
        ("CTYPE4", "'STOKES  '"),
        ("CRVAL4", "1.0"),
        ("BUNIT", "'JY/BEAM '"),
        ("OBJECT", "'NGC 1234'"),
    ])
}

/// Channel images held in memory. The plane of a channel is filled with the
/// channel index; the files themselves only need to exist.
struct MemoryReader;

impl ChannelImageReader for MemoryReader {
    fn read_header(&self, _path: &Path) -> Result<MetadataHeader, CubeError> {
        Ok(channel_header())
    }

    fn read_plane(&self, path: &Path) -> Result<Array2<f32>, CubeError> {
        let name = path.file_name().unwrap().to_str().unwrap();
        let channel = channel_of(name).unwrap();
        Ok(Array2::from_shape_fn((NY, NX), |(y, x)| {
            channel as f32 + (y * NX + x) as f32 / 100.0
        }))
    }
}

fn touch_channels(dir: &Path, prefix: &str, channels: impl IntoIterator<Item = usize>) {
    for c in channels {
        fs::write(dir.join(cube_channel_filename(prefix, c)), "").unwrap();
    }
}

#[test]
fn test_missing_channels_are_no_data() {
    let tmp = TempDir::new().unwrap();
    touch_channels(
        tmp.path(),
        CUBE_IMAGE_PREFIX,
        (0..10).filter(|c| *c != 3 && *c != 7),
    );
    let cube = assemble(&MemoryReader, tmp.path(), CUBE_IMAGE_PREFIX, 0..10)
        .unwrap()
        .unwrap();

    assert_eq!(cube.data.dim(), (10, NY, NX));
    assert_eq!(cube.filled_channels, vec![0, 1, 2, 4, 5, 6, 8, 9]);
    for c in 0..10 {
        let slice = cube.data.slice(s![c, .., ..]);
        if c == 3 || c == 7 {
            assert!(slice.iter().all(|v| v.is_nan()), "slice {c} should be empty");
        } else {
            let expected = MemoryReader.read_plane(&tmp.path().join(cube_image_filename(c))).unwrap();
            assert_eq!(slice, expected);
        }
    }
}

#[test]
fn test_channels_are_placed_relative_to_the_range() {
    let tmp = TempDir::new().unwrap();
    // Channel 0 is outside the range, but it is still the first file.
    touch_channels(tmp.path(), CUBE_IMAGE_PREFIX, [0, 2, 3, 4, 6, 9]);
    // Beam images don't get mixed in.
    touch_channels(tmp.path(), CUBE_BEAM_PREFIX, [5]);
    let cube = assemble(&MemoryReader, tmp.path(), CUBE_IMAGE_PREFIX, 2..7)
        .unwrap()
        .unwrap();
    assert_eq!(cube.data.dim(), (5, NY, NX));
    assert_eq!(cube.filled_channels, vec![2, 3, 4, 6]);
    assert_abs_diff_eq!(cube.data[(0, 0, 0)], 2.0);
    assert_abs_diff_eq!(cube.data[(4, 0, 0)], 6.0);
    assert!(cube.data[(3, 1, 1)].is_nan());
}

#[test]
fn test_no_channel_images_means_no_cube() {
    let tmp = TempDir::new().unwrap();
    touch_channels(tmp.path(), CUBE_BEAM_PREFIX, [1, 2]);
    let result = assemble(&MemoryReader, tmp.path(), CUBE_IMAGE_PREFIX, 0..4).unwrap();
    assert!(result.is_none());

    let output = tmp.path().join("HI_image_cube0.fits");
    let result = assemble_cube(
        &MemoryReader,
        tmp.path(),
        CUBE_IMAGE_PREFIX,
        0..4,
        1.4e9,
        &output,
    )
    .unwrap();
    assert!(result.is_none());
    assert!(!output.exists());
}

#[test]
fn test_accumulator_fills_each_slot_once() {
    let mut acc = CubeAccumulator::new(10..13, 2, 2).unwrap();
    assert_eq!(acc.plane_shape(), (2, 2));
    let plane = Array2::from_elem((2, 2), 1.0);
    acc.fill(11, plane.view()).unwrap();
    assert!(matches!(
        acc.fill(11, plane.view()),
        Err(CubeError::AlreadyFilled(11))
    ));
    assert!(matches!(
        acc.fill(13, plane.view()),
        Err(CubeError::ChannelOutOfRange { channel: 13, .. })
    ));
    assert_eq!(acc.filled_channels(), vec![11]);
    let data = acc.into_data();
    assert!(data[(0, 0, 0)].is_nan());
    assert_abs_diff_eq!(data[(1, 1, 1)], 1.0);

    assert!(matches!(
        CubeAccumulator::new(5..5, 2, 2),
        Err(CubeError::EmptyRange { start: 5, end: 5 })
    ));
}

#[test]
fn test_header_values_parse() {
    let header = channel_header();
    assert_eq!(header.get_str("CTYPE4"), Some("STOKES"));
    assert_eq!(header.get("NAXIS1"), Some(&HeaderValue::Int(4)));
    assert_abs_diff_eq!(header.get_f64("CRVAL2").unwrap(), -30.0);
    assert_eq!(header.get_str("OBJECT"), Some("NGC 1234"));
    // Logicals aren't carried.
    assert!(header.get("SIMPLE").is_none());

    let header = cards(&[("OBSERVER", "'O''Neil'")]);
    assert_eq!(header.get_str("OBSERVER"), Some("O'Neil"));
}

#[test]
fn test_reconcile_sets_frequencies_and_prunes() {
    let mut header = channel_header();
    header.reconcile(1.41e9);

    assert_abs_diff_eq!(header.get_f64("CRVAL3").unwrap(), 1.41e9);
    assert_abs_diff_eq!(header.get_f64("RESTFREQ").unwrap(), HI_REST_FREQ_HZ);
    assert_eq!(header.get_str("CTYPE3"), Some("FREQ-OBS"));
    assert_abs_diff_eq!(header.get_f64("CDELT3").unwrap(), 18518.5);
    assert!(header.get("CTYPE4").is_none());
    assert!(header.get("CRVAL4").is_none());
    assert!(header.get("NAXIS4").is_none());
    assert_eq!(header.get_str("CTYPE1"), Some("RA---NCP"));
    assert_eq!(header.get_str("BUNIT"), Some("JY/BEAM"));

    let descriptive: Vec<&str> = header.descriptive_cards().map(|(k, _)| k).collect();
    assert!(!descriptive.contains(&"NAXIS"));
    assert!(!descriptive.contains(&"NAXIS1"));
    assert!(!descriptive.contains(&"BITPIX"));
    assert!(descriptive.contains(&"CTYPE2"));
}

#[test]
fn test_reconcile_moves_frequency_ahead_of_sky_response() {
    let mut header = cards(&[
        ("CTYPE1", "'RA---NCP'"),
        ("CTYPE2", "'DEC--NCP'"),
        ("CTYPE3", "'SDBEAM'"),
        ("CRVAL3", "1.0"),
        ("CTYPE4", "'FREQ-OBS'"),
        ("CRVAL4", "1.42E+09"),
        ("CDELT4", "2.0E+04"),
        ("CRPIX4", "1.0"),
    ]);
    header.reconcile(1.39e9);

    assert_eq!(header.get_str("CTYPE3"), Some("FREQ-OBS"));
    // The frequency reference comes with the frequency axis; the start
    // frequency was set on the sky-response axis before the swap.
    assert_abs_diff_eq!(header.get_f64("CRVAL3").unwrap(), 1.42e9);
    assert_abs_diff_eq!(header.get_f64("RESTFREQ").unwrap(), HI_REST_FREQ_HZ);
    assert_abs_diff_eq!(header.get_f64("CDELT3").unwrap(), 2.0e4);
    assert_abs_diff_eq!(header.get_f64("CRPIX3").unwrap(), 1.0);
    // The sky-response axis, now axis 4, is dropped.
    assert!(header.get("CTYPE4").is_none());
    assert!(header.get("CRVAL4").is_none());
    assert!(header.get("CDELT4").is_none());
}

#[test]
fn test_unknown_axis_types_are_pruned() {
    let mut header = cards(&[
        ("CTYPE1", "'RA---SIN'"),
        ("CRVAL1", "10.0"),
        ("CTYPE2", "'DEC--NCP'"),
        ("CTYPE3", "'FREQ-OBS'"),
    ]);
    header.reconcile(1.4e9);
    assert!(header.get("CTYPE1").is_none());
    assert!(header.get("CRVAL1").is_none());
    assert_eq!(header.get_str("CTYPE2"), Some("DEC--NCP"));
}

/// Write a 4-axis channel image like the ones MIRIAD exports.
fn write_channel_fits(path: &Path, value: f32) {
    let mut fptr = fits_create_image(path, &[1, 1, NY, NX]).unwrap();
    let hdu = fits_open_hdu(&mut fptr, 0).unwrap();
    let pixels: Vec<f32> = (0..NX * NY).map(|i| value + i as f32).collect();
    fits_write_image(&mut fptr, &hdu, &pixels).unwrap();
    for (key, v) in [
        ("CTYPE1", "RA---NCP"),
        ("CTYPE2", "DEC--NCP"),
        ("CTYPE3", "FREQ-OBS"),
        ("CTYPE4", "STOKES"),
        ("BUNIT", "JY/BEAM"),
    ] {
        fits_write_key(&mut fptr, &hdu, key, v.to_string()).unwrap();
    }
    fits_write_key(&mut fptr, &hdu, "CRVAL3", 1.4e9).unwrap();
    fits_write_key(&mut fptr, &hdu, "CDELT3", 18518.5).unwrap();
    fits_write_key(&mut fptr, &hdu, "CRVAL4", 1.0).unwrap();
}

#[test]
#[serial]
fn test_fits_cube_round_trip() {
    let tmp = TempDir::new().unwrap();
    for c in [2, 3, 4, 6] {
        write_channel_fits(&tmp.path().join(cube_image_filename(c)), c as f32 * 100.0);
    }
    let output = tmp.path().join("HI_image_cube0.fits");
    // Replaced, not appended to.
    fs::write(&output, "stale").unwrap();

    let summary = assemble_cube(
        &FitsChannelReader,
        tmp.path(),
        CUBE_IMAGE_PREFIX,
        2..7,
        1.41e9,
        &output,
    )
    .unwrap()
    .unwrap();
    assert_eq!(summary.num_channels, 5);
    assert_eq!(summary.filled_channels, vec![2, 3, 4, 6]);

    let mut fptr = fits_open(&output).unwrap();
    let hdu = fits_open_hdu(&mut fptr, 0).unwrap();
    assert_eq!(fits_get_image_shape(&fptr, &hdu).unwrap(), &[5, NY, NX]);
    let data: Vec<f32> = fits_get_image(&mut fptr, &hdu).unwrap();
    let data = Array3::from_shape_vec((5, NY, NX), data).unwrap();
    assert_abs_diff_eq!(data[(0, 0, 0)], 200.0);
    assert_abs_diff_eq!(data[(2, 2, 3)], 400.0 + 11.0);
    assert_abs_diff_eq!(data[(4, 0, 1)], 601.0);
    assert!(data.slice(s![3, .., ..]).iter().all(|v| v.is_nan()));

    let header = MetadataHeader::from_cards(fits_read_header_cards(&mut fptr, &hdu).unwrap());
    assert_abs_diff_eq!(header.get_f64("RESTFREQ").unwrap(), HI_REST_FREQ_HZ, epsilon = 1.0);
    assert_abs_diff_eq!(header.get_f64("CRVAL3").unwrap(), 1.41e9, epsilon = 1.0);
    assert_eq!(header.get_str("CTYPE3"), Some("FREQ-OBS"));
    assert_eq!(header.get_str("BUNIT"), Some("JY/BEAM"));
    assert!(header.get("CTYPE4").is_none());
}

/// Write a channel beam like the ones MIRIAD exports, with the sky-response
/// axis ahead of frequency.
fn write_beam_fits(path: &Path) {
    let mut fptr = fits_create_image(path, &[1, 1, NY, NX]).unwrap();
    let hdu = fits_open_hdu(&mut fptr, 0).unwrap();
    fits_write_image(&mut fptr, &hdu, &[1.0f32; NX * NY]).unwrap();
    for (key, v) in [
        ("CTYPE1", "RA---NCP"),
        ("CTYPE2", "DEC--NCP"),
        ("CTYPE3", "SDBEAM"),
        ("CTYPE4", "FREQ-OBS"),
    ] {
        fits_write_key(&mut fptr, &hdu, key, v.to_string()).unwrap();
    }
    fits_write_key(&mut fptr, &hdu, "CRVAL3", 1.0).unwrap();
    fits_write_key(&mut fptr, &hdu, "CRVAL4", 1.42e9).unwrap();
    fits_write_key(&mut fptr, &hdu, "CDELT4", 18518.5).unwrap();
    fits_write_key(&mut fptr, &hdu, "CRPIX4", 1.0).unwrap();
}

#[test]
#[serial]
fn test_beam_cube_header() {
    let tmp = TempDir::new().unwrap();
    for c in [0, 1, 3] {
        write_beam_fits(&tmp.path().join(cube_beam_filename(c)));
    }
    let output = tmp.path().join("HI_beam_cube0.fits");
    assemble_cube(
        &FitsChannelReader,
        tmp.path(),
        CUBE_BEAM_PREFIX,
        0..4,
        1.41e9,
        &output,
    )
    .unwrap()
    .unwrap();

    let mut fptr = fits_open(&output).unwrap();
    let hdu = fits_open_hdu(&mut fptr, 0).unwrap();
    assert_eq!(fits_get_image_shape(&fptr, &hdu).unwrap(), &[4, NY, NX]);
    let header = MetadataHeader::from_cards(fits_read_header_cards(&mut fptr, &hdu).unwrap());
    assert_eq!(header.get_str("CTYPE3"), Some("FREQ-OBS"));
    assert_abs_diff_eq!(header.get_f64("CRVAL3").unwrap(), 1.42e9, epsilon = 1.0);
    assert_abs_diff_eq!(header.get_f64("CDELT3").unwrap(), 18518.5, epsilon = 1e-3);
    assert_abs_diff_eq!(header.get_f64("RESTFREQ").unwrap(), HI_REST_FREQ_HZ, epsilon = 1.0);
    assert!(header.get("CTYPE4").is_none());
}

#[test]
#[serial]
fn test_fits_reader_rejects_real_extra_axes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(cube_image_filename(0));
    let mut fptr = fits_create_image(&path, &[2, NY, NX]).unwrap();
    let hdu = fits_open_hdu(&mut fptr, 0).unwrap();
    fits_write_image(&mut fptr, &hdu, &vec![0.0f32; 2 * NY * NX]).unwrap();
    drop(fptr);

    assert!(matches!(
        FitsChannelReader.read_plane(&path),
        Err(CubeError::NonDegenerateAxes { .. })
    ));
}
