// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::Path;

use fitsio::{
    hdu::HduInfo,
    images::{ImageDescription, ImageType},
    FitsFile,
};
use tempfile::TempDir;

use linecube::filenames::cube_image_filename;

use crate::{get_cmd_output, linecube};

/// A 1x3x4 channel image full of `value`.
fn write_channel(path: &Path, value: f32) {
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[1, 3, 4],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .open()
        .unwrap();
    let hdu = fptr.primary_hdu().unwrap();
    hdu.write_image(&mut fptr, &[value; 12]).unwrap();
    for (key, value) in [
        ("CTYPE1", "RA---NCP"),
        ("CTYPE2", "DEC--NCP"),
        ("CTYPE3", "FREQ-OBS"),
        ("BUNIT", "JY/BEAM"),
    ] {
        hdu.write_key(&mut fptr, key, value).unwrap();
    }
}

#[test]
fn test_assemble_with_a_missing_channel() {
    let tmp = TempDir::new().unwrap();
    for channel in [10, 11, 13] {
        write_channel(&tmp.path().join(cube_image_filename(channel)), channel as f32);
    }
    let output = tmp.path().join("cube.fits");

    let cmd = linecube()
        .arg("cube-assemble")
        .arg("--dir")
        .arg(tmp.path())
        .args(["--start-channel", "10", "--end-channel", "14"])
        .args(["--start-freq", "1.4e9", "--no-beam"])
        .arg("--output")
        .arg(&output)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    assert!(!tmp.path().join("HI_beam_cube.fits").exists());

    let mut fptr = FitsFile::open(&output).unwrap();
    let hdu = fptr.primary_hdu().unwrap();
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => assert_eq!(shape, &[4, 3, 4]),
        _ => panic!("not an image"),
    }
    let data: Vec<f32> = hdu.read_image(&mut fptr).unwrap();
    for (i, slice) in data.chunks(12).enumerate() {
        if i == 2 {
            assert!(slice.iter().all(|p| p.is_nan()));
        } else {
            assert!(slice.iter().all(|&p| p == (10 + i) as f32));
        }
    }
    let crval3: f64 = hdu.read_key(&mut fptr, "CRVAL3").unwrap();
    assert!((crval3 - 1.4e9).abs() < 1.0);
}

#[test]
fn test_nothing_to_assemble() {
    let tmp = TempDir::new().unwrap();
    let cmd = linecube()
        .arg("cube-assemble")
        .arg("--dir")
        .arg(tmp.path())
        .args(["--start-channel", "0", "--end-channel", "4"])
        .args(["--start-freq", "1.4e9"])
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("was not written"), "{stdout}");
    assert!(!tmp.path().join("HI_image_cube.fits").exists());
}
