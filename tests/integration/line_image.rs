// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fs, path::Path};

use tempfile::TempDir;

use crate::{get_cmd_output, linecube};

/// Arguments for a dry run over a dataset that exists. The cubes come last.
fn dry_run_args(tmp: &Path, cubes: &[&str]) -> Vec<String> {
    let data = tmp.join("target.mir");
    fs::create_dir_all(&data).unwrap();
    let mut args: Vec<String> = vec![
        "line-image".into(),
        "--data".into(),
        data.display().to_string(),
        "--total-channels".into(),
        "64".into(),
        "--channel-width".into(),
        "1e4".into(),
        "--start-freq".into(),
        "1.4e9".into(),
        "--line-dir".into(),
        tmp.join("line").display().to_string(),
        "--dry-run".into(),
        "--cubes".into(),
    ];
    args.extend(cubes.iter().map(|c| c.to_string()));
    args
}

#[test]
fn test_dry_run() {
    let tmp = TempDir::new().unwrap();
    let cmd = linecube().args(dry_run_args(tmp.path(), &["0,32", "32,64,2e4"])).ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run -- exiting now."), "{stdout}");
    assert!(stdout.contains("Cube 1: input channels 32..64"), "{stdout}");
    // Nothing is made on a dry run.
    assert!(!tmp.path().join("line").exists());
}

#[test]
fn test_saved_toml_reproduces_the_run() {
    let tmp = TempDir::new().unwrap();
    let toml = tmp.path().join("line.toml");
    let cmd = linecube()
        .args(dry_run_args(tmp.path(), &["0,32", "32,64,2e4"]))
        .arg("--save-toml")
        .arg(&toml)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let contents = fs::read_to_string(&toml).unwrap();
    assert!(contents.contains("[line-image]"), "{contents}");

    let cmd = linecube()
        .arg("line-image")
        .arg(&toml)
        .arg("--dry-run")
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Cube 0: input channels 0..32"), "{stdout}");
}

#[test]
fn test_bad_cube_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cmd = linecube()
        .args(dry_run_args(tmp.path(), &["0,32", "32,16"]))
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("Couldn't parse cube '32,16'"), "{stderr}");
}

#[test]
fn test_unknown_subtract_mode_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut args = dry_run_args(tmp.path(), &["0,32"]);
    args.extend(["--subtract-mode".to_string(), "uvfit".to_string()]);
    let cmd = linecube().args(args).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(
        stderr.contains("Unknown continuum subtraction mode 'uvfit'"),
        "{stderr}"
    );
}
