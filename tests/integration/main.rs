// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod cube_assemble;
mod line_image;

use std::{process::Output, str::from_utf8};

use assert_cmd::{output::OutputError, Command};

fn linecube() -> Command {
    Command::cargo_bin("linecube").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

#[test]
fn test_help_lists_subcommands() {
    let cmd = linecube().arg("--help").ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    for sub in ["line-image", "continuum-image", "cube-assemble"] {
        assert!(stdout.contains(sub), "{sub} missing from:\n{stdout}");
    }
}

#[test]
fn test_no_subcommand_is_an_error() {
    let cmd = linecube().ok();
    assert!(cmd.is_err());
}

#[test]
fn test_continuum_image_needs_data() {
    let tmp = tempfile::TempDir::new().unwrap();
    let cmd = linecube()
        .args(["continuum-image", "--cont-dir"])
        .arg(tmp.path())
        .arg("--dry-run")
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("No input data was supplied"), "{stderr}");
}
